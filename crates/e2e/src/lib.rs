//! beaconcheck verification engine
//!
//! This crate drives a browser page through the rows of an expectation
//! source and verifies the analytics beacons each page emits:
//! - Registers a beacon listener before every navigation
//! - Executes parsed action scripts against the page
//! - Captures qualifying beacons under a bounded wait
//! - Compares canonical field values and writes statuses back
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SuiteRunner (events | plain)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ExpectationStore::load_cases() -> [TestCase]               │
//! │    for each case:                                           │
//! │      PageDriver::listen(pattern) -> BeaconListener          │
//! │      PageDriver::navigate(url)                              │
//! │      ActionExecutor::execute(step)  (wait, act, settle)     │
//! │      InterceptionMatcher::capture() -> CapturedBeacon       │
//! │    InterceptionMatcher::evaluate() -> MatchResult           │
//! │  write_results() -> ExpectationStore::save_statuses()       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageDriver                                                 │
//! │    ├── PlaywrightDriver  (node bridge, JSON lines)          │
//! │    └── ScriptedPage      (canned events, no browser)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod driver;
pub mod error;
pub mod executor;
pub mod matcher;
pub mod playwright;
pub mod runner;
pub mod scripted;

pub use driver::{BeaconListener, PageDriver, PageEvent};
pub use error::{E2eError, E2eResult};
pub use executor::ActionExecutor;
pub use matcher::{CapturedBeacon, InterceptionMatcher};
pub use playwright::{PlaywrightConfig, PlaywrightDriver};
pub use runner::{CaseCapture, RunCapture, RunSummary, SuiteRunner};
pub use scripted::ScriptedPage;
