//! beaconcheck Common Library
//!
//! Shared data model and the browser-independent half of the verification
//! engine: beacon decoding, canonical field mapping, the action
//! mini-language, network patterns, configuration and expectation stores.

pub mod action;
pub mod beacon;
pub mod capture_log;
pub mod config;
pub mod error;
pub mod fields;
pub mod pattern;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use action::{parse_action_script, ActionScript, ActionStep};
pub use beacon::parse_query;
pub use capture_log::CaptureLog;
pub use config::{CaptureMode, HarnessConfig, SuiteConfig, SuiteName};
pub use error::{Error, Result};
pub use fields::{CanonicalFields, FieldRecord};
pub use pattern::{NetworkPattern, RequiredParams};
pub use store::{CsvStore, ExpectationStore, SqliteStore};
pub use types::*;

/// beaconcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file, relative to the working directory
pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("beaconcheck.toml")
}

/// Normalize a field value for comparison: trimmed and lowercased
pub fn normalize_value(value: &str) -> String {
    value.trim().to_lowercase()
}
