//! Scripted page driver
//!
//! A deterministic [`PageDriver`] that replays canned page events for given
//! URLs and locators. Used to exercise the verification pipeline without a
//! browser.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use beaconcheck_common::{Beacon, NetworkPattern};

use crate::driver::{BeaconListener, PageDriver, PageEvent};
use crate::error::{E2eError, E2eResult};

/// Shared record of every driver call, in order
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub struct ScriptedPage {
    on_navigate: HashMap<String, Vec<PageEvent>>,
    on_action: HashMap<String, Vec<PageEvent>>,
    missing: HashSet<String>,
    unreachable: HashSet<String>,
    listener: Option<(NetworkPattern, UnboundedSender<PageEvent>)>,
    log: CallLog,
}

/// Beacon event for a GET to `url`
pub fn beacon(url: &str) -> PageEvent {
    PageEvent::Beacon(Beacon::get(url))
}

/// Uncaught script error event
pub fn script_error(message: &str) -> PageEvent {
    PageEvent::ScriptError(message.to_string())
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events emitted every time `url` is loaded
    pub fn on_navigate(mut self, url: &str, events: Vec<PageEvent>) -> Self {
        self.on_navigate.entry(url.to_string()).or_default().extend(events);
        self
    }

    /// Events emitted when the element at `locator` is acted on
    pub fn on_action(mut self, locator: &str, events: Vec<PageEvent>) -> Self {
        self.on_action.entry(locator.to_string()).or_default().extend(events);
        self
    }

    /// Never becomes visible
    pub fn missing_element(mut self, locator: &str) -> Self {
        self.missing.insert(locator.to_string());
        self
    }

    /// Navigation to `url` fails
    pub fn unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }

    fn emit(&mut self, events: Option<Vec<PageEvent>>) {
        let Some(events) = events else { return };
        let Some((pattern, tx)) = &self.listener else { return };

        for event in events {
            let forward = match &event {
                PageEvent::Beacon(beacon) => pattern.matches_beacon(beacon),
                PageEvent::ScriptError(_) => true,
            };
            if forward {
                // A dropped listener just means nobody is watching any more
                let _ = tx.send(event);
            }
        }
    }

    fn act(&mut self, locator: &str) {
        let events = self.on_action.get(locator).cloned();
        self.emit(events);
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn listen(&mut self, pattern: &NetworkPattern) -> E2eResult<BeaconListener> {
        self.record(format!("listen {}", pattern.glob()));
        let (tx, listener) = BeaconListener::channel();
        self.listener = Some((pattern.clone(), tx));
        Ok(listener)
    }

    async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        self.record(format!("navigate {}", url));
        if self.unreachable.contains(url) {
            return Err(E2eError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
            });
        }
        let events = self.on_navigate.get(url).cloned();
        self.emit(events);
        Ok(())
    }

    async fn wait_for_visible(&mut self, locator: &str, timeout: Duration) -> E2eResult<()> {
        self.record(format!("wait_for {}", locator));
        if self.missing.contains(locator) {
            return Err(E2eError::ElementNotFound {
                locator: locator.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn click(&mut self, locator: &str) -> E2eResult<()> {
        self.record(format!("click {}", locator));
        self.act(locator);
        Ok(())
    }

    async fn type_text(&mut self, locator: &str, value: &str) -> E2eResult<()> {
        self.record(format!("type {} {}", locator, value));
        self.act(locator);
        Ok(())
    }

    async fn select_option(&mut self, locator: &str, value: &str) -> E2eResult<()> {
        self.record(format!("select {} {}", locator, value));
        self.act(locator);
        Ok(())
    }

    async fn close(&mut self) -> E2eResult<()> {
        self.record("close".to_string());
        self.listener = None;
        Ok(())
    }
}
