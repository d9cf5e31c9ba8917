//! Page driver abstraction
//!
//! The verification engine never talks to a browser directly. It drives a
//! [`PageDriver`] and consumes the [`PageEvent`]s a driver forwards to the
//! most recently registered [`BeaconListener`].

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

use beaconcheck_common::{Beacon, NetworkPattern};

use crate::error::E2eResult;

/// Something observed on the page while a listener is registered
#[derive(Debug, Clone)]
pub enum PageEvent {
    /// A request matching the listener's pattern completed or failed
    Beacon(Beacon),
    /// An uncaught script error on the page
    ScriptError(String),
}

/// Receiving end of a driver's event stream.
///
/// Events are buffered from the moment the listener is registered, so a
/// beacon fired while an action is still settling is not lost.
pub struct BeaconListener {
    rx: mpsc::UnboundedReceiver<PageEvent>,
}

impl BeaconListener {
    /// Create a connected sender/listener pair
    pub fn channel() -> (mpsc::UnboundedSender<PageEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Next event; `None` once the driver has dropped the sender
    pub async fn recv(&mut self) -> Option<PageEvent> {
        self.rx.recv().await
    }

    /// Take every event buffered so far without waiting
    pub fn drain(&mut self) -> Vec<PageEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

/// A single browser page the harness can steer
#[async_trait]
pub trait PageDriver: Send {
    /// Start forwarding requests matching `pattern`.
    ///
    /// Registration is complete when this returns, so events triggered by a
    /// subsequent navigation or action are guaranteed to be delivered.
    /// Registering again replaces the previous listener.
    async fn listen(&mut self, pattern: &NetworkPattern) -> E2eResult<BeaconListener>;

    async fn navigate(&mut self, url: &str) -> E2eResult<()>;

    /// Wait until `locator` is attached and visible
    async fn wait_for_visible(&mut self, locator: &str, timeout: Duration) -> E2eResult<()>;

    async fn click(&mut self, locator: &str) -> E2eResult<()>;

    async fn type_text(&mut self, locator: &str, value: &str) -> E2eResult<()>;

    async fn select_option(&mut self, locator: &str, value: &str) -> E2eResult<()>;

    async fn close(&mut self) -> E2eResult<()>;
}
