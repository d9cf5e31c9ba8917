//! Error types for browser-driven verification

use beaconcheck_common::FailureReason;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Node.js not found at '{0}'. Install Node.js and run: npm install playwright")]
    NodeNotFound(String),

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Playwright bridge closed unexpectedly")]
    BridgeClosed,

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element '{locator}' not visible after {timeout_ms} ms")]
    ElementNotFound { locator: String, timeout_ms: u64 },

    #[error("Step failed: {step} - {reason}")]
    Interaction { step: String, reason: String },

    #[error("Uncaught page error: {0}")]
    PageScript(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Expectation store error: {0}")]
    Store(#[from] beaconcheck_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

impl E2eError {
    /// Failure reason when the error only fails the current case.
    ///
    /// `None` means the error is fatal to the run.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            E2eError::Navigation { reason, .. } => Some(FailureReason::Navigation(reason.clone())),
            E2eError::ElementNotFound { locator, .. } => {
                Some(FailureReason::ElementNotFound(locator.clone()))
            }
            E2eError::Interaction { step, reason } => {
                Some(FailureReason::Interaction(format!("{}: {}", step, reason)))
            }
            E2eError::Timeout(what) => Some(FailureReason::Interaction(format!("timed out: {}", what))),
            _ => None,
        }
    }

    pub fn is_case_failure(&self) -> bool {
        self.failure_reason().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_failures_are_recoverable() {
        let err = E2eError::ElementNotFound { locator: "#go".into(), timeout_ms: 4000 };
        assert_eq!(err.failure_reason(), Some(FailureReason::ElementNotFound("#go".into())));

        let err = E2eError::Navigation { url: "https://a.test".into(), reason: "net::ERR".into() };
        assert!(err.is_case_failure());
    }

    #[test]
    fn test_run_failures_are_fatal() {
        assert!(!E2eError::BridgeClosed.is_case_failure());
        assert!(!E2eError::PageScript("boom".into()).is_case_failure());
        let store = beaconcheck_common::Error::MissingColumn("Url".into());
        assert!(!E2eError::from(store).is_case_failure());
    }
}
