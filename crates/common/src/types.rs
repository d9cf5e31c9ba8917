//! Core types for beaconcheck

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::beacon::parse_query;

/// A single expectation row loaded from an expectation source.
///
/// Identity is the row position in the source; statuses are written back
/// to the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Zero-based position of the row in the backing source
    pub row: usize,
    pub url: String,
    pub field_name: String,
    pub expected_value: String,
    /// Pipe-delimited action script, if any
    pub action_script: Option<String>,
    /// Raw `AssertURL` column, carried through untouched
    #[serde(default)]
    pub assert_url: Option<String>,
    /// Status as last persisted (empty when never run)
    #[serde(default)]
    pub prior_status: String,
}

impl TestCase {
    pub fn new(row: usize, url: &str, field_name: &str, expected_value: &str) -> Self {
        Self {
            row,
            url: url.to_string(),
            field_name: field_name.to_string(),
            expected_value: expected_value.to_string(),
            action_script: None,
            assert_url: None,
            prior_status: String::new(),
        }
    }

    pub fn with_action(mut self, script: &str) -> Self {
        self.action_script = Some(script.to_string());
        self
    }

    /// Rows without a URL cannot be visited and are skipped by the runner
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Action script with surrounding whitespace removed, `None` when blank
    pub fn action(&self) -> Option<&str> {
        self.action_script
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Outcome of verifying one case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseStatus {
    Pass,
    Fail,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pass => "Pass",
            CaseStatus::Fail => "Fail",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, CaseStatus::Pass)
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a case failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Beacons arrived but the field value differed
    Mismatch,
    /// No qualifying beacon arrived before the deadline
    NoBeacon,
    /// The page could not be loaded
    Navigation(String),
    /// An action target never became visible
    ElementNotFound(String),
    /// The interaction itself failed
    Interaction(String),
    /// The run was aborted before this case could be verified
    Aborted(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Mismatch => write!(f, "value mismatch"),
            FailureReason::NoBeacon => write!(f, "no beacon captured before timeout"),
            FailureReason::Navigation(msg) => write!(f, "navigation failed: {}", msg),
            FailureReason::ElementNotFound(loc) => write!(f, "element not found: {}", loc),
            FailureReason::Interaction(msg) => write!(f, "interaction failed: {}", msg),
            FailureReason::Aborted(msg) => write!(f, "run aborted: {}", msg),
        }
    }
}

/// Verdict for a single case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub row: usize,
    pub url: String,
    pub field_name: String,
    pub expected_value: String,
    pub status: CaseStatus,
    /// Normalized value observed in the beacon(s), empty when none
    pub actual_value: String,
    pub beacons_considered: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl MatchResult {
    pub fn pass(case: &TestCase, actual_value: String, beacons_considered: usize) -> Self {
        Self::build(case, CaseStatus::Pass, actual_value, beacons_considered, None)
    }

    pub fn fail(
        case: &TestCase,
        actual_value: String,
        beacons_considered: usize,
        reason: FailureReason,
    ) -> Self {
        Self::build(case, CaseStatus::Fail, actual_value, beacons_considered, Some(reason))
    }

    fn build(
        case: &TestCase,
        status: CaseStatus,
        actual_value: String,
        beacons_considered: usize,
        reason: Option<FailureReason>,
    ) -> Self {
        Self {
            row: case.row,
            url: case.url.clone(),
            field_name: case.field_name.clone(),
            expected_value: case.expected_value.clone(),
            status,
            actual_value,
            beacons_considered,
            reason,
        }
    }
}

/// An intercepted analytics request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beacon {
    pub raw_url: String,
    pub method: String,
    pub query_params: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Response status, 0 when the request never got a response
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
    pub synthetic_id: String,
}

impl Beacon {
    /// Build a beacon from a captured request, decoding its query string
    pub fn capture(
        raw_url: &str,
        method: &str,
        status_code: u16,
        headers: HashMap<String, String>,
    ) -> Self {
        Self {
            raw_url: raw_url.to_string(),
            method: method.to_ascii_uppercase(),
            query_params: parse_query(raw_url),
            headers,
            status_code,
            timestamp: Utc::now(),
            synthetic_id: format!("request_{}", Uuid::new_v4().simple()),
        }
    }

    /// Shorthand for a successful GET with no headers
    pub fn get(raw_url: &str) -> Self {
        Self::capture(raw_url, "GET", 200, HashMap::new())
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.query_params.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_url_and_action() {
        let case = TestCase::new(0, "   ", "pageName", "Home").with_action("  ");
        assert!(!case.has_url());
        assert_eq!(case.action(), None);

        let case = TestCase::new(1, "https://example.com", "pageName", "Home")
            .with_action(" click|#go ");
        assert!(case.has_url());
        assert_eq!(case.action(), Some("click|#go"));
    }

    #[test]
    fn test_beacon_capture_decodes_query() {
        let beacon = Beacon::capture(
            "https://metrics.example.com/b/ss/rsid/1/JS-2.0/s1?pageName=Home%20Page&v5=search",
            "get",
            200,
            HashMap::new(),
        );
        assert_eq!(beacon.method, "GET");
        assert_eq!(beacon.query_params.get("pageName").map(String::as_str), Some("Home Page"));
        assert!(beacon.has_param("v5"));
        assert!(beacon.synthetic_id.starts_with("request_"));
    }

    #[test]
    fn test_synthetic_ids_are_unique() {
        let a = Beacon::get("https://x.test/b/ss/a?x=1");
        let b = Beacon::get("https://x.test/b/ss/a?x=1");
        assert_ne!(a.synthetic_id, b.synthetic_id);
    }
}
