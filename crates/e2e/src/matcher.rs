//! Interception matcher
//!
//! Awaits beacons on a [`BeaconListener`], projects them onto the canonical
//! schema and decides whether a case's expected value was observed.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use beaconcheck_common::{
    normalize_value, Beacon, CanonicalFields, FailureReason, FieldRecord, MatchResult,
    NetworkPattern, RequiredParams, TestCase,
};

use crate::driver::{BeaconListener, PageEvent};
use crate::error::{E2eError, E2eResult};

/// A beacon that passed the pattern and parameter filters
#[derive(Debug, Clone)]
pub struct CapturedBeacon {
    pub beacon: Beacon,
    pub fields: FieldRecord,
}

pub struct InterceptionMatcher {
    pattern: NetworkPattern,
    fields: CanonicalFields,
    timeout: Duration,
    benign_errors: Vec<String>,
}

impl InterceptionMatcher {
    pub fn new(pattern: NetworkPattern, fields: CanonicalFields, timeout: Duration) -> Self {
        Self {
            pattern,
            fields,
            timeout,
            benign_errors: Vec::new(),
        }
    }

    pub fn with_benign_errors(mut self, patterns: Vec<String>) -> Self {
        self.benign_errors = patterns;
        self
    }

    pub fn pattern(&self) -> &NetworkPattern {
        &self.pattern
    }

    pub fn fields(&self) -> &CanonicalFields {
        &self.fields
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_benign(&self, message: &str) -> bool {
        self.benign_errors.iter().any(|p| message.contains(p.as_str()))
    }

    /// Apply the endpoint pattern and required-parameter filter
    pub fn qualify(&self, beacon: Beacon, required: &RequiredParams) -> Option<CapturedBeacon> {
        if !self.pattern.matches_beacon(&beacon) {
            debug!("Ignoring request outside pattern: {}", beacon.raw_url);
            return None;
        }
        if !required.accepts(&beacon) {
            debug!(
                "Discarding beacon {} without required params {:?}",
                beacon.synthetic_id, required.0
            );
            return None;
        }
        let fields = self.fields.map(&beacon.query_params);
        Some(CapturedBeacon { beacon, fields })
    }

    fn check_script_error(&self, message: &str) -> E2eResult<()> {
        if self.is_benign(message) {
            info!("Suppressed page error: {}", message);
            Ok(())
        } else {
            Err(E2eError::PageScript(message.to_string()))
        }
    }

    /// Wait for one qualifying beacon, bounded by the matcher timeout.
    ///
    /// `Ok(None)` means the timeout elapsed, which is a verdict and not an
    /// error.
    pub async fn capture(
        &self,
        listener: &mut BeaconListener,
        required: &RequiredParams,
    ) -> E2eResult<Option<CapturedBeacon>> {
        self.capture_until(listener, required, Instant::now() + self.timeout)
            .await
    }

    /// Collect up to `limit` qualifying beacons under a single deadline,
    /// then take any further qualifying beacons already buffered.
    ///
    /// Silent steps do not stop collection; a beacon fired by a later step
    /// is still picked up as long as it arrives before the deadline.
    pub async fn capture_up_to(
        &self,
        listener: &mut BeaconListener,
        required: &RequiredParams,
        limit: usize,
    ) -> E2eResult<Vec<CapturedBeacon>> {
        let deadline = Instant::now() + self.timeout;
        let mut captured = Vec::new();
        while captured.len() < limit {
            match self.capture_until(listener, required, deadline).await? {
                Some(beacon) => captured.push(beacon),
                None => break,
            }
        }
        captured.extend(self.take_buffered(listener, required)?);
        Ok(captured)
    }

    /// Qualifying beacons buffered so far, without waiting
    pub fn take_buffered(
        &self,
        listener: &mut BeaconListener,
        required: &RequiredParams,
    ) -> E2eResult<Vec<CapturedBeacon>> {
        let mut captured = Vec::new();
        for event in listener.drain() {
            match event {
                PageEvent::ScriptError(message) => self.check_script_error(&message)?,
                PageEvent::Beacon(beacon) => captured.extend(self.qualify(beacon, required)),
            }
        }
        Ok(captured)
    }

    async fn capture_until(
        &self,
        listener: &mut BeaconListener,
        required: &RequiredParams,
        deadline: Instant,
    ) -> E2eResult<Option<CapturedBeacon>> {
        loop {
            let event = match tokio::time::timeout_at(deadline, listener.recv()).await {
                Err(_) => {
                    debug!("No qualifying beacon within {:?}", self.timeout);
                    return Ok(None);
                }
                Ok(None) => return Err(E2eError::BridgeClosed),
                Ok(Some(event)) => event,
            };

            match event {
                PageEvent::ScriptError(message) => self.check_script_error(&message)?,
                PageEvent::Beacon(beacon) => {
                    if let Some(captured) = self.qualify(beacon, required) {
                        debug!("Captured beacon {}", captured.beacon.synthetic_id);
                        return Ok(Some(captured));
                    }
                }
            }
        }
    }

    /// Drop buffered events, still honouring page errors among them
    pub fn discard_pending(&self, listener: &mut BeaconListener) -> E2eResult<usize> {
        let mut discarded = 0;
        for event in listener.drain() {
            match event {
                PageEvent::ScriptError(message) => self.check_script_error(&message)?,
                PageEvent::Beacon(_) => discarded += 1,
            }
        }
        if discarded > 0 {
            debug!("Discarded {} stale beacon(s)", discarded);
        }
        Ok(discarded)
    }

    /// Compare a case against the beacons captured for it.
    ///
    /// The case passes if any beacon carries the expected value after
    /// trimming and lowercasing both sides. Otherwise the reported actual
    /// value is the last non-empty one seen. Pure: the same inputs always
    /// give the same verdict.
    pub fn evaluate(&self, case: &TestCase, beacons: &[CapturedBeacon]) -> MatchResult {
        if beacons.is_empty() {
            return MatchResult::fail(case, String::new(), 0, FailureReason::NoBeacon);
        }
        if !self.fields.contains(&case.field_name) {
            warn!(
                "Field '{}' (row {}) is not a canonical field; it will never be populated",
                case.field_name, case.row
            );
        }

        let expected = normalize_value(&case.expected_value);
        let mut actual = String::new();
        for captured in beacons {
            let value = normalize_value(captured.fields.get(&case.field_name).unwrap_or(""));
            if value == expected {
                return MatchResult::pass(case, value, beacons.len());
            }
            if !value.is_empty() {
                actual = value;
            }
        }

        if actual.is_empty() {
            warn!("Field '{}' not found in any captured beacon", case.field_name);
        }
        MatchResult::fail(case, actual, beacons.len(), FailureReason::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconcheck_common::CaseStatus;
    use test_case::test_case;

    fn matcher(timeout_ms: u64) -> InterceptionMatcher {
        InterceptionMatcher::new(
            NetworkPattern::new("**/b/ss/**", Some("GET")).unwrap(),
            CanonicalFields::default(),
            Duration::from_millis(timeout_ms),
        )
        .with_benign_errors(vec!["digitalData.event is undefined".into()])
    }

    fn captured(m: &InterceptionMatcher, url: &str) -> CapturedBeacon {
        m.qualify(Beacon::get(url), &RequiredParams::default()).unwrap()
    }

    #[test]
    fn test_decoded_value_matches_case_insensitively() {
        let m = matcher(100);
        let case = TestCase::new(0, "https://a.test/", "pageName", "Home Page");
        let beacons = [captured(&m, "https://m.test/b/ss/rs/1?pageName=home%20page")];

        let result = m.evaluate(&case, &beacons);
        assert_eq!(result.status, CaseStatus::Pass);
        assert_eq!(result.actual_value, "home page");
    }

    #[test_case("Home Page", "home%20page", true ; "percent encoded")]
    #[test_case("  HOME page ", "Home%20Page", true ; "trim and case")]
    #[test_case("Home+Page", "home+page", true ; "plus kept literal")]
    #[test_case("Home Page", "home+page", false ; "plus is not a space")]
    #[test_case("", "", true ; "empty expectation matches empty field")]
    fn test_value_normalization(expected: &str, raw: &str, pass: bool) {
        let m = matcher(100);
        let case = TestCase::new(0, "https://a.test/", "pageName", expected);
        let url = format!("https://m.test/b/ss/rs/1?pageName={}", raw);
        let result = m.evaluate(&case, &[captured(&m, &url)]);
        assert_eq!(result.status.is_pass(), pass);
    }

    #[test]
    fn test_mismatch_reports_actual() {
        let m = matcher(100);
        let case = TestCase::new(0, "https://a.test/", "c3", "foo");
        let beacons = [
            captured(&m, "https://m.test/b/ss/rs/1?c3=bar"),
            captured(&m, "https://m.test/b/ss/rs/1?pageName=x"),
        ];

        let result = m.evaluate(&case, &beacons);
        assert_eq!(result.status, CaseStatus::Fail);
        assert_eq!(result.actual_value, "bar");
        assert_eq!(result.reason, Some(FailureReason::Mismatch));
        assert_eq!(result.beacons_considered, 2);
    }

    #[test]
    fn test_any_beacon_may_satisfy() {
        let m = matcher(100);
        let case = TestCase::new(0, "https://a.test/", "v5", "Search");
        let beacons = [
            captured(&m, "https://m.test/b/ss/rs/1?v5=pageview"),
            captured(&m, "https://m.test/b/ss/rs/1?v5=search"),
        ];
        assert!(m.evaluate(&case, &beacons).status.is_pass());
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let m = matcher(100);
        let case = TestCase::new(0, "https://a.test/", "c3", "foo");
        let beacons = [captured(&m, "https://m.test/b/ss/rs/1?c3=FOO ")];
        assert_eq!(m.evaluate(&case, &beacons), m.evaluate(&case, &beacons));
    }

    #[test]
    fn test_no_beacons_fails_empty() {
        let m = matcher(100);
        let case = TestCase::new(0, "https://a.test/", "pageName", "");
        let result = m.evaluate(&case, &[]);
        assert_eq!(result.status, CaseStatus::Fail);
        assert_eq!(result.actual_value, "");
        assert_eq!(result.reason, Some(FailureReason::NoBeacon));
    }

    #[test]
    fn test_qualify_filters() {
        let m = matcher(100);
        let marker = RequiredParams::new(["v5"]);
        assert!(m.qualify(Beacon::get("https://m.test/id?v5=x"), &marker).is_none());
        assert!(m.qualify(Beacon::get("https://m.test/b/ss/rs?pageName=x"), &marker).is_none());
        let post = Beacon::capture("https://m.test/b/ss/rs?v5=x", "POST", 200, Default::default());
        assert!(m.qualify(post, &marker).is_none());
        assert!(m.qualify(Beacon::get("https://m.test/b/ss/rs?v5=x"), &marker).is_some());
    }

    #[tokio::test]
    async fn test_capture_skips_unrelated_beacons() {
        let m = matcher(1_000);
        let (tx, mut listener) = BeaconListener::channel();
        tx.send(PageEvent::Beacon(Beacon::get("https://cdn.test/lib.js"))).unwrap();
        tx.send(PageEvent::Beacon(Beacon::get("https://m.test/b/ss/rs?pageName=Home"))).unwrap();
        tx.send(PageEvent::Beacon(Beacon::get("https://m.test/b/ss/rs?v5=click"))).unwrap();

        let captured = m
            .capture(&mut listener, &RequiredParams::new(["v5"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(captured.fields.get("v5"), Some("click"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_times_out_without_beacon() {
        let m = matcher(10_000);
        let (_tx, mut listener) = BeaconListener::channel();
        let started = Instant::now();

        let captured = m.capture(&mut listener, &RequiredParams::default()).await.unwrap();
        assert!(captured.is_none());
        assert!(started.elapsed() >= Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_benign_errors_suppressed_others_fatal() {
        let m = matcher(1_000);
        let (tx, mut listener) = BeaconListener::channel();
        tx.send(PageEvent::ScriptError("TypeError: digitalData.event is undefined".into()))
            .unwrap();
        tx.send(PageEvent::Beacon(Beacon::get("https://m.test/b/ss/rs?pageName=Home"))).unwrap();
        assert!(m
            .capture(&mut listener, &RequiredParams::default())
            .await
            .unwrap()
            .is_some());

        tx.send(PageEvent::ScriptError("ReferenceError: foo is not defined".into()))
            .unwrap();
        assert!(matches!(
            m.capture(&mut listener, &RequiredParams::default()).await,
            Err(E2eError::PageScript(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_stream_is_fatal() {
        let m = matcher(1_000);
        let (tx, mut listener) = BeaconListener::channel();
        drop(tx);
        assert!(matches!(
            m.capture(&mut listener, &RequiredParams::default()).await,
            Err(E2eError::BridgeClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_up_to_shares_one_deadline() {
        let m = matcher(10_000);
        let (tx, mut listener) = BeaconListener::channel();
        let started = Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(6_000)).await;
            tx.send(PageEvent::Beacon(Beacon::get("https://m.test/b/ss/rs?v5=search"))).unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(tx);
        });

        let captured = m
            .capture_up_to(&mut listener, &RequiredParams::new(["v5"]), 2)
            .await
            .unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].fields.get("v5"), Some("search"));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(10_000));
        assert!(waited < Duration::from_millis(16_000));
    }

    #[tokio::test]
    async fn test_capture_up_to_takes_extra_buffered_beacons() {
        let m = matcher(1_000);
        let (tx, mut listener) = BeaconListener::channel();
        for url in [
            "https://m.test/b/ss/rs?v5=open",
            "https://m.test/b/ss/rs?pageName=NoMarker",
            "https://m.test/b/ss/rs?v5=filter",
        ] {
            tx.send(PageEvent::Beacon(Beacon::get(url))).unwrap();
        }

        let captured = m
            .capture_up_to(&mut listener, &RequiredParams::new(["v5"]), 1)
            .await
            .unwrap();
        let values: Vec<_> = captured.iter().filter_map(|c| c.fields.get("v5")).collect();
        assert_eq!(values, vec!["open", "filter"]);
    }

    #[test]
    fn test_discard_pending_counts_beacons() {
        let m = matcher(100);
        let (tx, mut listener) = BeaconListener::channel();
        tx.send(PageEvent::Beacon(Beacon::get("https://m.test/b/ss/rs?pageName=Home"))).unwrap();
        tx.send(PageEvent::ScriptError("digitalData.event is undefined".into())).unwrap();
        assert_eq!(m.discard_pending(&mut listener).unwrap(), 1);

        tx.send(PageEvent::ScriptError("boom".into())).unwrap();
        assert!(m.discard_pending(&mut listener).is_err());
    }
}
