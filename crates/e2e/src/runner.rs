//! Suite runner that drives the page through every expectation and records verdicts

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use beaconcheck_common::store::{partition_runnable, write_results};
use beaconcheck_common::{
    parse_action_script, CaptureLog, CaptureMode, ExpectationStore, FailureReason,
    HarnessConfig, MatchResult, RequiredParams, SuiteConfig, SuiteName, TestCase,
};

use crate::driver::{BeaconListener, PageDriver};
use crate::error::{E2eError, E2eResult};
use crate::executor::ActionExecutor;
use crate::matcher::{CapturedBeacon, InterceptionMatcher};

/// Beacons captured while running one case
#[derive(Debug, Clone)]
pub struct CaseCapture {
    pub row: usize,
    pub beacons: Vec<CapturedBeacon>,
}

/// Beacons accumulated across a whole batch-mode run
#[derive(Debug, Default)]
pub struct RunCapture {
    beacons: Vec<CapturedBeacon>,
}

impl RunCapture {
    pub fn extend(&mut self, capture: CaseCapture) {
        self.beacons.extend(capture.beacons);
    }

    pub fn beacons(&self) -> &[CapturedBeacon] {
        &self.beacons
    }

    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }
}

/// How a case ended before evaluation
enum CaseOutcome {
    Captured(CaseCapture),
    /// Navigation or interaction failed; the verdict is already known
    Failed(MatchResult),
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub suite: SuiteName,
    pub source: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<MatchResult>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Write the summary as `results.json` under `dir`
    pub fn write_report(&self, dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

/// Runs one suite: loads expectations, drives the page case by case,
/// evaluates captured beacons and writes statuses back.
pub struct SuiteRunner {
    name: SuiteName,
    suite: SuiteConfig,
    store: Box<dyn ExpectationStore>,
    page: Box<dyn PageDriver>,
    matcher: InterceptionMatcher,
    executor: ActionExecutor,
    capture_log: Option<CaptureLog>,
    output_dir: PathBuf,
}

impl SuiteRunner {
    pub fn new(
        name: SuiteName,
        config: &HarnessConfig,
        store: Box<dyn ExpectationStore>,
        page: Box<dyn PageDriver>,
    ) -> E2eResult<Self> {
        let suite = config.suite(name).clone();
        let fields = config.canonical_fields();
        let matcher = InterceptionMatcher::new(
            config.network_pattern()?,
            fields.clone(),
            config.timing.beacon_timeout(),
        )
        .with_benign_errors(config.benign_errors.clone());
        let executor = ActionExecutor::new(config.timing.element_timeout(), config.timing.settle());

        let capture_log = match &suite.capture_log {
            Some(path) => Some(CaptureLog::open(path, &fields)?),
            None => None,
        };

        Ok(Self {
            name,
            suite,
            store,
            page,
            matcher,
            executor,
            capture_log,
            output_dir: config.output_dir.clone(),
        })
    }

    pub fn matcher(&self) -> &InterceptionMatcher {
        &self.matcher
    }

    /// Run every case, persist statuses and write the JSON report.
    ///
    /// A fatal error marks the current and remaining cases failed, saves
    /// statuses and is then returned.
    pub async fn run(&mut self) -> E2eResult<RunSummary> {
        let start = Instant::now();
        let source = self.store.describe();
        info!("Running suite '{}' against {}", self.name, source);

        let mut cases = self.store.load_cases().await?;
        let (runnable, skipped) = partition_runnable(cases.clone());
        info!("Loaded {} case(s), {} skipped", runnable.len(), skipped.len());

        let mut results = Vec::with_capacity(runnable.len());
        let mut run_capture = RunCapture::default();
        let mut deferred = Vec::new();
        let mut fatal = None;

        for (index, case) in runnable.iter().enumerate() {
            debug!("Row {}: {} [{}]", case.row, case.url, case.field_name);
            match self.run_case(case).await {
                Ok(CaseOutcome::Failed(result)) => {
                    log_result(&result);
                    results.push(result);
                }
                Ok(CaseOutcome::Captured(capture)) => match self.suite.mode {
                    CaptureMode::PerCase => {
                        let result = self.matcher.evaluate(case, &capture.beacons);
                        log_result(&result);
                        results.push(result);
                    }
                    CaptureMode::Batch => {
                        run_capture.extend(capture);
                        deferred.push(case);
                    }
                },
                Err(e) => match e.failure_reason() {
                    // Driver errors outside a step still only fail this case
                    Some(reason) => {
                        let result = MatchResult::fail(case, String::new(), 0, reason);
                        log_result(&result);
                        results.push(result);
                    }
                    None => {
                        error!("Aborting run at row {}: {}", case.row, e);
                        for rest in &runnable[index..] {
                            results.push(MatchResult::fail(
                                rest,
                                String::new(),
                                0,
                                FailureReason::Aborted(e.to_string()),
                            ));
                        }
                        fatal = Some(e);
                        break;
                    }
                },
            }
        }

        if !deferred.is_empty() {
            info!(
                "Comparing {} case(s) against {} captured beacon(s)",
                deferred.len(),
                run_capture.len()
            );
            for case in deferred {
                let result = self.matcher.evaluate(case, run_capture.beacons());
                log_result(&result);
                results.push(result);
            }
        }
        results.sort_by_key(|r| r.row);

        if let Err(e) = self.page.close().await {
            warn!("Failed to close page: {}", e);
        }

        write_results(self.store.as_mut(), &mut cases, &results).await?;

        let passed = results.iter().filter(|r| r.status.is_pass()).count();
        let summary = RunSummary {
            suite: self.name,
            source,
            total: runnable.len(),
            passed,
            failed: results.len() - passed,
            skipped: skipped.len(),
            duration_ms: start.elapsed().as_millis() as u64,
            results,
        };

        info!(
            "Suite '{}': {} passed, {} failed, {} skipped ({} ms)",
            summary.suite, summary.passed, summary.failed, summary.skipped, summary.duration_ms
        );
        summary.write_report(&self.output_dir)?;

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Navigate, act and capture for a single case.
    ///
    /// The listener is registered before navigation so no beacon fired by
    /// the page load can be missed.
    async fn run_case(&mut self, case: &TestCase) -> E2eResult<CaseOutcome> {
        let script = case.action().map(parse_action_script).unwrap_or_default();
        let mut listener = self.page.listen(self.matcher.pattern()).await?;

        if let Err(e) = self.page.navigate(case.url.trim()).await {
            return fail_case(case, e);
        }

        let mut beacons = Vec::new();
        if script.is_empty() || self.suite.record_page_load {
            if let Some(captured) = self
                .matcher
                .capture(&mut listener, &RequiredParams::default())
                .await?
            {
                beacons.push(captured);
            }
        }

        if !script.is_empty() {
            self.matcher.discard_pending(&mut listener)?;
            if let Err(e) = self.executor.run_steps(self.page.as_mut(), &script.steps).await {
                return fail_case(case, e);
            }
            let captured = self
                .matcher
                .capture_up_to(&mut listener, &self.suite.required_params, script.len())
                .await?;
            if captured.is_empty() {
                warn!("Row {}: no beacon after {} step(s)", case.row, script.len());
            }
            beacons.extend(captured);
        }

        self.record_captures(case.row, &beacons, &mut listener)?;
        Ok(CaseOutcome::Captured(CaseCapture {
            row: case.row,
            beacons,
        }))
    }

    fn record_captures(
        &mut self,
        row: usize,
        beacons: &[CapturedBeacon],
        listener: &mut BeaconListener,
    ) -> E2eResult<()> {
        // Anything still buffered belongs to this case and must not leak into the next one
        self.matcher.discard_pending(listener)?;

        if let Some(log) = self.capture_log.as_mut() {
            for captured in beacons {
                log.append(row, &captured.beacon, &captured.fields)?;
            }
        }
        Ok(())
    }
}

fn fail_case(case: &TestCase, err: E2eError) -> E2eResult<CaseOutcome> {
    match err.failure_reason() {
        Some(reason) => {
            warn!("Row {}: {}", case.row, err);
            Ok(CaseOutcome::Failed(MatchResult::fail(case, String::new(), 0, reason)))
        }
        None => Err(err),
    }
}

fn log_result(result: &MatchResult) {
    if result.status.is_pass() {
        info!("✓ row {} {} = '{}'", result.row, result.field_name, result.actual_value);
    } else {
        error!(
            "✗ row {} {}: expected '{}', got '{}'{}",
            result.row,
            result.field_name,
            result.expected_value,
            result.actual_value,
            result
                .reason
                .as_ref()
                .map(|r| format!(" ({})", r))
                .unwrap_or_default()
        );
    }
}
