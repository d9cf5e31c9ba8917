//! Writing verdicts back to the expectation source

use std::collections::HashMap;
use tracing::{info, warn};

use super::ExpectationStore;
use crate::types::{MatchResult, TestCase};
use crate::Result;

/// Copy each result's status onto the case with the same row.
///
/// Returns the number of cases updated. Cases without a result keep their
/// prior status.
pub fn apply_results(cases: &mut [TestCase], results: &[MatchResult]) -> usize {
    let by_row: HashMap<usize, &MatchResult> = results.iter().map(|r| (r.row, r)).collect();
    let mut updated = 0;
    for case in cases.iter_mut() {
        if let Some(result) = by_row.get(&case.row) {
            case.prior_status = result.status.as_str().to_string();
            updated += 1;
        }
    }
    if updated != results.len() {
        warn!(
            "{} result(s) did not correspond to a loaded case",
            results.len() - updated
        );
    }
    updated
}

/// Apply results to `cases` and persist them through the store
pub async fn write_results<S>(
    store: &mut S,
    cases: &mut [TestCase],
    results: &[MatchResult],
) -> Result<usize>
where
    S: ExpectationStore + ?Sized,
{
    let updated = apply_results(cases, results);
    store.save_statuses(cases).await?;
    info!("Persisted {} status(es) to {}", updated, store.describe());
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CsvLayout;
    use crate::store::CsvStore;
    use crate::types::FailureReason;

    #[test]
    fn test_apply_by_row_identity() {
        let mut cases = vec![
            TestCase::new(3, "https://a.test/", "pageName", "Home"),
            TestCase::new(5, "https://b.test/", "c3", "foo"),
        ];
        let results = vec![
            MatchResult::fail(&cases[1], String::new(), 0, FailureReason::NoBeacon),
            MatchResult::pass(&cases[0], "home".into(), 1),
        ];

        assert_eq!(apply_results(&mut cases, &results), 2);
        assert_eq!(cases[0].prior_status, "Pass");
        assert_eq!(cases[1].prior_status, "Fail");
    }

    #[test]
    fn test_unmatched_cases_keep_prior_status() {
        let mut cases = vec![TestCase::new(0, "https://a.test/", "ce", "UTF-8")];
        cases[0].prior_status = "Pass".into();
        assert_eq!(apply_results(&mut cases, &[]), 0);
        assert_eq!(cases[0].prior_status, "Pass");
    }

    #[tokio::test]
    async fn test_write_results_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aem.csv");
        let seed = vec![
            TestCase::new(0, "https://a.test/", "pageName", "Home"),
            TestCase::new(1, "https://b.test/", "c3", "foo"),
        ];
        let mut store = CsvStore::create(&path, CsvLayout::Named, &seed).unwrap();
        let mut cases = store.load_cases().await.unwrap();

        let results = vec![MatchResult::pass(&cases[1], "foo".into(), 1)];
        write_results(&mut store, &mut cases, &results).await.unwrap();

        let reloaded = store.load_cases().await.unwrap();
        assert_eq!(reloaded[0].prior_status, "");
        assert_eq!(reloaded[1].prior_status, "Pass");
    }
}
