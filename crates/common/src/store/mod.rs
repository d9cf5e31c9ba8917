//! Expectation stores
//!
//! A store loads ordered test cases from a tabular source and writes the
//! computed statuses back to the same rows. Backends preserve every column
//! they do not own.

mod csv_store;
mod sqlite_store;
mod writer;

use async_trait::async_trait;
use tracing::warn;

pub use csv_store::CsvStore;
pub use sqlite_store::SqliteStore;
pub use writer::{apply_results, write_results};

use crate::config::{SourceConfig, SourceKind};
use crate::types::TestCase;
use crate::Result;

/// Tabular source of expectations
#[async_trait]
pub trait ExpectationStore: Send {
    /// Human-readable location of the source, for logs
    fn describe(&self) -> String;

    /// Load every row in source order, blank URLs included
    async fn load_cases(&mut self) -> Result<Vec<TestCase>>;

    /// Write `prior_status` of each case back to its row
    async fn save_statuses(&mut self, cases: &[TestCase]) -> Result<()>;
}

/// Open the store described by the configuration
pub fn open_store(config: &SourceConfig) -> Result<Box<dyn ExpectationStore>> {
    match config.kind {
        SourceKind::Csv => Ok(Box::new(CsvStore::new(&config.path, config.layout))),
        SourceKind::Sqlite => Ok(Box::new(SqliteStore::open(&config.path, &config.table)?)),
    }
}

/// Split loaded rows into runnable cases and rows skipped for a blank URL
pub fn partition_runnable(cases: Vec<TestCase>) -> (Vec<TestCase>, Vec<TestCase>) {
    let (runnable, skipped): (Vec<_>, Vec<_>) = cases.into_iter().partition(TestCase::has_url);
    for case in &skipped {
        warn!(
            "Skipping row {}: empty URL (field '{}', value '{}')",
            case.row, case.field_name, case.expected_value
        );
    }
    (runnable, skipped)
}
