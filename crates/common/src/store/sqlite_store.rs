//! SQLite expectation source

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::ExpectationStore;
use crate::types::TestCase;
use crate::{Error, Result};

/// Expectations kept in a relational table.
///
/// Rows are ordered by `id`; a case's `row` is its position in that order
/// and statuses are written back by `id`.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
    /// `id` of each loaded row, indexed by case position
    ids: Arc<Mutex<Vec<i64>>>,
    location: String,
}

impl SqliteStore {
    /// Open or create the database at path
    pub fn open(path: impl AsRef<Path>, table: &str) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::with_connection(conn, table, path.as_ref().display().to_string())?;
        info!("Opened expectation database at {:?}", path.as_ref());
        Ok(store)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory(table: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, table, ":memory:".to_string())
    }

    fn with_connection(conn: Connection, table: &str, location: String) -> Result<Self> {
        validate_table_name(table)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
            ids: Arc::new(Mutex::new(Vec::new())),
            location,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL DEFAULT '',
                field_name TEXT NOT NULL DEFAULT '',
                expected_value TEXT NOT NULL DEFAULT '',
                action TEXT,
                assert_url TEXT,
                status TEXT NOT NULL DEFAULT '',
                updated_at INTEGER
            );
            "#,
            table = self.table
        ))?;
        debug!("Expectation table '{}' ready", self.table);
        Ok(())
    }

    /// Append cases to the table in order
    pub fn insert_cases(&self, cases: &[TestCase]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (url, field_name, expected_value, action, assert_url, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.table
            ))?;
            for case in cases {
                stmt.execute(params![
                    case.url,
                    case.field_name,
                    case.expected_value,
                    case.action_script,
                    case.assert_url,
                    case.prior_status,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid table name '{}'", table)))
    }
}

#[async_trait]
impl ExpectationStore for SqliteStore {
    fn describe(&self) -> String {
        format!("sqlite:{}#{}", self.location, self.table)
    }

    async fn load_cases(&mut self) -> Result<Vec<TestCase>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, url, field_name, expected_value, action, assert_url, status
             FROM {} ORDER BY id",
            self.table
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut ids = Vec::new();
        let mut cases = Vec::new();
        for (position, row) in rows.enumerate() {
            let (id, url, field_name, expected_value, action, assert_url, status) = row?;
            ids.push(id);
            cases.push(TestCase {
                row: position,
                url,
                field_name,
                expected_value,
                action_script: action.filter(|a| !a.trim().is_empty()),
                assert_url,
                prior_status: status,
            });
        }

        info!("Loaded {} row(s) from {}", cases.len(), self.describe());
        *self.ids.lock() = ids;
        Ok(cases)
    }

    async fn save_statuses(&mut self, cases: &[TestCase]) -> Result<()> {
        let ids = self.ids.lock().clone();
        let mut conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3",
                self.table
            ))?;
            for case in cases {
                let id = ids.get(case.row).ok_or(Error::RowOutOfRange {
                    row: case.row,
                    len: ids.len(),
                })?;
                stmt.execute(params![case.prior_status, now, id])?;
            }
        }
        tx.commit()?;

        debug!("Wrote {} status(es) to {}", cases.len(), self.describe());
        Ok(())
    }
}
