//! CSV expectation source

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::ExpectationStore;
use crate::config::CsvLayout;
use crate::types::TestCase;
use crate::{Error, Result};

const NAMED_HEADER: [&str; 6] = ["Url", "Fieldname", "Value", "Action", "AssertURL", "Status"];

/// Column positions of the fields the harness reads or writes
#[derive(Debug, Clone, Copy)]
struct Columns {
    url: usize,
    field: usize,
    value: usize,
    action: Option<usize>,
    assert_url: Option<usize>,
    status: Option<usize>,
}

impl Columns {
    const POSITIONAL: Columns = Columns {
        url: 1,
        field: 2,
        value: 3,
        action: Some(4),
        assert_url: None,
        status: Some(5),
    };

    fn from_header(header: &[String]) -> Result<Self> {
        let find = |name: &str| header.iter().position(|h| normalize_header(h) == name);
        let require = |name: &str, label: &str| {
            find(name).ok_or_else(|| Error::MissingColumn(label.to_string()))
        };
        Ok(Self {
            url: require("url", "Url")?,
            field: require("fieldname", "Fieldname")?,
            value: require("value", "Value")?,
            action: find("action"),
            assert_url: find("asserturl"),
            status: find("status"),
        })
    }
}

/// "Field Name", "field_name" and "Fieldname" all name the same column
fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone)]
struct CsvTable {
    header: Option<Vec<String>>,
    rows: Vec<Vec<String>>,
    columns: Columns,
    terminator: csv::Terminator,
}

/// Line ending of the first record, so rewrites keep the source's style
fn detect_terminator(content: &[u8]) -> csv::Terminator {
    match content.iter().position(|&b| b == b'\n') {
        Some(idx) if idx > 0 && content[idx - 1] == b'\r' => csv::Terminator::CRLF,
        _ => csv::Terminator::Any(b'\n'),
    }
}

impl CsvTable {
    fn read(path: &Path, layout: CsvLayout) -> Result<Self> {
        let content = std::fs::read(path)?;
        let terminator = detect_terminator(&content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_slice());

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        match layout {
            CsvLayout::Positional => Ok(Self {
                header: None,
                rows,
                columns: Columns::POSITIONAL,
                terminator,
            }),
            CsvLayout::Named => {
                if rows.is_empty() {
                    return Err(Error::MissingColumn("Url".to_string()));
                }
                let header = rows.remove(0);
                let columns = Columns::from_header(&header)?;
                Ok(Self {
                    header: Some(header),
                    rows,
                    columns,
                    terminator,
                })
            }
        }
    }

    fn case(&self, row: usize) -> TestCase {
        let record = &self.rows[row];
        let cell = |idx: usize| record.get(idx).cloned().unwrap_or_default();
        let optional = |idx: Option<usize>| {
            idx.map(cell).filter(|value| !value.trim().is_empty())
        };

        TestCase {
            row,
            url: cell(self.columns.url),
            field_name: cell(self.columns.field),
            expected_value: cell(self.columns.value),
            action_script: optional(self.columns.action),
            assert_url: optional(self.columns.assert_url),
            prior_status: self.columns.status.map(cell).unwrap_or_default(),
        }
    }

    fn status_column(&mut self) -> usize {
        if let Some(idx) = self.columns.status {
            return idx;
        }
        let header = self.header.get_or_insert_with(Vec::new);
        header.push("Status".to_string());
        let idx = header.len() - 1;
        self.columns.status = Some(idx);
        idx
    }

    fn set_status(&mut self, row: usize, status: &str) -> Result<()> {
        let column = self.status_column();
        let len = self.rows.len();
        let record = self
            .rows
            .get_mut(row)
            .ok_or(Error::RowOutOfRange { row, len })?;
        if record.len() <= column {
            record.resize(column + 1, String::new());
        }
        record[column] = status.to_string();
        Ok(())
    }

    /// Replace the file atomically so an interrupted write never truncates it
    fn write(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::WriterBuilder::new()
                .flexible(true)
                .terminator(self.terminator)
                .from_writer(tmp.as_file_mut());
            if let Some(header) = &self.header {
                writer.write_record(header)?;
            }
            for record in &self.rows {
                writer.write_record(record)?;
            }
            writer.flush()?;
        }
        tmp.persist(path)?;
        Ok(())
    }
}

/// Expectations kept in a CSV file, either with a named header row or in
/// positional spreadsheet-range order
pub struct CsvStore {
    path: PathBuf,
    layout: CsvLayout,
    table: Option<CsvTable>,
}

impl CsvStore {
    pub fn new(path: impl AsRef<Path>, layout: CsvLayout) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            layout,
            table: None,
        }
    }

    /// Write a fresh source file holding `cases` in order
    pub fn create(path: impl AsRef<Path>, layout: CsvLayout, cases: &[TestCase]) -> Result<Self> {
        let rows = cases
            .iter()
            .enumerate()
            .map(|(idx, case)| {
                let action = case.action_script.clone().unwrap_or_default();
                match layout {
                    CsvLayout::Named => vec![
                        case.url.clone(),
                        case.field_name.clone(),
                        case.expected_value.clone(),
                        action,
                        case.assert_url.clone().unwrap_or_default(),
                        case.prior_status.clone(),
                    ],
                    CsvLayout::Positional => vec![
                        (idx + 1).to_string(),
                        case.url.clone(),
                        case.field_name.clone(),
                        case.expected_value.clone(),
                        action,
                        case.prior_status.clone(),
                    ],
                }
            })
            .collect();

        let (header, columns) = match layout {
            CsvLayout::Named => {
                let header: Vec<String> = NAMED_HEADER.iter().map(|h| h.to_string()).collect();
                let columns = Columns::from_header(&header)?;
                (Some(header), columns)
            }
            CsvLayout::Positional => (None, Columns::POSITIONAL),
        };

        let table = CsvTable {
            header,
            rows,
            columns,
            terminator: csv::Terminator::Any(b'\n'),
        };
        table.write(path.as_ref())?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            layout,
            table: Some(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExpectationStore for CsvStore {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    async fn load_cases(&mut self) -> Result<Vec<TestCase>> {
        let table = CsvTable::read(&self.path, self.layout)?;
        let cases: Vec<TestCase> = (0..table.rows.len()).map(|row| table.case(row)).collect();
        info!("Loaded {} row(s) from {}", cases.len(), self.path.display());
        self.table = Some(table);
        Ok(cases)
    }

    async fn save_statuses(&mut self, cases: &[TestCase]) -> Result<()> {
        let mut table = match self.table.take() {
            Some(table) => table,
            None => CsvTable::read(&self.path, self.layout)?,
        };

        let mut outcome = Ok(());
        for case in cases {
            if let Err(e) = table.set_status(case.row, &case.prior_status) {
                outcome = Err(e);
                break;
            }
        }
        let outcome = outcome.and_then(|_| table.write(&self.path));
        self.table = Some(table);
        outcome?;

        debug!("Wrote {} status(es) to {}", cases.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_named_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "aem.csv",
            "Url,Fieldname,Value,Action,AssertURL,Status\n\
             https://a.test/,pageName,Home,,true,\n\
             https://a.test/,v5,search,type|#q|shoes,,Fail\n\
             ,pageName,orphan,,,\n",
        );

        let mut store = CsvStore::new(&path, CsvLayout::Named);
        let cases = store.load_cases().await.unwrap();
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].field_name, "pageName");
        assert_eq!(cases[0].action_script, None);
        assert_eq!(cases[0].assert_url.as_deref(), Some("true"));
        assert_eq!(cases[1].action_script.as_deref(), Some("type|#q|shoes"));
        assert_eq!(cases[1].prior_status, "Fail");
        assert!(!cases[2].has_url());
        assert_eq!(cases[2].row, 2);
    }

    #[tokio::test]
    async fn test_status_written_in_place_preserving_other_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "aem.csv",
            "Owner,Url,Fieldname,Value,Status,Notes\n\
             web,https://a.test/,pageName,Home,,\"keep, me\"\n\
             web,,pageName,skipped,,untouched\n\
             app,https://b.test/,c3,foo,Pass,x\n",
        );

        let mut store = CsvStore::new(&path, CsvLayout::Named);
        let mut cases = store.load_cases().await.unwrap();
        cases[0].prior_status = "Pass".to_string();
        cases[2].prior_status = "Fail".to_string();
        store.save_statuses(&[cases[0].clone(), cases[2].clone()]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Owner,Url,Fieldname,Value,Status,Notes\n\
             web,https://a.test/,pageName,Home,Pass,\"keep, me\"\n\
             web,,pageName,skipped,,untouched\n\
             app,https://b.test/,c3,foo,Fail,x\n"
        );
    }

    #[tokio::test]
    async fn test_missing_status_column_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "aem.csv", "Url,Fieldname,Value\nhttps://a.test/,ce,UTF-8\n");

        let mut store = CsvStore::new(&path, CsvLayout::Named);
        let mut cases = store.load_cases().await.unwrap();
        cases[0].prior_status = "Pass".to_string();
        store.save_statuses(&cases).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "Url,Fieldname,Value,Status\nhttps://a.test/,ce,UTF-8,Pass\n");
    }

    #[tokio::test]
    async fn test_missing_required_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "aem.csv", "Url,Value\nhttps://a.test/,x\n");

        let mut store = CsvStore::new(&path, CsvLayout::Named);
        match store.load_cases().await {
            Err(Error::MissingColumn(col)) => assert_eq!(col, "Fieldname"),
            other => panic!("expected missing column, got {:?}", other.map(|c| c.len())),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvStore::new(dir.path().join("absent.csv"), CsvLayout::Named);
        assert!(store.load_cases().await.is_err());
    }

    #[tokio::test]
    async fn test_positional_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "range.csv",
            "1,https://a.test/,pageName,Home,click|#go,\n\
             2,https://b.test/,v5,search\n",
        );

        let mut store = CsvStore::new(&path, CsvLayout::Positional);
        let mut cases = store.load_cases().await.unwrap();
        assert_eq!(cases[0].action_script.as_deref(), Some("click|#go"));
        assert_eq!(cases[1].action_script, None);

        cases[1].prior_status = "Pass".to_string();
        store.save_statuses(&cases[1..]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "1,https://a.test/,pageName,Home,click|#go,\n2,https://b.test/,v5,search,,Pass\n"
        );
    }

    #[tokio::test]
    async fn test_round_trip_preserves_order_and_values() {
        let dir = tempfile::tempdir().unwrap();
        for layout in [CsvLayout::Named, CsvLayout::Positional] {
            let path = dir.path().join(format!("{:?}.csv", layout));
            let original = vec![
                TestCase::new(0, "https://a.test/?q=1,2", "pageName", "Home \"Page\""),
                TestCase::new(1, "https://b.test/", "v5", "search").with_action("type|#q|x"),
                TestCase::new(2, "", "c3", "orphan"),
            ];
            let mut store = CsvStore::create(&path, layout, &original).unwrap();

            let mut loaded = store.load_cases().await.unwrap();
            for case in loaded.iter_mut() {
                case.prior_status = "Fail".to_string();
            }
            store.save_statuses(&loaded).await.unwrap();

            let reloaded = CsvStore::new(&path, layout).load_cases().await.unwrap();
            assert_eq!(reloaded.len(), original.len());
            for (before, after) in original.iter().zip(&reloaded) {
                assert_eq!(before.row, after.row);
                assert_eq!(before.url, after.url);
                assert_eq!(before.field_name, after.field_name);
                assert_eq!(before.expected_value, after.expected_value);
                assert_eq!(before.action_script, after.action_script);
                assert_eq!(after.prior_status, "Fail");
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_row_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "aem.csv", "Url,Fieldname,Value\nhttps://a.test/,ce,x\n");
        let mut store = CsvStore::new(&path, CsvLayout::Named);
        store.load_cases().await.unwrap();

        let mut stray = TestCase::new(7, "https://a.test/", "ce", "x");
        stray.prior_status = "Pass".to_string();
        assert!(matches!(
            store.save_statuses(&[stray]).await,
            Err(Error::RowOutOfRange { row: 7, len: 1 })
        ));
    }

    #[tokio::test]
    async fn test_crlf_line_endings_survive_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "export.csv",
            "Url,Fieldname,Value,Status\r\nhttps://a.test/,pageName,Home,\r\nhttps://a.test/,c3,foo,\r\n",
        );

        let mut store = CsvStore::new(&path, CsvLayout::Named);
        let mut cases = store.load_cases().await.unwrap();
        assert_eq!(cases[0].expected_value, "Home");
        cases[0].prior_status = "Pass".to_string();
        cases[1].prior_status = "Fail".to_string();
        store.save_statuses(&cases).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "Url,Fieldname,Value,Status\r\nhttps://a.test/,pageName,Home,Pass\r\nhttps://a.test/,c3,foo,Fail\r\n"
        );
    }

    #[test]
    fn test_terminator_detection() {
        assert!(matches!(detect_terminator(b"a,b\r\nc,d\r\n"), csv::Terminator::CRLF));
        assert!(matches!(detect_terminator(b"a,b\nc,d\n"), csv::Terminator::Any(b'\n')));
        assert!(matches!(detect_terminator(b""), csv::Terminator::Any(b'\n')));
    }

    #[test]
    fn test_header_normalization() {
        assert_eq!(normalize_header("\u{feff}Url"), "url");
        assert_eq!(normalize_header("Field Name"), "fieldname");
        assert_eq!(normalize_header("assert_url"), "asserturl");
    }
}
