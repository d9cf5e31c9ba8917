//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fields::{CanonicalFields, DEFAULT_CANONICAL_FIELDS};
use crate::pattern::{NetworkPattern, RequiredParams};
use crate::{Error, Result};

/// Harness configuration, loaded from `beaconcheck.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Canonical tracking fields beacons are projected onto
    pub canonical_fields: Vec<String>,

    /// Substrings of page script errors that are ignored
    pub benign_errors: Vec<String>,

    /// Directory for the JSON run report
    pub output_dir: PathBuf,

    /// Where expectations are read from and statuses written to
    pub source: SourceConfig,

    /// Which requests count as analytics beacons
    pub network: NetworkConfig,

    /// Wait bounds and settle delay
    pub timing: TimingConfig,

    /// Browser launch options
    pub browser: BrowserConfig,

    /// Per-suite behaviour
    pub suites: SuitesConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            canonical_fields: DEFAULT_CANONICAL_FIELDS.iter().map(|s| s.to_string()).collect(),
            benign_errors: vec!["digitalData.event is undefined".to_string()],
            output_dir: PathBuf::from("test-results"),
            source: SourceConfig::default(),
            network: NetworkConfig::default(),
            timing: TimingConfig::default(),
            browser: BrowserConfig::default(),
            suites: SuitesConfig::default(),
        }
    }
}

/// Kind of expectation source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Csv,
    Sqlite,
}

/// Column layout of a CSV source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvLayout {
    /// Header row with `Url, Fieldname, Value, Action, AssertURL, Status`
    #[default]
    Named,
    /// No header; `[id, url, fieldName, value, action, status]`
    Positional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub path: PathBuf,
    pub layout: CsvLayout,
    /// Table name for SQLite sources
    pub table: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Csv,
            path: PathBuf::from("fixtures/expectations.csv"),
            layout: CsvLayout::Named,
            table: "expectations".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// URL glob for the analytics collection endpoint
    pub pattern: String,
    /// HTTP method, `*` for any
    pub method: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            pattern: "**/b/ss/**".to_string(),
            method: "GET".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Bound on each awaited beacon
    pub beacon_timeout_ms: u64,
    /// Bound on waiting for an action target to become visible
    pub element_timeout_ms: u64,
    /// Pause after each interaction so asynchronous beacons can fire
    pub settle_ms: u64,
    /// Bound on page navigation
    pub navigation_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            beacon_timeout_ms: 10_000,
            element_timeout_ms: 4_000,
            settle_ms: 1_000,
            navigation_timeout_ms: 30_000,
        }
    }
}

impl TimingConfig {
    pub fn beacon_timeout(&self) -> Duration {
        Duration::from_millis(self.beacon_timeout_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub browser: Browser,
    pub headless: bool,
    /// Node.js executable used to host the Playwright bridge
    pub node_binary: PathBuf,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: false,
            node_binary: PathBuf::from("node"),
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

/// Named suites selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteName {
    Events,
    Plain,
}

impl SuiteName {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuiteName::Events => "events",
            SuiteName::Plain => "plain",
        }
    }
}

impl std::fmt::Display for SuiteName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When captured beacons are compared against expectations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Compare each case against its own beacons as soon as it finishes
    #[default]
    PerCase,
    /// Accumulate beacons for the whole run, compare every case at the end
    Batch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    pub mode: CaptureMode,
    /// Keep the page-load beacon for cases that also run actions
    pub record_page_load: bool,
    /// Parameters a post-action beacon must carry
    pub required_params: RequiredParams,
    /// Append-only CSV log of every captured beacon
    pub capture_log: Option<PathBuf>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::PerCase,
            record_page_load: false,
            required_params: RequiredParams::new(["v5"]),
            capture_log: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuitesConfig {
    pub events: SuiteConfig,
    pub plain: SuiteConfig,
}

impl Default for SuitesConfig {
    fn default() -> Self {
        Self {
            events: SuiteConfig {
                mode: CaptureMode::Batch,
                record_page_load: true,
                ..SuiteConfig::default()
            },
            plain: SuiteConfig {
                capture_log: Some(PathBuf::from("test-results/captures.csv")),
                ..SuiteConfig::default()
            },
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults if absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.canonical_fields.is_empty() {
            return Err(Error::Config("canonical_fields must not be empty".to_string()));
        }
        if self.timing.beacon_timeout_ms == 0 {
            return Err(Error::Config("timing.beacon_timeout_ms must be positive".to_string()));
        }
        if self.timing.element_timeout_ms == 0 {
            return Err(Error::Config("timing.element_timeout_ms must be positive".to_string()));
        }
        self.network_pattern()?;
        Ok(())
    }

    pub fn network_pattern(&self) -> Result<NetworkPattern> {
        NetworkPattern::new(&self.network.pattern, Some(&self.network.method))
    }

    pub fn canonical_fields(&self) -> CanonicalFields {
        CanonicalFields::new(self.canonical_fields.iter().cloned())
    }

    pub fn suite(&self, name: SuiteName) -> &SuiteConfig {
        match name {
            SuiteName::Events => &self.suites.events,
            SuiteName::Plain => &self.suites.plain,
        }
    }
}
