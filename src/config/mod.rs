use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::SourceKind;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

/// One input file, listed in priority order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub kind: SourceKind,

    /// Overrides the kind's default delimiter.
    #[serde(default)]
    pub delimiter: Option<char>,

    #[serde(default = "default_true")]
    pub required: bool,
}

impl SourceConfig {
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter
            .filter(char::is_ascii)
            .map(|c| c as u8)
            .unwrap_or_else(|| self.kind.default_delimiter())
    }
}

/// How the normalizer treats missing calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GapPolicy {
    #[default]
    Reject,
    CarryForward,
}

/// Moving-average and aggregation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_window_days")]
    pub window_days: usize,

    #[serde(default)]
    pub gap_policy: GapPolicy,

    /// Largest price difference tolerated when two sources cover the same day.
    #[serde(default = "default_overlap_tolerance")]
    pub overlap_tolerance: Decimal,

    #[serde(default = "default_histogram_width")]
    pub histogram_width: u32,

    #[serde(default = "default_histogram_bound")]
    pub histogram_bound: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

/// Price fetcher configuration (`update` command)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetcherConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_ticker")]
    pub ticker: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    #[serde(default = "default_daily_source_path")]
    pub daily_source_path: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            path: PathBuf::from("resources/data/historical_data.tsv"),
            kind: SourceKind::Historical,
            delimiter: None,
            required: true,
        },
        SourceConfig {
            path: default_daily_source_path(),
            kind: SourceKind::Daily,
            delimiter: None,
            required: false,
        },
    ]
}
fn default_true() -> bool {
    true
}
fn default_window_days() -> usize {
    1400
}
fn default_overlap_tolerance() -> Decimal {
    Decimal::new(1, 2)
}
fn default_histogram_width() -> u32 {
    3
}
fn default_histogram_bound() -> u32 {
    18
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}
fn default_base_url() -> String {
    "https://query1.finance.yahoo.com/v8/finance/chart".to_string()
}
fn default_ticker() -> String {
    "BTC-USD".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> usize {
    3
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "btracker/0.1 (200-week moving average tracker)".to_string()
}
fn default_lookback_days() -> u32 {
    10
}
fn default_daily_source_path() -> PathBuf {
    PathBuf::from("resources/data/daily_data.csv")
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            gap_policy: GapPolicy::default(),
            overlap_tolerance: default_overlap_tolerance(),
            histogram_width: default_histogram_width(),
            histogram_bound: default_histogram_bound(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ticker: default_ticker(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            user_agent: default_user_agent(),
            lookback_days: default_lookback_days(),
            daily_source_path: default_daily_source_path(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            analytics: AnalyticsConfig::default(),
            output: OutputConfig::default(),
            fetcher: FetcherConfig::default(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("BTRACKER").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        cfg.try_deserialize()
            .context("Invalid configuration")
    }
}
