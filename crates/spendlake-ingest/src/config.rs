//! Configuration management
//!
//! Every setting has an environment variable (a `.env` file is honoured) and a
//! default below. Command-line flags are applied on top before `validate`.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use spendlake_common::{Result, SpendlakeError};
use std::path::PathBuf;

use crate::archive::discovery::DEFAULT_INDEX_URL;

// ============================================================================
// Sync Configuration Constants
// ============================================================================

/// Directory archives are downloaded and unpacked into.
pub const DEFAULT_STAGING_DIR: &str = "data";

/// Pattern for the sweep upload after a sync walk.
pub const DEFAULT_UPLOAD_PATTERN: &str = "data/*.csv";

/// Earliest and latest accepted start years.
pub const MIN_START_YEAR: i32 = 2000;
pub const MAX_START_YEAR: i32 = 2100;

/// Month in which a federal fiscal year begins (of the previous calendar year).
const FISCAL_YEAR_START_MONTH: u32 = 10;

// ============================================================================
// Load Configuration Constants
// ============================================================================

pub const DEFAULT_SCHEMA_PATH: &str = "schema.json";
pub const DEFAULT_INPUT_PATTERN: &str = "data/test.csv";
pub const DEFAULT_OUTPUT_PATH: &str = "output/transactions.jsonl";

/// Fiscal year containing `date`
pub fn fiscal_year_of(date: NaiveDate) -> i32 {
    if date.month() >= FISCAL_YEAR_START_MONTH {
        date.year() + 1
    } else {
        date.year()
    }
}

pub fn current_fiscal_year() -> i32 {
    fiscal_year_of(Utc::now().date_naive())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Archive sync settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub start_year: i32,
    pub staging_dir: PathBuf,
    pub index_url: String,
    pub verify_uploads: bool,
    pub show_progress: bool,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| non_empty(lookup(name));

        let start_year = match var("SPENDLAKE_START_YEAR") {
            Some(year) => year.trim().parse().map_err(|_| {
                SpendlakeError::Config(format!("SPENDLAKE_START_YEAR '{}' is not a year", year))
            })?,
            None => current_fiscal_year(),
        };

        Ok(Self {
            start_year,
            staging_dir: var("SPENDLAKE_STAGING_DIR")
                .unwrap_or_else(|| DEFAULT_STAGING_DIR.to_string())
                .into(),
            index_url: var("SPENDLAKE_INDEX_URL").unwrap_or_else(|| DEFAULT_INDEX_URL.to_string()),
            verify_uploads: var("SPENDLAKE_VERIFY_UPLOADS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(false),
            show_progress: var("SPENDLAKE_PROGRESS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_START_YEAR..=MAX_START_YEAR).contains(&self.start_year) {
            return Err(SpendlakeError::Config(format!(
                "Start year {} is outside {}..={}",
                self.start_year, MIN_START_YEAR, MAX_START_YEAR
            )));
        }
        if self.staging_dir.as_os_str().is_empty() {
            return Err(SpendlakeError::Config("Staging directory must not be empty".into()));
        }
        if self.index_url.trim().is_empty() {
            return Err(SpendlakeError::Config("Archive index URL must not be empty".into()));
        }
        Ok(())
    }
}

/// Schema-driven load settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub schema_path: PathBuf,
    pub input_pattern: String,
    pub output_path: PathBuf,
}

impl LoadConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| non_empty(lookup(name));

        Self {
            schema_path: var("SPENDLAKE_SCHEMA")
                .unwrap_or_else(|| DEFAULT_SCHEMA_PATH.to_string())
                .into(),
            input_pattern: var("SPENDLAKE_INPUT").unwrap_or_else(|| DEFAULT_INPUT_PATTERN.to_string()),
            output_path: var("SPENDLAKE_OUTPUT")
                .unwrap_or_else(|| DEFAULT_OUTPUT_PATH.to_string())
                .into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_path.as_os_str().is_empty() {
            return Err(SpendlakeError::Config("Schema path must not be empty".into()));
        }
        if self.input_pattern.trim().is_empty() {
            return Err(SpendlakeError::Config("Input pattern must not be empty".into()));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(SpendlakeError::Config("Output path must not be empty".into()));
        }
        Ok(())
    }
}
