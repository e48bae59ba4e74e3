//! Staging directory housekeeping: year tagging and cleanup

use regex::Regex;
use spendlake_common::{Result, SpendlakeError};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::files::{file_name_str, FilePattern};

/// Extracted transaction files, before renaming
pub const EXTRACTED_PATTERN: &str = "all_contracts_prime_transactions_*.csv";

/// Every delimited file in the staging directory
pub const DELIMITED_PATTERN: &str = "*.csv";

const RENAME_FROM: &str = "all_";

static YEAR_PREFIX: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(\d{4})"));

/// Fiscal year taken from the leading four digits of an archive's file name
pub fn archive_year(archive: &Path) -> Result<i32> {
    let name = file_name_str(archive)?;
    let year_prefix = YEAR_PREFIX
        .as_ref()
        .map_err(|e| SpendlakeError::ArchiveFormat(format!("Invalid year pattern: {}", e)))?;
    year_prefix
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| {
            SpendlakeError::ArchiveFormat(format!(
                "Archive name '{}' does not start with a four-digit year",
                name
            ))
        })
}

/// Pattern matching the files produced by [`rename_extracted`] for `year`
pub fn renamed_pattern(staging_dir: &Path, year: i32) -> Result<FilePattern> {
    FilePattern::in_dir(staging_dir, &format!("{}_{}", year, EXTRACTED_PATTERN))
}

/// `all_...` becomes `{year}_all_...`
pub fn year_tagged_name(file_name: &str, year: i32) -> String {
    file_name.replacen(RENAME_FROM, &format!("{}_{}", year, RENAME_FROM), 1)
}

/// Prefix every extracted transaction file with the archive year
pub fn rename_extracted(staging_dir: &Path, year: i32) -> Result<Vec<PathBuf>> {
    let extracted = FilePattern::in_dir(staging_dir, EXTRACTED_PATTERN)?;
    let mut renamed = Vec::new();

    for path in extracted.matching_files()? {
        let target = path.with_file_name(year_tagged_name(file_name_str(&path)?, year));
        std::fs::rename(&path, &target)?;
        debug!(from = %path.display(), to = %target.display(), "Renamed");
        renamed.push(target);
    }

    info!(year, files = renamed.len(), "Tagged extracted files with year");
    Ok(renamed)
}

/// Delete the archive and every delimited file in the staging directory
///
/// Returns how many files were removed. A missing archive is not an error.
pub fn cleanup(staging_dir: &Path, archive: &Path) -> Result<usize> {
    let mut removed = 0;

    match std::fs::remove_file(archive) {
        Ok(()) => removed += 1,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return Err(e.into()),
    }

    for path in FilePattern::in_dir(staging_dir, DELIMITED_PATTERN)?.matching_files()? {
        std::fs::remove_file(&path)?;
        removed += 1;
    }

    info!(dir = %staging_dir.display(), removed, "Staging directory cleaned");
    Ok(removed)
}
