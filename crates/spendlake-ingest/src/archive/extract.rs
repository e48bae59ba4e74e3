//! Zip extraction to the staging directory

use spendlake_common::{Result, SpendlakeError};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::ArchiveExtractor;

/// Writes every file entry of a zip archive directly into the destination
/// directory; directory structure inside the archive is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveExtractor for ZipExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<Vec<PathBuf>> {
        let format_err = |what: &str, e: &dyn std::fmt::Display| {
            SpendlakeError::ArchiveFormat(format!("{} {}: {}", what, archive.display(), e))
        };

        let file = File::open(archive)?;
        let mut zip =
            zip::ZipArchive::new(file).map_err(|e| format_err("Failed to read zip archive", &e))?;
        std::fs::create_dir_all(destination)?;

        let mut written = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| format_err(&format!("Failed to read entry {} of", i), &e))?;

            if entry.is_dir() {
                continue;
            }

            let Some(file_name) = entry
                .enclosed_name()
                .and_then(|p| p.file_name().map(|n| n.to_owned()))
            else {
                warn!(entry = entry.name(), "Skipping archive entry with unsafe path");
                continue;
            };

            let target = destination.join(file_name);
            let mut out = BufWriter::new(File::create(&target)?);
            let bytes = std::io::copy(&mut entry, &mut out)
                .map_err(|e| format_err(&format!("Failed to unpack {} from", entry.name()), &e))?;
            debug!(file = %target.display(), bytes, "Extracted");
            written.push(target);
        }

        info!(
            archive = %archive.display(),
            files = written.len(),
            "Archive extracted"
        );
        Ok(written)
    }
}
