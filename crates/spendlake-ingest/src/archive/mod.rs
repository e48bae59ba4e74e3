//! Yearly contract archives: discovery, download, unpacking and hand-off
//!
//! [`sync::ArchiveSync`] walks fiscal years backward from a starting year.
//! For each year it asks an [`ArchiveIndex`] for the full archive, downloads
//! it with an [`ArchiveFetcher`], unpacks it with an [`ArchiveExtractor`],
//! renames the extracted files to carry the year, hands them to a
//! [`BulkUploader`] and clears the staging directory.
//!
//! The collaborators are traits so the walk can run against in-memory fakes.

use async_trait::async_trait;
use spendlake_common::Result;
use std::path::{Path, PathBuf};

use crate::files::FilePattern;

pub mod discovery;
pub mod extract;
pub mod fetch;
pub mod staging;
pub mod sync;

pub use discovery::{DiscoveryStep, HttpArchiveIndex, YearWalk};
pub use extract::ZipExtractor;
pub use fetch::HttpFetcher;
pub use sync::{ArchiveSync, SyncCollaborators, SyncRun, YearOutcome};

/// A full yearly archive found by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    pub url: String,
    pub fiscal_year: i32,
}

/// Lists the published archives of a fiscal year
#[async_trait]
pub trait ArchiveIndex: Send + Sync {
    /// URL of the first listed archive, `None` when nothing is published
    async fn first_archive_url(&self, fiscal_year: i32) -> Result<Option<String>>;
}

/// Copies a remote archive to a local file
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

/// Unpacks an archive into a directory
pub trait ArchiveExtractor: Send + Sync {
    /// Returns the paths of the written files
    fn extract(&self, archive: &Path, destination: &Path) -> Result<Vec<PathBuf>>;
}

/// What an upload call reports back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub objects: Vec<UploadedObject>,
}

impl UploadReport {
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub local_path: PathBuf,
    pub key: String,
    pub size: u64,
}

/// Copies local files into the bucket under their base names
#[async_trait]
pub trait BulkUploader: Send + Sync {
    async fn upload(&self, pattern: &FilePattern) -> Result<UploadReport>;

    /// Confirm every reported object exists remotely
    ///
    /// The default trusts the upload call.
    async fn verify(&self, _report: &UploadReport) -> Result<()> {
        Ok(())
    }
}
