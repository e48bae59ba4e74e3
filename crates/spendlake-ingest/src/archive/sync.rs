//! The per-year sync walk
//!
//! Years are processed strictly one after another: a year's download,
//! extraction, renaming, upload and cleanup all finish before the index is
//! asked about the previous year. The first error ends the walk and leaves
//! the staging directory as it was at the failing step.

use spendlake_common::{Result, SpendlakeError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::fetch::archive_file_name;
use super::staging;
use super::{
    ArchiveDescriptor, ArchiveExtractor, ArchiveFetcher, ArchiveIndex, BulkUploader, UploadReport,
    YearWalk,
};
use crate::files::FilePattern;

/// The external services one sync run talks to
pub struct SyncCollaborators {
    pub index: Box<dyn ArchiveIndex>,
    pub fetcher: Box<dyn ArchiveFetcher>,
    pub extractor: Box<dyn ArchiveExtractor>,
    pub uploader: Box<dyn BulkUploader>,
}

/// Result of one fully processed fiscal year
#[derive(Debug, Clone)]
pub struct YearOutcome {
    pub fiscal_year: i32,
    pub archive_url: String,
    pub archive_name: String,
    pub renamed_files: Vec<PathBuf>,
    pub upload: UploadReport,
    pub removed_files: usize,
}

pub struct ArchiveSync {
    collaborators: SyncCollaborators,
    staging_dir: PathBuf,
    verify_uploads: bool,
}

impl ArchiveSync {
    /// Uploads are fire-and-forget until verification is switched on
    pub fn new(collaborators: SyncCollaborators, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            collaborators,
            staging_dir: staging_dir.into(),
            verify_uploads: false,
        }
    }

    /// With verification on, an upload that fails or cannot be confirmed ends
    /// the walk before cleanup so the staged files survive
    pub fn with_upload_verification(mut self, verify: bool) -> Self {
        self.verify_uploads = verify;
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn uploader(&self) -> &dyn BulkUploader {
        self.collaborators.uploader.as_ref()
    }

    /// Start a fresh walk at `start_year`
    pub fn synchronize(&self, start_year: i32) -> SyncRun<'_> {
        info!(
            start_year,
            staging_dir = %self.staging_dir.display(),
            verify_uploads = self.verify_uploads,
            "Starting archive sync"
        );
        SyncRun {
            sync: self,
            walk: YearWalk::new(start_year),
        }
    }

    /// Drive a walk until it stops, returning every year's outcome
    pub async fn run_to_completion(&self, start_year: i32) -> Result<Vec<YearOutcome>> {
        let mut run = self.synchronize(start_year);
        let mut outcomes = Vec::new();
        while let Some(outcome) = run.next().await {
            outcomes.push(outcome?);
        }
        Ok(outcomes)
    }

    async fn process_year(&self, descriptor: ArchiveDescriptor) -> Result<YearOutcome> {
        let ArchiveDescriptor { url, fiscal_year } = descriptor;
        tokio::fs::create_dir_all(&self.staging_dir).await?;

        let archive_name = archive_file_name(&url)?;
        let archive_path = self.staging_dir.join(&archive_name);

        self.collaborators.fetcher.fetch(&url, &archive_path).await?;
        self.collaborators
            .extractor
            .extract(&archive_path, &self.staging_dir)?;

        // The file name decides the tag, not the year we asked for
        let year = staging::archive_year(&archive_path)?;
        if year != fiscal_year {
            warn!(fiscal_year, archive_year = year, archive = %archive_name, "Archive year differs from requested year");
        }
        let renamed_files = staging::rename_extracted(&self.staging_dir, year)?;

        let pattern = staging::renamed_pattern(&self.staging_dir, year)?;
        let upload = self.upload(&pattern, renamed_files.len()).await?;

        let removed_files = staging::cleanup(&self.staging_dir, &archive_path)?;

        info!(
            fiscal_year,
            files = renamed_files.len(),
            uploaded = upload.len(),
            bytes = upload.bytes(),
            "Year synchronized"
        );

        Ok(YearOutcome {
            fiscal_year,
            archive_url: url,
            archive_name,
            renamed_files,
            upload,
            removed_files,
        })
    }

    async fn upload(&self, pattern: &FilePattern, expected: usize) -> Result<UploadReport> {
        let uploader = self.uploader();

        if !self.verify_uploads {
            return match uploader.upload(pattern).await {
                Ok(report) => Ok(report),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Upload failed, continuing with cleanup");
                    Ok(UploadReport::default())
                },
            };
        }

        let report = uploader
            .upload(pattern)
            .await
            .map_err(|e| unverified(pattern, e))?;

        if report.len() < expected {
            return Err(SpendlakeError::UnverifiedUpload(format!(
                "{}: {} of {} files reported as uploaded",
                pattern,
                report.len(),
                expected
            )));
        }

        uploader
            .verify(&report)
            .await
            .map_err(|e| unverified(pattern, e))?;

        Ok(report)
    }
}

fn unverified(pattern: &FilePattern, error: SpendlakeError) -> SpendlakeError {
    match error {
        SpendlakeError::UnverifiedUpload(_) => error,
        other => SpendlakeError::UnverifiedUpload(format!("{}: {}", pattern, other)),
    }
}

/// A single pass over the years, one [`YearOutcome`] per `next` call
///
/// Ends when discovery stops, or right after the first error has been
/// returned.
pub struct SyncRun<'a> {
    sync: &'a ArchiveSync,
    walk: YearWalk,
}

impl SyncRun<'_> {
    pub async fn next(&mut self) -> Option<Result<YearOutcome>> {
        let descriptor = match self.walk.next(self.sync.collaborators.index.as_ref()).await? {
            Ok(descriptor) => descriptor,
            Err(e) => return Some(Err(e)),
        };

        let fiscal_year = descriptor.fiscal_year;
        let outcome = self.sync.process_year(descriptor).await;
        if let Err(e) = &outcome {
            warn!(fiscal_year, error = %e, "Year failed, ending sync");
            self.walk.finish();
        }
        Some(outcome)
    }

    /// The year the next call will ask about
    pub fn next_year(&self) -> Option<i32> {
        self.walk.next_year()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::UploadedObject;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Full archives for `first..=last`, a delta archive the year before
    struct FakeIndex {
        first: i32,
        last: i32,
    }

    #[async_trait]
    impl ArchiveIndex for FakeIndex {
        async fn first_archive_url(&self, fiscal_year: i32) -> Result<Option<String>> {
            Ok(if (self.first..=self.last).contains(&fiscal_year) {
                Some(format!("https://files.example/{}_all_Contracts_Full.zip", fiscal_year))
            } else if fiscal_year == self.first - 1 {
                Some(format!("https://files.example/{}_all_Contracts_Delta.zip", fiscal_year))
            } else {
                None
            })
        }
    }

    struct FakeFetcher;

    #[async_trait]
    impl ArchiveFetcher for FakeFetcher {
        async fn fetch(&self, _url: &str, destination: &Path) -> Result<()> {
            std::fs::write(destination, b"archive")?;
            Ok(())
        }
    }

    /// Drops two transaction files and an unrelated one
    struct FakeExtractor {
        fail: bool,
    }

    impl ArchiveExtractor for FakeExtractor {
        fn extract(&self, archive: &Path, destination: &Path) -> Result<Vec<PathBuf>> {
            if self.fail {
                return Err(SpendlakeError::ArchiveFormat(format!("corrupt {}", archive.display())));
            }
            let mut written = Vec::new();
            for name in [
                "all_contracts_prime_transactions_1.csv",
                "all_contracts_prime_transactions_2.csv",
                "readme.txt",
            ] {
                let path = destination.join(name);
                std::fs::write(&path, "a,b\n1,2\n")?;
                written.push(path);
            }
            Ok(written)
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum UploadMode {
        Ok,
        Fail,
        VerifyFail,
    }

    #[derive(Clone)]
    struct FakeUploader {
        mode: UploadMode,
        uploaded: Arc<Mutex<Vec<String>>>,
    }

    impl FakeUploader {
        fn new(mode: UploadMode) -> Self {
            Self {
                mode,
                uploaded: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn uploaded(&self) -> Vec<String> {
            self.uploaded.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BulkUploader for FakeUploader {
        async fn upload(&self, pattern: &FilePattern) -> Result<UploadReport> {
            if self.mode == UploadMode::Fail {
                return Err(SpendlakeError::Storage("bucket unavailable".into()));
            }
            let mut report = UploadReport::default();
            for path in pattern.matching_files()? {
                let key = path.file_name().unwrap().to_string_lossy().into_owned();
                self.uploaded.lock().unwrap().push(key.clone());
                report.objects.push(UploadedObject {
                    size: std::fs::metadata(&path)?.len(),
                    local_path: path,
                    key,
                });
            }
            Ok(report)
        }

        async fn verify(&self, report: &UploadReport) -> Result<()> {
            if self.mode == UploadMode::VerifyFail {
                return Err(SpendlakeError::UnverifiedUpload(format!(
                    "{} missing",
                    report.objects[0].key
                )));
            }
            Ok(())
        }
    }

    fn sync_with(dir: &Path, uploader: FakeUploader, extract_fails: bool) -> ArchiveSync {
        ArchiveSync::new(
            SyncCollaborators {
                index: Box::new(FakeIndex { first: 2017, last: 2019 }),
                fetcher: Box::new(FakeFetcher),
                extractor: Box::new(FakeExtractor { fail: extract_fails }),
                uploader: Box::new(uploader),
            },
            dir,
        )
    }

    fn csv_count(dir: &Path) -> usize {
        FilePattern::in_dir(dir, "*.csv").unwrap().matching_files().unwrap().len()
    }

    #[tokio::test]
    async fn test_walk_processes_years_until_delta() {
        let dir = TempDir::new().unwrap();
        let uploader = FakeUploader::new(UploadMode::Ok);
        let sync = sync_with(dir.path(), uploader.clone(), false);

        let outcomes = sync.run_to_completion(2019).await.unwrap();

        let years: Vec<_> = outcomes.iter().map(|o| o.fiscal_year).collect();
        assert_eq!(years, vec![2019, 2018, 2017]);
        assert_eq!(outcomes[0].archive_name, "2019_all_Contracts_Full.zip");
        assert_eq!(outcomes[0].upload.len(), 2);
        // archive plus two renamed files
        assert_eq!(outcomes[0].removed_files, 3);

        let uploaded = uploader.uploaded();
        assert_eq!(uploaded.len(), 6);
        assert_eq!(uploaded[0], "2019_all_contracts_prime_transactions_1.csv");
        assert_eq!(uploaded[5], "2017_all_contracts_prime_transactions_2.csv");

        assert_eq!(csv_count(dir.path()), 0);
        assert!(!dir.path().join("2017_all_Contracts_Full.zip").exists());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_files_when_verifying() {
        let dir = TempDir::new().unwrap();
        let sync = sync_with(dir.path(), FakeUploader::new(UploadMode::Fail), false)
            .with_upload_verification(true);

        let mut run = sync.synchronize(2019);
        let err = run.next().await.unwrap().unwrap_err();
        assert!(matches!(err, SpendlakeError::UnverifiedUpload(_)));
        assert!(run.next().await.is_none());

        assert!(dir.path().join("2019_all_Contracts_Full.zip").exists());
        assert!(dir.path().join("2019_all_contracts_prime_transactions_1.csv").exists());
    }

    #[tokio::test]
    async fn test_verification_miss_aborts_before_cleanup() {
        let dir = TempDir::new().unwrap();
        let sync = sync_with(dir.path(), FakeUploader::new(UploadMode::VerifyFail), false)
            .with_upload_verification(true);

        let err = sync.run_to_completion(2019).await.unwrap_err();
        assert!(matches!(err, SpendlakeError::UnverifiedUpload(_)));
        assert_eq!(csv_count(dir.path()), 2);
    }

    #[tokio::test]
    async fn test_failed_upload_still_cleans_by_default() {
        let dir = TempDir::new().unwrap();
        let sync = sync_with(dir.path(), FakeUploader::new(UploadMode::Fail), false);

        let outcomes = sync.run_to_completion(2019).await.unwrap();
        let years: Vec<_> = outcomes.iter().map(|o| o.fiscal_year).collect();
        assert_eq!(years, vec![2019, 2018, 2017]);
        assert!(outcomes.iter().all(|o| o.upload.is_empty()));
        assert!(outcomes.iter().all(|o| o.removed_files == 3));
        assert_eq!(csv_count(dir.path()), 0);
        assert!(!dir.path().join("2019_all_Contracts_Full.zip").exists());
    }

    #[tokio::test]
    async fn test_verification_is_not_consulted_by_default() {
        let dir = TempDir::new().unwrap();
        let sync = sync_with(dir.path(), FakeUploader::new(UploadMode::VerifyFail), false);

        let outcomes = sync.run_to_completion(2019).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].upload.len(), 2);
        assert_eq!(csv_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_extraction_failure_ends_walk() {
        let dir = TempDir::new().unwrap();
        let sync = sync_with(dir.path(), FakeUploader::new(UploadMode::Ok), true);

        let mut run = sync.synchronize(2019);
        assert!(matches!(
            run.next().await,
            Some(Err(SpendlakeError::ArchiveFormat(_)))
        ));
        assert_eq!(run.next_year(), None);
        assert!(run.next().await.is_none());
        // The downloaded archive is left for inspection
        assert!(dir.path().join("2019_all_Contracts_Full.zip").exists());
    }
}
