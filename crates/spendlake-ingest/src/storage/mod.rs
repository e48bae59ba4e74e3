//! S3-compatible object store used as the bulk uploader

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use spendlake_common::{Result, SpendlakeError};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::archive::{BulkUploader, UploadReport, UploadedObject};
use crate::files::{file_name_str, FilePattern};

pub mod config;

pub use config::StorageConfig;

#[derive(Clone)]
pub struct ObjectStore {
    client: Client,
    bucket: String,
    key_prefix: Option<String>,
}

impl ObjectStore {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        debug!("Initializing storage with config: {:?}", config);

        let mut builder = match config.static_credentials() {
            Some((access_key, secret_key)) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "spendlake-storage",
                )),
            None => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(bucket = %config.bucket, "Storage client initialized");

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            key_prefix: config.key_prefix,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key for a local file name
    pub fn key_for(&self, file_name: &str) -> String {
        object_key(self.key_prefix.as_deref(), file_name)
    }

    #[instrument(skip(self))]
    pub async fn upload_file(&self, path: &Path) -> Result<UploadedObject> {
        let key = self.key_for(file_name_str(path)?);
        let size = tokio::fs::metadata(path).await?.len();

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        let body = ByteStream::from_path(path).await.map_err(|e| {
            SpendlakeError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                SpendlakeError::Storage(format!(
                    "Failed to upload s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);

        Ok(UploadedObject {
            local_path: path.to_path_buf(),
            key,
            size,
        })
    }

    /// Remote size of an object, `None` if it does not exist
    #[instrument(skip(self))]
    pub async fn object_size(&self, key: &str) -> Result<Option<u64>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(head.content_length().unwrap_or(0).max(0) as u64)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(SpendlakeError::Storage(format!(
                "Failed to check s3://{}/{}: {}",
                self.bucket,
                key,
                DisplayErrorContext(&e)
            ))),
        }
    }
}

#[async_trait]
impl BulkUploader for ObjectStore {
    async fn upload(&self, pattern: &FilePattern) -> Result<UploadReport> {
        let files = pattern.matching_files()?;
        if files.is_empty() {
            warn!(pattern = %pattern, "No files match upload pattern");
        }

        let mut report = UploadReport::default();
        for path in &files {
            report.objects.push(self.upload_file(path).await?);
        }

        info!(
            pattern = %pattern,
            bucket = %self.bucket,
            files = report.len(),
            bytes = report.bytes(),
            "Bulk upload complete"
        );
        Ok(report)
    }

    async fn verify(&self, report: &UploadReport) -> Result<()> {
        for object in &report.objects {
            match self.object_size(&object.key).await? {
                Some(size) if size == object.size => {
                    debug!(key = %object.key, size, "Upload verified");
                },
                Some(size) => {
                    return Err(SpendlakeError::UnverifiedUpload(format!(
                        "s3://{}/{} has {} bytes, expected {}",
                        self.bucket, object.key, size, object.size
                    )));
                },
                None => {
                    return Err(SpendlakeError::UnverifiedUpload(format!(
                        "s3://{}/{} is missing",
                        self.bucket, object.key
                    )));
                },
            }
        }
        Ok(())
    }
}

fn object_key(prefix: Option<&str>, file_name: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, file_name),
        _ => file_name.to_string(),
    }
}
