//! Archive download over HTTP

use async_trait::async_trait;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use spendlake_common::{Result, SpendlakeError};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::ArchiveFetcher;

const PROGRESS_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})";

/// Local file name for an archive URL: its last path segment
pub fn archive_file_name(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| SpendlakeError::ArchiveFormat(format!("Invalid archive URL '{}': {}", url, e)))?;

    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            SpendlakeError::ArchiveFormat(format!("Archive URL '{}' has no file name", url))
        })
}

/// Streams archives to disk, optionally with a progress bar
///
/// No retries: a failed transfer is reported once and the partial file is
/// removed.
pub struct HttpFetcher {
    client: reqwest::Client,
    show_progress: bool,
}

impl HttpFetcher {
    pub fn new(show_progress: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            show_progress,
        }
    }

    fn progress_bar(&self, total: u64, destination: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!("Downloading {}", destination.display()));
        pb
    }

    async fn stream_to(&self, url: &str, destination: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SpendlakeError::Transport(format!("Download of {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(SpendlakeError::Transport(format!(
                "Download of {} returned {}",
                url,
                response.status()
            )));
        }

        let pb = self.progress_bar(response.content_length().unwrap_or(0), destination);
        let mut file = tokio::fs::File::create(destination).await?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                SpendlakeError::Transport(format!("Download of {} interrupted: {}", url, e))
            })?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush().await?;
        pb.finish_and_clear();

        Ok(downloaded)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(false)
    }
}

#[async_trait]
impl ArchiveFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        info!(url, destination = %destination.display(), "Downloading archive");

        match self.stream_to(url, destination).await {
            Ok(bytes) => {
                info!(url, bytes, "Download complete");
                Ok(())
            },
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(destination).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            path = %destination.display(),
                            error = %remove_err,
                            "Could not remove partial download"
                        );
                    }
                }
                Err(e)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_file_name() {
        assert_eq!(
            archive_file_name("https://files.usaspending.gov/award_data_archive/2019_all_Contracts_Full_20190110.zip")
                .unwrap(),
            "2019_all_Contracts_Full_20190110.zip"
        );
        assert_eq!(
            archive_file_name("https://files.example/a/2017_all.zip?sig=abc").unwrap(),
            "2017_all.zip"
        );
    }

    #[test]
    fn test_archive_file_name_rejects_directories_and_garbage() {
        assert!(matches!(
            archive_file_name("https://files.example/archives/"),
            Err(SpendlakeError::ArchiveFormat(_))
        ));
        assert!(archive_file_name("not a url").is_err());
    }
}
