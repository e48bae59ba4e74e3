//! Archive discovery and the backward year walk
//!
//! Each fiscal year is classified as exactly one [`DiscoveryStep`]. Only full
//! archives continue the walk; a delta archive or an empty listing ends it
//! normally, and transport failures end it with an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spendlake_common::{Result, SpendlakeError};
use std::time::Duration;
use tracing::{debug, error, info};

use super::{ArchiveDescriptor, ArchiveIndex};

/// Marker in the URL of incremental archives
pub const DELTA_MARKER: &str = "Delta";

/// Public endpoint listing the monthly bulk archives
pub const DEFAULT_INDEX_URL: &str =
    "https://api.usaspending.gov/api/v2/bulk_download/list_monthly_files/";

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Outcome of asking the index about one fiscal year
#[derive(Debug)]
pub enum DiscoveryStep {
    /// A full archive; process it and move on to the previous year
    Continue(ArchiveDescriptor),
    /// Delta archive or nothing listed; the walk is over
    Stop,
    Fail(SpendlakeError),
}

/// Classify the first listed archive for `fiscal_year`
pub async fn discover(index: &dyn ArchiveIndex, fiscal_year: i32) -> DiscoveryStep {
    match index.first_archive_url(fiscal_year).await {
        Ok(Some(url)) if url.contains(DELTA_MARKER) => {
            info!(fiscal_year, url = %url, "Only a delta archive is listed, stopping");
            DiscoveryStep::Stop
        },
        Ok(Some(url)) => {
            debug!(fiscal_year, url = %url, "Found full archive");
            DiscoveryStep::Continue(ArchiveDescriptor { url, fiscal_year })
        },
        Ok(None) => {
            info!(fiscal_year, "No archive listed, stopping");
            DiscoveryStep::Stop
        },
        Err(e) => {
            error!(fiscal_year, error = %e, "Archive discovery failed");
            DiscoveryStep::Fail(e)
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Pending(i32),
    Finished,
}

/// Finite, single-use walk from a starting year toward earlier years
///
/// Yields one descriptor per year until discovery stops or fails. Once
/// finished it yields nothing; start a new walk to begin again.
#[derive(Debug, Clone)]
pub struct YearWalk {
    state: WalkState,
}

impl YearWalk {
    pub fn new(start_year: i32) -> Self {
        Self {
            state: WalkState::Pending(start_year),
        }
    }

    /// The year the next call will ask about
    pub fn next_year(&self) -> Option<i32> {
        match self.state {
            WalkState::Pending(year) => Some(year),
            WalkState::Finished => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == WalkState::Finished
    }

    /// End the walk early
    pub fn finish(&mut self) {
        self.state = WalkState::Finished;
    }

    pub async fn next(&mut self, index: &dyn ArchiveIndex) -> Option<Result<ArchiveDescriptor>> {
        let WalkState::Pending(year) = self.state else {
            return None;
        };

        match discover(index, year).await {
            DiscoveryStep::Continue(descriptor) => {
                self.state = WalkState::Pending(year - 1);
                Some(Ok(descriptor))
            },
            DiscoveryStep::Stop => {
                self.state = WalkState::Finished;
                None
            },
            DiscoveryStep::Fail(e) => {
                self.state = WalkState::Finished;
                Some(Err(e))
            },
        }
    }
}

#[derive(Serialize)]
struct ListMonthlyFilesRequest<'a> {
    agency: &'a str,
    fiscal_year: i32,
    #[serde(rename = "type")]
    award_type: &'a str,
}

#[derive(Deserialize)]
struct ListMonthlyFilesResponse {
    monthly_files: Vec<MonthlyFile>,
}

#[derive(Deserialize)]
struct MonthlyFile {
    url: String,
}

/// Archive index backed by the bulk-download listing endpoint
pub struct HttpArchiveIndex {
    client: reqwest::Client,
    url: String,
}

impl HttpArchiveIndex {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("spendlake/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SpendlakeError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ArchiveIndex for HttpArchiveIndex {
    async fn first_archive_url(&self, fiscal_year: i32) -> Result<Option<String>> {
        debug!(fiscal_year, endpoint = %self.url, "Listing archives");

        let response = self
            .client
            .post(&self.url)
            .json(&ListMonthlyFilesRequest {
                agency: "all",
                fiscal_year,
                award_type: "contracts",
            })
            .send()
            .await
            .map_err(|e| SpendlakeError::Transport(format!("Archive listing request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SpendlakeError::Transport(format!(
                "Archive listing for {} returned {}",
                fiscal_year,
                response.status()
            )));
        }

        let listing: ListMonthlyFilesResponse = response.json().await.map_err(|e| {
            SpendlakeError::Transport(format!("Unreadable archive listing for {}: {}", fiscal_year, e))
        })?;

        // Only the first entry counts
        Ok(listing.monthly_files.into_iter().next().map(|file| file.url))
    }
}
