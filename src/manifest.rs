//! Read-only fetch of the remote extension catalog.

use thiserror::Error;

/// Result type for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Errors fetching the extension catalog.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The catalog host answered with a non-success status.
    #[error("manifest fetch failed with HTTP status {status}")]
    FetchFailed {
        /// HTTP status code.
        status: u16,
    },

    /// The catalog host could not be reached.
    #[error("manifest unavailable: {reason}")]
    Unavailable {
        /// Transport failure.
        reason: String,
    },

    /// The response body did not parse as JSON.
    #[error("manifest body is not valid JSON: {reason}")]
    Parse {
        /// Parse failure.
        reason: String,
    },
}

/// Stateless fetcher for the remote extension catalog.
///
/// One GET per call: no retry, no cache. The body is parsed as JSON whatever
/// the declared content type says, and returned unmodified.
pub struct ManifestFetcher {
    url: String,
    client: reqwest::Client,
}

impl ManifestFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Catalog URL this fetcher reads from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the catalog.
    pub async fn fetch(&self) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ManifestError::Unavailable {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManifestError::FetchFailed {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ManifestError::Unavailable {
                reason: e.to_string(),
            })?;
        serde_json::from_slice(&body).map_err(|e| ManifestError::Parse {
            reason: e.to_string(),
        })
    }
}
