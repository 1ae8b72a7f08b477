// REST snapshot client - fetches depth snapshots for book reconciliation
//
// Synchronous from the driver's point of view: the fetch is awaited inline
// from the feed task. Blocking there is fine because no other work is useful
// for that symbol until the snapshot arrives, and other symbols keep
// accumulating deltas in their own buffers.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::book::parser::{self, ParseError};
use crate::core::types::DepthSnapshot;

/// Binance REST endpoint.
pub const BINANCE_REST_URL: &str = "https://api.binance.com";

/// Request timeout; also the de-facto bound on how long a snapshot fetch can
/// stall the feed task.
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("decode error: {0}")]
    Decode(#[from] ParseError),
}

/// The snapshot collaborator. The coordinator only depends on this seam, so
/// tests can inject a stub instead of the HTTP client.
pub trait SnapshotSource {
    fn fetch_snapshot(
        &self,
        symbol: &str,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<DepthSnapshot, SnapshotError>>;
}

/// HTTPS snapshot client over reqwest.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new() -> Result<Self, SnapshotError> {
        Self::with_base_url(BINANCE_REST_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, SnapshotError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }
}

impl SnapshotSource for RestClient {
    /// GET {base}/api/v3/depth?symbol=SYM&limit=N
    ///
    /// Bids come back sorted high-to-low, asks low-to-high; prices and
    /// quantities are decimal strings widened by the shared decoder.
    async fn fetch_snapshot(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<DepthSnapshot, SnapshotError> {
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.base_url, symbol, limit
        );
        debug!(url = %url, "Fetching depth snapshot");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // error bodies still carry code/msg; decode surfaces them
            if let Err(e) = parser::decode_snapshot(&body) {
                return Err(SnapshotError::Decode(e));
            }
            return Err(SnapshotError::Status(status.as_u16()));
        }

        let snapshot = parser::decode_snapshot(&body)?;

        info!(
            symbol = symbol,
            last_update_id = snapshot.last_update_id,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "Snapshot received"
        );

        Ok(snapshot)
    }
}
