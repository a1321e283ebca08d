//! # CDN usage
//!
//! [`UsageProvider`] fetches per-host traffic for aligned windows; the
//! ingestor folds those rows into `usage_snapshots`. Cloudflare's
//! GraphQL analytics API is the production implementation.

pub mod cloudflare;
pub mod ingestor;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

pub use cloudflare::CloudflareClient;
pub use ingestor::Ingestor;

/// Usage for a hostname within one discrete billing window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedUsage {
    pub host: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub bytes: i64,
}

/// Errors surfaced by usage providers.
#[derive(Debug, Error)]
pub enum CdnError {
    #[error("unsupported usage window {0:?}; only 1h windows are available")]
    UnsupportedWindow(Duration),
    #[error("cdn request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cdn api error: {0}")]
    Api(String),
    #[error("cdn account {0} not found")]
    AccountNotFound(String),
}

/// Fetches usage statistics between aligned windows.
#[async_trait]
pub trait UsageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Per-host usage rows covering `[start, end)` in `window`-sized
    /// buckets for the given hosts.
    async fn usage(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        window: Duration,
        hosts: &[String],
    ) -> Result<Vec<WindowedUsage>, CdnError>;
}

/// Truncates a timestamp down to the window boundary.
pub(crate) fn truncate_to_window(ts: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let secs = window.as_secs() as i64;
    if secs <= 0 {
        return ts;
    }
    let aligned = ts.timestamp().div_euclid(secs) * secs;
    Utc.timestamp_opt(aligned, 0).single().unwrap_or(ts)
}
