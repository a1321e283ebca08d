//! # DNS providers
//!
//! [`DnsProvider`] is the seam the reconciler drives: an idempotent
//! `set_weights` per (domain, weights) tuple. The Route53 implementation
//! lives in [`route53`]; when no provider is configured (or its init
//! fails) the [`NoopProvider`] fails open by logging intended weights.

pub mod aws;
pub mod route53;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use route53::{Route53Provider, Route53ProviderConfig};

/// Errors surfaced by DNS providers.
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("domain is required")]
    DomainRequired,
    #[error("no hosted zone for {domain}")]
    ZoneNotFound { domain: String },
    #[error("weighted records for {domain} not found")]
    RecordsNotFound { domain: String },
    #[error("dns api error: {0}")]
    Api(String),
    #[error("set_weights({domain}) failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        domain: String,
        attempts: u32,
        #[source]
        source: Box<DnsError>,
    },
}

/// Pushes weighted record updates for a domain.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sets the primary/backup weights for `domain`. MUST be idempotent
    /// per (domain, weights) tuple and observe cancellation promptly.
    async fn set_weights(&self, domain: &str, primary: i64, backup: i64) -> Result<(), DnsError>;
}

/// Fail-open provider substituted when DNS is not configured.
pub struct NoopProvider;

#[async_trait]
impl DnsProvider for NoopProvider {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn set_weights(&self, domain: &str, primary: i64, backup: i64) -> Result<(), DnsError> {
        info!(domain, primary, backup, "noop set_weights");
        Ok(())
    }
}
