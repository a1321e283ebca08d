//! Route53-backed DNS provider.
//!
//! The weighted-record logic (zone resolution, record pagination, UPSERT
//! batches, retry with capped exponential backoff) is written against
//! [`Route53Api`], a thin contract over the SDK, so tests can drive it
//! with a mock and the adapter in [`super::aws`] stays trivial.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tokio::time::sleep;
use tracing::warn;

use super::{DnsError, DnsProvider};

/// A hosted zone candidate returned by name lookup.
#[derive(Debug, Clone)]
pub struct HostedZoneSummary {
    pub id: String,
    pub name: String,
}

/// An alias target carried through record copies untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasEndpoint {
    pub zone_id: String,
    pub dns_name: String,
    pub evaluate_target_health: bool,
}

/// One resource record set, rich enough to copy faithfully on UPSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    pub name: String,
    pub record_type: String,
    pub set_identifier: Option<String>,
    pub weight: Option<i64>,
    pub ttl: Option<i64>,
    pub values: Vec<String>,
    pub alias: Option<AliasEndpoint>,
    pub health_check_id: Option<String>,
}

/// Pagination cursor echoed back on truncated record listings.
#[derive(Debug, Clone, Default)]
pub struct RecordCursor {
    pub record_name: Option<String>,
    pub record_type: Option<String>,
    pub record_identifier: Option<String>,
}

/// One page of record sets.
#[derive(Debug, Clone)]
pub struct RecordSetPage {
    pub records: Vec<RecordSet>,
    /// Cursor for the next page; None when the listing is exhausted.
    pub next: Option<RecordCursor>,
}

/// Subset of the Route53 API the provider needs; mockable in tests.
#[async_trait]
pub trait Route53Api: Send + Sync {
    async fn hosted_zones_by_name(
        &self,
        dns_name: &str,
    ) -> Result<Vec<HostedZoneSummary>, DnsError>;

    async fn list_record_sets(
        &self,
        zone_id: &str,
        start: Option<RecordCursor>,
    ) -> Result<RecordSetPage, DnsError>;

    /// Submits one atomic change batch of UPSERTs.
    async fn change_record_sets(
        &self,
        zone_id: &str,
        comment: &str,
        changes: Vec<RecordSet>,
    ) -> Result<(), DnsError>;
}

/// Configuration for the Route53 provider.
#[derive(Debug, Clone, Default)]
pub struct Route53ProviderConfig {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Attempts per `set_weights` call; 0 means the default of 3.
    pub max_attempts: u32,
}

/// Provider implementing weighted failover over Route53 records.
pub struct Route53Provider<A> {
    api: A,
    zone_cache: Mutex<HashMap<String, String>>,
    max_attempts: u32,
}

impl<A: Route53Api> Route53Provider<A> {
    pub fn new(api: A, cfg: &Route53ProviderConfig) -> Self {
        let max_attempts = if cfg.max_attempts == 0 {
            3
        } else {
            cfg.max_attempts
        };
        Self {
            api,
            zone_cache: Mutex::new(HashMap::new()),
            max_attempts,
        }
    }

    async fn set_weights_once(
        &self,
        domain: &str,
        primary_weight: i64,
        backup_weight: i64,
    ) -> Result<(), DnsError> {
        let zone_id = self.lookup_hosted_zone(domain).await?;
        let (primary, backup) = self.fetch_weighted_records(&zone_id, domain).await?;

        let mut primary_update = primary;
        let mut backup_update = backup;
        primary_update.weight = Some(primary_weight);
        backup_update.weight = Some(backup_weight);

        let comment = format!(
            "tranche weight update {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        self.api
            .change_record_sets(&zone_id, &comment, vec![primary_update, backup_update])
            .await
    }

    /// Resolves the longest-matching hosted zone by name suffix; hits are
    /// cached per domain.
    async fn lookup_hosted_zone(&self, domain: &str) -> Result<String, DnsError> {
        if let Some(id) = self.zone_cache.lock().expect("zone cache").get(domain) {
            return Ok(id.clone());
        }

        let zones = self.api.hosted_zones_by_name(domain).await?;

        let mut best: Option<(String, String)> = None;
        for zone in zones {
            let zone_name = zone.name.trim_end_matches('.');
            if zone_name.is_empty() || !domain.ends_with(zone_name) {
                continue;
            }
            let better = match &best {
                Some((_, name)) => zone_name.len() > name.len(),
                None => true,
            };
            if better {
                let id = zone
                    .id
                    .strip_prefix("/hostedzone/")
                    .unwrap_or(&zone.id)
                    .to_string();
                best = Some((id, zone_name.to_string()));
            }
        }

        let (id, _) = best.ok_or_else(|| DnsError::ZoneNotFound {
            domain: domain.to_string(),
        })?;

        self.zone_cache
            .lock()
            .expect("zone cache")
            .insert(domain.to_string(), id.clone());
        Ok(id)
    }

    /// Pages through record sets until both weighted records (primary and
    /// backup set identifiers, matched case-insensitively) are found or
    /// the listing is exhausted.
    async fn fetch_weighted_records(
        &self,
        zone_id: &str,
        domain: &str,
    ) -> Result<(RecordSet, RecordSet), DnsError> {
        let mut primary: Option<RecordSet> = None;
        let mut backup: Option<RecordSet> = None;
        let mut cursor = Some(RecordCursor {
            record_name: Some(domain.to_string()),
            ..Default::default()
        });

        loop {
            let page = self.api.list_record_sets(zone_id, cursor.take()).await?;

            for record in page.records {
                if record.name.trim_end_matches('.') != domain {
                    continue;
                }
                let Some(identifier) = record.set_identifier.as_deref() else {
                    continue;
                };
                if record.weight.is_none() {
                    continue;
                }
                match identifier.to_ascii_lowercase().as_str() {
                    "primary" => primary = Some(record),
                    "backup" => backup = Some(record),
                    _ => {}
                }
            }

            if primary.is_some() && backup.is_some() {
                break;
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        match (primary, backup) {
            (Some(primary), Some(backup)) => Ok((primary, backup)),
            _ => Err(DnsError::RecordsNotFound {
                domain: domain.to_string(),
            }),
        }
    }
}

#[async_trait]
impl<A: Route53Api> DnsProvider for Route53Provider<A> {
    fn name(&self) -> &'static str {
        "route53"
    }

    async fn set_weights(&self, domain: &str, primary: i64, backup: i64) -> Result<(), DnsError> {
        let normalized = domain.trim().trim_end_matches('.');
        if normalized.is_empty() {
            return Err(DnsError::DomainRequired);
        }

        let mut last_err: Option<DnsError> = None;
        for attempt in 1..=self.max_attempts {
            match self.set_weights_once(normalized, primary, backup).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        domain = normalized,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "route53 set_weights attempt failed"
                    );
                    last_err = Some(err);
                    if attempt < self.max_attempts {
                        let backoff = Duration::from_millis(200) * 2u32.pow(attempt - 1);
                        sleep(backoff).await;
                    }
                }
            }
        }

        Err(DnsError::RetriesExhausted {
            domain: normalized.to_string(),
            attempts: self.max_attempts,
            source: Box::new(last_err.unwrap_or(DnsError::Api("unknown".to_string()))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn weighted(name: &str, identifier: &str, weight: i64) -> RecordSet {
        RecordSet {
            name: name.to_string(),
            record_type: "CNAME".to_string(),
            set_identifier: Some(identifier.to_string()),
            weight: Some(weight),
            ttl: Some(60),
            values: vec![format!("{identifier}.example.net.")],
            alias: None,
            health_check_id: None,
        }
    }

    struct MockApi {
        zones: Vec<HostedZoneSummary>,
        pages: Vec<RecordSetPage>,
        change_failures: u32,
        change_calls: AtomicU32,
        captured: Mutex<Vec<(String, Vec<RecordSet>)>>,
    }

    impl MockApi {
        fn single_zone(records: Vec<RecordSet>) -> Self {
            Self {
                zones: vec![HostedZoneSummary {
                    id: "/hostedzone/Z123".to_string(),
                    name: "example.com.".to_string(),
                }],
                pages: vec![RecordSetPage {
                    records,
                    next: None,
                }],
                change_failures: 0,
                change_calls: AtomicU32::new(0),
                captured: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Route53Api for MockApi {
        async fn hosted_zones_by_name(
            &self,
            _dns_name: &str,
        ) -> Result<Vec<HostedZoneSummary>, DnsError> {
            Ok(self.zones.clone())
        }

        async fn list_record_sets(
            &self,
            _zone_id: &str,
            start: Option<RecordCursor>,
        ) -> Result<RecordSetPage, DnsError> {
            let index = start
                .and_then(|c| c.record_identifier)
                .and_then(|i| i.parse::<usize>().ok())
                .unwrap_or(0);
            Ok(self.pages[index.min(self.pages.len() - 1)].clone())
        }

        async fn change_record_sets(
            &self,
            zone_id: &str,
            _comment: &str,
            changes: Vec<RecordSet>,
        ) -> Result<(), DnsError> {
            let call = self.change_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.change_failures {
                return Err(DnsError::Api("temporary error".to_string()));
            }
            self.captured
                .lock()
                .unwrap()
                .push((zone_id.to_string(), changes));
            Ok(())
        }
    }

    #[tokio::test]
    async fn set_weights_upserts_both_records() {
        let api = MockApi::single_zone(vec![
            weighted("app.example.com.", "primary", 10),
            weighted("app.example.com.", "backup", 5),
        ]);
        let provider = Route53Provider::new(api, &Route53ProviderConfig::default());

        provider.set_weights("app.example.com", 50, 10).await.unwrap();

        let captured = provider.api.captured.lock().unwrap();
        let (zone_id, changes) = &captured[0];
        assert_eq!(zone_id, "Z123");
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].weight, Some(50));
        assert_eq!(changes[1].weight, Some(10));
        // Everything except the weight is copied verbatim.
        assert_eq!(changes[0].values, vec!["primary.example.net.".to_string()]);
        assert_eq!(changes[0].ttl, Some(60));
    }

    #[tokio::test(start_paused = true)]
    async fn set_weights_retries_then_succeeds() {
        let mut api = MockApi::single_zone(vec![
            weighted("app.example.com.", "primary", 1),
            weighted("app.example.com.", "backup", 1),
        ]);
        api.change_failures = 1;
        let provider = Route53Provider::new(
            api,
            &Route53ProviderConfig {
                max_attempts: 2,
                ..Default::default()
            },
        );

        provider.set_weights("app.example.com", 10, 5).await.unwrap();

        assert_eq!(provider.api.change_calls.load(Ordering::SeqCst), 2);
        let captured = provider.api.captured.lock().unwrap();
        assert_eq!(captured[0].1[0].weight, Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn set_weights_surfaces_exhaustion() {
        let mut api = MockApi::single_zone(vec![
            weighted("app.example.com.", "primary", 1),
            weighted("app.example.com.", "backup", 1),
        ]);
        api.change_failures = 5;
        let provider = Route53Provider::new(
            api,
            &Route53ProviderConfig {
                max_attempts: 2,
                ..Default::default()
            },
        );

        let err = provider.set_weights("app.example.com", 10, 5).await.unwrap_err();
        assert!(matches!(
            err,
            DnsError::RetriesExhausted { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn longest_zone_suffix_wins() {
        let api = MockApi {
            zones: vec![
                HostedZoneSummary {
                    id: "/hostedzone/SHORT".to_string(),
                    name: "example.com.".to_string(),
                },
                HostedZoneSummary {
                    id: "/hostedzone/LONG".to_string(),
                    name: "app.example.com.".to_string(),
                },
            ],
            pages: vec![RecordSetPage {
                records: vec![
                    weighted("x.app.example.com.", "primary", 1),
                    weighted("x.app.example.com.", "backup", 1),
                ],
                next: None,
            }],
            change_failures: 0,
            change_calls: AtomicU32::new(0),
            captured: Mutex::new(Vec::new()),
        };
        let provider = Route53Provider::new(api, &Route53ProviderConfig::default());

        provider.set_weights("x.app.example.com", 100, 0).await.unwrap();
        assert_eq!(provider.api.captured.lock().unwrap()[0].0, "LONG");
    }

    #[tokio::test]
    async fn missing_weighted_records_is_an_error() {
        let api = MockApi::single_zone(vec![weighted("app.example.com.", "primary", 1)]);
        let provider = Route53Provider::new(api, &Route53ProviderConfig::default());

        let err = provider.set_weights("app.example.com", 10, 5).await.unwrap_err();
        assert!(matches!(
            err,
            DnsError::RetriesExhausted { ref source, .. }
                if matches!(**source, DnsError::RecordsNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn identifier_match_is_case_insensitive() {
        let api = MockApi::single_zone(vec![
            weighted("app.example.com.", "Primary", 1),
            weighted("app.example.com.", "BACKUP", 1),
        ]);
        let provider = Route53Provider::new(api, &Route53ProviderConfig::default());
        provider.set_weights("app.example.com", 0, 100).await.unwrap();
    }

    #[tokio::test]
    async fn empty_domain_is_rejected() {
        let api = MockApi::single_zone(vec![]);
        let provider = Route53Provider::new(api, &Route53ProviderConfig::default());
        let err = provider.set_weights("   ", 1, 2).await.unwrap_err();
        assert!(matches!(err, DnsError::DomainRequired));
    }
}
