//! Probe scheduler.
//!
//! Maintains one cancellable sampling loop per probe target and
//! reconciles the running set against the store every reconcile
//! interval. A failed domain fetch preserves the service's loops; a
//! failed service listing backs off and retries without touching any
//! loop.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::MetricsRecorder;
use crate::models::{service, service_domain};
use crate::repositories;

/// Probe loop tuning; the defaults match production cadence.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Request path, normalized to start with `/`.
    pub path: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Delay between probes of one target.
    pub probe_interval: Duration,
    /// Delay between reconciles of the loop set.
    pub reconcile_interval: Duration,
    /// Back-off after a failed service listing.
    pub retry_interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            timeout: Duration::from_secs(5),
            probe_interval: Duration::from_secs(10),
            reconcile_interval: Duration::from_secs(5 * 60),
            retry_interval: Duration::from_secs(60),
        }
    }
}

/// One concrete sampling endpoint for a (service, domain, label) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProbeTarget {
    pub service_id: i64,
    pub domain_id: i64,
    pub url: String,
    /// Host header override, set when the URL host differs from the domain.
    pub host_header: Option<String>,
    pub metrics_key: String,
}

impl ProbeTarget {
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.service_id, self.domain_id, self.metrics_key)
    }
}

/// Dynamic fleet of per-target probe loops sharing one HTTP client.
pub struct Scheduler {
    db: DatabaseConnection,
    recorder: Arc<dyn MetricsRecorder>,
    cfg: ProbeConfig,
    client: reqwest::Client,
    loops: Mutex<HashMap<String, CancellationToken>>,
}

impl Scheduler {
    pub fn new(
        db: DatabaseConnection,
        recorder: Arc<dyn MetricsRecorder>,
        cfg: ProbeConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            db,
            recorder,
            cfg,
            client,
            loops: Mutex::new(HashMap::new()),
        })
    }

    /// Runs reconcile rounds until `shutdown` fires, then cancels every
    /// probe loop before returning.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!("probe scheduler started");

        loop {
            let delay = match repositories::service::active_services(&self.db).await {
                Ok(services) => {
                    self.reconcile(&shutdown, services).await;
                    self.cfg.reconcile_interval
                }
                Err(err) => {
                    error!(error = ?err, "failed to list active services");
                    self.cfg.retry_interval
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        self.cancel_all_loops();
        info!("probe scheduler stopped");
    }

    async fn reconcile(self: &Arc<Self>, shutdown: &CancellationToken, services: Vec<service::Model>) {
        let mut active: HashSet<String> = HashSet::new();

        for svc in services {
            match repositories::service_domain::domains_for_service(&self.db, svc.id).await {
                Ok(domains) => {
                    for target in expand_targets(&svc, &domains, &self.cfg.path) {
                        active.insert(target.key());
                        self.ensure_probe_loop(shutdown, target);
                    }
                }
                Err(err) => {
                    // Transient read failure: keep whatever is running
                    // for this service instead of cancelling it.
                    warn!(error = ?err, service_id = svc.id, "failed to load domains; preserving loops");
                    self.preserve_existing_loops(&mut active, svc.id);
                }
            }
        }

        self.stop_missing_loops(&active);

        let running = self.loops.lock().expect("loops lock").len();
        metrics::gauge!("tranche_probe_loops").set(running as f64);
        debug!(running, "probe reconcile completed");
    }

    fn ensure_probe_loop(self: &Arc<Self>, shutdown: &CancellationToken, target: ProbeTarget) {
        let mut loops = self.loops.lock().expect("loops lock");
        let key = target.key();
        if loops.contains_key(&key) {
            return;
        }

        let token = shutdown.child_token();
        loops.insert(key, token.clone());

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.probe_loop(token, target).await;
        });
    }

    /// Marks every running loop of `service_id` as still desired.
    fn preserve_existing_loops(&self, active: &mut HashSet<String>, service_id: i64) {
        let loops = self.loops.lock().expect("loops lock");
        let prefix = format!("{service_id}:");
        for key in loops.keys() {
            if key.starts_with(&prefix) {
                active.insert(key.clone());
            }
        }
    }

    fn stop_missing_loops(&self, active: &HashSet<String>) {
        let mut loops = self.loops.lock().expect("loops lock");
        loops.retain(|key, token| {
            if active.contains(key) {
                return true;
            }
            debug!(target = %key, "stopping probe loop");
            token.cancel();
            false
        });
    }

    fn cancel_all_loops(&self) {
        let mut loops = self.loops.lock().expect("loops lock");
        for (_, token) in loops.drain() {
            token.cancel();
        }
    }

    async fn probe_loop(self: Arc<Self>, token: CancellationToken, target: ProbeTarget) {
        loop {
            let start = Instant::now();
            let ok = tokio::select! {
                _ = token.cancelled() => return,
                outcome = self.probe_once(&target) => outcome,
            };
            let latency = start.elapsed();

            if let Err(err) = self
                .recorder
                .record_probe(target.service_id, &target.metrics_key, ok, latency)
                .await
            {
                error!(error = ?err, target = %target.metrics_key, "failed to record probe sample");
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(self.cfg.probe_interval) => {}
            }
        }
    }

    /// One GET against the target. A completed response below 500 counts
    /// as ok; timeouts, connection errors and 5xx do not. The body is
    /// drained and discarded.
    async fn probe_once(&self, target: &ProbeTarget) -> bool {
        let mut request = self.client.get(&target.url);
        if let Some(host) = &target.host_header {
            request = request.header(reqwest::header::HOST, host);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let _ = response.bytes().await;
                status.as_u16() < 500
            }
            Err(err) => {
                debug!(error = %err, target = %target.metrics_key, "probe request failed");
                false
            }
        }
    }
}

/// Expands a service and its domains into the desired probe target set:
/// one direct probe per domain, plus one probe through each configured
/// CDN with the domain as Host header.
pub(crate) fn expand_targets(
    svc: &service::Model,
    domains: &[service_domain::Model],
    probe_path: &str,
) -> Vec<ProbeTarget> {
    let mut targets = Vec::new();
    for domain in domains {
        if let Some(target) = build_target(svc.id, domain, &domain.name, None, probe_path) {
            targets.push(target);
        }
        if !svc.primary_cdn.is_empty() {
            let label = format!("primary:{}", svc.primary_cdn);
            if let Some(target) =
                build_target(svc.id, domain, &svc.primary_cdn, Some(&label), probe_path)
            {
                targets.push(target);
            }
        }
        if !svc.backup_cdn.is_empty() {
            let label = format!("backup:{}", svc.backup_cdn);
            if let Some(target) =
                build_target(svc.id, domain, &svc.backup_cdn, Some(&label), probe_path)
            {
                targets.push(target);
            }
        }
    }
    targets
}

fn build_target(
    service_id: i64,
    domain: &service_domain::Model,
    host: &str,
    label: Option<&str>,
    probe_path: &str,
) -> Option<ProbeTarget> {
    let url = build_probe_url(host, probe_path)?;
    let parsed = Url::parse(&url).ok()?;

    let metrics_key = match label {
        Some(label) => format!("{}@{}", domain.name, label),
        None => domain.name.clone(),
    };
    let host_header = match parsed.host_str() {
        Some(url_host) if url_host.eq_ignore_ascii_case(&domain.name) => None,
        _ => Some(domain.name.clone()),
    };

    Some(ProbeTarget {
        service_id,
        domain_id: domain.id,
        url,
        host_header,
        metrics_key,
    })
}

fn build_probe_url(host: &str, probe_path: &str) -> Option<String> {
    let host = host.trim();
    if host.is_empty() {
        return None;
    }
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let mut parsed = Url::parse(&base).ok()?;
    parsed.set_path(probe_path);
    Some(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service(id: i64, primary: &str, backup: &str) -> service::Model {
        service::Model {
            id,
            customer_id: 1,
            name: "app".to_string(),
            primary_cdn: primary.to_string(),
            backup_cdn: backup.to_string(),
            created_at: Utc::now().fixed_offset(),
            deleted_at: None,
        }
    }

    fn domain(id: i64, service_id: i64, name: &str) -> service_domain::Model {
        service_domain::Model {
            id,
            service_id,
            name: name.to_string(),
        }
    }

    fn test_scheduler() -> Arc<Scheduler> {
        let recorder = Arc::new(InMemoryRecorder);
        Arc::new(
            Scheduler::new(
                DatabaseConnection::default(),
                recorder,
                ProbeConfig::default(),
            )
            .expect("scheduler"),
        )
    }

    struct InMemoryRecorder;

    #[async_trait::async_trait]
    impl MetricsRecorder for InMemoryRecorder {
        async fn record_probe(
            &self,
            _service_id: i64,
            _target: &str,
            _ok: bool,
            _latency: Duration,
        ) -> Result<(), super::super::MonitorError> {
            Ok(())
        }
    }

    #[test]
    fn expands_direct_primary_and_backup_targets() {
        let svc = service(1, "cdn-a.example.net", "cdn-b.example.net");
        let domains = vec![domain(10, 1, "app.example.com")];

        let targets = expand_targets(&svc, &domains, "/healthz");
        assert_eq!(targets.len(), 3);

        assert_eq!(targets[0].url, "https://app.example.com/healthz");
        assert_eq!(targets[0].host_header, None);
        assert_eq!(targets[0].metrics_key, "app.example.com");

        assert_eq!(targets[1].url, "https://cdn-a.example.net/healthz");
        assert_eq!(targets[1].host_header.as_deref(), Some("app.example.com"));
        assert_eq!(
            targets[1].metrics_key,
            "app.example.com@primary:cdn-a.example.net"
        );

        assert_eq!(targets[2].url, "https://cdn-b.example.net/healthz");
        assert_eq!(
            targets[2].metrics_key,
            "app.example.com@backup:cdn-b.example.net"
        );
    }

    #[test]
    fn skips_cdn_targets_when_fields_are_empty() {
        let svc = service(1, "", "");
        let domains = vec![domain(10, 1, "app.example.com")];

        let targets = expand_targets(&svc, &domains, "/");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].metrics_key, "app.example.com");
    }

    #[test]
    fn host_header_comparison_is_case_insensitive() {
        let svc = service(1, "APP.EXAMPLE.COM", "");
        let domains = vec![domain(10, 1, "app.example.com")];

        let targets = expand_targets(&svc, &domains, "/");
        // URL hosts are lowercased by the parser; no Host override needed.
        assert_eq!(targets[1].host_header, None);
    }

    #[test]
    fn target_key_is_service_domain_label() {
        let svc = service(7, "", "");
        let domains = vec![domain(42, 7, "app.example.com")];
        let targets = expand_targets(&svc, &domains, "/");
        assert_eq!(targets[0].key(), "7:42:app.example.com");
    }

    #[test]
    fn preserve_existing_loops_keeps_only_that_service() {
        let scheduler = test_scheduler();
        {
            let mut loops = scheduler.loops.lock().unwrap();
            loops.insert("1:10:a".to_string(), CancellationToken::new());
            loops.insert("1:11:b".to_string(), CancellationToken::new());
            loops.insert("2:10:other".to_string(), CancellationToken::new());
        }

        let mut active = HashSet::new();
        scheduler.preserve_existing_loops(&mut active, 1);

        assert_eq!(active.len(), 2);
        assert!(active.contains("1:10:a"));
        assert!(active.contains("1:11:b"));
        assert!(!active.contains("2:10:other"));
    }

    #[test]
    fn stop_missing_loops_cancels_undesired_keys() {
        let scheduler = test_scheduler();
        let keep = CancellationToken::new();
        let drop = CancellationToken::new();
        {
            let mut loops = scheduler.loops.lock().unwrap();
            loops.insert("1:10:a".to_string(), keep.clone());
            loops.insert("2:10:other".to_string(), drop.clone());
        }

        let mut active = HashSet::new();
        active.insert("1:10:a".to_string());
        scheduler.stop_missing_loops(&active);

        assert!(!keep.is_cancelled());
        assert!(drop.is_cancelled());
        assert_eq!(scheduler.loops.lock().unwrap().len(), 1);
    }

    #[test]
    fn cancel_all_loops_empties_the_map() {
        let scheduler = test_scheduler();
        let token = CancellationToken::new();
        scheduler
            .loops
            .lock()
            .unwrap()
            .insert("1:10:a".to_string(), token.clone());

        scheduler.cancel_all_loops();
        assert!(token.is_cancelled());
        assert!(scheduler.loops.lock().unwrap().is_empty());
    }

    #[test]
    fn probe_urls_normalize_scheme_and_path() {
        assert_eq!(
            build_probe_url("app.example.com", "/status").as_deref(),
            Some("https://app.example.com/status")
        );
        assert_eq!(
            build_probe_url("http://app.example.com", "/").as_deref(),
            Some("http://app.example.com/")
        );
        assert_eq!(build_probe_url("   ", "/"), None);
    }
}
