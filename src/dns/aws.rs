//! AWS SDK adapter for the Route53 provider contract.
//!
//! Pure translation layer: SDK types in and out, no routing logic. The
//! interesting behavior (zone matching, pagination, retries) lives in
//! [`super::route53`] where it can be tested against a mock.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_route53::config::Credentials;
use aws_sdk_route53::types::{
    AliasTarget, Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use aws_sdk_route53::Client;

use super::route53::{
    AliasEndpoint, HostedZoneSummary, RecordCursor, RecordSet, RecordSetPage, Route53Api,
    Route53ProviderConfig,
};
use super::DnsError;

/// Real Route53 client wired from provider configuration.
pub struct SdkRoute53Api {
    client: Client,
}

impl SdkRoute53Api {
    /// Builds the SDK client; static credentials are used when provided,
    /// otherwise the default AWS credential chain applies.
    pub async fn connect(cfg: &Route53ProviderConfig) -> Result<Self, DnsError> {
        if cfg.region.is_empty() {
            return Err(DnsError::Api("route53 region is required".to_string()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()));
        if !cfg.access_key_id.is_empty() && !cfg.secret_access_key.is_empty() {
            let session_token = if cfg.session_token.is_empty() {
                None
            } else {
                Some(cfg.session_token.clone())
            };
            loader = loader.credentials_provider(Credentials::new(
                cfg.access_key_id.clone(),
                cfg.secret_access_key.clone(),
                session_token,
                None,
                "static",
            ));
        }

        let sdk_config = loader.load().await;
        Ok(Self {
            client: Client::new(&sdk_config),
        })
    }
}

#[async_trait]
impl Route53Api for SdkRoute53Api {
    async fn hosted_zones_by_name(
        &self,
        dns_name: &str,
    ) -> Result<Vec<HostedZoneSummary>, DnsError> {
        let output = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(dns_name)
            .send()
            .await
            .map_err(api_err)?;

        Ok(output
            .hosted_zones()
            .iter()
            .map(|zone| HostedZoneSummary {
                id: zone.id().to_string(),
                name: zone.name().to_string(),
            })
            .collect())
    }

    async fn list_record_sets(
        &self,
        zone_id: &str,
        start: Option<RecordCursor>,
    ) -> Result<RecordSetPage, DnsError> {
        let mut request = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(zone_id);
        if let Some(cursor) = start {
            if let Some(name) = cursor.record_name {
                request = request.start_record_name(name);
            }
            if let Some(record_type) = cursor.record_type {
                request = request.start_record_type(RrType::from(record_type.as_str()));
            }
            if let Some(identifier) = cursor.record_identifier {
                request = request.start_record_identifier(identifier);
            }
        }

        let output = request.send().await.map_err(api_err)?;

        let records = output
            .resource_record_sets()
            .iter()
            .map(from_sdk_record)
            .collect();
        let next = if output.is_truncated() {
            Some(RecordCursor {
                record_name: output.next_record_name().map(str::to_string),
                record_type: output.next_record_type().map(|t| t.as_str().to_string()),
                record_identifier: output.next_record_identifier().map(str::to_string),
            })
        } else {
            None
        };

        Ok(RecordSetPage { records, next })
    }

    async fn change_record_sets(
        &self,
        zone_id: &str,
        comment: &str,
        changes: Vec<RecordSet>,
    ) -> Result<(), DnsError> {
        let mut sdk_changes = Vec::with_capacity(changes.len());
        for record in &changes {
            let change = Change::builder()
                .action(ChangeAction::Upsert)
                .resource_record_set(to_sdk_record(record)?)
                .build()
                .map_err(api_err)?;
            sdk_changes.push(change);
        }

        let batch = ChangeBatch::builder()
            .comment(comment)
            .set_changes(Some(sdk_changes))
            .build()
            .map_err(api_err)?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(api_err)?;
        Ok(())
    }
}

fn from_sdk_record(record: &ResourceRecordSet) -> RecordSet {
    RecordSet {
        name: record.name().to_string(),
        record_type: record.r#type().as_str().to_string(),
        set_identifier: record.set_identifier().map(str::to_string),
        weight: record.weight(),
        ttl: record.ttl(),
        values: record
            .resource_records()
            .iter()
            .map(|r| r.value().to_string())
            .collect(),
        alias: record.alias_target().map(|alias| AliasEndpoint {
            zone_id: alias.hosted_zone_id().to_string(),
            dns_name: alias.dns_name().to_string(),
            evaluate_target_health: alias.evaluate_target_health(),
        }),
        health_check_id: record.health_check_id().map(str::to_string),
    }
}

fn to_sdk_record(record: &RecordSet) -> Result<ResourceRecordSet, DnsError> {
    let mut builder = ResourceRecordSet::builder()
        .name(&record.name)
        .r#type(RrType::from(record.record_type.as_str()))
        .set_set_identifier(record.set_identifier.clone())
        .set_weight(record.weight)
        .set_ttl(record.ttl)
        .set_health_check_id(record.health_check_id.clone());

    if !record.values.is_empty() {
        let mut values = Vec::with_capacity(record.values.len());
        for value in &record.values {
            values.push(ResourceRecord::builder().value(value).build().map_err(api_err)?);
        }
        builder = builder.set_resource_records(Some(values));
    }

    if let Some(alias) = &record.alias {
        let target = AliasTarget::builder()
            .hosted_zone_id(&alias.zone_id)
            .dns_name(&alias.dns_name)
            .evaluate_target_health(alias.evaluate_target_health)
            .build()
            .map_err(api_err)?;
        builder = builder.alias_target(target);
    }

    builder.build().map_err(api_err)
}

fn api_err<E: std::fmt::Debug>(err: E) -> DnsError {
    DnsError::Api(format!("{err:?}"))
}
