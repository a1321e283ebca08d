//! Cloudflare GraphQL analytics client.
//!
//! Queries `httpRequestsAdaptiveGroups` for per-host hourly byte counts.
//! The adaptive dataset emits hourly buckets, so only 1h windows are
//! supported.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{truncate_to_window, CdnError, UsageProvider, WindowedUsage};

const GRAPHQL_ENDPOINT: &str = "https://api.cloudflare.com/client/v4/graphql";

const USAGE_QUERY: &str = r#"query usage($accountTag: String, $from: Time!, $to: Time!, $hosts: [String!]) {
  viewer {
    accounts(filter: {accountTag: $accountTag}) {
      httpRequestsAdaptiveGroups(
        filter: {datetime_geq: $from, datetime_lt: $to, clientRequestHTTPHost_in: $hosts},
        limit: 10000,
        orderBy: [datetimeHour_ASC]) {
        dimensions { datetimeHour clientRequestHTTPHost }
        sum { bytes }
      }
    }
  }
}"#;

/// Usage provider backed by Cloudflare's GraphQL analytics API.
pub struct CloudflareClient {
    account_id: String,
    api_token: String,
    endpoint: String,
    http: reqwest::Client,
}

impl CloudflareClient {
    pub fn new(account_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            api_token: api_token.into(),
            endpoint: GRAPHQL_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Points the client at a different endpoint (tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Serialize)]
struct GqlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct AdaptiveResponse {
    #[serde(default)]
    data: Option<ResponseData>,
    #[serde(default)]
    errors: Vec<GqlError>,
}

#[derive(Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Deserialize)]
struct ResponseData {
    viewer: Viewer,
}

#[derive(Deserialize)]
struct Viewer {
    #[serde(default)]
    accounts: Vec<Account>,
}

#[derive(Deserialize)]
struct Account {
    #[serde(rename = "httpRequestsAdaptiveGroups", default)]
    groups: Vec<AdaptiveGroup>,
}

#[derive(Deserialize)]
struct AdaptiveGroup {
    dimensions: Dimensions,
    sum: Sum,
}

#[derive(Deserialize)]
struct Dimensions {
    #[serde(rename = "datetimeHour")]
    datetime_hour: DateTime<Utc>,
    #[serde(rename = "clientRequestHTTPHost")]
    client_request_http_host: String,
}

#[derive(Deserialize)]
struct Sum {
    bytes: i64,
}

#[async_trait]
impl UsageProvider for CloudflareClient {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    async fn usage(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        window: Duration,
        hosts: &[String],
    ) -> Result<Vec<WindowedUsage>, CdnError> {
        if window != Duration::from_secs(3600) {
            return Err(CdnError::UnsupportedWindow(window));
        }

        let payload = GqlRequest {
            query: USAGE_QUERY,
            variables: serde_json::json!({
                "accountTag": self.account_id,
                "from": start.to_rfc3339_opts(SecondsFormat::Secs, true),
                "to": end.to_rfc3339_opts(SecondsFormat::Secs, true),
                "hosts": hosts,
            }),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CdnError::Api(format!("cloudflare api status {status}")));
        }

        let decoded: AdaptiveResponse = response.json().await?;
        if let Some(error) = decoded.errors.first() {
            return Err(CdnError::Api(error.message.clone()));
        }

        let accounts = decoded.data.map(|d| d.viewer.accounts).unwrap_or_default();
        let Some(account) = accounts.into_iter().next() else {
            return Err(CdnError::AccountNotFound(self.account_id.clone()));
        };

        Ok(account
            .groups
            .into_iter()
            .map(|group| {
                let window_start = truncate_to_window(group.dimensions.datetime_hour, window);
                WindowedUsage {
                    host: group.dimensions.client_request_http_host,
                    window_start,
                    window_end: window_start + chrono::Duration::seconds(3600),
                    bytes: group.sum.bytes,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn parses_hourly_groups() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "viewer": { "accounts": [{
                    "httpRequestsAdaptiveGroups": [
                        {
                            "dimensions": {
                                "datetimeHour": "2025-05-10T08:00:00Z",
                                "clientRequestHTTPHost": "app.example.com"
                            },
                            "sum": { "bytes": 1024 }
                        },
                        {
                            "dimensions": {
                                "datetimeHour": "2025-05-10T09:00:00Z",
                                "clientRequestHTTPHost": "app.example.com"
                            },
                            "sum": { "bytes": 2048 }
                        }
                    ]
                }]}},
                "errors": []
            })))
            .mount(&server)
            .await;

        let client = CloudflareClient::new("acct", "token-1")
            .with_endpoint(format!("{}/graphql", server.uri()));
        let hosts = vec!["app.example.com".to_string()];
        let usage = client
            .usage(hour(6), hour(10), Duration::from_secs(3600), &hosts)
            .await
            .unwrap();

        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].host, "app.example.com");
        assert_eq!(usage[0].window_start, hour(8));
        assert_eq!(usage[0].window_end, hour(9));
        assert_eq!(usage[0].bytes, 1024);
        assert_eq!(usage[1].bytes, 2048);
    }

    #[tokio::test]
    async fn graphql_errors_are_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{ "message": "quota exceeded" }]
            })))
            .mount(&server)
            .await;

        let client = CloudflareClient::new("acct", "t").with_endpoint(server.uri());
        let err = client
            .usage(hour(6), hour(10), Duration::from_secs(3600), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CdnError::Api(msg) if msg == "quota exceeded"));
    }

    #[tokio::test]
    async fn unknown_account_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "viewer": { "accounts": [] } },
                "errors": []
            })))
            .mount(&server)
            .await;

        let client = CloudflareClient::new("missing", "t").with_endpoint(server.uri());
        let err = client
            .usage(hour(6), hour(10), Duration::from_secs(3600), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CdnError::AccountNotFound(acct) if acct == "missing"));
    }

    #[tokio::test]
    async fn rejects_non_hourly_windows() {
        let client = CloudflareClient::new("acct", "t");
        let err = client
            .usage(hour(6), hour(10), Duration::from_secs(600), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CdnError::UnsupportedWindow(_)));
    }

    #[tokio::test]
    async fn http_failures_are_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = CloudflareClient::new("acct", "t").with_endpoint(server.uri());
        let err = client
            .usage(hour(6), hour(10), Duration::from_secs(3600), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CdnError::Api(_)));
    }
}
