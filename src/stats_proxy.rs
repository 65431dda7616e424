use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StatsProxyCfg;
use crate::error::ProxyError;

/// Body returned by the stats route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsPayload {
    pub stats: Value,
    pub collection: Value,
}

/// Client for the marketplace collection endpoints. Calls are issued one after
/// the other, never concurrently.
pub struct StatsClient {
    client: reqwest::Client,
    upstream: String,
    collection: String,
}

impl StatsClient {
    pub fn new(cfg: &StatsProxyCfg) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(ProxyError::Client)?;
        Ok(Self {
            client,
            upstream: cfg.upstream.trim_end_matches('/').to_string(),
            collection: cfg.collection.clone(),
        })
    }

    pub fn stats_url(&self) -> String {
        format!("{}/api/v1/collection/{}/stats", self.upstream, self.collection)
    }

    pub fn collection_url(&self) -> String {
        format!("{}/api/v1/collection/{}", self.upstream, self.collection)
    }

    /// Stats are required; collection metadata degrades to `{}`.
    pub async fn fetch(&self) -> Result<StatsPayload, ProxyError> {
        let resp = self.client.get(self.stats_url()).header(ACCEPT, "application/json").send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProxyError::Upstream { status, body });
        }
        let stats_body: Value = resp.json().await?;

        let collection = match self.fetch_collection().await {
            Ok(body) => field_or_empty(body, "collection"),
            Err(e) => {
                warn!("could not fetch collection data: {e}");
                empty_object()
            }
        };

        Ok(StatsPayload { stats: field_or_empty(stats_body, "stats"), collection })
    }

    async fn fetch_collection(&self) -> Result<Value, ProxyError> {
        let resp = self.client.get(self.collection_url()).header(ACCEPT, "application/json").send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProxyError::Upstream { status, body });
        }
        Ok(resp.json().await?)
    }
}

fn empty_object() -> Value { Value::Object(Map::new()) }

/// Takes `body[key]`, or `{}` when absent or null. A missing key usually means
/// the upstream schema moved, so it is logged.
fn field_or_empty(mut body: Value, key: &str) -> Value {
    match body.get_mut(key).map(Value::take) {
        Some(v) if !v.is_null() => v,
        _ => {
            warn!("upstream response has no `{key}` field");
            debug!("upstream body: {body}");
            empty_object()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn urls_follow_collection_slug() {
        let cfg = StatsProxyCfg { upstream: "http://example.test/".into(), ..StatsProxyCfg::default() };
        let client = StatsClient::new(&cfg).unwrap();
        assert_eq!(client.stats_url(), "http://example.test/api/v1/collection/otterful-otters/stats");
        assert_eq!(client.collection_url(), "http://example.test/api/v1/collection/otterful-otters");
    }

    #[test]
    fn missing_or_null_fields_become_empty_objects() {
        assert_eq!(field_or_empty(json!({"stats": {"floor_price": 1.5}}), "stats"), json!({"floor_price": 1.5}));
        assert_eq!(field_or_empty(json!({"stats": null}), "stats"), json!({}));
        assert_eq!(field_or_empty(json!({"other": 1}), "collection"), json!({}));
        assert_eq!(field_or_empty(json!([1, 2]), "stats"), json!({}));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_an_error() {
        let cfg = StatsProxyCfg { upstream: "http://127.0.0.1:1".into(), timeout_secs: 2, ..StatsProxyCfg::default() };
        let client = StatsClient::new(&cfg).unwrap();
        assert!(matches!(client.fetch().await, Err(ProxyError::Request(_))));
    }
}
