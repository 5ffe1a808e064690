//! etcd v2 keys API backend
//!
//! Talks to `<endpoint>/v2/keys/...` over HTTP. CAS guards map onto the
//! `prevValue` / `prevExist` form fields; etcd error codes map onto the
//! store error variants.

use super::{normalize_key, CoordinationStore, GetOptions, SetOptions, StoreNode};
use crate::common::utils::{encode_form_value, encode_key_path};
use crate::common::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const ERR_KEY_NOT_FOUND: u64 = 100;
const ERR_TEST_FAILED: u64 = 101;
const ERR_NODE_EXIST: u64 = 105;

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: EtcdNode,
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
}

impl From<EtcdNode> for StoreNode {
    fn from(n: EtcdNode) -> Self {
        StoreNode {
            key: n.key.unwrap_or_else(|| "/".to_string()),
            value: n.value,
            dir: n.dir,
            nodes: n.nodes.into_iter().map(StoreNode::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EtcdError {
    #[serde(rename = "errorCode")]
    error_code: u64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    cause: Option<String>,
}

/// etcd v2 store
pub struct EtcdStore {
    endpoint: String,
    client: reqwest::Client,
}

impl EtcdStore {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/v2/keys{}", self.endpoint, encode_key_path(key))
    }

    async fn check(&self, key: &str, response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }
        Err(map_error(key, status.as_u16(), &body))
    }
}

/// Translate an etcd error body into a store error
fn map_error(key: &str, status: u16, body: &str) -> Error {
    match serde_json::from_str::<EtcdError>(body) {
        Ok(e) => match e.error_code {
            ERR_KEY_NOT_FOUND => Error::KeyNotFound(key.to_string()),
            ERR_TEST_FAILED => Error::CompareFailed(key.to_string()),
            ERR_NODE_EXIST => Error::KeyExists(key.to_string()),
            code => Error::Store(format!(
                "etcd error {} on {}: {} ({})",
                code,
                key,
                e.message,
                e.cause.unwrap_or_default()
            )),
        },
        Err(_) => Error::Store(format!("etcd returned {} for {}: {}", status, key, body)),
    }
}

/// Build the `application/x-www-form-urlencoded` body for a set
fn set_form(value: &str, opts: &SetOptions) -> String {
    let mut fields = vec![format!("value={}", encode_form_value(value))];
    if let Some(prev) = &opts.prev_value {
        fields.push(format!("prevValue={}", encode_form_value(prev)));
    }
    if let Some(exist) = opts.prev_exist {
        fields.push(format!("prevExist={}", exist));
    }
    if let Some(ttl) = opts.ttl {
        fields.push(format!("ttl={}", ttl.as_secs().max(1)));
    }
    fields.join("&")
}

#[async_trait]
impl CoordinationStore for EtcdStore {
    async fn get(&self, key: &str, opts: GetOptions) -> Result<StoreNode> {
        let key = normalize_key(key);
        let url = format!(
            "{}?recursive={}&sorted={}",
            self.url(&key),
            opts.recursive,
            opts.sorted
        );
        tracing::debug!("etcd GET {}", url);

        let response = self.client.get(&url).send().await?;
        let body = self.check(&key, response).await?;
        let parsed: EtcdResponse = serde_json::from_str(&body)?;
        Ok(parsed.node.into())
    }

    async fn set(&self, key: &str, value: &str, opts: SetOptions) -> Result<()> {
        let key = normalize_key(key);
        tracing::debug!("etcd PUT {}", key);

        let response = self
            .client
            .put(self.url(&key))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(set_form(value, &opts))
            .send()
            .await?;
        self.check(&key, response).await?;
        Ok(())
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<()> {
        let key = normalize_key(key);
        let url = format!("{}?recursive={}", self.url(&key), recursive);
        tracing::debug!("etcd DELETE {}", url);

        let response = self.client.delete(&url).send().await?;
        self.check(&key, response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_error_codes() {
        let not_found = r#"{"errorCode":100,"message":"Key not found","cause":"/service/x","index":7}"#;
        assert!(matches!(
            map_error("/service/x", 404, not_found),
            Error::KeyNotFound(_)
        ));

        let cas = r#"{"errorCode":101,"message":"Compare failed","cause":"[30000 != 30001]","index":9}"#;
        assert!(matches!(
            map_error("/routing/nextport", 412, cas),
            Error::CompareFailed(_)
        ));

        let exists = r#"{"errorCode":105,"message":"Key already exists","cause":"/routing/nextport","index":3}"#;
        assert!(matches!(
            map_error("/routing/nextport", 412, exists),
            Error::KeyExists(_)
        ));

        assert!(matches!(
            map_error("/k", 502, "<html>bad gateway</html>"),
            Error::Store(_)
        ));
    }

    #[test]
    fn test_set_form() {
        let form = set_form("30001", &SetOptions::swap("30000"));
        assert_eq!(form, "value=30001&prevValue=30000");

        let form = set_form("30000", &SetOptions::create_only());
        assert_eq!(form, "value=30000&prevExist=false");
    }

    #[test]
    fn test_parse_directory_response() {
        let body = r#"{
            "action": "get",
            "node": {
                "key": "/service",
                "dir": true,
                "nodes": [
                    {"key": "/service/a", "dir": true, "nodes": [
                        {"key": "/service/a/state", "value": "{}", "modifiedIndex": 4}
                    ]}
                ]
            }
        }"#;
        let parsed: EtcdResponse = serde_json::from_str(body).unwrap();
        let node: StoreNode = parsed.node.into();
        assert!(node.dir);
        let a = node.child("a").unwrap();
        assert_eq!(a.child("state").unwrap().value.as_deref(), Some("{}"));
    }

    #[test]
    fn test_url_encoding() {
        let store = EtcdStore::new("http://127.0.0.1:4001/").unwrap();
        assert_eq!(
            store.url("/service/a b/state"),
            "http://127.0.0.1:4001/v2/keys/service/a%20b/state"
        );
    }
}
