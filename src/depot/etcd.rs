//! etcd v3 keyspace, reached through the gRPC JSON gateway.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::kv::KvStore;
use crate::error::{CertDepotError, Result};

/// Keys of one prefix in an etcd cluster.
///
/// Requests are blocking and carry no timeout of their own.
#[derive(Debug, Clone)]
pub struct EtcdStore {
    client: Client,
    endpoint: String,
    prefix: String,
}

#[derive(Serialize)]
struct RangeRequest {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_end: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    keys_only: bool,
}

#[derive(Deserialize, Default)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Deserialize)]
struct KeyValue {
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Serialize)]
struct DeleteRangeRequest {
    key: String,
}

#[derive(Deserialize)]
struct DeleteRangeResponse {
    // int64 fields are strings in the gateway's JSON
    #[serde(default)]
    deleted: Option<String>,
}

#[derive(Serialize)]
struct Compare {
    key: String,
    result: &'static str,
    target: &'static str,
    create_revision: &'static str,
}

#[derive(Serialize)]
struct PutRequest {
    key: String,
    value: String,
}

#[derive(Serialize)]
struct RequestOp {
    request_put: PutRequest,
}

#[derive(Serialize)]
struct TxnRequest {
    compare: Vec<Compare>,
    success: Vec<RequestOp>,
}

#[derive(Deserialize)]
struct TxnResponse {
    #[serde(default)]
    succeeded: bool,
}

/// The key right after every key starting with `prefix`.
fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // all 0xff: the whole keyspace from prefix on
    vec![0]
}

impl EtcdStore {
    pub fn new(endpoint: &str, prefix: &str) -> Result<Self> {
        if endpoint.is_empty() {
            return Err(CertDepotError::InvalidConfig("empty etcd endpoint".to_string()));
        }
        Ok(Self {
            client: Client::builder().build()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            prefix: prefix.to_string(),
        })
    }

    fn encode_key(&self, key: &str) -> String {
        STANDARD.encode(format!("{}{key}", self.prefix))
    }

    fn call<B: Serialize, R: DeserializeOwned>(&self, method: &str, body: &B) -> Result<R> {
        let url = format!("{}/v3/kv/{method}", self.endpoint);
        let response = self.client.post(&url).json(body).send()?;
        if !response.status().is_success() {
            return Err(CertDepotError::Backend(format!(
                "{url} answered {}",
                response.status()
            )));
        }
        Ok(response.json()?)
    }

    /// Puts `value` only while `key` has never been created.
    fn create_request(&self, key: &str, value: &[u8]) -> TxnRequest {
        let encoded = self.encode_key(key);
        TxnRequest {
            compare: vec![Compare {
                key: encoded.clone(),
                result: "EQUAL",
                target: "CREATE",
                create_revision: "0",
            }],
            success: vec![RequestOp {
                request_put: PutRequest {
                    key: encoded,
                    value: STANDARD.encode(value),
                },
            }],
        }
    }

    fn decode(&self, field: &str) -> Result<Vec<u8>> {
        STANDARD
            .decode(field)
            .map_err(|e| CertDepotError::Backend(format!("malformed etcd payload: {e}")))
    }
}

impl KvStore for EtcdStore {
    fn create(&self, key: &str, value: &[u8]) -> Result<bool> {
        let response: TxnResponse = self.call("txn", &self.create_request(key, value))?;
        Ok(response.succeeded)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let request = RangeRequest {
            key: self.encode_key(key),
            range_end: None,
            keys_only: false,
        };
        let response: RangeResponse = self.call("range", &request)?;
        response
            .kvs
            .first()
            .map(|kv| self.decode(&kv.value))
            .transpose()
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let request = DeleteRangeRequest {
            key: self.encode_key(key),
        };
        let response: DeleteRangeResponse = self.call("deleterange", &request)?;
        Ok(response.deleted.is_some_and(|deleted| deleted != "0"))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let request = RangeRequest {
            key: STANDARD.encode(&self.prefix),
            range_end: Some(STANDARD.encode(prefix_range_end(self.prefix.as_bytes()))),
            keys_only: true,
        };
        let response: RangeResponse = self.call("range", &request)?;
        let mut keys = Vec::with_capacity(response.kvs.len());
        for kv in &response.kvs {
            let full = String::from_utf8(self.decode(&kv.key)?)
                .map_err(|e| CertDepotError::Backend(e.to_string()))?;
            if let Some(name) = full.strip_prefix(&self.prefix) {
                keys.push(name.to_string());
            }
        }
        Ok(keys)
    }
}
