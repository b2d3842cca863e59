use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StrategyConfig;
use crate::network::query::ExploreRequest;
use crate::network::strategy::StrategyKind;

/// JSON-RPC 2.0 request
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<JsonRpcId>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 ID (string or number; absent for notifications)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    String(String),
    Number(i64),
}

impl From<JsonRpcId> for Value {
    fn from(id: JsonRpcId) -> Self {
        match id {
            JsonRpcId::String(s) => Value::String(s),
            JsonRpcId::Number(n) => Value::Number(n.into()),
        }
    }
}

/// JSON-RPC 2.0 response
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
}

impl JsonRpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            payload: JsonRpcResponsePayload::Result { result },
        }
    }

    pub fn error(id: Value, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            payload: JsonRpcResponsePayload::Error {
                error: JsonRpcError {
                    code,
                    message: message.into(),
                    data,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    Result { result: Value },
    Error { error: JsonRpcError },
}

/// JSON-RPC 2.0 error
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub methods: Vec<&'static str>,
}

/// `network/explore` parameters: an exploration request plus an optional
/// per-call deadline overriding the configured one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreParams {
    #[serde(flatten)]
    pub request: ExploreRequest,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Gexf,
    Json,
}

/// `network/export` parameters
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    #[serde(flatten)]
    pub explore: ExploreParams,
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub format: ExportFormat,
    pub node_count: usize,
    pub edge_count: usize,
    pub content: String,
}

/// Strategy settings on the wire. `strategy/get` fills every field;
/// `strategy/update` applies only the fields present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StrategySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branching_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Vec<StrategyKind>>,
}

impl StrategySettings {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite the fields present in `self`.
    pub fn apply_to(self, config: &mut StrategyConfig) {
        if let Some(v) = self.branching_factor {
            config.branching_factor = v;
        }
        if let Some(v) = self.small_threshold {
            config.small_threshold = v;
        }
        if let Some(v) = self.large_threshold {
            config.large_threshold = v;
        }
        if let Some(v) = self.min_workers {
            config.min_workers = v;
        }
        if let Some(v) = self.max_workers {
            config.max_workers = v;
        }
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
    }
}

impl From<&StrategyConfig> for StrategySettings {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            branching_factor: Some(config.branching_factor),
            small_threshold: Some(config.small_threshold),
            large_threshold: Some(config.large_threshold),
            min_workers: Some(config.min_workers),
            max_workers: Some(config.max_workers),
            enabled: Some(config.enabled.clone()),
        }
    }
}

/// JSON-RPC error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const ENTITY_NOT_FOUND: i32 = -32001;
    pub const DEADLINE_EXCEEDED: i32 = -32002;
    pub const CANCELLED: i32 = -32003;
}
