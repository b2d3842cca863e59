use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{BionetError, Result};
use crate::export::write_gexf;
use crate::network::explorer::Explorer;
use crate::network::model::GraphDocument;
use crate::network::query::ExploreContext;
use crate::service::types::*;

const METHODS: &[&str] = &[
    "initialize",
    "network/explore",
    "network/export",
    "strategy/get",
    "strategy/update",
    "shutdown",
];

/// Newline-delimited JSON-RPC 2.0 server over an [`Explorer`].
pub struct NetworkServer {
    explorer: Explorer,
    shutdown: CancellationToken,
}

impl NetworkServer {
    pub fn new(explorer: Explorer, shutdown: CancellationToken) -> Self {
        Self { explorer, shutdown }
    }

    pub fn explorer(&self) -> &Explorer {
        &self.explorer
    }

    /// Handle one request. Notifications (no id) get no response.
    pub async fn process_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id: Value = match request.id {
            Some(id) => id.into(),
            None => {
                log::debug!("Ignoring notification {}", request.method);
                return None;
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                error_codes::INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
                None,
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(),
            "network/explore" => self.handle_explore(request.params).await,
            "network/export" => self.handle_export(request.params).await,
            "strategy/get" => self.handle_strategy_get(),
            "strategy/update" => self.handle_strategy_update(request.params),
            "shutdown" => {
                self.shutdown.cancel();
                Ok(Value::Null)
            }
            other => {
                return Some(JsonRpcResponse::error(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Unknown method: {}", other),
                    None,
                ))
            }
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::result(id, value),
            Err(e) => error_response(id, &request.method, e),
        })
    }

    /// Serve requests from `reader` until EOF, `shutdown`, or a write failure.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        loop {
            let line = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    let id = extract_id(trimmed).unwrap_or(Value::Null);
                    let response = JsonRpcResponse::error(
                        id,
                        error_codes::PARSE_ERROR,
                        format!("Parse error: {}", e),
                        None,
                    );
                    send_response(&mut writer, &response).await?;
                    continue;
                }
            };

            if let Some(response) = self.process_request(request).await {
                send_response(&mut writer, &response).await?;
            }
        }
        log::info!("Network server shutting down");
        Ok(())
    }

    /// Serve on stdin/stdout; logs go to stderr.
    pub async fn run(&self) -> Result<()> {
        log::info!("bionet server v{} listening on stdio", env!("CARGO_PKG_VERSION"));
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }

    fn handle_initialize(&self) -> Result<Value> {
        let info = ServerInfo {
            name: "bionet".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            methods: METHODS.to_vec(),
        };
        Ok(serde_json::to_value(info)?)
    }

    fn context(&self, timeout_ms: Option<u64>) -> ExploreContext {
        let token = self.shutdown.child_token();
        let timeout_ms = timeout_ms.unwrap_or(self.explorer.limits().query_timeout_ms);
        if timeout_ms == 0 {
            ExploreContext::with_token(token)
        } else {
            ExploreContext::with_token(token).timeout_after(Duration::from_millis(timeout_ms))
        }
    }

    async fn explore(&self, params: ExploreParams) -> Result<GraphDocument> {
        let ctx = self.context(params.timeout_ms);
        self.explorer.explore_with(&params.request, &ctx).await
    }

    async fn handle_explore(&self, params: Option<Value>) -> Result<Value> {
        let params: ExploreParams = parse_params(params, "network/explore")?;
        let doc = self.explore(params).await?;
        Ok(serde_json::to_value(&doc)?)
    }

    async fn handle_export(&self, params: Option<Value>) -> Result<Value> {
        let params: ExportParams = parse_params(params, "network/export")?;
        let format = params.format;
        let doc = self.explore(params.explore).await?;
        let content = match format {
            ExportFormat::Gexf => write_gexf(&doc)?,
            ExportFormat::Json => serde_json::to_string_pretty(&doc)?,
        };
        Ok(serde_json::to_value(ExportResult {
            format,
            node_count: doc.nodes.len(),
            edge_count: doc.edges.len(),
            content,
        })?)
    }

    fn handle_strategy_get(&self) -> Result<Value> {
        let snapshot = self.explorer.strategy_config().snapshot();
        Ok(serde_json::to_value(StrategySettings::from(snapshot.as_ref()))?)
    }

    fn handle_strategy_update(&self, params: Option<Value>) -> Result<Value> {
        let settings: StrategySettings = parse_params(params, "strategy/update")?;
        if settings.is_empty() {
            return Err(BionetError::InvalidInput(
                "strategy/update needs at least one field".to_string(),
            ));
        }
        let updated = self
            .explorer
            .strategy_config()
            .update_with(|config| settings.apply_to(config))?;
        Ok(serde_json::to_value(StrategySettings::from(updated.as_ref()))?)
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>, method: &str) -> Result<T> {
    let params = params.ok_or_else(|| BionetError::InvalidInput(format!("Missing params for {}", method)))?;
    serde_json::from_value(params)
        .map_err(|e| BionetError::InvalidInput(format!("Invalid {} params: {}", method, e)))
}

/// Map a library error onto a JSON-RPC error object.
fn error_response(id: Value, method: &str, err: BionetError) -> JsonRpcResponse {
    let code = match &err {
        BionetError::InvalidInput(_) | BionetError::Config(_) => error_codes::INVALID_PARAMS,
        BionetError::EntityNotFound(_) => error_codes::ENTITY_NOT_FOUND,
        BionetError::DeadlineExceeded(_) => error_codes::DEADLINE_EXCEEDED,
        BionetError::Cancelled => error_codes::CANCELLED,
        _ => error_codes::INTERNAL_ERROR,
    };
    if code == error_codes::INTERNAL_ERROR {
        log::error!("{} failed: {}", method, err);
    } else {
        log::debug!("{} rejected: {}", method, err);
    }
    let data = match &err {
        BionetError::EntityNotFound(person) => Some(serde_json::json!({ "personId": person })),
        _ => None,
    };
    JsonRpcResponse::error(id, code, err.to_string(), data)
}

/// Send JSON-RPC response (newline-delimited)
async fn send_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Best-effort id recovery from a line that failed to parse
fn extract_id(line: &str) -> Option<Value> {
    let id_start = line.find(r#""id":"#)?;
    let rest = line[id_start + 5..].trim_start();
    let end = rest.find([',', '}']).unwrap_or(rest.len());
    let raw = rest[..end].trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        Some(Value::String(raw[1..raw.len() - 1].to_string()))
    } else {
        raw.parse::<i64>().ok().map(|n| Value::Number(n.into()))
    }
}
