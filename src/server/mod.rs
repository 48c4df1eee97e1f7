//! Tool server: JSON-RPC 2.0 over stdio exposing `python_repl`.
//!
//! One request per line, one response line per request (notifications get
//! none). Requests are handled in order on a single executor, so a server
//! process is one cumulative session.
//!
//! Methods: `initialize`, `ping`, `tools/list`, `tools/call`, `notifications/*`.

use std::{io, time::Duration};

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::{
    execution::{ExecutionOutcome, Executor},
    functions::{parse_args, ToolDef},
};

/// Maximum request line size (10 MB).
const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

pub struct ToolServer {
    executor: Executor,
    tool: ToolDef,
    default_timeout: Option<Duration>,
}

impl ToolServer {
    pub fn new(executor: Executor, default_timeout: Option<Duration>) -> Self {
        Self {
            executor,
            tool: ToolDef::python_repl(),
            default_timeout,
        }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Serve until `reader` reaches EOF. Oversized or non-UTF-8 lines get an
    /// error response and the loop carries on with the next line.
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(tool = %self.tool.name, "tool server ready");
        while let Some(incoming) = read_line_limited(&mut reader).await? {
            let response = match incoming {
                Incoming::Oversized => {
                    warn!("request line over the size limit skipped");
                    Some(error_response(
                        Value::Null,
                        INVALID_REQUEST,
                        "Request exceeds 10MB size limit".into(),
                    ))
                }
                Incoming::InvalidUtf8 => Some(error_response(
                    Value::Null,
                    INVALID_REQUEST,
                    "Invalid UTF-8".into(),
                )),
                Incoming::Line(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(line) {
                        Ok(request) => self.handle(request).await,
                        Err(e) => Some(error_response(Value::Null, PARSE_ERROR, format!("Parse error: {}", e))),
                    }
                }
            };

            if let Some(response) = response {
                writer.write_all(response.to_string().as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        info!("stdin closed; tool server exiting");
        Ok(())
    }

    /// Handle one decoded message. `None` for notifications.
    pub async fn handle(&mut self, request: Value) -> Option<Value> {
        let id = request.get("id").cloned();
        let method = request
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));
        debug!(%method, "request");

        if method.starts_with("notifications/") {
            return None;
        }
        let id = id.unwrap_or(Value::Null);

        let result = match method.as_str() {
            "initialize" => Ok(self.initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": [self.tool.descriptor()] })),
            "tools/call" => self.call_tool(&params).await,
            "" => Err((INVALID_REQUEST, "Missing method".to_string())),
            other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
        };

        Some(match result {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err((code, message)) => error_response(id, code, message),
        })
    }

    fn initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    async fn call_tool(&mut self, params: &Value) -> std::result::Result<Value, (i64, String)> {
        let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
        if name != self.tool.name {
            return Err((INVALID_PARAMS, format!("Unknown tool: {}", name)));
        }
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        let request = parse_args(&args, self.default_timeout).map_err(|e| (INVALID_PARAMS, format!("{:#}", e)))?;

        match self.executor.execute(&request).await {
            Ok(outcome) => {
                let is_error = !outcome.is_output();
                if let ExecutionOutcome::Fault(fault) = &outcome {
                    debug!(kind = %fault.kind, "tool call faulted");
                }
                Ok(json!({
                    "content": [{ "type": "text", "text": outcome.into_text() }],
                    "isError": is_error,
                }))
            }
            Err(e) => {
                warn!(error = %e, "tool call could not start a worker");
                Err((INTERNAL_ERROR, e.to_string()))
            }
        }
    }
}

enum Incoming {
    Line(String),
    Oversized,
    InvalidUtf8,
}

/// Read one line of at most [`MAX_REQUEST_SIZE`] bytes. The rest of an
/// oversized line is discarded without buffering it. `None` at EOF.
async fn read_line_limited<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<Incoming>> {
    let mut buf = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if buf.is_empty() { None } else { Some(decode_line(buf)) });
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if buf.len() + pos > MAX_REQUEST_SIZE {
                    reader.consume(pos + 1);
                    return Ok(Some(Incoming::Oversized));
                }
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                return Ok(Some(decode_line(buf)));
            }
            None => {
                let len = available.len();
                if buf.len() + len > MAX_REQUEST_SIZE {
                    reader.consume(len);
                    skip_until_newline(reader).await?;
                    return Ok(Some(Incoming::Oversized));
                }
                buf.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

async fn skip_until_newline<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<()> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        if let Some(pos) = available.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = available.len();
        reader.consume(len);
    }
}

fn decode_line(mut buf: Vec<u8>) -> Incoming {
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    match String::from_utf8(buf) {
        Ok(line) => Incoming::Line(line),
        Err(_) => Incoming::InvalidUtf8,
    }
}

fn error_response(id: Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

/// Run the tool server on this process's stdin/stdout.
pub async fn serve_stdio(executor: Executor, default_timeout: Option<Duration>) -> Result<()> {
    let mut server = ToolServer::new(executor, default_timeout);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    server.serve(stdin, tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Interpreter;

    fn server() -> ToolServer {
        let executor = Executor::new(Interpreter::new("/nonexistent/python-for-tests"));
        ToolServer::new(executor, None)
    }

    #[tokio::test]
    async fn test_initialize() {
        let resp = server()
            .handle(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .await
            .unwrap();
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_notification_has_no_response() {
        let resp = server()
            .handle(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let resp = server()
            .handle(json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"}))
            .await
            .unwrap();
        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "python_repl");
    }

    #[tokio::test]
    async fn test_unknown_method_and_tool() {
        let mut s = server();
        let resp = s
            .handle(json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"}))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);

        let resp = s
            .handle(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "add", "arguments": {}}}))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_rpc_error() {
        let resp = server()
            .handle(json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "python_repl", "arguments": {"command": "print(1)", "timeout": 1}}
            }))
            .await
            .unwrap();
        assert_eq!(resp["error"]["code"], INTERNAL_ERROR);
        assert!(resp.get("result").is_none());
    }

    #[tokio::test]
    async fn test_serve_lines() {
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\nnot json\n{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n";
        let mut out: Vec<u8> = Vec::new();
        server().serve(&input[..], &mut out).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"], json!({}));
        assert_eq!(lines[1]["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_stop_server() {
        let input = b"\xff\xfe\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n";
        let mut out: Vec<u8> = Vec::new();
        server().serve(&input[..], &mut out).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["error"]["code"], INVALID_REQUEST);
        assert_eq!(lines[1]["id"], 1);
        assert_eq!(lines[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let mut input = vec![b'x'; MAX_REQUEST_SIZE + 16];
        input.extend_from_slice(b"\n{\"jsonrpc\":\"2.0\",\"id\":7,\"method\":\"ping\"}\n");
        let mut reader = tokio::io::BufReader::with_capacity(4096, &input[..]);

        let first = read_line_limited(&mut reader).await.unwrap();
        assert!(matches!(first, Some(Incoming::Oversized)));
        match read_line_limited(&mut reader).await.unwrap() {
            Some(Incoming::Line(line)) => assert!(line.contains("\"id\":7")),
            _ => panic!("expected the next request line"),
        }
        assert!(read_line_limited(&mut reader).await.unwrap().is_none());

        let mut out: Vec<u8> = Vec::new();
        server().serve(&input[..], &mut out).await.unwrap();
        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["error"]["code"], INVALID_REQUEST);
        assert_eq!(lines[1]["id"], 7);
    }

    #[tokio::test]
    async fn test_final_line_without_newline() {
        let mut reader = &b"{\"id\":1}\r"[..];
        match read_line_limited(&mut reader).await.unwrap() {
            Some(Incoming::Line(line)) => assert_eq!(line, "{\"id\":1}"),
            _ => panic!("expected a line"),
        }
    }
}
