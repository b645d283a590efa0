//! Low-level JSON-RPC client for LSP communication.
//!
//! Spawns rust-analyzer, sends/receives LSP messages over stdin/stdout,
//! and manages the LSP wire protocol (Content-Length headers, JSON-RPC
//! envelopes).

use crate::error::{LibrarianError, Result};
use crate::extractor::protocol::{InitializeParams, InitializeResult, JsonRpcMessage};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::debug;

/// Low-level LSP client using JSON-RPC over stdin/stdout.
pub struct LspClient {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl LspClient {
    /// Spawns rust-analyzer for a project.
    pub fn spawn(project_root: &Path) -> Result<Self> {
        let mut child = Command::new("rust-analyzer")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .current_dir(project_root)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    LibrarianError::RustAnalyzerNotFound
                } else {
                    LibrarianError::RustAnalyzerStartFailed(e.to_string())
                }
            })?;

        let stdin = BufWriter::new(child.stdin.take().ok_or_else(|| {
            LibrarianError::RustAnalyzerStartFailed("stdin not captured".into())
        })?);

        let stdout = BufReader::new(child.stdout.take().ok_or_else(|| {
            LibrarianError::RustAnalyzerStartFailed("stdout not captured".into())
        })?);

        Ok(Self {
            child,
            stdin,
            stdout,
            next_id: 1,
        })
    }

    /// Sends `initialize` and waits for the response.
    pub fn initialize(&mut self, params: InitializeParams) -> Result<InitializeResult> {
        self.request("initialize", params)
    }

    /// Sends the `initialized` notification.
    pub fn initialized(&mut self) -> Result<()> {
        self.notify("initialized", serde_json::json!({}))
    }

    /// Sends `shutdown` then `exit`, and waits for the process to exit.
    pub fn shutdown(mut self) -> Result<()> {
        let _: Value = self.request("shutdown", serde_json::json!(null))?;
        self.notify("exit", serde_json::json!(null))?;
        let _ = self.child.wait();
        Ok(())
    }

    /// Sends a request and waits for the matching response, skipping over
    /// any notifications or responses to other in-flight requests.
    pub fn request<P: Serialize, R: DeserializeOwned>(&mut self, method: &str, params: P) -> Result<R> {
        let id = self.next_id;
        self.next_id += 1;

        let params_value = serde_json::to_value(params)
            .map_err(|e| LibrarianError::Serialization(e.to_string()))?;
        let request = JsonRpcMessage::request(id, method, params_value);
        self.send_message(&request)?;

        loop {
            let response = self.read_message()?;

            if response.is_response() && response.get_id_u64() == Some(id) {
                if let Some(error) = response.error {
                    return Err(LibrarianError::LspProtocolError(format!(
                        "{} (code {})",
                        error.message, error.code
                    )));
                }

                let result = if let Some(result) = response.result {
                    result
                } else {
                    if method != "shutdown" {
                        debug!(method, id, "LSP response missing result field, treating as null");
                    }
                    Value::Null
                };

                return serde_json::from_value(result)
                    .map_err(|e| LibrarianError::Deserialization(e.to_string()));
            }
        }
    }

    /// Sends a notification (no response expected).
    pub fn notify<P: Serialize>(&mut self, method: &str, params: P) -> Result<()> {
        let params_value = serde_json::to_value(params)
            .map_err(|e| LibrarianError::Serialization(e.to_string()))?;
        let notification = JsonRpcMessage::notification(method, params_value);
        self.send_message(&notification)
    }

    /// Reads messages until the named notification arrives, or the
    /// timeout elapses.
    pub fn wait_for_notification(&mut self, expected_method: &str, timeout_ms: u64) -> Result<Value> {
        use std::time::{Duration, Instant};

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        loop {
            if start.elapsed() > timeout {
                return Err(LibrarianError::LspTimeout {
                    method: expected_method.to_string(),
                    timeout_ms,
                });
            }

            let message = self.read_message()?;

            if message.is_notification() {
                if let Some(method) = &message.method {
                    if method == expected_method {
                        return Ok(message.params.unwrap_or(Value::Null));
                    }
                }
            }
        }
    }

    fn send_message(&mut self, message: &JsonRpcMessage) -> Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| LibrarianError::Serialization(e.to_string()))?;
        write!(self.stdin, "Content-Length: {}\r\n\r\n", json.len())?;
        self.stdin.write_all(json.as_bytes())?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read_message(&mut self) -> Result<JsonRpcMessage> {
        let mut content_length: Option<usize> = None;

        loop {
            let mut line = String::new();
            self.stdout.read_line(&mut line)?;
            let line = line.trim();

            if line.is_empty() {
                break;
            }

            if let Some(len_str) = line.strip_prefix("Content-Length: ") {
                content_length = Some(
                    len_str
                        .parse()
                        .map_err(|_| LibrarianError::LspProtocolError("invalid Content-Length".into()))?,
                );
            }
        }

        let content_length = content_length
            .ok_or_else(|| LibrarianError::LspProtocolError("missing Content-Length header".into()))?;

        let mut content = vec![0u8; content_length];
        self.stdout.read_exact(&mut content)?;

        serde_json::from_slice(&content).map_err(|e| LibrarianError::Deserialization(e.to_string()))
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}
