//! Line-oriented command loop
//!
//! Reads one JSON command per line, runs it to completion and writes one
//! JSON result per line. Commands are handled strictly in order.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use crate::actions::{Action, Request};
use crate::handlers::Handlers;
use crate::protocol::{Command, ErrorType, Response};

/// Characters of the parameter preview logged in debug mode
const PARAMS_PREVIEW_CHARS: usize = 80;

/// What the loop does after a line
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Respond(Response),
    Exit,
}

fn preview(params: &Value) -> String {
    let text = params.to_string();
    match text.char_indices().nth(PARAMS_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text,
    }
}

pub struct Dispatcher {
    handlers: Arc<Handlers>,
    debug: bool,
}

impl Dispatcher {
    pub fn new(handlers: Handlers) -> Self {
        Self {
            handlers: Arc::new(handlers),
            debug: false,
        }
    }

    /// Log action names and a parameter preview for every command
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Handle one input line. Every line except `exit` gets a response,
    /// blank ones included.
    pub async fn dispatch_line(&self, line: &str) -> Flow {
        let line = line.trim();
        let started = Instant::now();
        let mut response = match self.decode(line) {
            Ok(Some(request)) => self.execute(request).await,
            Ok(None) => return Flow::Exit,
            Err(response) => response,
        };
        response.set_execution_time_ms(started.elapsed().as_millis() as u64);
        Flow::Respond(response)
    }

    /// Parse a line into a request. `Ok(None)` is the exit command.
    fn decode(&self, line: &str) -> Result<Option<Request>, Response> {
        let value: Value = serde_json::from_str(line).map_err(|e| {
            warn!("JSON decode error: {}", e);
            Response::error(ErrorType::JsonDecode, format!("Invalid JSON format: {}", e))
        })?;

        let command: Command = serde_json::from_value(value).map_err(|e| {
            warn!("Invalid command structure: {}", e);
            Response::error(ErrorType::Validation, format!("Invalid command structure: {}", e))
        })?;

        let Some(action) = Action::from_name(&command.action) else {
            warn!("Unknown action: {}", command.action);
            return Err(Response::error(
                ErrorType::UnknownAction,
                format!("Unknown action: {}", command.action),
            ));
        };

        if self.debug {
            debug!("Action: {} params: {}", action, preview(&command.params));
        }

        if action == Action::Exit {
            return Ok(None);
        }

        Request::parse(action, command.params).map(Some).map_err(|e| {
            warn!("Invalid parameters for {}: {}", action, e);
            Response::error(e.error_type(), e.to_string())
        })
    }

    /// Run the handler in its own task so a panic surfaces as a join error.
    async fn execute(&self, request: Request) -> Response {
        let action = request.action();
        let handlers = Arc::clone(&self.handlers);
        let task = tokio::spawn(async move { handlers.handle(request).await });

        match task.await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("{} failed ({}): {}", action, e.error_type().as_str(), e);
                Response::error(e.error_type(), e.to_string())
            }
            Err(e) => {
                error!("Handler for {} did not complete: {}", action, e);
                Response::error(ErrorType::Internal, "Unexpected error")
            }
        }
    }

    /// Serve commands from `reader` until end of input or `exit`.
    pub async fn run<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("Ready for commands");
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                debug!("End of input");
                break;
            }
            // invalid UTF-8 is replaced and then fails JSON decoding like any bad line
            let line = String::from_utf8_lossy(&buf);

            match self.dispatch_line(&line).await {
                Flow::Respond(response) => {
                    writer.write_all(response.to_line().as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await?;
                }
                Flow::Exit => {
                    info!("Exit requested");
                    break;
                }
            }
        }
        Ok(())
    }
}
