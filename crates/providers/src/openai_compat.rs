//! OpenAI-compatible streaming provider.
//!
//! Works with OpenRouter, OpenAI, and any endpoint exposing a streaming
//! `/chat/completions` route with function calling.

use std::collections::BTreeMap;

use async_trait::async_trait;
use deepsearch_config::ProviderConfig;
use deepsearch_core::error::ProviderError;
use deepsearch_core::message::{InvocationState, Message, Part, Role, ToolInvocation};
use deepsearch_core::provider::*;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    /// Build from the `[provider]` config section.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(format!("no API key for provider '{}'", config.name))
        })?;
        Ok(Self::new(&config.name, &config.base_url, api_key))
    }

    /// Convert our part-based messages to the OpenAI chat format.
    ///
    /// An assistant message holding tool invocations expands into one
    /// assistant turn per step, each followed by its `tool` results.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            match message.role {
                Role::User | Role::System => out.push(ApiMessage {
                    role: message.role.as_str().into(),
                    content: Some(message.text()),
                    tool_calls: None,
                    tool_call_id: None,
                }),
                Role::Assistant => expand_assistant(message, &mut out),
                // Without a matching call id the API rejects a `tool` turn,
                // so standalone tool output is passed along as user text.
                Role::Tool => {
                    let output = tool_output_text(message);
                    if !output.is_empty() {
                        out.push(ApiMessage {
                            role: "user".into(),
                            content: Some(format!("Tool output:\n{output}")),
                            tool_calls: None,
                            tool_call_id: None,
                        });
                    }
                }
            }
        }
        out
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

/// Pending assistant turn while expanding a multi-step message.
#[derive(Default)]
struct Turn<'a> {
    content: String,
    step: Option<u32>,
    invocations: Vec<&'a ToolInvocation>,
}

impl Turn<'_> {
    fn is_empty(&self) -> bool {
        self.content.is_empty() && self.invocations.is_empty()
    }

    fn flush(&mut self, out: &mut Vec<ApiMessage>) {
        if self.is_empty() {
            return;
        }
        let tool_calls: Vec<ApiToolCall> = self
            .invocations
            .iter()
            .map(|inv| ApiToolCall {
                id: inv.tool_call_id.clone(),
                r#type: "function".into(),
                function: ApiFunction {
                    name: inv.tool_name.clone(),
                    arguments: inv.args.to_string(),
                },
            })
            .collect();
        out.push(ApiMessage {
            role: "assistant".into(),
            content: (!self.content.is_empty()).then(|| std::mem::take(&mut self.content)),
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        });
        for inv in self.invocations.drain(..) {
            let result = inv.result.as_ref().map(|r| r.to_string()).unwrap_or_default();
            out.push(ApiMessage {
                role: "tool".into(),
                content: Some(result),
                tool_calls: None,
                tool_call_id: Some(inv.tool_call_id.clone()),
            });
        }
        self.content.clear();
        self.step = None;
    }
}

fn expand_assistant(message: &Message, out: &mut Vec<ApiMessage>) {
    let mut turn = Turn::default();
    for part in &message.parts {
        match part {
            Part::Text { text } => {
                if !turn.invocations.is_empty() {
                    turn.flush(out);
                }
                turn.content.push_str(text);
            }
            // Unanswered calls cannot be replayed to the model.
            Part::ToolInvocation(inv) if inv.state == InvocationState::Result => {
                if !turn.invocations.is_empty() && turn.step != inv.step {
                    turn.flush(out);
                }
                turn.step = inv.step;
                turn.invocations.push(inv);
            }
            Part::ToolInvocation(_) | Part::Unknown(_) => {}
        }
    }
    turn.flush(out);
}

/// Text and invocation results of a `tool` message, one per line.
fn tool_output_text(message: &Message) -> String {
    message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } if !text.trim().is_empty() => Some(text.clone()),
            Part::ToolInvocation(inv) => inv.result.as_ref().map(|r| r.to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn map_status(status: u16, body: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            retry_after_secs: 5,
        },
        401 | 403 => ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

#[async_trait]
impl deepsearch_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    async fn stream(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<ChunkReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let send = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            res = send => res.map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(map_status(status, error_body));
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();

            // Tool call deltas keyed by index
            let mut accumulators: BTreeMap<u32, ToolCallAccumulator> = BTreeMap::new();
            let mut usage = None;

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(provider = %provider_name, "Stream cancelled, closing connection");
                        return;
                    }
                    next = byte_stream.next() => next,
                };

                let bytes = match next {
                    Some(Ok(b)) => b,
                    Some(Err(e)) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                    None => break,
                };

                lines.extend(&bytes);

                while let Some(line) = lines.next_line() {
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let _ = tx.send(Ok(final_chunk(&accumulators, usage))).await;
                        return;
                    }

                    let stream_resp = match serde_json::from_str::<StreamResponse>(data) {
                        Ok(r) => r,
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                            continue;
                        }
                    };

                    if let Some(u) = stream_resp.usage {
                        usage = Some(Usage {
                            prompt_tokens: u.prompt_tokens,
                            completion_tokens: u.completion_tokens,
                            total_tokens: u.total_tokens,
                        });
                    }

                    let Some(choice) = stream_resp.choices.into_iter().next() else {
                        continue;
                    };

                    for tc_delta in choice.delta.tool_calls.unwrap_or_default() {
                        let acc = accumulators.entry(tc_delta.index).or_default();
                        if let Some(id) = tc_delta.id {
                            acc.id = id;
                        }
                        if let Some(func) = tc_delta.function {
                            if let Some(name) = func.name {
                                acc.name = name;
                            }
                            if let Some(args) = func.arguments {
                                acc.arguments.push_str(&args);
                            }
                        }
                    }

                    if let Some(content) = choice.delta.content.filter(|c| !c.is_empty())
                        && tx.send(Ok(StreamChunk::text(content))).await.is_err()
                    {
                        return; // receiver dropped
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(final_chunk(&accumulators, usage))).await;
        });

        Ok(rx)
    }
}

/// Splits a byte stream into lines.
///
/// Bytes are held until a newline arrives, so a multi-byte character split
/// across network chunks is decoded whole.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator.
    fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let line = String::from_utf8_lossy(&raw[..end]);
        Some(line.trim_end_matches('\r').to_string())
    }
}

fn final_chunk(accumulators: &BTreeMap<u32, ToolCallAccumulator>, usage: Option<Usage>) -> StreamChunk {
    StreamChunk {
        content: None,
        tool_calls: accumulators
            .iter()
            .map(|(index, acc)| acc.to_tool_call(*index))
            .collect(),
        done: true,
        usage,
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    /// Calls the endpoint left without an id are named after their index.
    fn to_tool_call(&self, index: u32) -> StreamToolCall {
        let id = if self.id.is_empty() {
            format!("call_{index}")
        } else {
            self.id.clone()
        };
        StreamToolCall {
            id,
            name: self.name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}
