// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat completions provider
//!
//! Works against any endpoint speaking the `/chat/completions` dialect
//! (OpenAI, OpenRouter, Ollama, DeepSeek, ...). Streaming responses are
//! parsed from SSE `data:` lines; tool call argument fragments are assembled
//! here so the pipeline only ever sees complete tool calls.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ApiError, RelayError, Result};
use crate::llm::message::{Message, Role, ToolCall};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, EventStream, FinishReason, LlmProvider, StreamEvent,
    ToolDefinition, Usage,
};

/// Provider for OpenAI-compatible chat completion APIs
pub struct OpenAiCompatProvider {
    client: Client,
    name: String,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiCompatProvider {
    /// Create a provider; `base_url` is the API root (e.g. `https://api.openai.com/v1`)
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            name: name.into(),
            api_key,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Convert internal messages to the OpenAI wire format
    fn convert_messages(&self, messages: &[Message], system: Option<&str>) -> Vec<WireMessage> {
        let mut result = Vec::with_capacity(messages.len() + 1);

        if let Some(sys) = system {
            result.push(WireMessage {
                role: "system".to_string(),
                content: Some(sys.to_string()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for m in messages {
            let tool_calls = if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|call| WireToolCall {
                            id: call.id.clone(),
                            r#type: "function".to_string(),
                            function: WireFunctionCall {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect(),
                )
            };
            // Assistant messages that only carry tool calls send null content
            let content = if m.role == Role::Assistant && m.content.is_empty() && tool_calls.is_some()
            {
                None
            } else {
                Some(m.content.clone())
            };

            result.push(WireMessage {
                role: m.role.to_string(),
                content,
                tool_calls,
                tool_call_id: m.tool_call_id.clone(),
            });
        }

        result
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|t| WireTool {
                r#type: "function".to_string(),
                function: WireFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: serde_json::json!({
                        "type": t.input_schema.schema_type,
                        "properties": t.input_schema.properties,
                        "required": t.input_schema.required,
                    }),
                },
            })
            .collect()
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> WireRequest {
        WireRequest {
            model: request.model.clone(),
            messages: self.convert_messages(&request.messages, request.system.as_deref()),
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(self.convert_tools(&request.tools))
            },
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
            stream: Some(stream),
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, body: &WireRequest) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                RelayError::Api(ApiError::Timeout)
            } else if e.is_connect() {
                RelayError::Api(ApiError::Network(e.to_string()))
            } else {
                RelayError::Http(e)
            }
        })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                target: "chatrelay.provider",
                provider = %self.name,
                status,
                "provider returned error status"
            );
            return Err(parse_error(status, &body));
        }

        Ok(response)
    }
}

/// Parse an error response body into a typed error
pub(crate) fn parse_error(status: u16, body: &str) -> RelayError {
    let detail = serde_json::from_str::<WireError>(body).ok().map(|e| e.error);
    let code = detail
        .as_ref()
        .and_then(|d| d.code.as_ref())
        .map(|c| match c {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    let message = detail
        .map(|d| d.message)
        .unwrap_or_else(|| body.to_string());

    let error = match (status, code.as_str()) {
        (401, _) | (_, "invalid_api_key") | (_, "authentication_error") => {
            ApiError::AuthenticationFailed
        }
        (402, _) | (_, "insufficient_quota") => ApiError::PaymentRequired(message),
        (429, _) | (_, "rate_limit_exceeded") => ApiError::RateLimited(0),
        (404, _) | (_, "model_not_found") => ApiError::ModelNotFound(message),
        (408, _) | (504, _) => ApiError::Timeout,
        _ => ApiError::ServerError { status, message },
    };
    RelayError::Api(error)
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let body = self.build_request(&request, false);
        let response = self.send(&body).await?;

        let api_response: WireResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::InvalidResponse("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: parse_arguments(&tc.function.arguments),
            })
            .collect();

        Ok(CompletionResponse {
            id: api_response.id.unwrap_or_default(),
            model: api_response.model.unwrap_or(request.model),
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_provider)
                .unwrap_or(FinishReason::Stop),
            usage: api_response.usage.map(Usage::from).unwrap_or_default(),
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let body = self.build_request(&request, true);
        let response = self.send(&body).await?;

        tracing::debug!(
            target: "chatrelay.provider",
            provider = %self.name,
            model = %request.model,
            "stream opened"
        );

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut parser = SseParser::default();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for event in parser.push_bytes(&chunk) {
                            yield Ok(event);
                        }
                    }
                    Err(e) => {
                        yield Err(RelayError::Api(ApiError::StreamError(e.to_string())));
                        return;
                    }
                }
                if parser.is_done() {
                    return;
                }
            }
            for event in parser.finish() {
                yield Ok(event);
            }
        };

        Ok(Box::pin(stream))
    }
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Incremental SSE parser turning `data:` lines into stream events
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    /// Bytes of the current incomplete line; a multi-byte character may be
    /// split across network chunks
    buffer: Vec<u8>,
    started: bool,
    done: bool,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    tool_calls: BTreeMap<usize, PartialToolCall>,
}

impl SseParser {
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    #[cfg(test)]
    pub(crate) fn push(&mut self, text: &str) -> Vec<StreamEvent> {
        self.push_bytes(text.as_bytes())
    }

    /// Feed a network chunk; returns the events completed by it. Lines are
    /// decoded only once their newline has arrived.
    pub(crate) fn push_bytes(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw[..line_end]).trim().to_string();

            if self.done || line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
                continue;
            };
            if data == "[DONE]" {
                events.extend(self.finish());
                continue;
            }
            self.handle_data(data, &mut events);
        }

        events
    }

    /// Flush at end of stream
    pub(crate) fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done {
            return vec![];
        }
        self.done = true;
        let mut events = self.drain_tool_calls();
        match self.finish_reason {
            Some(reason) => events.push(StreamEvent::Finish {
                reason,
                usage: self.usage,
            }),
            None => events.push(StreamEvent::Error {
                error_type: "invalid_response".to_string(),
                message: "stream ended without a finish reason".to_string(),
            }),
        }
        events
    }

    fn handle_data(&mut self, data: &str, events: &mut Vec<StreamEvent>) {
        let chunk = match serde_json::from_str::<WireStreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(target: "chatrelay.provider", error = %e, "skipping unparseable chunk");
                return;
            }
        };

        if let Some(error) = chunk.error {
            self.done = true;
            let error_type = match error.code {
                Some(serde_json::Value::String(code)) => code,
                _ => "server_error".to_string(),
            };
            events.push(StreamEvent::Error {
                error_type,
                message: error.message,
            });
            return;
        }

        if !self.started {
            self.started = true;
            events.push(StreamEvent::MessageStart {
                id: chunk.id.clone().unwrap_or_default(),
                model: chunk.model.clone().unwrap_or_default(),
            });
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }

        for choice in chunk.choices {
            let delta = choice.delta;
            if let Some(reasoning) = delta.reasoning_content.or(delta.reasoning) {
                if !reasoning.is_empty() {
                    events.push(StreamEvent::ReasoningDelta(reasoning));
                }
            }
            if let Some(text) = delta.content {
                if !text.is_empty() {
                    events.push(StreamEvent::TextDelta(text));
                }
            }
            for tc in delta.tool_calls.unwrap_or_default() {
                let entry = self.tool_calls.entry(tc.index.unwrap_or(0)).or_default();
                if let Some(id) = tc.id {
                    entry.id = id;
                }
                if let Some(function) = tc.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(FinishReason::from_provider(&reason));
                events.extend(self.drain_tool_calls());
            }
        }
    }

    fn drain_tool_calls(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.tool_calls)
            .into_iter()
            .map(|(index, partial)| {
                let id = if partial.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    partial.id
                };
                StreamEvent::ToolCall(ToolCall {
                    id,
                    name: partial.name,
                    arguments: parse_arguments(&partial.arguments),
                })
            })
            .collect()
    }
}

// OpenAI wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default)]
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: Option<String>,
    model: Option<String>,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u
                .total_tokens
                .unwrap_or(u.prompt_tokens + u.completion_tokens),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
    code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    usage: Option<WireUsage>,
    error: Option<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Option<Vec<WireStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireStreamToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<WireStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct WireStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}
