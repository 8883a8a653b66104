// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM Provider trait and related types
//!
//! Defines the abstraction the pipeline streams through. Every component
//! above this layer depends only on [`LlmProvider`], never on a concrete
//! backend.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::{Message, ToolCall};

/// Boxed, cancellable stream of provider events. Dropping it cancels the call.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Main trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "OpenAI", "OpenRouter")
    fn name(&self) -> &str;

    /// Non-streaming completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Streaming completion
    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream>;
}

/// Request for completion
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model to use
    pub model: String,

    /// Messages in the conversation
    pub messages: Vec<Message>,

    /// System prompt
    pub system: Option<String>,

    /// Maximum tokens in response
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Tools available for the model to use; the model decides whether to
    /// call them
    pub tools: Vec<ToolDefinition>,
}

/// Response from a non-streaming completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Response ID
    pub id: String,

    /// Model used
    pub model: String,

    /// Generated text
    pub text: String,

    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,

    /// Why generation stopped
    pub finish_reason: FinishReason,

    /// Token usage
    pub usage: Usage,
}

/// Why the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// Natural end of message
    Stop,
    /// Hit max tokens
    Length,
    /// Wants to use a tool
    ToolCalls,
    /// Provider reported a failure
    Error,
}

impl FinishReason {
    /// Parse an OpenAI-style `finish_reason` value.
    pub fn from_provider(value: &str) -> Self {
        match value {
            "length" | "max_tokens" => FinishReason::Length,
            "tool_calls" | "function_call" | "tool_use" | "tool-calls" => FinishReason::ToolCalls,
            "error" => FinishReason::Error,
            _ => FinishReason::Stop,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool-calls",
            FinishReason::Error => "error",
        }
    }
}

/// Token usage statistics, opaque counters reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Events from a streaming response
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Start of message
    MessageStart { id: String, model: String },

    /// Visible text
    TextDelta(String),

    /// Model reasoning, kept apart from visible text
    ReasoningDelta(String),

    /// A fully assembled tool call
    ToolCall(ToolCall),

    /// End of the call
    Finish {
        reason: FinishReason,
        usage: Option<Usage>,
    },

    /// Ping (keep-alive)
    Ping,

    /// Error
    Error { error_type: String, message: String },
}

/// Tool definition for the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Input schema (JSON Schema)
    pub input_schema: ToolInputSchema,
}

/// Input schema for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    /// Schema type (always "object")
    #[serde(rename = "type")]
    pub schema_type: String,

    /// Property definitions
    pub properties: serde_json::Value,

    /// Required properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl ToolInputSchema {
    pub fn object(properties: serde_json::Value, required: Vec<String>) -> Self {
        Self {
            schema_type: "object".to_string(),
            properties,
            required,
        }
    }
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            system: None,
            max_tokens: 8000,
            temperature: 0.0,
            tools: vec![],
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set tools
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}
