// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Provides a scripted implementation of the LlmProvider trait. Each call
//! (streaming or not) consumes the next [`MockResponse`]; once the script
//! runs out the last entry repeats, which makes "always truncated" providers
//! a one-liner.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{ApiError, Result};
use crate::llm::message::ToolCall;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, EventStream, FinishReason, LlmProvider, StreamEvent,
    Usage,
};

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Configured responses
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// Failure raised when the call is issued, before any event is produced
#[derive(Clone, Debug, PartialEq)]
pub enum MockFailure {
    Authentication,
    PaymentRequired,
    RateLimited,
    Network(String),
}

impl MockFailure {
    fn into_error(self) -> ApiError {
        match self {
            MockFailure::Authentication => ApiError::AuthenticationFailed,
            MockFailure::PaymentRequired => {
                ApiError::PaymentRequired("insufficient credit".to_string())
            }
            MockFailure::RateLimited => ApiError::RateLimited(1),
            MockFailure::Network(message) => ApiError::Network(message),
        }
    }
}

/// A pre-configured response for the mock provider
#[derive(Clone, Debug)]
pub struct MockResponse {
    /// Reasoning deltas, streamed before any text
    pub reasoning: Vec<String>,
    /// Text deltas
    pub chunks: Vec<String>,
    /// Tool calls, streamed after the text
    pub tool_calls: Vec<ToolCall>,
    /// Finish reason
    pub finish_reason: FinishReason,
    /// Token usage reported with the finish event
    pub usage: Option<Usage>,
    /// In-stream error event sent instead of the finish event
    pub stream_error: Option<(String, String)>,
    /// Error returned when the call is issued
    pub failure: Option<MockFailure>,
    /// Hang forever after the deltas instead of finishing
    pub stall: bool,
    /// Never answer the call at all
    pub hang: bool,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            reasoning: vec![],
            chunks: vec!["Mock response".to_string()],
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            usage: Some(Usage::new(10, 20)),
            stream_error: None,
            failure: None,
            stall: false,
            hang: false,
        }
    }
}

impl MockResponse {
    /// A response streaming `text` as a single delta
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            chunks: vec![text.into()],
            ..Default::default()
        }
    }

    /// A response streaming the given deltas in order
    pub fn chunks(chunks: Vec<&str>) -> Self {
        Self {
            chunks: chunks.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    /// A response that is cut off at the token limit
    pub fn truncated(text: impl Into<String>) -> Self {
        Self::text(text).with_finish(FinishReason::Length)
    }

    /// A response that fails with an in-stream error event
    pub fn stream_error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            chunks: vec![],
            stream_error: Some((error_type.into(), message.into())),
            ..Default::default()
        }
    }

    /// A call that fails before streaming starts
    pub fn failure(failure: MockFailure) -> Self {
        Self {
            chunks: vec![],
            failure: Some(failure),
            ..Default::default()
        }
    }

    /// A call that is accepted but never answered
    pub fn hanging() -> Self {
        Self {
            chunks: vec![],
            hang: true,
            ..Default::default()
        }
    }

    pub fn with_finish(mut self, reason: FinishReason) -> Self {
        self.finish_reason = reason;
        self
    }

    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = Some(Usage::new(prompt_tokens, completion_tokens));
        self
    }

    pub fn without_usage(mut self) -> Self {
        self.usage = None;
        self
    }

    pub fn with_reasoning(mut self, reasoning: Vec<&str>) -> Self {
        self.reasoning = reasoning.into_iter().map(String::from).collect();
        self
    }

    /// Add a tool call and mark the response as finishing for tool use
    pub fn with_tool_call(mut self, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        self.tool_calls.push(ToolCall {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        });
        self.finish_reason = FinishReason::ToolCalls;
        self
    }

    /// Stream the deltas, then go silent without finishing
    pub fn stalled(mut self) -> Self {
        self.stall = true;
        self
    }

    fn into_events(self) -> Vec<Result<StreamEvent>> {
        let mut events = vec![Ok(StreamEvent::MessageStart {
            id: format!("mock_{}", uuid::Uuid::new_v4().simple()),
            model: "mock-model".to_string(),
        })];
        events.extend(
            self.reasoning
                .into_iter()
                .map(|r| Ok(StreamEvent::ReasoningDelta(r))),
        );
        events.extend(self.chunks.into_iter().map(|t| Ok(StreamEvent::TextDelta(t))));
        events.extend(
            self.tool_calls
                .into_iter()
                .map(|call| Ok(StreamEvent::ToolCall(call))),
        );
        if self.stall {
            return events;
        }
        match self.stream_error {
            Some((error_type, message)) => {
                events.push(Ok(StreamEvent::Error {
                    error_type,
                    message,
                }));
            }
            None => events.push(Ok(StreamEvent::Finish {
                reason: self.finish_reason,
                usage: self.usage,
            })),
        }
        events
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(vec![MockResponse::default()])),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Replace the script with the given responses (returned in order)
    pub fn with_script(self, script: Vec<MockResponse>) -> Self {
        {
            let mut responses = lock(&self.responses);
            *responses = script;
        }
        self
    }

    /// Set a single text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_script(vec![MockResponse::text(text)])
    }

    /// Queue multiple text responses
    pub fn with_responses(self, texts: Vec<String>) -> Self {
        self.with_script(texts.into_iter().map(MockResponse::text).collect())
    }

    /// Get the number of calls made (streaming and non-streaming)
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    /// Reset call count and recorded requests
    pub fn reset(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        lock(&self.recorded_requests).clear();
    }

    fn next_response(&self, request: CompletionRequest) -> MockResponse {
        lock(&self.recorded_requests).push(request);
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        let responses = lock(&self.responses);
        if responses.is_empty() {
            MockResponse::default()
        } else {
            responses[count.min(responses.len() - 1)].clone()
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let model = request.model.clone();
        let response = self.next_response(request);
        if response.hang {
            futures::future::pending::<()>().await;
        }
        if let Some(failure) = response.failure {
            return Err(failure.into_error().into());
        }
        if let Some((error_type, message)) = response.stream_error {
            return Err(ApiError::from_stream_event(&error_type, &message).into());
        }

        Ok(CompletionResponse {
            id: format!("mock_{}", uuid::Uuid::new_v4().simple()),
            model,
            text: response.chunks.concat(),
            tool_calls: response.tool_calls,
            finish_reason: response.finish_reason,
            usage: response.usage.unwrap_or_default(),
        })
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<EventStream> {
        let response = self.next_response(request);
        if response.hang {
            futures::future::pending::<()>().await;
        }
        if let Some(failure) = response.failure {
            return Err(failure.into_error().into());
        }

        let stall = response.stall;
        let events = stream::iter(response.into_events());
        if stall {
            Ok(Box::pin(events.chain(stream::pending())))
        } else {
            Ok(Box::pin(events))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::Message;

    fn request() -> CompletionRequest {
        CompletionRequest::new("mock-model", vec![Message::user("Hello")])
    }

    async fn collect(provider: &MockProvider) -> Vec<StreamEvent> {
        let stream = provider.complete_stream(request()).await.unwrap();
        stream.map(|event| event.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_complete_returns_text_and_records_request() {
        let provider = MockProvider::new().with_response("Hello there");
        let response = provider.complete(request()).await.unwrap();

        assert_eq!(response.text, "Hello there");
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().model, "mock-model");
    }

    #[tokio::test]
    async fn test_script_repeats_last_response() {
        let provider =
            MockProvider::new().with_responses(vec!["first".to_string(), "second".to_string()]);

        assert_eq!(provider.complete(request()).await.unwrap().text, "first");
        assert_eq!(provider.complete(request()).await.unwrap().text, "second");
        assert_eq!(provider.complete(request()).await.unwrap().text, "second");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_event_order() {
        let provider = MockProvider::new().with_script(vec![MockResponse::chunks(vec!["a", "b"])
            .with_reasoning(vec!["think"])
            .with_tool_call("lookup", serde_json::json!({"q": 1}))]);

        let events = collect(&provider).await;
        assert!(matches!(events[0], StreamEvent::MessageStart { .. }));
        assert!(matches!(&events[1], StreamEvent::ReasoningDelta(r) if r == "think"));
        assert!(matches!(&events[2], StreamEvent::TextDelta(t) if t == "a"));
        assert!(matches!(&events[3], StreamEvent::TextDelta(t) if t == "b"));
        assert!(matches!(&events[4], StreamEvent::ToolCall(call) if call.name == "lookup"));
        assert!(matches!(
            events[5],
            StreamEvent::Finish {
                reason: FinishReason::ToolCalls,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stream_error_replaces_finish() {
        let provider =
            MockProvider::new().with_script(vec![MockResponse::stream_error("server_error", "boom")]);
        let events = collect(&provider).await;

        assert!(matches!(events.last(), Some(StreamEvent::Error { message, .. }) if message == "boom"));
        assert!(!events
            .iter()
            .any(|e| matches!(e, StreamEvent::Finish { .. })));
    }

    #[tokio::test]
    async fn test_failure_before_stream() {
        let provider =
            MockProvider::new().with_script(vec![MockResponse::failure(MockFailure::Authentication)]);
        let result = provider.complete_stream(request()).await;
        assert!(result.is_err());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_stream_never_finishes() {
        let provider = MockProvider::new().with_script(vec![MockResponse::text("partial").stalled()]);
        let mut stream = provider.complete_stream(request()).await.unwrap();

        assert!(matches!(stream.next().await, Some(Ok(StreamEvent::MessageStart { .. }))));
        assert!(matches!(stream.next().await, Some(Ok(StreamEvent::TextDelta(_)))));
        let next = tokio::time::timeout(std::time::Duration::from_secs(60), stream.next()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_reset() {
        let provider = MockProvider::new();
        provider.complete(request()).await.unwrap();
        provider.reset();
        assert_eq!(provider.call_count(), 0);
        assert!(provider.recorded_requests().is_empty());
    }
}
