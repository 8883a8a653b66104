// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-request pipeline
//!
//! Context construction followed by segment orchestration, with failures
//! classified, recorded and reported to the client. One watchdog session
//! covers both phases and is stopped when the request ends.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::classifier::classify;
use super::context::ContextBuilder;
use super::emitter::{PipelineOutput, StreamEmitter};
use super::orchestrator::{Conversation, OrchestratorConfig, OrchestratorOutcome, SegmentOrchestrator};
use super::progress::ProgressTracker;
use super::prompts;
use super::request::{ChatRequest, ModelSelection};
use super::usage::UsageAccumulator;
use super::watchdog::StreamWatchdog;
use crate::config::PipelineConfig;
use crate::error::{RelayError, Result};
use crate::llm::provider::LlmProvider;
use crate::monitoring::HealthCollector;
use crate::tools::ToolCallInterceptor;

/// Lines buffered between the pipeline task and the HTTP body
const OUTPUT_BUFFER: usize = 64;

pub struct ChatPipeline {
    provider: Arc<dyn LlmProvider>,
    interceptor: Arc<ToolCallInterceptor>,
    config: PipelineConfig,
    health: Arc<dyn HealthCollector>,
    watchdog: Option<StreamWatchdog>,
}

impl ChatPipeline {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        interceptor: Arc<ToolCallInterceptor>,
        config: PipelineConfig,
        health: Arc<dyn HealthCollector>,
    ) -> Self {
        Self {
            provider,
            interceptor,
            config,
            health,
            watchdog: None,
        }
    }

    /// Use this watchdog instead of one built from the config
    pub fn with_watchdog(mut self, watchdog: StreamWatchdog) -> Self {
        self.watchdog = Some(watchdog);
        self
    }

    /// Run on a new task, returning the output channel
    pub fn spawn(
        self,
        request: ChatRequest,
        selection: ModelSelection,
    ) -> mpsc::Receiver<PipelineOutput> {
        let (mut emitter, rx) = StreamEmitter::channel(OUTPUT_BUFFER);
        tokio::spawn(async move {
            let _ = self.run(request, selection, &mut emitter).await;
        });
        rx
    }

    /// Run to completion. Errors have already been reported through the
    /// emitter when this returns.
    pub async fn run(
        &self,
        request: ChatRequest,
        selection: ModelSelection,
        emitter: &mut StreamEmitter,
    ) -> Result<OrchestratorOutcome> {
        let result = self.drive(request, selection, emitter).await;
        if let Err(error) = &result {
            self.report(error, emitter).await;
        }
        result
    }

    async fn drive(
        &self,
        request: ChatRequest,
        selection: ModelSelection,
        emitter: &mut StreamEmitter,
    ) -> Result<OrchestratorOutcome> {
        let mut usage = UsageAccumulator::new();
        let mut progress = ProgressTracker::new();
        let watchdog = self.watchdog.clone().unwrap_or_else(|| {
            StreamWatchdog::new(
                Duration::from_secs(self.config.stall_timeout_secs),
                self.config.stall_max_retries,
            )
        });
        let mut session = watchdog.session();

        tracing::debug!(
            target: "chatrelay.pipeline",
            messages = request.messages.len(),
            files = request.files.len(),
            optimize = request.context_optimization,
            "building context"
        );
        let context = ContextBuilder::new(
            Arc::clone(&self.provider),
            selection.model.clone(),
            self.config.max_context_files,
        )
        .build(
            &request.messages,
            &request.files,
            request.context_optimization,
            &mut usage,
            &mut progress,
            emitter,
            &mut session,
        )
        .await?;

        let files = context.filtered_files.as_ref().unwrap_or(&request.files);
        let system = prompts::system_prompt(request.chat_mode, files, request.design_scheme.as_ref());

        let mut config = OrchestratorConfig::from(&self.config);
        if let Some(steps) = request.max_llm_steps {
            config.max_llm_steps = steps;
        }
        let orchestrator =
            SegmentOrchestrator::new(Arc::clone(&self.provider), Arc::clone(&self.interceptor), config);

        let conversation = Conversation {
            selection,
            system,
            messages: request.messages,
        };
        orchestrator
            .run(conversation, &mut usage, &mut progress, emitter, &mut session)
            .await
    }

    async fn report(&self, error: &RelayError, emitter: &mut StreamEmitter) {
        if matches!(error, RelayError::Cancelled) {
            tracing::info!(target: "chatrelay.pipeline", "request cancelled by client");
            return;
        }

        let classified = classify(error);
        self.health.record_error(classified.kind, &classified.message);
        tracing::warn!(
            target: "chatrelay.pipeline",
            kind = %classified.kind,
            status = classified.http_status,
            streamed = emitter.has_started(),
            error = %error,
            "request failed"
        );

        if emitter.fail(classified).await.is_err() {
            tracing::debug!(target: "chatrelay.pipeline", "client gone before error was delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::classifier::ErrorKind;
    use crate::chat::request::ChatMode;
    use crate::llm::message::Message;
    use crate::llm::mock_provider::{MockFailure, MockProvider, MockResponse};
    use crate::monitoring::InMemoryHealthCollector;
    use crate::tools::ToolRegistry;
    use std::collections::BTreeMap;

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![Message::user("hi")],
            files: BTreeMap::new(),
            chat_mode: ChatMode::Build,
            context_optimization: false,
            max_llm_steps: None,
            prompt_id: None,
            design_scheme: None,
        }
    }

    fn selection() -> ModelSelection {
        ModelSelection {
            model: "m".to_string(),
            provider: "mock".to_string(),
        }
    }

    fn pipeline(provider: Arc<MockProvider>, health: Arc<InMemoryHealthCollector>) -> ChatPipeline {
        let interceptor = Arc::new(ToolCallInterceptor::new(
            Arc::new(ToolRegistry::new()),
            Duration::from_secs(5),
        ));
        ChatPipeline::new(provider, interceptor, PipelineConfig::default(), health)
    }

    #[tokio::test]
    async fn test_failure_before_stream_is_out_of_band() {
        let provider = Arc::new(
            MockProvider::new().with_script(vec![MockResponse::failure(MockFailure::Authentication)]),
        );
        let health = Arc::new(InMemoryHealthCollector::new());
        let mut rx = pipeline(provider, health.clone()).spawn(request(), selection());

        match rx.recv().await {
            Some(PipelineOutput::Failed(error)) => {
                assert_eq!(error.kind, ErrorKind::Auth);
                assert_eq!(error.http_status, 401);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(rx.recv().await.is_none());
        assert_eq!(health.error_count(ErrorKind::Auth), 1);
    }

    #[tokio::test]
    async fn test_system_prompt_carries_files() {
        let provider = Arc::new(MockProvider::new().with_response("ok"));
        let health = Arc::new(InMemoryHealthCollector::new());
        let mut request = request();
        request
            .files
            .insert("/home/project/index.html".to_string(), "<html/>".to_string());
        let (mut emitter, _rx) = StreamEmitter::channel(64);

        pipeline(provider.clone(), health)
            .run(request, selection(), &mut emitter)
            .await
            .unwrap();

        let system = provider.last_request().unwrap().system.unwrap();
        assert!(system.contains("<file path=\"index.html\">"));
    }

    #[tokio::test]
    async fn test_request_step_limit_overrides_default() {
        let provider = Arc::new(MockProvider::new().with_script(vec![
            MockResponse::text("").with_tool_call("lookup", serde_json::json!({})),
        ]));
        let health = Arc::new(InMemoryHealthCollector::new());
        let mut request = request();
        request.max_llm_steps = Some(1);
        let (mut emitter, _rx) = StreamEmitter::channel(64);

        pipeline(provider.clone(), health)
            .run(request, selection(), &mut emitter)
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 1);
    }
}
