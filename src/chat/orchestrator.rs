// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Segment orchestration
//!
//! Drives one or more provider calls ("segments") into a single logical
//! reply. A segment ends on a natural finish, a length truncation or a
//! recoverable stall; the last two continue the reply with a synthetic user
//! message until the segment cap is reached. Inside a segment, calls that
//! finish for tool use run further steps with the tool results appended.
//!
//! Events are pulled one at a time from a `select!` that also watches for
//! client disconnects, watchdog notices and finished tool executions, so tool
//! calls never pause stream consumption. Opening a stream is awaited under the
//! same watchdog session, so a call that never answers is abandoned too.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::sync::Arc;

use super::emitter::StreamEmitter;
use super::progress::{ProgressLabel, ProgressTracker};
use super::prompts::CONTINUE_PROMPT;
use super::request::{continuation_message, ModelSelection};
use super::streaming::{SegmentAccumulator, StreamEventResult, StreamSegment};
use super::usage::UsageAccumulator;
use super::watchdog::{Stall, Watched, WatchdogSession};
use super::wire::{Annotation, DataChunk};
use crate::config::PipelineConfig;
use crate::error::{ApiError, RelayError, Result};
use crate::llm::message::Message;
use crate::llm::provider::{
    CompletionRequest, EventStream, FinishReason, LlmProvider, StreamEvent, Usage,
};
use crate::tools::{ToolCallInterceptor, ToolResult};

/// Limits for one orchestrated reply
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Provider calls allowed to continue a truncated reply, first call included
    pub segment_cap: u32,
    pub max_tokens: u32,
    /// Tool steps allowed per segment
    pub max_llm_steps: u32,
}

impl From<&PipelineConfig> for OrchestratorConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            segment_cap: config.segment_cap,
            max_tokens: config.max_tokens,
            max_llm_steps: config.default_max_llm_steps,
        }
    }
}

/// Conversation handed to the orchestrator
#[derive(Debug, Clone)]
pub struct Conversation {
    pub selection: ModelSelection,
    pub system: String,
    pub messages: Vec<Message>,
}

/// Result of a finished reply
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOutcome {
    pub segments: u32,
    /// Client-visible text, all segments concatenated
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// How a segment ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentEnd {
    Finished(FinishReason),
    Truncated,
    Stalled,
}

/// Output of one segment
struct SegmentOutput {
    end: SegmentEnd,
    /// Text of every step in the segment
    text: String,
    /// Text of the last step only, which is not yet in the history
    last_step_text: String,
}

/// Per-run mutable state threaded through segments and steps
struct RunState<'a> {
    usage: &'a mut UsageAccumulator,
    progress: &'a mut ProgressTracker,
    emitter: &'a mut StreamEmitter,
    session: &'a mut WatchdogSession,
    response_started: bool,
}

pub struct SegmentOrchestrator {
    provider: Arc<dyn LlmProvider>,
    interceptor: Arc<ToolCallInterceptor>,
    config: OrchestratorConfig,
}

impl SegmentOrchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        interceptor: Arc<ToolCallInterceptor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            provider,
            interceptor,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Stream a complete reply. Provider calls and streams are watched by
    /// `session`, which the caller owns and stops.
    pub async fn run(
        &self,
        conversation: Conversation,
        usage: &mut UsageAccumulator,
        progress: &mut ProgressTracker,
        emitter: &mut StreamEmitter,
        session: &mut WatchdogSession,
    ) -> Result<OrchestratorOutcome> {
        let mut state = RunState {
            usage,
            progress,
            emitter,
            session,
            response_started: false,
        };

        let Conversation {
            selection,
            system,
            mut messages,
        } = conversation;
        let mut segments: u32 = 0;
        let mut text = String::new();

        tracing::debug!(
            target: "chatrelay.orchestrator",
            model = %selection.model,
            provider = %selection.provider,
            "streaming"
        );

        loop {
            segments += 1;
            let output = self
                .run_segment(&selection, &system, &mut messages, segments, &mut state)
                .await?;
            text.push_str(&output.text);

            let reason = match output.end {
                SegmentEnd::Finished(reason) => reason,
                SegmentEnd::Truncated | SegmentEnd::Stalled => {
                    if segments >= self.config.segment_cap {
                        tracing::warn!(
                            target: "chatrelay.orchestrator",
                            segments,
                            "segment cap reached, failing"
                        );
                        return Err(RelayError::SegmentCapExceeded { segments });
                    }
                    if output.end == SegmentEnd::Stalled && output.last_step_text.is_empty() {
                        tracing::debug!(
                            target: "chatrelay.orchestrator",
                            segment = segments,
                            "nothing streamed, reissuing call"
                        );
                        continue;
                    }
                    tracing::debug!(
                        target: "chatrelay.orchestrator",
                        segment = segments,
                        stalled = output.end == SegmentEnd::Stalled,
                        "maybe continuing: appending continuation"
                    );
                    messages.push(Message::assistant(output.last_step_text));
                    messages.push(continuation_message(&selection, CONTINUE_PROMPT));
                    continue;
                }
            };

            let totals = state.usage.totals();
            state.emitter.annotate(Annotation::Usage(totals)).await?;
            let event = state
                .progress
                .completed(ProgressLabel::Response, "Response Generated");
            state.emitter.progress(event).await?;
            state.emitter.emit(DataChunk::finish(reason, totals)).await?;
            state.emitter.close().await?;

            tracing::debug!(
                target: "chatrelay.orchestrator",
                segments,
                finish_reason = reason.as_str(),
                total_tokens = totals.total_tokens,
                "finished"
            );
            return Ok(OrchestratorOutcome {
                segments,
                text,
                finish_reason: reason,
                usage: totals,
            });
        }
    }

    /// One segment: a provider call plus any tool steps that follow it
    async fn run_segment(
        &self,
        selection: &ModelSelection,
        system: &str,
        messages: &mut Vec<Message>,
        segment: u32,
        state: &mut RunState<'_>,
    ) -> Result<SegmentOutput> {
        let mut segment_text = String::new();
        let mut steps: u32 = 0;

        loop {
            steps += 1;
            let request = CompletionRequest::new(selection.model.clone(), messages.clone())
                .with_system(system)
                .with_max_tokens(self.config.max_tokens)
                .with_tools(self.interceptor.definitions());

            let closed = state.emitter.closed_handle();
            let opened = state
                .session
                .watch(closed.closed(), self.provider.complete_stream(request))
                .await?;
            let stream = match opened {
                Watched::Ready(stream) => stream,
                Watched::Stalled(Stall::Recoverable { attempt }) => {
                    tracing::warn!(
                        target: "chatrelay.orchestrator",
                        segment,
                        attempt,
                        "provider call stalled before streaming, abandoning"
                    );
                    return Ok(SegmentOutput {
                        end: SegmentEnd::Stalled,
                        text: segment_text,
                        last_step_text: String::new(),
                    });
                }
                Watched::Stalled(Stall::Exhausted) => return Err(state.session.exhausted()),
            };
            if !state.response_started {
                state.response_started = true;
                let event = state
                    .progress
                    .started(ProgressLabel::Response, "Generating Response");
                state.emitter.progress(event).await?;
            }

            let (step, results, stalled) = self.consume_step(stream, state).await?;
            segment_text.push_str(&step.text);
            state.usage.add(step.usage);

            if stalled {
                state
                    .emitter
                    .emit(DataChunk::step_finish(FinishReason::Length, step.usage, true))
                    .await?;
                return Ok(SegmentOutput {
                    end: SegmentEnd::Stalled,
                    text: segment_text,
                    last_step_text: step.text,
                });
            }

            let reason = step.finish_reason.unwrap_or(FinishReason::Stop);
            let continues_with_tools = reason == FinishReason::ToolCalls
                && !step.tool_calls.is_empty()
                && steps < self.config.max_llm_steps;
            state
                .emitter
                .emit(DataChunk::step_finish(
                    reason,
                    step.usage,
                    reason == FinishReason::Length,
                ))
                .await?;

            tracing::debug!(
                target: "chatrelay.orchestrator",
                segment,
                step = steps,
                finish_reason = reason.as_str(),
                "step finished"
            );

            if continues_with_tools {
                messages.push(Message::assistant_tool_calls(
                    step.text.clone(),
                    step.tool_calls.clone(),
                ));
                for call in &step.tool_calls {
                    if let Some(result) = results.iter().find(|r| r.tool_call_id == call.id) {
                        messages.push(ToolCallInterceptor::result_message(result));
                    }
                }
                continue;
            }

            let end = match reason {
                FinishReason::Length => SegmentEnd::Truncated,
                other => SegmentEnd::Finished(other),
            };
            return Ok(SegmentOutput {
                end,
                text: segment_text,
                last_step_text: step.text,
            });
        }
    }

    /// Pull one provider stream to its end, running tool calls as they
    /// arrive. Returns the accumulated step, its tool results and whether the
    /// stream was abandoned after a stall.
    async fn consume_step(
        &self,
        mut stream: EventStream,
        state: &mut RunState<'_>,
    ) -> Result<(StreamSegment, Vec<ToolResult>, bool)> {
        let closed = state.emitter.closed_handle();
        let mut accumulator = SegmentAccumulator::new();
        let mut pending: FuturesUnordered<BoxFuture<'static, ToolResult>> = FuturesUnordered::new();
        let mut results = Vec::new();
        let mut stream_done = false;
        let mut stalled = false;

        loop {
            if stream_done && pending.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = closed.closed() => {
                    tracing::info!(target: "chatrelay.orchestrator", "client disconnected, cancelling");
                    return Err(RelayError::Cancelled);
                }

                Some(stall) = state.session.next_stall() => match stall {
                    Stall::Recoverable { attempt } => {
                        tracing::warn!(
                            target: "chatrelay.orchestrator",
                            attempt,
                            "stream stalled, abandoning call"
                        );
                        // Dropping the stream cancels the provider call
                        stream = Box::pin(futures::stream::empty::<Result<StreamEvent>>());
                        stream_done = true;
                        stalled = true;
                    }
                    Stall::Exhausted => return Err(state.session.exhausted()),
                },

                Some(result) = pending.next(), if !pending.is_empty() => {
                    state.session.touch();
                    state.emitter.annotate(Annotation::ToolResult(result.clone())).await?;
                    state.emitter.emit(DataChunk::tool_result(&result)).await?;
                    results.push(result);
                }

                item = stream.next(), if !stream_done => match item {
                    None => {
                        stream_done = true;
                        if accumulator.finish_reason().is_none() {
                            return Err(ApiError::InvalidResponse(
                                "stream ended without a finish reason".to_string(),
                            )
                            .into());
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    Some(Ok(event)) => {
                        state.session.touch();
                        match accumulator.process_event(event) {
                            StreamEventResult::TextDelta(text) => {
                                state.emitter.emit(DataChunk::text(&text)).await?;
                            }
                            StreamEventResult::ReasoningDelta(text) => {
                                state.emitter.emit(DataChunk::reasoning(&text)).await?;
                            }
                            StreamEventResult::ToolCall(call) => {
                                state.emitter.emit(DataChunk::tool_call(&call)).await?;
                                let interceptor = Arc::clone(&self.interceptor);
                                pending.push(async move { interceptor.on_tool_call(call).await }.boxed());
                            }
                            StreamEventResult::Finished(_) => {
                                stream_done = true;
                            }
                            StreamEventResult::Error { error_type, message } => {
                                return Err(ApiError::from_stream_event(&error_type, &message).into());
                            }
                            StreamEventResult::Ping | StreamEventResult::MessageStart => {}
                        }
                    }
                },
            }
        }

        Ok((accumulator.finish(), results, stalled))
    }
}
