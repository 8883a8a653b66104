// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context construction
//!
//! With context optimization on, two sequential non-streaming calls run
//! before the reply: one summarizes the conversation, the other picks the
//! project files the reply needs. Both report progress and usage, and both
//! are awaited under the request's watchdog session.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use super::emitter::StreamEmitter;
use super::progress::{ProgressLabel, ProgressTracker};
use super::prompts::{self, relative_path, PROJECT_ROOT};
use super::usage::UsageAccumulator;
use super::watchdog::{Stall, Watched, WatchdogSession};
use super::wire::Annotation;
use crate::error::Result;
use crate::llm::message::{Message, Role};
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Output of context construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextOutcome {
    /// Files chosen for the reply; `None` when no selection ran
    pub filtered_files: Option<BTreeMap<String, String>>,
    pub summary: Option<String>,
}

fn include_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<includeFile\s+path="([^"]+)"\s*/?>"#).expect("include file regex")
    })
}

/// Builds the summary and file selection for one request
pub struct ContextBuilder {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_files: usize,
    max_tokens: u32,
}

impl ContextBuilder {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, max_files: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            max_files,
            max_tokens: 2000,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub async fn build(
        &self,
        messages: &[Message],
        files: &BTreeMap<String, String>,
        optimize: bool,
        usage: &mut UsageAccumulator,
        progress: &mut ProgressTracker,
        emitter: &mut StreamEmitter,
        session: &mut WatchdogSession,
    ) -> Result<ContextOutcome> {
        if !optimize || files.is_empty() {
            return Ok(ContextOutcome::default());
        }

        emitter
            .progress(progress.started(ProgressLabel::Summary, "Analysing Request"))
            .await?;
        let summary = self.summarize(messages, usage, emitter, session).await?;
        emitter
            .progress(progress.completed(ProgressLabel::Summary, "Analysis Complete"))
            .await?;
        emitter
            .annotate(Annotation::ChatSummary {
                summary: summary.clone(),
                chat_id: messages.last().and_then(|m| m.id.clone()),
            })
            .await?;

        emitter
            .progress(progress.started(ProgressLabel::Context, "Determining Files to Read"))
            .await?;
        let selected = self
            .select_files(&summary, messages, files, usage, emitter, session)
            .await?;
        emitter
            .progress(progress.completed(ProgressLabel::Context, "Code Files Selected"))
            .await?;
        emitter
            .annotate(Annotation::CodeContext {
                files: selected
                    .keys()
                    .map(|path| relative_path(path).to_string())
                    .collect(),
            })
            .await?;

        Ok(ContextOutcome {
            filtered_files: Some(selected),
            summary: Some(summary),
        })
    }

    async fn summarize(
        &self,
        messages: &[Message],
        usage: &mut UsageAccumulator,
        emitter: &StreamEmitter,
        session: &mut WatchdogSession,
    ) -> Result<String> {
        let request = CompletionRequest::new(
            self.model.clone(),
            vec![Message::user(render_transcript(messages))],
        )
        .with_system(prompts::SUMMARY_SYSTEM_PROMPT)
        .with_max_tokens(self.max_tokens);

        let response = self.complete(request, emitter, session).await?;
        usage.add(response.usage);

        tracing::debug!(
            target: "chatrelay.context",
            chars = response.text.len(),
            "conversation summarized"
        );
        Ok(response.text.trim().to_string())
    }

    async fn select_files(
        &self,
        summary: &str,
        messages: &[Message],
        files: &BTreeMap<String, String>,
        usage: &mut UsageAccumulator,
        emitter: &StreamEmitter,
        session: &mut WatchdogSession,
    ) -> Result<BTreeMap<String, String>> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let paths: Vec<&str> = files.keys().map(String::as_str).collect();

        let request = CompletionRequest::new(
            self.model.clone(),
            vec![Message::user(prompts::context_selection_prompt(
                summary, last_user, &paths,
            ))],
        )
        .with_system(prompts::CONTEXT_SYSTEM_PROMPT)
        .with_max_tokens(self.max_tokens);

        let response = self.complete(request, emitter, session).await?;
        usage.add(response.usage);

        let selected = select_known_paths(&response.text, files, self.max_files);
        tracing::debug!(
            target: "chatrelay.context",
            selected = selected.len(),
            available = files.len(),
            "context files selected"
        );
        Ok(selected)
    }

    /// A non-streaming call that is reissued on a recoverable stall and
    /// fails once the retry budget is spent
    async fn complete(
        &self,
        request: CompletionRequest,
        emitter: &StreamEmitter,
        session: &mut WatchdogSession,
    ) -> Result<CompletionResponse> {
        let closed = emitter.closed_handle();
        loop {
            let call = self.provider.complete(request.clone());
            match session.watch(closed.closed(), call).await? {
                Watched::Ready(response) => return Ok(response),
                Watched::Stalled(Stall::Recoverable { attempt }) => {
                    tracing::warn!(
                        target: "chatrelay.context",
                        attempt,
                        "context call stalled, reissuing"
                    );
                }
                Watched::Stalled(Stall::Exhausted) => return Err(session.exhausted()),
            }
        }
    }
}

/// Resolve `<includeFile>` markers against the known files, in answer order,
/// deduplicated and capped at `max_files`.
pub fn select_known_paths(
    answer: &str,
    files: &BTreeMap<String, String>,
    max_files: usize,
) -> BTreeMap<String, String> {
    let mut selected = BTreeMap::new();
    for capture in include_file_regex().captures_iter(answer) {
        if selected.len() >= max_files {
            break;
        }
        let Some(path) = capture.get(1).map(|m| m.as_str().trim()) else {
            continue;
        };
        let candidates = [
            path.to_string(),
            format!("{}{}", PROJECT_ROOT, path.trim_start_matches('/')),
        ];
        if let Some((key, content)) = candidates
            .iter()
            .find_map(|candidate| files.get_key_value(candidate))
        {
            selected.insert(key.clone(), content.clone());
        } else {
            tracing::debug!(target: "chatrelay.context", path, "ignoring unknown selected path");
        }
    }
    selected
}

fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::from("<chat_history>\n");
    for message in messages {
        out.push_str(&format!("[{}]: {}\n", message.role, message.content));
    }
    out.push_str("</chat_history>");
    out
}
