// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Public stream protocol
//!
//! Each line of the response body is `<tag>:<payload>\n`, payload being JSON.
//! [`DataChunk`] is the native (pre-transform) form; the
//! [`ChunkTransformer`](super::transform::ChunkTransformer) renders lines.

use serde_json::{json, Value};

use crate::chat::classifier::ClassifiedError;
use crate::chat::progress::ProgressEvent;
use crate::llm::message::ToolCall;
use crate::llm::provider::{FinishReason, Usage};
use crate::tools::ToolResult;

/// Stream part tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartTag {
    Text,
    Data,
    Error,
    Annotation,
    ToolCall,
    ToolResult,
    StepFinish,
    Finish,
    /// Native only; rendered as text between reasoning delimiters
    Reasoning,
}

impl PartTag {
    pub fn code(&self) -> char {
        match self {
            PartTag::Text => '0',
            PartTag::Data => '2',
            PartTag::Error => '3',
            PartTag::Annotation => '8',
            PartTag::ToolCall => '9',
            PartTag::ToolResult => 'a',
            PartTag::StepFinish => 'e',
            PartTag::Finish => 'd',
            PartTag::Reasoning => 'g',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            '0' => PartTag::Text,
            '2' => PartTag::Data,
            '3' => PartTag::Error,
            '8' => PartTag::Annotation,
            '9' => PartTag::ToolCall,
            'a' => PartTag::ToolResult,
            'e' => PartTag::StepFinish,
            'd' => PartTag::Finish,
            'g' => PartTag::Reasoning,
            _ => return None,
        })
    }
}

/// Message annotations carried by `8:` lines
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Progress(ProgressEvent),
    Usage(Usage),
    ChatSummary {
        summary: String,
        chat_id: Option<String>,
    },
    CodeContext {
        files: Vec<String>,
    },
    ToolResult(ToolResult),
    Error(ClassifiedError),
}

impl Annotation {
    pub fn to_json(&self) -> Value {
        match self {
            Annotation::Progress(event) => json!({
                "type": "progress",
                "label": event.label,
                "status": event.status,
                "order": event.order,
                "message": event.message,
            }),
            Annotation::Usage(usage) => json!({
                "type": "usage",
                "value": usage,
            }),
            Annotation::ChatSummary { summary, chat_id } => json!({
                "type": "chatSummary",
                "summary": summary,
                "chatId": chat_id,
            }),
            Annotation::CodeContext { files } => json!({
                "type": "codeContext",
                "files": files,
            }),
            Annotation::ToolResult(result) => json!({
                "type": "toolResult",
                "toolCallId": result.tool_call_id,
                "toolName": result.tool_name,
                "result": result.payload(),
                "isError": result.is_error(),
            }),
            Annotation::Error(error) => json!({
                "type": "error",
                "kind": error.kind,
                "message": error.message,
                "statusCode": error.http_status,
                "isRetryable": error.retryable,
            }),
        }
    }
}

/// One native stream chunk
#[derive(Debug, Clone, PartialEq)]
pub struct DataChunk {
    pub tag: PartTag,
    pub payload: String,
}

impl DataChunk {
    pub fn new(tag: PartTag, payload: impl Into<String>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(PartTag::Text, Value::from(text).to_string())
    }

    pub fn reasoning(text: &str) -> Self {
        Self::new(PartTag::Reasoning, Value::from(text).to_string())
    }

    pub fn annotation(annotation: &Annotation) -> Self {
        Self::new(
            PartTag::Annotation,
            Value::Array(vec![annotation.to_json()]).to_string(),
        )
    }

    pub fn error(message: &str) -> Self {
        Self::new(PartTag::Error, Value::from(message).to_string())
    }

    pub fn tool_call(call: &ToolCall) -> Self {
        let payload = json!({
            "toolCallId": call.id,
            "toolName": call.name,
            "args": call.arguments,
        });
        Self::new(PartTag::ToolCall, payload.to_string())
    }

    pub fn tool_result(result: &ToolResult) -> Self {
        let payload = json!({
            "toolCallId": result.tool_call_id,
            "result": result.payload(),
        });
        Self::new(PartTag::ToolResult, payload.to_string())
    }

    pub fn step_finish(reason: FinishReason, usage: Usage, is_continued: bool) -> Self {
        let payload = json!({
            "finishReason": reason.as_str(),
            "usage": usage_json(usage),
            "isContinued": is_continued,
        });
        Self::new(PartTag::StepFinish, payload.to_string())
    }

    pub fn finish(reason: FinishReason, usage: Usage) -> Self {
        let payload = json!({
            "finishReason": reason.as_str(),
            "usage": usage_json(usage),
        });
        Self::new(PartTag::Finish, payload.to_string())
    }
}

fn usage_json(usage: Usage) -> Value {
    json!({
        "promptTokens": usage.prompt_tokens,
        "completionTokens": usage.completion_tokens,
    })
}

/// Split a public line into its tag and payload (trailing newline removed)
pub fn parse_line(line: &str) -> Option<(PartTag, &str)> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let (code, payload) = line.split_once(':')?;
    let mut chars = code.chars();
    let tag = PartTag::from_code(chars.next()?)?;
    if chars.next().is_some() {
        return None;
    }
    Some((tag, payload))
}
