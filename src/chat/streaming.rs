// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming response handling
//!
//! Testable accumulation of one provider call's events, kept apart from the
//! I/O in the orchestrator.

use crate::llm::message::ToolCall;
use crate::llm::provider::{FinishReason, StreamEvent, Usage};

/// One provider call's worth of output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSegment {
    /// Visible text, concatenated
    pub text: String,
    /// Reasoning text, concatenated
    pub reasoning: String,
    /// Tool calls issued during the call
    pub tool_calls: Vec<ToolCall>,
    /// Finish reason, if the provider sent one
    pub finish_reason: Option<FinishReason>,
    /// Usage reported for the call
    pub usage: Usage,
}

/// Accumulator for streaming response content
#[derive(Debug, Default)]
pub struct SegmentAccumulator {
    segment: StreamSegment,
}

impl SegmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.segment.text
    }

    /// Get the finish reason
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.segment.finish_reason
    }

    /// Process a stream event and return what the caller should act on
    pub fn process_event(&mut self, event: StreamEvent) -> StreamEventResult {
        match event {
            StreamEvent::TextDelta(text) => {
                self.segment.text.push_str(&text);
                StreamEventResult::TextDelta(text)
            }
            StreamEvent::ReasoningDelta(text) => {
                self.segment.reasoning.push_str(&text);
                StreamEventResult::ReasoningDelta(text)
            }
            StreamEvent::ToolCall(call) => {
                self.segment.tool_calls.push(call.clone());
                StreamEventResult::ToolCall(call)
            }
            StreamEvent::Finish { reason, usage } => {
                self.segment.finish_reason = Some(reason);
                if let Some(usage) = usage {
                    self.segment.usage = usage;
                }
                StreamEventResult::Finished(reason)
            }
            StreamEvent::Error {
                error_type,
                message,
            } => {
                self.segment.finish_reason = Some(FinishReason::Error);
                StreamEventResult::Error {
                    error_type,
                    message,
                }
            }
            StreamEvent::Ping => StreamEventResult::Ping,
            StreamEvent::MessageStart { .. } => StreamEventResult::MessageStart,
        }
    }

    /// Consume the accumulator and return the segment
    pub fn finish(self) -> StreamSegment {
        self.segment
    }
}

/// Result of processing a stream event
#[derive(Debug, Clone)]
pub enum StreamEventResult {
    /// Text delta received (contains the text to forward)
    TextDelta(String),
    /// Reasoning delta received
    ReasoningDelta(String),
    /// Complete tool call received
    ToolCall(ToolCall),
    /// Provider finished the call
    Finished(FinishReason),
    /// Error occurred
    Error { error_type: String, message: String },
    /// Ping event (keep-alive)
    Ping,
    /// Message started
    MessageStart,
}

impl StreamEventResult {
    /// Check if this result contains displayable text
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamEventResult::TextDelta(text) => Some(text),
            _ => None,
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, StreamEventResult::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulates_text_and_reasoning() {
        let mut acc = SegmentAccumulator::new();
        acc.process_event(StreamEvent::MessageStart {
            id: "m".into(),
            model: "x".into(),
        });
        acc.process_event(StreamEvent::ReasoningDelta("think ".into()));
        acc.process_event(StreamEvent::ReasoningDelta("more".into()));
        let result = acc.process_event(StreamEvent::TextDelta("Hello".into()));
        acc.process_event(StreamEvent::TextDelta(", world".into()));

        assert_eq!(result.text(), Some("Hello"));
        assert_eq!(acc.text(), "Hello, world");

        let segment = acc.finish();
        assert_eq!(segment.reasoning, "think more");
        assert_eq!(segment.finish_reason, None);
    }

    #[test]
    fn test_finish_records_reason_and_usage() {
        let mut acc = SegmentAccumulator::new();
        let result = acc.process_event(StreamEvent::Finish {
            reason: FinishReason::Length,
            usage: Some(Usage::new(7, 3)),
        });

        assert!(matches!(result, StreamEventResult::Finished(FinishReason::Length)));
        assert_eq!(acc.finish_reason(), Some(FinishReason::Length));
        assert_eq!(acc.finish().usage, Usage::new(7, 3));
    }

    #[test]
    fn test_finish_without_usage_keeps_zero() {
        let mut acc = SegmentAccumulator::new();
        acc.process_event(StreamEvent::Finish {
            reason: FinishReason::Stop,
            usage: None,
        });
        assert_eq!(acc.finish().usage, Usage::default());
    }

    #[test]
    fn test_tool_calls_collected() {
        let mut acc = SegmentAccumulator::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "lookup".into(),
            arguments: serde_json::json!({}),
        };
        let result = acc.process_event(StreamEvent::ToolCall(call.clone()));
        assert!(matches!(result, StreamEventResult::ToolCall(ref c) if c.id == "call_1"));
        assert_eq!(acc.finish().tool_calls, vec![call]);
    }

    #[test]
    fn test_error_event() {
        let mut acc = SegmentAccumulator::new();
        let result = acc.process_event(StreamEvent::Error {
            error_type: "server_error".into(),
            message: "boom".into(),
        });
        assert!(result.is_error());
        assert_eq!(acc.finish_reason(), Some(FinishReason::Error));
    }

    #[test]
    fn test_ping_is_passive() {
        let mut acc = SegmentAccumulator::new();
        assert!(matches!(
            acc.process_event(StreamEvent::Ping),
            StreamEventResult::Ping
        ));
        assert_eq!(acc.finish(), StreamSegment::default());
    }
}
