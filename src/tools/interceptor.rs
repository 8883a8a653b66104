// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mid-stream tool call execution
//!
//! Runs model-issued tool calls against the registry. Every call produces
//! exactly one [`ToolResult`]; unknown tools, tool errors and timeouts become
//! error results rather than pipeline failures.

use std::sync::Arc;
use std::time::Duration;

use crate::llm::message::{Message, ToolCall};
use crate::llm::provider::ToolDefinition;

use super::{ToolRegistry, ToolResult};

/// Executes tool calls with a per-call timeout
pub struct ToolCallInterceptor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolCallInterceptor {
    /// Create a new interceptor
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Tool descriptors (no execution bodies) for the provider request
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Execute one tool call
    pub async fn on_tool_call(&self, call: ToolCall) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name).cloned() else {
            tracing::warn!(target: "chatrelay.tools", tool = %call.name, "unknown tool requested");
            return ToolResult::error(call.id, call.name.clone(), format!("Unknown tool: {}", call.name));
        };

        tracing::debug!(target: "chatrelay.tools", tool = %call.name, id = %call.id, "executing tool");

        match tokio::time::timeout(self.timeout, tool.execute(call.arguments)).await {
            Ok(Ok(output)) => ToolResult::success(call.id, call.name, output),
            Ok(Err(e)) => {
                tracing::warn!(
                    target: "chatrelay.tools",
                    tool = %call.name,
                    error = %e,
                    "tool returned error"
                );
                ToolResult::error(call.id, call.name, e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    target: "chatrelay.tools",
                    tool = %call.name,
                    timeout_secs = self.timeout.as_secs(),
                    "tool timed out"
                );
                let message = format!("Tool timed out after {}s", self.timeout.as_secs());
                ToolResult::error(call.id, call.name, message)
            }
        }
    }

    /// Convert a tool result into the history message answering its call
    pub fn result_message(result: &ToolResult) -> Message {
        Message::tool_result(
            result.tool_call_id.clone(),
            truncate_output(&result.output_text(), MAX_TOOL_OUTPUT_CHARS),
        )
    }
}

/// Tool output longer than this is cut before it goes back to the model
const MAX_TOOL_OUTPUT_CHARS: usize = 32_000;

fn truncate_output(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RelayError, Result};
    use crate::llm::message::Role;
    use crate::llm::provider::ToolInputSchema;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo arguments".to_string(),
                input_schema: ToolInputSchema::object(json!({}), vec![]),
            }
        }

        async fn execute(&self, arguments: Value) -> Result<Value> {
            Ok(arguments)
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "fail".to_string(),
                description: "Always fails".to_string(),
                input_schema: ToolInputSchema::object(json!({}), vec![]),
            }
        }

        async fn execute(&self, _arguments: Value) -> Result<Value> {
            Err(RelayError::ToolExecution("disk on fire".to_string()))
        }

        fn name(&self) -> &str {
            "fail"
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "slow".to_string(),
                description: "Never returns in time".to_string(),
                input_schema: ToolInputSchema::object(json!({}), vec![]),
            }
        }

        async fn execute(&self, _arguments: Value) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn interceptor() -> ToolCallInterceptor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(FailingTool));
        registry.register(Arc::new(SlowTool));
        ToolCallInterceptor::new(Arc::new(registry), Duration::from_secs(30))
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments: json!({"x": 1}),
        }
    }

    #[tokio::test]
    async fn test_successful_call() {
        let result = interceptor().on_tool_call(call("echo")).await;
        assert_eq!(result.tool_call_id, "call_echo");
        assert_eq!(result.payload(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let result = interceptor().on_tool_call(call("nope")).await;
        assert!(result.is_error());
        assert_eq!(result.tool_call_id, "call_nope");
        assert!(result.output_text().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_tool_error_is_error_result() {
        let result = interceptor().on_tool_call(call("fail")).await;
        assert!(result.is_error());
        assert!(result.output_text().contains("disk on fire"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout_is_error_result() {
        let result = interceptor().on_tool_call(call("slow")).await;
        assert!(result.is_error());
        assert!(result.output_text().contains("timed out"));
    }

    #[test]
    fn test_definitions_exported() {
        let names: Vec<String> = interceptor()
            .definitions()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["echo", "fail", "slow"]);
    }

    #[test]
    fn test_result_message() {
        let result = ToolResult::success("call_1", "echo", Value::String("done".into()));
        let message = ToolCallInterceptor::result_message(&result);
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.content, "done");
    }

    #[test]
    fn test_truncate_output() {
        assert_eq!(truncate_output("short", 10), "short");
        assert_eq!(truncate_output("abcdef", 3), "abc...");
        assert_eq!(truncate_output("héllo", 2), "hé...");
        assert_eq!(truncate_output("", 0), "");
    }
}
