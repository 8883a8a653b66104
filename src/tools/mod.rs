// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for chatrelay
//!
//! Tools are supplied by external providers (MCP bridges, in-process
//! adapters, ...) behind the [`Tool`] trait. The relay only advertises their
//! definitions to the model and runs the calls the model issues; see
//! [`interceptor`] for the execution side.

pub mod interceptor;

pub use interceptor::*;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::llm::provider::ToolDefinition;

/// Result of tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// The tool call this result answers
    pub tool_call_id: String,
    /// Name of the tool that was called
    pub tool_name: String,
    /// The output of the tool
    pub output: ToolOutput,
}

/// Output from a tool
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Successful output
    Success(Value),
    /// Error output
    Error(String),
}

impl ToolResult {
    /// Create a successful result
    pub fn success(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output: ToolOutput::Success(output),
        }
    }

    /// Create an error result
    pub fn error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            output: ToolOutput::Error(error.into()),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self.output, ToolOutput::Error(_))
    }

    /// JSON payload sent to the client and the model: the output, or `{"error": ...}`
    pub fn payload(&self) -> Value {
        match &self.output {
            ToolOutput::Success(value) => value.clone(),
            ToolOutput::Error(message) => serde_json::json!({ "error": message }),
        }
    }

    /// Text form of the payload for the tool message in the history
    pub fn output_text(&self) -> String {
        match &self.output {
            ToolOutput::Success(Value::String(s)) => s.clone(),
            _ => self.payload().to_string(),
        }
    }
}

/// Trait for implementing tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition for the LLM
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the model-supplied arguments
    async fn execute(&self, arguments: Value) -> Result<Value>;

    /// Get the tool name
    fn name(&self) -> &str;
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool of the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Get all tool definitions, ordered by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// List all tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ToolInputSchema;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.to_string(),
                description: format!("{} tool", self.0),
                input_schema: ToolInputSchema::object(serde_json::json!({}), vec![]),
            }
        }

        async fn execute(&self, arguments: Value) -> Result<Value> {
            Ok(arguments)
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(NamedTool("zeta")));
        registry.register(Arc::new(NamedTool("alpha")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_registry_definitions_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("b")));
        registry.register(Arc::new(NamedTool("a")));

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_tool_result_payloads() {
        let ok = ToolResult::success("call_1", "lookup", serde_json::json!({"hits": 2}));
        assert!(!ok.is_error());
        assert_eq!(ok.payload(), serde_json::json!({"hits": 2}));
        assert_eq!(ok.output_text(), r#"{"hits":2}"#);

        let text = ToolResult::success("call_2", "lookup", Value::String("plain".into()));
        assert_eq!(text.output_text(), "plain");

        let err = ToolResult::error("call_3", "lookup", "boom");
        assert!(err.is_error());
        assert_eq!(err.payload(), serde_json::json!({"error": "boom"}));
    }
}
