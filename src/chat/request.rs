// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat request body and model/provider selection

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::llm::message::{Message, Role};

/// Conversation mode chosen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Talk about the project without producing code actions
    Discuss,
    /// Produce code and actions
    Build,
}

/// Body of `POST /chat`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,

    /// Virtual path -> file content
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: BTreeMap<String, String>,

    pub chat_mode: ChatMode,

    #[serde(default, deserialize_with = "null_as_default")]
    pub context_optimization: bool,

    /// Tool steps allowed per segment
    #[serde(default, rename = "maxLLMSteps")]
    pub max_llm_steps: Option<u32>,

    #[serde(default)]
    pub prompt_id: Option<String>,

    /// Opaque design hints forwarded into the system prompt
    #[serde(default)]
    pub design_scheme: Option<serde_json::Value>,
}

/// An explicit `null` reads the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatRequest {
    /// The last user message, if any
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}

/// Model and provider used for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: String,
    pub provider: String,
}

fn model_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[Model: (.*?)\]\n\n").expect("model marker regex"))
}

fn provider_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[Provider: (.*?)\]\n\n").expect("provider marker regex"))
}

/// Markers found at the start of a user message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMarkers {
    pub model: Option<String>,
    pub provider: Option<String>,
    /// Message content with the markers removed
    pub content: String,
}

/// Pull `[Model: ...]` and `[Provider: ...]` markers out of message text
pub fn extract_model_and_provider(content: &str) -> ExtractedMarkers {
    let model = model_regex()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|m| !m.is_empty());
    let provider = provider_regex()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| !p.is_empty());

    let stripped = model_regex().replace(content, "");
    let stripped = provider_regex().replace(&stripped, "");

    ExtractedMarkers {
        model,
        provider,
        content: stripped.into_owned(),
    }
}

/// Strip selection markers from the last user message and return them.
/// Earlier messages are left as sent.
pub fn strip_selection_markers(messages: &mut [Message]) -> (Option<String>, Option<String>) {
    let Some(message) = messages.iter_mut().rev().find(|m| m.role == Role::User) else {
        return (None, None);
    };
    let extracted = extract_model_and_provider(&message.content);
    if extracted.model.is_some() || extracted.provider.is_some() {
        message.content = extracted.content;
    }
    (extracted.model, extracted.provider)
}

/// Build the synthetic user message that resumes a truncated reply
pub fn continuation_message(selection: &ModelSelection, prompt: &str) -> Message {
    Message::user(format!(
        "[Model: {}]\n\n[Provider: {}]\n\n{}",
        selection.model, selection.provider, prompt
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_request() {
        let json = serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "files": {"/home/project/src/main.ts": "console.log(1)"},
            "chatMode": "build",
            "contextOptimization": true,
            "maxLLMSteps": 3,
            "promptId": "default"
        });
        let request: ChatRequest = serde_json::from_value(json).unwrap();

        assert_eq!(request.chat_mode, ChatMode::Build);
        assert!(request.context_optimization);
        assert_eq!(request.max_llm_steps, Some(3));
        assert_eq!(request.files.len(), 1);
        assert_eq!(request.prompt_id.as_deref(), Some("default"));
    }

    #[test]
    fn test_deserialize_minimal_request() {
        let json = serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "chatMode": "discuss"
        });
        let request: ChatRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.chat_mode, ChatMode::Discuss);
        assert!(!request.context_optimization);
        assert!(request.files.is_empty());
        assert!(request.max_llm_steps.is_none());
    }

    #[test]
    fn test_null_optional_fields_read_as_missing() {
        let json = serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "chatMode": "build",
            "files": null,
            "contextOptimization": null,
            "maxLLMSteps": null
        });
        let request: ChatRequest = serde_json::from_value(json).unwrap();
        assert!(request.files.is_empty());
        assert!(!request.context_optimization);
        assert!(request.max_llm_steps.is_none());
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let json = serde_json::json!({
            "messages": [{"role": "user", "content": "hi"}],
            "chatMode": "chat"
        });
        assert!(serde_json::from_value::<ChatRequest>(json).is_err());
    }

    #[test]
    fn test_extract_markers() {
        let content = "[Model: gpt-4o]\n\n[Provider: OpenAI]\n\nBuild a todo app";
        let extracted = extract_model_and_provider(content);

        assert_eq!(extracted.model.as_deref(), Some("gpt-4o"));
        assert_eq!(extracted.provider.as_deref(), Some("OpenAI"));
        assert_eq!(extracted.content, "Build a todo app");
    }

    #[test]
    fn test_extract_without_markers() {
        let extracted = extract_model_and_provider("just text");
        assert_eq!(extracted.model, None);
        assert_eq!(extracted.provider, None);
        assert_eq!(extracted.content, "just text");
    }

    #[test]
    fn test_strip_selection_markers_uses_last() {
        let mut messages = vec![
            Message::user("[Model: a]\n\n[Provider: P1]\n\nfirst"),
            Message::assistant("[Model: not-me]\n\nreply"),
            Message::user("[Model: b]\n\n[Provider: P2]\n\nsecond"),
        ];
        let (model, provider) = strip_selection_markers(&mut messages);

        assert_eq!(model.as_deref(), Some("b"));
        assert_eq!(provider.as_deref(), Some("P2"));
        assert_eq!(messages[0].content, "[Model: a]\n\n[Provider: P1]\n\nfirst");
        assert_eq!(messages[1].content, "[Model: not-me]\n\nreply");
        assert_eq!(messages[2].content, "second");
    }

    #[test]
    fn test_strip_selection_markers_ignores_earlier_messages() {
        let mut messages = vec![
            Message::user("[Model: a]\n\n[Provider: P1]\n\nfirst"),
            Message::assistant("reply"),
            Message::user("no markers"),
        ];
        let (model, provider) = strip_selection_markers(&mut messages);

        assert_eq!(model, None);
        assert_eq!(provider, None);
        assert_eq!(messages[0].content, "[Model: a]\n\n[Provider: P1]\n\nfirst");
        assert_eq!(messages[2].content, "no markers");
    }

    #[test]
    fn test_continuation_message_format() {
        let selection = ModelSelection {
            model: "gpt-4o".to_string(),
            provider: "OpenAI".to_string(),
        };
        let message = continuation_message(&selection, "Continue.");
        assert_eq!(message.role, Role::User);
        assert_eq!(
            message.content,
            "[Model: gpt-4o]\n\n[Provider: OpenAI]\n\nContinue."
        );
    }

    #[test]
    fn test_last_user_message() {
        let request = ChatRequest {
            messages: vec![Message::user("one"), Message::assistant("two")],
            files: BTreeMap::new(),
            chat_mode: ChatMode::Build,
            context_optimization: false,
            max_llm_steps: None,
            prompt_id: None,
            design_scheme: None,
        };
        assert_eq!(request.last_user_message().unwrap().content, "one");
    }
}
