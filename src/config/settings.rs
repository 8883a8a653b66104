// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for chatrelay
//!
//! Handles loading settings from ~/.chatrelay/settings.json. Every field has
//! a default, so a missing or partial file is always usable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

mod io;
mod validation;

/// Main settings structure, stored in ~/.chatrelay/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Streaming pipeline limits and timeouts
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// LLM provider configurations
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Header every chat request must carry to identify the calling client
    #[serde(default = "default_client_header")]
    pub client_header: String,
}

/// Streaming pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Maximum provider calls per reply when continuing truncated output
    #[serde(default = "default_segment_cap")]
    pub segment_cap: u32,

    /// Maximum tokens requested per provider call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Tool steps per segment when the request does not say
    #[serde(default = "default_max_llm_steps")]
    pub default_max_llm_steps: u32,

    /// Seconds without stream activity before a stall is declared
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// Stalls recovered by continuation before giving up
    #[serde(default = "default_stall_max_retries")]
    pub stall_max_retries: u32,

    /// Per-call tool execution timeout in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Upper bound on files selected by context optimization
    #[serde(default = "default_max_context_files")]
    pub max_context_files: usize,
}

/// Configuration for LLM providers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvidersConfig {
    /// Provider used when a request names none
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Known providers, keyed by display name (e.g. "OpenAI")
    #[serde(default = "default_provider_entries")]
    pub entries: BTreeMap<String, ProviderEntry>,
}

/// One OpenAI-compatible provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderEntry {
    /// API root, e.g. https://api.openai.com/v1
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// API key stored in the settings file (env var takes precedence)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used when the request names none
    pub default_model: String,

    /// Whether calls need an API key at all (false for local servers)
    #[serde(default = "default_true")]
    pub requires_api_key: bool,
}

impl ProviderEntry {
    fn hosted(base_url: &str, api_key_env: &str, default_model: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key_env: Some(api_key_env.to_string()),
            api_key: None,
            default_model: default_model.to_string(),
            requires_api_key: true,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_client_header() -> String {
    "x-client-id".to_string()
}

fn default_segment_cap() -> u32 {
    2
}

fn default_max_tokens() -> u32 {
    8000
}

fn default_max_llm_steps() -> u32 {
    5
}

fn default_stall_timeout_secs() -> u64 {
    45
}

fn default_stall_max_retries() -> u32 {
    2
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_max_context_files() -> usize {
    5
}

fn default_provider() -> String {
    "OpenAI".to_string()
}

fn default_true() -> bool {
    true
}

fn default_provider_entries() -> BTreeMap<String, ProviderEntry> {
    let mut entries = BTreeMap::new();
    entries.insert(
        "OpenAI".to_string(),
        ProviderEntry::hosted("https://api.openai.com/v1", "OPENAI_API_KEY", "gpt-4o"),
    );
    entries.insert(
        "OpenRouter".to_string(),
        ProviderEntry::hosted(
            "https://openrouter.ai/api/v1",
            "OPENROUTER_API_KEY",
            "anthropic/claude-sonnet-4",
        ),
    );
    entries.insert(
        "Deepseek".to_string(),
        ProviderEntry::hosted(
            "https://api.deepseek.com/v1",
            "DEEPSEEK_API_KEY",
            "deepseek-chat",
        ),
    );
    entries.insert(
        "Ollama".to_string(),
        ProviderEntry {
            base_url: "http://127.0.0.1:11434/v1".to_string(),
            api_key_env: None,
            api_key: None,
            default_model: "llama3.1".to_string(),
            requires_api_key: false,
        },
    );
    entries
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            client_header: default_client_header(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_cap: default_segment_cap(),
            max_tokens: default_max_tokens(),
            default_max_llm_steps: default_max_llm_steps(),
            stall_timeout_secs: default_stall_timeout_secs(),
            stall_max_retries: default_stall_max_retries(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_context_files: default_max_context_files(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            entries: default_provider_entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_default() {
        let settings = Settings::default();
        assert_eq!(settings.server.bind, "127.0.0.1:8787");
        assert_eq!(settings.server.client_header, "x-client-id");
        assert_eq!(settings.pipeline.segment_cap, 2);
        assert_eq!(settings.pipeline.stall_timeout_secs, 45);
        assert_eq!(settings.pipeline.stall_max_retries, 2);
        assert_eq!(settings.pipeline.tool_timeout_secs, 30);
        assert_eq!(settings.pipeline.max_context_files, 5);
        assert_eq!(settings.providers.default_provider, "OpenAI");
    }

    #[test]
    fn test_default_provider_entries() {
        let entries = default_provider_entries();
        assert!(entries.contains_key("OpenAI"));
        assert!(entries.contains_key("OpenRouter"));
        assert!(!entries["Ollama"].requires_api_key);
        assert_eq!(
            entries["OpenAI"].api_key_env.as_deref(),
            Some("OPENAI_API_KEY")
        );
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"pipeline": {"segment_cap": 4}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.pipeline.segment_cap, 4);
        assert_eq!(settings.pipeline.max_tokens, 8000);
        assert_eq!(settings.server, ServerConfig::default());
        assert_eq!(settings.providers, ProvidersConfig::default());
    }

    #[test]
    fn test_provider_entry_requires_key_defaults_true() {
        let json = r#"{"base_url": "http://x/v1", "default_model": "m"}"#;
        let entry: ProviderEntry = serde_json::from_str(json).unwrap();
        assert!(entry.requires_api_key);
        assert!(entry.api_key_env.is_none());
    }
}
