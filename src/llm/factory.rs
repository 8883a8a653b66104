// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Provider factory for creating LLM providers
//!
//! Turns a provider name plus per-request credentials into a provider
//! instance. The server only sees the [`ProviderResolver`] trait, so tests can
//! hand it a scripted provider instead.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{ApiError, RelayError, Result};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::OpenAiCompatProvider;

/// Credentials supplied by the client with a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    /// Provider name -> API key
    pub api_keys: BTreeMap<String, String>,
    /// Provider name -> provider settings object (e.g. `{"baseUrl": ...}`)
    pub provider_settings: BTreeMap<String, serde_json::Value>,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.api_keys.is_empty() && self.provider_settings.is_empty()
    }

    /// API key for a provider, ignoring ASCII case in the name
    pub fn api_key(&self, provider: &str) -> Option<&str> {
        self.api_keys
            .iter()
            .find(|(name, key)| name.eq_ignore_ascii_case(provider) && !key.trim().is_empty())
            .map(|(_, key)| key.as_str())
    }

    /// Base URL override for a provider, if the client sent one
    pub fn base_url(&self, provider: &str) -> Option<&str> {
        self.provider_settings
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(provider))
            .and_then(|(_, value)| value.get("baseUrl"))
            .and_then(|url| url.as_str())
            .filter(|url| !url.trim().is_empty())
    }
}

/// Resolves provider names into provider instances
pub trait ProviderResolver: Send + Sync {
    /// Provider used when the request does not name one
    fn default_provider(&self) -> String;

    /// Model used for `provider` when the request does not name one
    fn default_model(&self, provider: &str) -> Option<String>;

    /// Create a provider for this request
    fn resolve(&self, provider: &str, credentials: &Credentials) -> Result<Arc<dyn LlmProvider>>;
}

/// Factory creating OpenAI-compatible providers from settings
pub struct ProviderFactory {
    settings: Arc<Settings>,
}

impl ProviderFactory {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }
}

impl ProviderResolver for ProviderFactory {
    fn default_provider(&self) -> String {
        self.settings.providers.default_provider.clone()
    }

    fn default_model(&self, provider: &str) -> Option<String> {
        self.settings
            .provider(provider)
            .map(|(_, entry)| entry.default_model.clone())
    }

    fn resolve(&self, provider: &str, credentials: &Credentials) -> Result<Arc<dyn LlmProvider>> {
        let (name, entry) = self
            .settings
            .provider(provider)
            .ok_or_else(|| RelayError::Config(format!("Unknown provider: {}", provider)))?;

        // Priority: request cookie > env var > config file.
        let api_key = credentials
            .api_key(name)
            .map(str::to_string)
            .or_else(|| self.settings.api_key_for(name));
        if entry.requires_api_key && api_key.is_none() {
            return Err(ApiError::MissingApiKey(name.to_string()).into());
        }

        let base_url = credentials
            .base_url(name)
            .map(str::to_string)
            .unwrap_or_else(|| entry.base_url.clone());

        tracing::debug!(
            target: "chatrelay.provider",
            provider = name,
            base_url = %base_url,
            "resolved provider"
        );

        Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)))
    }
}

/// Resolver that always hands out the same provider instance
pub struct StaticProviderResolver {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl StaticProviderResolver {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl ProviderResolver for StaticProviderResolver {
    fn default_provider(&self) -> String {
        self.provider.name().to_string()
    }

    fn default_model(&self, _provider: &str) -> Option<String> {
        Some(self.model.clone())
    }

    fn resolve(&self, _provider: &str, _credentials: &Credentials) -> Result<Arc<dyn LlmProvider>> {
        Ok(Arc::clone(&self.provider))
    }
}
