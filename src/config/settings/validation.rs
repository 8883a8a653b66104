// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{RelayError, Result};

use super::{ProviderEntry, Settings};

impl Settings {
    /// Look up a provider entry by name, ignoring ASCII case.
    pub fn provider(&self, name: &str) -> Option<(&str, &ProviderEntry)> {
        self.providers
            .entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, entry)| (key.as_str(), entry))
    }

    /// Get the API key for a provider, checking its env var first.
    pub fn api_key_for(&self, name: &str) -> Option<String> {
        let (_, entry) = self.provider(name)?;
        // Priority: env var > config file.
        entry
            .api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
            .or_else(|| entry.api_key.clone())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        let pipeline = &self.pipeline;

        if pipeline.segment_cap == 0 {
            problems.push("pipeline.segment_cap must be at least 1");
        }
        if pipeline.max_tokens == 0 {
            problems.push("pipeline.max_tokens must be at least 1");
        }
        if pipeline.default_max_llm_steps == 0 {
            problems.push("pipeline.default_max_llm_steps must be at least 1");
        }
        if pipeline.stall_timeout_secs == 0 {
            problems.push("pipeline.stall_timeout_secs must be at least 1");
        }
        if pipeline.tool_timeout_secs == 0 {
            problems.push("pipeline.tool_timeout_secs must be at least 1");
        }
        if pipeline.max_context_files == 0 {
            problems.push("pipeline.max_context_files must be at least 1");
        }
        if self.server.client_header.trim().is_empty() {
            problems.push("server.client_header must not be empty");
        }
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            problems.push("server.bind must be a socket address such as 127.0.0.1:8787");
        }
        if self.provider(&self.providers.default_provider).is_none() {
            problems.push("providers.default_provider must name a configured provider");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(RelayError::Config(problems.join("; ")))
        }
    }
}
