// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-request token usage totals

use crate::llm::provider::Usage;

/// Merges per-call usage into one running total. Never shared across requests.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    totals: Usage,
    calls: u32,
}

impl UsageAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one provider call's usage
    pub fn add(&mut self, delta: Usage) {
        self.totals.prompt_tokens = self.totals.prompt_tokens.saturating_add(delta.prompt_tokens);
        self.totals.completion_tokens = self
            .totals
            .completion_tokens
            .saturating_add(delta.completion_tokens);
        self.totals.total_tokens = self.totals.total_tokens.saturating_add(delta.total_tokens);
        self.calls += 1;
    }

    pub fn totals(&self) -> Usage {
        self.totals
    }

    /// Number of calls recorded
    pub fn calls(&self) -> u32 {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_totals() {
        let acc = UsageAccumulator::new();
        assert_eq!(acc.totals(), Usage::default());
        assert_eq!(acc.calls(), 0);
    }

    #[test]
    fn test_additive() {
        let mut acc = UsageAccumulator::new();
        acc.add(Usage::new(10, 5));
        acc.add(Usage::new(3, 4));

        assert_eq!(acc.totals(), Usage::new(13, 9));
        assert_eq!(acc.calls(), 2);
    }

    #[test]
    fn test_saturates() {
        let mut acc = UsageAccumulator::new();
        acc.add(Usage {
            prompt_tokens: u64::MAX,
            completion_tokens: 0,
            total_tokens: u64::MAX,
        });
        acc.add(Usage::new(1, 1));
        assert_eq!(acc.totals().prompt_tokens, u64::MAX);
        assert_eq!(acc.totals().completion_tokens, 1);
    }
}
