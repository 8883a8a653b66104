// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM module for chatrelay
//!
//! Provides abstraction over different LLM providers.

pub mod factory;
pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod providers;

pub use message::*;
pub use provider::*;
