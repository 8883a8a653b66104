// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! chatrelay - request-handling path of a chat completion endpoint.
//!
//! Turns one client request into a multi-segment, tool-call-aware,
//! recoverable, usage-accounted stream of model output.
//!
//! Architecture highlights:
//! - `chat`: validation, context building, segment orchestration, wire format
//! - `llm`: provider abstraction, OpenAI-compatible provider, scripted mock
//! - `tools`: tool registry and mid-stream tool call interception
//! - `server`: axum router for `POST /chat` and `/health`
//! - `monitoring`: injected health collector
//! - `config`, `cli`: settings and the `chatrelay` binary's arguments

pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod monitoring;
pub mod server;
pub mod tools;

pub use error::{ApiError, RelayError, Result};
