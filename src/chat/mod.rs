// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat streaming pipeline
//!
//! Everything between a validated `POST /chat` body and the lines written to
//! the client: context construction, segment orchestration with tool calls
//! and stall recovery, usage accounting, wire transformation and error
//! classification.

pub mod classifier;
pub mod context;
pub mod emitter;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod request;
pub mod streaming;
pub mod transform;
pub mod usage;
pub mod validator;
pub mod watchdog;
pub mod wire;

pub use classifier::{classify, classify_message, ClassifiedError, ErrorKind};
pub use emitter::{PipelineOutput, StreamEmitter};
pub use pipeline::ChatPipeline;
pub use request::{ChatMode, ChatRequest, ModelSelection};
pub use validator::{RequestValidator, ValidationOutcome};
