// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Configuration module for chatrelay
//!
//! Handles loading and validating server, pipeline and provider settings.

pub mod settings;

pub use settings::*;
