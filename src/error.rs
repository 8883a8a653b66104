// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for chatrelay
//!
//! `RelayError` is the crate-wide error; `ApiError` covers failures reported
//! by (or while talking to) a model provider. Mapping either onto the public
//! error taxonomy is the job of [`crate::chat::classifier`].

use thiserror::Error;

/// Main error type for relay operations
#[derive(Error, Debug)]
pub enum RelayError {
    /// Provider-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Request failed validation
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Tool execution errors
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Length-truncated reply could not be continued any further
    #[error("Cannot continue message: maximum segments reached ({segments})")]
    SegmentCapExceeded { segments: u32 },

    /// Stream stayed silent past the watchdog window with no retries left
    #[error("Stream stalled: no output received after {attempts} stall recoveries")]
    Stalled { attempts: u32 },

    /// The client went away mid-request
    #[error("Request cancelled by client")]
    Cancelled,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Provider-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid or missing API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// No API key configured or supplied for the provider
    #[error("Missing API key for provider {0}")]
    MissingApiKey(String),

    /// Account has no remaining credit
    #[error("Payment required: {0}")]
    PaymentRequired(String),

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Requested model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Error event reported inside a stream
    #[error("Streaming error: {0}")]
    StreamError(String),
}

impl ApiError {
    /// Map an in-stream provider error event onto a typed error.
    pub fn from_stream_event(error_type: &str, message: &str) -> Self {
        match error_type {
            "authentication_error" | "invalid_api_key" => ApiError::AuthenticationFailed,
            "rate_limit_error" | "rate_limit_exceeded" | "rate_limit" => ApiError::RateLimited(0),
            "insufficient_quota" | "payment_required" => {
                ApiError::PaymentRequired(message.to_string())
            }
            "timeout" => ApiError::Timeout,
            "invalid_response" => ApiError::InvalidResponse(message.to_string()),
            "overloaded_error" | "network_error" => ApiError::Network(message.to_string()),
            _ => ApiError::StreamError(message.to_string()),
        }
    }
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
