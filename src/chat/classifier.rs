// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error classification
//!
//! Maps any [`RelayError`] onto the public taxonomy: a stable kind, the HTTP
//! status it answers with and whether the client may retry. Typed errors map
//! structurally; anything else falls back to [`classify_message`].

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, RelayError};

/// Stable error kinds exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    Auth,
    PaymentRequired,
    RateLimited,
    Timeout,
    Network,
    MalformedResponse,
    SegmentCapExceeded,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Validation,
        ErrorKind::Auth,
        ErrorKind::PaymentRequired,
        ErrorKind::RateLimited,
        ErrorKind::Timeout,
        ErrorKind::Network,
        ErrorKind::MalformedResponse,
        ErrorKind::SegmentCapExceeded,
        ErrorKind::Unknown,
    ];

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::Auth => 401,
            ErrorKind::PaymentRequired => 402,
            ErrorKind::RateLimited => 429,
            ErrorKind::Timeout => 408,
            ErrorKind::Network => 503,
            ErrorKind::MalformedResponse => 400,
            ErrorKind::SegmentCapExceeded => 500,
            ErrorKind::Unknown => 500,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::Network | ErrorKind::Unknown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::PaymentRequired => "payment-required",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::MalformedResponse => "malformed-response",
            ErrorKind::SegmentCapExceeded => "segment-cap-exceeded",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure normalized for clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub http_status: u16,
    pub message: String,
    pub retryable: bool,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            http_status: kind.http_status(),
            message: message.into(),
            retryable: kind.retryable(),
        }
    }
}

/// Classify a relay error
pub fn classify(error: &RelayError) -> ClassifiedError {
    let kind = match error {
        RelayError::Validation(_) => ErrorKind::Validation,
        RelayError::SegmentCapExceeded { .. } => ErrorKind::SegmentCapExceeded,
        RelayError::Stalled { .. } => ErrorKind::Timeout,
        RelayError::Json(_) => ErrorKind::MalformedResponse,
        RelayError::Api(api) => classify_api(api),
        RelayError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
        RelayError::Http(e) if e.is_connect() => ErrorKind::Network,
        other => classify_message(&other.to_string()),
    };
    ClassifiedError::new(kind, error.to_string())
}

fn classify_api(error: &ApiError) -> ErrorKind {
    match error {
        ApiError::AuthenticationFailed | ApiError::MissingApiKey(_) => ErrorKind::Auth,
        ApiError::PaymentRequired(_) => ErrorKind::PaymentRequired,
        ApiError::RateLimited(_) => ErrorKind::RateLimited,
        ApiError::Timeout => ErrorKind::Timeout,
        ApiError::Network(_) => ErrorKind::Network,
        ApiError::InvalidResponse(_) => ErrorKind::MalformedResponse,
        ApiError::ServerError { status, message } => match status {
            401 | 403 => ErrorKind::Auth,
            402 => ErrorKind::PaymentRequired,
            429 => ErrorKind::RateLimited,
            408 | 504 => ErrorKind::Timeout,
            502 | 503 => ErrorKind::Network,
            _ => classify_message(message),
        },
        ApiError::ModelNotFound(message) | ApiError::StreamError(message) => {
            classify_message(message)
        }
    }
}

/// Message patterns checked in order; the first match wins
const MESSAGE_PATTERNS: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::Validation,
        &["invalid request", "validation failed"],
    ),
    (
        ErrorKind::SegmentCapExceeded,
        &["maximum segments reached"],
    ),
    (
        ErrorKind::Auth,
        &[
            "api key",
            "api_key",
            "unauthorized",
            "authentication",
            "invalid key",
        ],
    ),
    (
        ErrorKind::PaymentRequired,
        &[
            "payment required",
            "insufficient credit",
            "insufficient_quota",
            "insufficient balance",
            "billing",
        ],
    ),
    (
        ErrorKind::RateLimited,
        &["rate limit", "rate_limit", "too many requests"],
    ),
    (ErrorKind::Timeout, &["timeout", "timed out"]),
    (
        ErrorKind::Network,
        &[
            "network",
            "econnrefused",
            "enotfound",
            "connection refused",
            "connection reset",
            "fetch failed",
            "service unavailable",
        ],
    ),
    (
        ErrorKind::MalformedResponse,
        &[
            "invalid json",
            "malformed",
            "unexpected token",
            "invalid api response",
            "json error",
        ],
    ),
];

/// Classify free-form error text
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    MESSAGE_PATTERNS
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}
