// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Request validation
//!
//! Transport- and payload-level checks that run before any provider work.
//! Validation never fails with an error of its own: it reports every failing
//! field at once.

use axum::http::{header, HeaderMap, Method};
use serde_json::Value;

use crate::error::{RelayError, Result};

const ROLES: [&str; 4] = ["user", "assistant", "system", "tool"];

/// One failing field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(Vec<FieldError>),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid)
    }

    pub fn errors(&self) -> &[FieldError] {
        match self {
            ValidationOutcome::Valid => &[],
            ValidationOutcome::Invalid(errors) => errors,
        }
    }

    /// Convert into a `Validation` error listing every failing field
    pub fn into_result(self) -> Result<()> {
        match self {
            ValidationOutcome::Valid => Ok(()),
            ValidationOutcome::Invalid(errors) => {
                let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Err(RelayError::Validation(listed.join("; ")))
            }
        }
    }
}

/// Validates chat requests
#[derive(Debug, Clone)]
pub struct RequestValidator {
    client_header: String,
}

impl RequestValidator {
    pub fn new(client_header: impl Into<String>) -> Self {
        Self {
            client_header: client_header.into().to_ascii_lowercase(),
        }
    }

    pub fn client_header(&self) -> &str {
        &self.client_header
    }

    pub fn validate(&self, method: &Method, headers: &HeaderMap, body: &Value) -> ValidationOutcome {
        let mut errors = Vec::new();

        self.check_headers(method, headers, &mut errors);
        check_body(body, &mut errors);

        if errors.is_empty() {
            ValidationOutcome::Valid
        } else {
            ValidationOutcome::Invalid(errors)
        }
    }

    fn check_headers(&self, method: &Method, headers: &HeaderMap, errors: &mut Vec<FieldError>) {
        let state_changing = matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        );
        if state_changing {
            let is_json = headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(';').next())
                .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
                .unwrap_or(false);
            if !is_json {
                errors.push(FieldError::new(
                    "content-type",
                    "must be application/json",
                ));
            }
        }

        let has_client = headers
            .get(self.client_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        if !has_client {
            errors.push(FieldError::new(
                self.client_header.clone(),
                "header is required",
            ));
        }
    }
}

fn check_body(body: &Value, errors: &mut Vec<FieldError>) {
    let Some(object) = body.as_object() else {
        errors.push(FieldError::new("body", "must be a JSON object"));
        return;
    };

    match object.get("messages").and_then(Value::as_array) {
        Some(messages) if !messages.is_empty() => {
            for (i, message) in messages.iter().enumerate() {
                check_message(i, message, errors);
            }
        }
        _ => errors.push(FieldError::new("messages", "must be a non-empty array")),
    }

    match object.get("chatMode").and_then(Value::as_str) {
        Some("discuss") | Some("build") => {}
        _ => errors.push(FieldError::new(
            "chatMode",
            "must be \"discuss\" or \"build\"",
        )),
    }

    match object.get("files") {
        None | Some(Value::Null) => {}
        Some(Value::Object(files)) => {
            for (path, content) in files {
                if !content.is_string() {
                    errors.push(FieldError::new(
                        format!("files[{}]", path),
                        "must be a string",
                    ));
                }
            }
        }
        Some(_) => errors.push(FieldError::new("files", "must be an object")),
    }

    match object.get("maxLLMSteps") {
        None | Some(Value::Null) => {}
        Some(steps) => {
            let positive = steps
                .as_u64()
                .map(|n| n >= 1 && n <= u64::from(u32::MAX))
                .unwrap_or(false);
            if !positive {
                errors.push(FieldError::new(
                    "maxLLMSteps",
                    "must be a positive integer",
                ));
            }
        }
    }

    match object.get("contextOptimization") {
        None | Some(Value::Null) | Some(Value::Bool(_)) => {}
        Some(_) => errors.push(FieldError::new("contextOptimization", "must be a boolean")),
    }
}

fn check_message(index: usize, message: &Value, errors: &mut Vec<FieldError>) {
    let Some(message) = message.as_object() else {
        errors.push(FieldError::new(
            format!("messages[{}]", index),
            "must be an object",
        ));
        return;
    };

    let role_ok = message
        .get("role")
        .and_then(Value::as_str)
        .map(|role| ROLES.contains(&role))
        .unwrap_or(false);
    if !role_ok {
        errors.push(FieldError::new(
            format!("messages[{}].role", index),
            "must be one of user, assistant, system, tool",
        ));
    }

    if !message.get("content").map(Value::is_string).unwrap_or(false) {
        errors.push(FieldError::new(
            format!("messages[{}].content", index),
            "must be a string",
        ));
    }

    if let Some(id) = message.get("id") {
        if !id.is_string() && !id.is_null() {
            errors.push(FieldError::new(
                format!("messages[{}].id", index),
                "must be a string",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert("x-client-id", HeaderValue::from_static("web-1"));
        headers
    }

    fn body() -> Value {
        json!({
            "messages": [{"id": "1", "role": "user", "content": "hi"}],
            "chatMode": "build",
        })
    }

    fn validator() -> RequestValidator {
        RequestValidator::new("X-Client-Id")
    }

    fn fields(outcome: &ValidationOutcome) -> Vec<&str> {
        outcome.errors().iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_request() {
        let outcome = validator().validate(&Method::POST, &headers(), &body());
        assert!(outcome.is_valid());
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn test_header_name_is_lowercased() {
        assert_eq!(validator().client_header(), "x-client-id");
    }

    #[test]
    fn test_missing_client_header() {
        let mut headers = headers();
        headers.remove("x-client-id");
        let outcome = validator().validate(&Method::POST, &headers, &body());
        assert_eq!(fields(&outcome), vec!["x-client-id"]);
    }

    #[test]
    fn test_blank_client_header() {
        let mut headers = headers();
        headers.insert("x-client-id", HeaderValue::from_static("   "));
        let outcome = validator().validate(&Method::POST, &headers, &body());
        assert_eq!(fields(&outcome), vec!["x-client-id"]);
    }

    #[test]
    fn test_wrong_content_type() {
        let mut headers = headers();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let outcome = validator().validate(&Method::POST, &headers, &body());
        assert_eq!(fields(&outcome), vec!["content-type"]);
    }

    #[test]
    fn test_content_type_not_checked_for_get() {
        let mut headers = headers();
        headers.remove(header::CONTENT_TYPE);
        let outcome = validator().validate(&Method::GET, &headers, &body());
        assert!(outcome.is_valid());
    }

    #[test]
    fn test_invalid_chat_mode() {
        let mut body = body();
        body["chatMode"] = json!("chat");
        let outcome = validator().validate(&Method::POST, &headers(), &body);
        assert_eq!(fields(&outcome), vec!["chatMode"]);
    }

    #[test]
    fn test_non_object_body() {
        let outcome = validator().validate(&Method::POST, &headers(), &json!([1, 2]));
        assert_eq!(fields(&outcome), vec!["body"]);
    }

    #[test]
    fn test_empty_messages() {
        let mut body = body();
        body["messages"] = json!([]);
        let outcome = validator().validate(&Method::POST, &headers(), &body);
        assert_eq!(fields(&outcome), vec!["messages"]);
    }

    #[test]
    fn test_bad_message_entries() {
        let mut body = body();
        body["messages"] = json!([
            "nope",
            {"role": "robot", "content": "x"},
            {"role": "user", "content": 5, "id": 7},
        ]);
        let outcome = validator().validate(&Method::POST, &headers(), &body);
        assert_eq!(
            fields(&outcome),
            vec![
                "messages[0]",
                "messages[1].role",
                "messages[2].content",
                "messages[2].id"
            ]
        );
    }

    #[test]
    fn test_optional_fields() {
        let mut body = body();
        body["files"] = json!({"/home/project/a.ts": 1});
        body["maxLLMSteps"] = json!(0);
        body["contextOptimization"] = json!("yes");
        let outcome = validator().validate(&Method::POST, &headers(), &body);
        assert_eq!(
            fields(&outcome),
            vec!["files[/home/project/a.ts]", "maxLLMSteps", "contextOptimization"]
        );
    }

    #[test]
    fn test_all_errors_reported_together() {
        let mut headers = headers();
        headers.remove("x-client-id");
        let mut body = body();
        body["chatMode"] = json!(null);
        let err = validator()
            .validate(&Method::POST, &headers, &body)
            .into_result()
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("x-client-id"));
        assert!(message.contains("chatMode"));
    }
}
