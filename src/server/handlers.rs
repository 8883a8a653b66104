// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! HTTP handlers

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::credentials::parse_cookies;
use super::AppState;
use crate::chat::classifier::{classify, ClassifiedError, ErrorKind};
use crate::chat::request::{strip_selection_markers, ChatRequest, ModelSelection};
use crate::chat::{ChatPipeline, PipelineOutput};
use crate::error::RelayError;
use crate::tools::ToolCallInterceptor;

/// `POST /chat`
pub async fn chat(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    if let Err(e) = state.validator.validate(&method, &headers, &value).into_result() {
        return reject(&state, &e, None);
    }
    let mut request: ChatRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            let error = RelayError::Validation(format!("body: {}", e));
            return reject(&state, &error, None);
        }
    };

    let credentials = parse_cookies(&headers);
    let (model, provider) = strip_selection_markers(&mut request.messages);
    let provider = provider.unwrap_or_else(|| state.resolver.default_provider());
    let Some(model) = model.or_else(|| state.resolver.default_model(&provider)) else {
        let error = RelayError::Config(format!("no model configured for provider {}", provider));
        return reject(&state, &error, Some(&provider));
    };

    let llm = match state.resolver.resolve(&provider, &credentials) {
        Ok(llm) => llm,
        Err(e) => return reject(&state, &e, Some(&provider)),
    };

    tracing::info!(
        target: "chatrelay.server",
        provider = %provider,
        model = %model,
        mode = ?request.chat_mode,
        messages = request.messages.len(),
        prompt_id = request.prompt_id.as_deref().unwrap_or("-"),
        "chat request"
    );

    let interceptor = Arc::new(ToolCallInterceptor::new(
        Arc::clone(&state.tools),
        Duration::from_secs(state.settings.pipeline.tool_timeout_secs),
    ));
    let pipeline = ChatPipeline::new(
        llm,
        interceptor,
        state.settings.pipeline.clone(),
        Arc::clone(&state.health),
    );
    let selection = ModelSelection {
        model,
        provider: provider.clone(),
    };
    let mut rx = pipeline.spawn(request, selection);

    match rx.recv().await {
        Some(PipelineOutput::Line(first)) => stream_response(first, rx),
        Some(PipelineOutput::Failed(error)) => error_response(&error, Some(&provider)),
        None => {
            let error = ClassifiedError::new(ErrorKind::Unknown, "pipeline ended without output");
            error_response(&error, Some(&provider))
        }
    }
}

/// `GET|POST /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let report = state.health.health_status();
    let status = if report.status.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

fn stream_response(first: String, mut rx: mpsc::Receiver<PipelineOutput>) -> Response {
    let body = async_stream::stream! {
        yield Ok::<_, Infallible>(Bytes::from(first));
        while let Some(output) = rx.recv().await {
            match output {
                PipelineOutput::Line(line) => yield Ok(Bytes::from(line)),
                PipelineOutput::Failed(error) => {
                    yield Ok(Bytes::from(format!("3:{}\n", Value::from(error.message))));
                }
            }
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CONNECTION, "keep-alive"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// Classify, record and answer a failure raised before the pipeline started
fn reject(state: &AppState, error: &RelayError, provider: Option<&str>) -> Response {
    let classified = classify(error);
    state
        .health
        .record_error(classified.kind, &classified.message);
    tracing::warn!(
        target: "chatrelay.server",
        kind = %classified.kind,
        status = classified.http_status,
        error = %error,
        "request rejected"
    );
    error_response(&classified, provider)
}

fn error_response(error: &ClassifiedError, provider: Option<&str>) -> Response {
    let status =
        StatusCode::from_u16(error.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "error": true,
        "message": error.message,
        "statusCode": error.http_status,
        "isRetryable": error.retryable,
        "provider": provider,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    (status, Json(body)).into_response()
}
