// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Credential cookies
//!
//! `apiKeys` and `providers` cookies hold URL-encoded JSON objects. Anything
//! malformed degrades to an empty map with a warning; it never fails the
//! request.

use axum::http::{header, HeaderMap};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::llm::factory::Credentials;

const API_KEYS_COOKIE: &str = "apiKeys";
const PROVIDERS_COOKIE: &str = "providers";

/// Parse credentials from every `Cookie` header
pub fn parse_cookies(headers: &HeaderMap) -> Credentials {
    let mut credentials = Credentials::default();

    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            tracing::warn!(target: "chatrelay.server", "ignoring non-ASCII cookie header");
            continue;
        };
        for pair in value.split(';') {
            let Some((name, raw)) = pair.trim().split_once('=') else {
                continue;
            };
            match name.trim() {
                API_KEYS_COOKIE => {
                    if let Some(object) = decode_object(API_KEYS_COOKIE, raw) {
                        credentials.api_keys = object
                            .into_iter()
                            .filter_map(|(provider, key)| match key {
                                Value::String(key) => Some((provider, key)),
                                _ => None,
                            })
                            .collect();
                    }
                }
                PROVIDERS_COOKIE => {
                    if let Some(object) = decode_object(PROVIDERS_COOKIE, raw) {
                        credentials.provider_settings = object;
                    }
                }
                _ => {}
            }
        }
    }

    credentials
}

fn decode_object(cookie: &str, raw: &str) -> Option<BTreeMap<String, Value>> {
    let decoded = match urlencoding::decode(raw.trim()) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!(target: "chatrelay.server", cookie, error = %e, "cookie is not valid UTF-8 after decoding");
            return None;
        }
    };
    match serde_json::from_str::<BTreeMap<String, Value>>(&decoded) {
        Ok(object) => Some(object),
        Err(e) => {
            tracing::warn!(target: "chatrelay.server", cookie, error = %e, "malformed cookie, using empty credentials");
            None
        }
    }
}
