// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Health monitoring
//!
//! The only state shared across requests. Collectors are injected as
//! `Arc<dyn HealthCollector>`; the in-memory one keeps append-only atomic
//! error counters plus the latest result of each named health check.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::chat::classifier::ErrorKind;

/// Overall or per-check health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Whether `/health` should answer 200
    pub fn is_serving(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checked_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCount {
    pub kind: ErrorKind,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

/// Body of `/health`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: String,
    pub checks: Vec<HealthCheck>,
    pub error_summary: Vec<ErrorCount>,
}

pub trait HealthCollector: Send + Sync {
    /// Count one classified failure
    fn record_error(&self, kind: ErrorKind, message: &str);

    /// Store the latest result of a named check
    fn update_health_check(&self, name: &str, status: HealthStatus, detail: Option<String>);

    fn health_status(&self) -> HealthReport;
}

/// Collector kept in process memory
pub struct InMemoryHealthCollector {
    counts: [AtomicU64; ErrorKind::ALL.len()],
    last_messages: RwLock<HashMap<ErrorKind, String>>,
    checks: RwLock<BTreeMap<String, HealthCheck>>,
}

impl Default for InMemoryHealthCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHealthCollector {
    pub fn new() -> Self {
        Self {
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
            last_messages: RwLock::new(HashMap::new()),
            checks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Errors recorded so far for one kind
    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.counts[kind_index(kind)].load(Ordering::Relaxed)
    }
}

fn kind_index(kind: ErrorKind) -> usize {
    ErrorKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(ErrorKind::ALL.len() - 1)
}

impl HealthCollector for InMemoryHealthCollector {
    fn record_error(&self, kind: ErrorKind, message: &str) {
        self.counts[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
        match self.last_messages.write() {
            Ok(mut last) => {
                last.insert(kind, message.to_string());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(kind, message.to_string());
            }
        }
    }

    fn update_health_check(&self, name: &str, status: HealthStatus, detail: Option<String>) {
        let check = HealthCheck {
            name: name.to_string(),
            status,
            detail,
            checked_at: chrono::Utc::now().to_rfc3339(),
        };
        match self.checks.write() {
            Ok(mut checks) => {
                checks.insert(name.to_string(), check);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(name.to_string(), check);
            }
        }
    }

    fn health_status(&self) -> HealthReport {
        let checks: Vec<HealthCheck> = match self.checks.read() {
            Ok(checks) => checks.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        let last_messages = match self.last_messages.read() {
            Ok(last) => last.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        let error_summary = ErrorKind::ALL
            .iter()
            .map(|kind| ErrorCount {
                kind: *kind,
                count: self.error_count(*kind),
                last_message: last_messages.get(kind).cloned(),
            })
            .filter(|count| count.count > 0)
            .collect();

        let status = checks
            .iter()
            .map(|check| check.status)
            .max_by_key(HealthStatus::severity)
            .unwrap_or(HealthStatus::Healthy);

        HealthReport {
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            checks,
            error_summary,
        }
    }
}

/// Collector that records nothing and always reports healthy
#[derive(Debug, Default)]
pub struct NoopHealthCollector;

impl HealthCollector for NoopHealthCollector {
    fn record_error(&self, _kind: ErrorKind, _message: &str) {}

    fn update_health_check(&self, _name: &str, _status: HealthStatus, _detail: Option<String>) {}

    fn health_status(&self) -> HealthReport {
        HealthReport {
            status: HealthStatus::Healthy,
            timestamp: chrono::Utc::now().to_rfc3339(),
            checks: vec![],
            error_summary: vec![],
        }
    }
}
