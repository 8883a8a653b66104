// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Progress annotations
//!
//! One [`ProgressTracker`] per request hands out strictly increasing `order`
//! values, whichever stages actually run.

use serde::{Deserialize, Serialize};

/// Pipeline stage a progress event reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLabel {
    Summary,
    Context,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    InProgress,
    Complete,
}

/// A progress update sent to the client as an annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub label: ProgressLabel,
    pub status: ProgressStatus,
    pub order: u32,
    pub message: String,
}

/// Per-request source of progress events
#[derive(Debug)]
pub struct ProgressTracker {
    next_order: u32,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self { next_order: 1 }
    }

    /// Create the next event in order
    pub fn event(
        &mut self,
        label: ProgressLabel,
        status: ProgressStatus,
        message: impl Into<String>,
    ) -> ProgressEvent {
        let order = self.next_order;
        self.next_order += 1;
        ProgressEvent {
            label,
            status,
            order,
            message: message.into(),
        }
    }

    pub fn started(&mut self, label: ProgressLabel, message: impl Into<String>) -> ProgressEvent {
        self.event(label, ProgressStatus::InProgress, message)
    }

    pub fn completed(&mut self, label: ProgressLabel, message: impl Into<String>) -> ProgressEvent {
        self.event(label, ProgressStatus::Complete, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_strictly_increase() {
        let mut tracker = ProgressTracker::new();
        let a = tracker.started(ProgressLabel::Summary, "Analysing Request");
        let b = tracker.completed(ProgressLabel::Summary, "Analysis Complete");
        let c = tracker.started(ProgressLabel::Response, "Generating Response");

        assert_eq!(a.order, 1);
        assert_eq!(b.order, 2);
        assert_eq!(c.order, 3);
    }

    #[test]
    fn test_wire_shape() {
        let mut tracker = ProgressTracker::new();
        let event = tracker.started(ProgressLabel::Context, "Determining Files to Read");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["label"], "context");
        assert_eq!(json["status"], "in-progress");
        assert_eq!(json["order"], 1);
        assert_eq!(json["message"], "Determining Files to Read");
    }
}
