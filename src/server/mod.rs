// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! HTTP surface: `POST /chat` and `/health`

pub mod credentials;
pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::chat::RequestValidator;
use crate::config::Settings;
use crate::error::{RelayError, Result};
use crate::llm::factory::ProviderResolver;
use crate::monitoring::{HealthCollector, HealthStatus, InMemoryHealthCollector};
use crate::tools::ToolRegistry;

/// Shared server state
pub struct AppState {
    pub settings: Arc<Settings>,
    pub resolver: Arc<dyn ProviderResolver>,
    pub tools: Arc<ToolRegistry>,
    pub health: Arc<dyn HealthCollector>,
    pub validator: RequestValidator,
}

impl AppState {
    pub fn new(settings: Arc<Settings>, resolver: Arc<dyn ProviderResolver>) -> Self {
        let validator = RequestValidator::new(settings.server.client_header.clone());
        Self {
            settings,
            resolver,
            tools: Arc::new(ToolRegistry::new()),
            health: Arc::new(InMemoryHealthCollector::new()),
            validator,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_health(mut self, health: Arc<dyn HealthCollector>) -> Self {
        self.health = health;
        self
    }

    /// Record the configuration check on the health collector
    pub fn check_config(&self) {
        match self.settings.validate() {
            Ok(()) => self
                .health
                .update_health_check("config", HealthStatus::Healthy, None),
            Err(e) => self.health.update_health_check(
                "config",
                HealthStatus::Unhealthy,
                Some(e.to_string()),
            ),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/health", get(handlers::health).post(handlers::health))
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(state: Arc<AppState>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| RelayError::Config(format!("cannot bind {}: {}", bind, e)))?;

    tracing::info!(target: "chatrelay.server", bind, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!(target: "chatrelay.server", "shutting down");
        })
        .await?;
    Ok(())
}
