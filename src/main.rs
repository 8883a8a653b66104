// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! chatrelay - streaming chat completion relay
//!
//! Entry point for the chatrelay server binary.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use chatrelay::cli::{Cli, Commands, ServeArgs};
use chatrelay::config::Settings;
use chatrelay::llm::factory::ProviderFactory;
use chatrelay::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on the relay's own targets. `RUST_LOG` still takes precedence.
    if cli.verbose > 0 {
        let level = if cli.verbose > 1 { "trace" } else { "debug" };
        for target in [
            "chatrelay.server",
            "chatrelay.pipeline",
            "chatrelay.orchestrator",
            "chatrelay.context",
            "chatrelay.tools",
            "chatrelay.watchdog",
            "chatrelay.provider",
        ] {
            if let Ok(parsed) = format!("{}={}", target, level).parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load_from(&path)
        .with_context(|| format!("loading settings from {}", path.display()))?;

    match cli.command {
        Some(Commands::CheckConfig) => {
            settings.validate().context("invalid settings")?;
            println!("{}: ok", path.display());
        }
        Some(Commands::Serve(args)) => run_serve(args, settings).await?,
        None => run_serve(ServeArgs::default(), settings).await?,
    }

    Ok(())
}

async fn run_serve(args: ServeArgs, mut settings: Settings) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        settings.server.bind = bind;
    }
    settings.validate().context("invalid settings")?;

    let bind = settings.server.bind.clone();
    let settings = Arc::new(settings);
    let resolver = Arc::new(ProviderFactory::new(Arc::clone(&settings)));
    let state = AppState::new(settings, resolver);
    state.check_config();

    server::serve(Arc::new(state), &bind)
        .await
        .context("server failed")?;
    Ok(())
}
