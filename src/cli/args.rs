// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// chatrelay - streaming chat completion relay
#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(version, about = "Segmented, tool-aware streaming relay for chat completions")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path (defaults to ~/.chatrelay/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP server (default when no command given)
    Serve(ServeArgs),

    /// Load and validate the settings, then exit
    CheckConfig,
}

/// Arguments for `serve`
#[derive(clap::Args, Debug, Default, PartialEq, Eq)]
pub struct ServeArgs {
    /// Address to bind, overriding the settings file
    #[arg(long)]
    pub bind: Option<String>,
}
