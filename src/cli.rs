// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bobai", version, about = "Local AI coding assistant server")]
pub struct Cli {
    /// Project directory to serve
    #[arg(short, long, default_value = ".")]
    pub project: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Override the configured provider id
    #[arg(long)]
    pub provider: Option<String>,

    /// Override the configured model
    #[arg(long)]
    pub model: Option<String>,

    /// Provider base URL override (proxies, local servers)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store a provider credential in the auth file
    Login {
        /// Provider id the token belongs to (defaults to the resolved provider)
        #[arg(long)]
        provider: Option<String>,
        /// The token value
        #[arg(long)]
        token: String,
        /// Token scheme, e.g. bearer or oauth
        #[arg(long, default_value = "bearer")]
        token_type: String,
    },
    /// List this project's stored sessions
    Sessions,
    /// Print the resolved configuration
    ShowConfig,
}
