// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bobai_config::{TokenEntry, TokenStore};
use bobai_node::NodeState;
use bobai_store::SessionStore;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project_root = cli
        .project
        .canonicalize()
        .with_context(|| format!("project directory {} not found", cli.project.display()))?;
    let project = bobai_config::ensure_project(&project_root)?;
    let paths = bobai_config::project_paths(&project_root);

    let global = bobai_config::global_config_path()
        .map(|p| bobai_config::load_layer(&p))
        .unwrap_or_default();
    let mut config = bobai_config::resolve(&project.overrides, &global);
    if let Some(provider) = &cli.provider {
        config.provider = provider.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }

    let token_store = TokenStore::default_path()
        .map(TokenStore::new)
        .context("no platform config directory available")?;

    match &cli.command {
        Some(Commands::Login {
            provider,
            token,
            token_type,
        }) => {
            let provider = provider.as_deref().unwrap_or(config.provider.as_str());
            token_store.save(
                provider,
                TokenEntry {
                    token: token.clone(),
                    token_type: token_type.clone(),
                },
            )?;
            println!("stored credential for {provider}");
            Ok(())
        }

        Some(Commands::Sessions) => {
            let store = SessionStore::open(&paths.db_file)?;
            let sessions = store.list_sessions().await?;
            if sessions.is_empty() {
                println!("no sessions yet");
            }
            for s in sessions {
                println!(
                    "{}  {}  {}",
                    s.id,
                    s.updated_at,
                    s.title.as_deref().unwrap_or("(untitled)")
                );
            }
            Ok(())
        }

        Some(Commands::ShowConfig) => {
            println!(
                "{}",
                serde_json::json!({
                    "project": project.id,
                    "provider": config.provider,
                    "model": config.model,
                })
            );
            Ok(())
        }

        None => {
            let token = token_store.get(&config.provider).map(|t| t.token);
            if token.is_none() {
                tracing::warn!(
                    provider = %config.provider,
                    "no stored credential; provider calls will fail until `bobai login` is run"
                );
            }
            let provider =
                bobai_model::from_config(&config.provider, token, cli.base_url.as_deref())?;

            let state = NodeState {
                store: SessionStore::open(&paths.db_file)?,
                provider,
                model: config.model,
                project_root,
            };
            bobai_node::serve(Arc::new(state), cli.listen).await
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
