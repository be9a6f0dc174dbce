/*
 * Steward - Community Workspace Reconciliation Engine
 * Copyright (C) 2025 Steward team
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Steward daemon - converges a community workspace to its declared
//! structure, either once (`apply`) or continuously (`serve`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as AnyhowContext;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use steward::config::BaselineConfig;
use steward::jobs;
use steward::sync::{run_promotion_reconciliation, Context};
use steward::{ConfigStore, JsonFileStore, RestDirectory, StructureConfig};

#[derive(Parser)]
#[command(name = "stewardd")]
#[command(about = "Community workspace reconciliation engine", long_about = None)]
#[command(version)]
struct Cli {
    /// API token used against the workspace platform
    #[arg(long, env = "STEWARD_API_TOKEN", hide_env_values = true)]
    token: String,

    /// Identifier of the managed workspace
    #[arg(long, env = "STEWARD_WORKSPACE_ID")]
    workspace_id: u64,

    /// Base URL of the platform REST API
    #[arg(long, env = "STEWARD_API_URL", default_value = RestDirectory::DEFAULT_BASE_URL)]
    api_url: String,

    /// Path to the baseline document
    #[arg(long, env = "STEWARD_BASELINE", default_value = "base.config.json")]
    baseline: PathBuf,

    /// Path where the accepted structure document is persisted
    #[arg(long, env = "STEWARD_STORE", default_value = "structure.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the startup sync, then resync nightly until stopped
    Serve,

    /// Apply one structure document and persist it on success
    Apply {
        /// Path to the structure document
        config: PathBuf,
    },

    /// Apply the baseline document only
    Baseline,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let baseline = BaselineConfig::from_file(&cli.baseline)
        .with_context(|| format!("loading baseline document {}", cli.baseline.display()))?;
    let directory = Arc::new(RestDirectory::new(
        cli.api_url.clone(),
        cli.token.clone(),
        cli.workspace_id,
    ));
    let ctx = Context::new(directory, Arc::new(baseline));
    let store = JsonFileStore::new(&cli.store);

    match cli.command {
        Commands::Serve => {
            info!(workspace = cli.workspace_id, "starting steward daemon");
            if !jobs::run_startup_sync(&ctx, &store).await {
                anyhow::bail!("startup sync failed");
            }
            tokio::select! {
                () = jobs::run_scheduler(&ctx, &store) => unreachable!("scheduler never returns"),
                result = tokio::signal::ctrl_c() => {
                    result.context("waiting for shutdown signal")?;
                    info!("shutdown signal received");
                }
            }
            Ok(())
        }
        Commands::Apply { config } => {
            let document = StructureConfig::from_file(&config)
                .with_context(|| format!("loading structure document {}", config.display()))?;
            let progress = |message: &str| info!("{message}");
            if !run_promotion_reconciliation(&ctx, &document, Some(&progress)).await {
                anyhow::bail!("reconciliation did not fully converge");
            }
            store
                .save(&document)
                .await
                .context("persisting accepted structure document")?;
            info!("structure document applied and persisted");
            Ok(())
        }
        Commands::Baseline => {
            if !steward::run_baseline_reconciliation(&ctx).await {
                anyhow::bail!("baseline reconciliation failed");
            }
            Ok(())
        }
    }
}
