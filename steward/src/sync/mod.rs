//! Workspace reconciliation: converges the remote community workspace to
//! the declared structure.
//!
//! Two entry points share one [`lock::SyncLock`] so a baseline pass and a
//! promotion pass never interleave their writes. Both swallow the error into
//! a bool: callers (jobs, the admin surface) only need to know whether the
//! run fully converged, the diagnostics live in the logs.

pub mod archive;
pub mod baseline;
pub mod lock;
pub mod naming;
pub mod order;
pub mod permissions;
pub mod promotion;
pub(crate) mod state;
pub mod types;

use tracing::{error, info, instrument};

use crate::config::StructureConfig;

pub use lock::{SyncGuard, SyncLock};
pub use types::{Context, Error, ProgressSink, Result};

/// Applies the fixed baseline structure (roles, static categories, the
/// Archive category and its permission lock). Returns `true` when the run
/// completed without a fatal error.
#[instrument(skip_all)]
pub async fn run_baseline_reconciliation(ctx: &Context) -> bool {
    let _guard = ctx.lock.acquire().await;
    info!("starting baseline reconciliation");
    match baseline::apply(ctx).await {
        Ok(()) => {
            info!("baseline reconciliation complete");
            true
        }
        Err(e) => {
            error!(error = %e, "baseline reconciliation failed");
            false
        }
    }
}

/// Converges every cohort of the structure document, drains stale cohorts
/// and restores the global category order. Returns `true` when every global
/// step succeeded; per-cohort failures are isolated and do not flip the
/// result on their own.
#[instrument(skip_all)]
pub async fn run_promotion_reconciliation(
    ctx: &Context,
    config: &StructureConfig,
    progress: Option<&dyn ProgressSink>,
) -> bool {
    let _guard = ctx.lock.acquire().await;
    info!("starting promotion reconciliation");
    match promotion::apply(ctx, config, progress).await {
        Ok(()) => {
            info!("promotion reconciliation complete");
            true
        }
        Err(e) => {
            error!(error = %e, "promotion reconciliation failed");
            false
        }
    }
}
