//! Scheduled reconciliation.
//!
//! Two triggers: a one-shot startup sync guarded so reconnects never replay
//! it, and a nightly resync at midnight UTC that re-applies the last
//! accepted structure document.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{error, info, instrument, warn};

use crate::persist::ConfigStore;
use crate::sync::{run_baseline_reconciliation, run_promotion_reconciliation, Context};

static STARTUP_SYNCED: AtomicBool = AtomicBool::new(false);

/// Runs the full startup sync: baseline first, then the stored promotion
/// document if one exists. Subsequent calls in the same process are no-ops.
#[instrument(skip_all)]
pub async fn run_startup_sync(ctx: &Context, store: &dyn ConfigStore) -> bool {
    if STARTUP_SYNCED.swap(true, Ordering::SeqCst) {
        info!("startup sync already performed");
        return true;
    }

    if !run_baseline_reconciliation(ctx).await {
        error!("startup baseline sync failed");
        return false;
    }

    resync_stored_config(ctx, store).await
}

/// Re-applies the last accepted structure document. Succeeds vacuously when
/// none has been accepted yet.
#[instrument(skip_all)]
pub async fn resync_stored_config(ctx: &Context, store: &dyn ConfigStore) -> bool {
    let config = match store.load().await {
        Ok(Some(config)) => config,
        Ok(None) => {
            info!("no stored structure document, nothing to resync");
            return true;
        }
        Err(e) => {
            let e = crate::sync::Error::from(e);
            error!(error = %e, "failed to load stored structure document");
            return false;
        }
    };
    run_promotion_reconciliation(ctx, &config, None).await
}

/// Time until the next scheduled resync (midnight UTC).
#[must_use]
pub fn next_run_delay(now: DateTime<Utc>) -> Duration {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    let next = Utc
        .from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap_or_default());
    (next - now).to_std().unwrap_or(Duration::from_secs(60))
}

/// Nightly resync loop; runs until the process exits.
pub async fn run_scheduler(ctx: &Context, store: &dyn ConfigStore) {
    loop {
        let delay = next_run_delay(Utc::now());
        info!(seconds = delay.as_secs(), "next scheduled resync");
        tokio::time::sleep(delay).await;
        if !resync_stored_config(ctx, store).await {
            warn!("scheduled resync failed, will retry at next tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{BaselineConfig, ConfigError};
    use crate::directory::MemoryDirectory;
    use crate::persist::MockConfigStore;

    fn test_context() -> Context {
        Context::new(
            Arc::new(MemoryDirectory::new(1)),
            Arc::new(BaselineConfig::default()),
        )
    }

    #[tokio::test]
    async fn resync_without_stored_document_succeeds_vacuously() {
        let ctx = test_context();
        let mut store = MockConfigStore::new();
        store.expect_load().times(1).returning(|| Ok(None));

        assert!(resync_stored_config(&ctx, &store).await);
    }

    #[tokio::test]
    async fn resync_fails_when_the_store_is_unreadable() {
        let ctx = test_context();
        let mut store = MockConfigStore::new();
        store.expect_load().returning(|| {
            Err(ConfigError::Parse(
                serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            ))
        });

        assert!(!resync_stored_config(&ctx, &store).await);
    }

    #[test]
    fn delay_counts_down_to_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 30).unwrap();
        assert_eq!(next_run_delay(now), Duration::from_secs(30));
    }

    #[test]
    fn delay_at_midnight_is_a_full_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(next_run_delay(now), Duration::from_secs(24 * 60 * 60));
    }
}
