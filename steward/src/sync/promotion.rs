//! Promotion-config reconciler, the core engine.
//!
//! One run walks every cohort key of the structure document, converges that
//! cohort's category, role and channels, then performs the global steps:
//! draining cohorts that left the config, re-sorting the top-level category
//! order and enforcing the nickname capability policy.
//!
//! Failure granularity is channel > cohort > run: a failing channel aborts
//! its cohort, a failing cohort never stops its siblings, and only a failing
//! global step marks the whole run as failed.

use std::collections::BTreeSet;

use tracing::{error, info, instrument, warn};

use crate::config::{ChannelSpec, PromotionSpec, StructureConfig};
use crate::consts::{roles, STAFF_ROLE_NAMES};
use crate::directory::{Channel, ChannelEdit, DirectoryClient, Id, RoleEdit};
use crate::sync::archive::{archive_stale_cohorts, prune_unused_channels};
use crate::sync::naming::{cohort_category_name, today, CohortKey};
use crate::sync::order::{category_order_plan, channel_order_plan};
use crate::sync::permissions::{
    cohort_category_overwrites, cohort_channel_overwrites, overwrites_equal,
};
use crate::sync::state::RemoteState;
use crate::sync::types::{report, Context, Error, ProgressSink, Result};

#[instrument(skip_all, fields(cohorts = config.cohorts.len()))]
pub(crate) async fn apply(
    ctx: &Context,
    config: &StructureConfig,
    progress: Option<&dyn ProgressSink>,
) -> Result<()> {
    let directory = ctx.directory.as_ref();
    let mut state = RemoteState::refresh(directory).await?;

    // The maintainer is both a staff role and the archive lock target; make
    // sure it exists before any overwrite is computed so the first run
    // resolves the same staff set as every later one.
    if let Err(e) = state
        .find_or_create_role(directory, roles::MAINTAINER, None, None, None)
        .await
    {
        warn!(error = %e, "maintainer role unavailable, staff access will be incomplete");
    }

    for (key, spec) in &config.cohorts {
        report(progress, &format!("Processing {key}"));
        match reconcile_cohort(&mut state, directory, key, &config.shared, spec).await {
            Ok(()) => report(progress, &format!("Processed {key}")),
            Err(e) => {
                error!(error = %e, cohort = %key, "cohort reconciliation failed, continuing");
                report(progress, &format!("Failed {key}, skipping"));
            }
        }
    }

    let mut first_error: Option<Error> = None;

    report(progress, "Cleaning old promotions");
    // Staleness is decided by the document alone: every parseable key claims
    // its category name, whether or not its cohort converged this run.
    let expected: BTreeSet<String> = config
        .cohorts
        .keys()
        .filter_map(|key| CohortKey::parse(key).ok())
        .map(|cohort| cohort_category_name(&cohort.display_name(today())))
        .collect();
    let shared_names: BTreeSet<String> =
        config.shared.iter().map(|c| c.name.clone()).collect();
    if let Err(e) = archive_stale_cohorts(&mut state, directory, &expected, &shared_names).await {
        error!(error = %e, "failed to archive stale cohorts");
        first_error.get_or_insert(e);
    }

    report(progress, "Sorting all categories");
    if let Err(e) = reorder_categories(ctx, &mut state, directory).await {
        error!(error = %e, "failed to reorder categories");
        first_error.get_or_insert(e);
    }

    adjust_nickname_capability(&mut state, directory).await;

    match first_error {
        Some(e) => Err(e),
        None => {
            report(progress, "Config processed successfully");
            Ok(())
        }
    }
}

/// Converges one cohort: category + role + overwrites, shared channels then
/// cohort channels, deterministic order, pruning.
async fn reconcile_cohort(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    key: &str,
    shared: &[ChannelSpec],
    spec: &PromotionSpec,
) -> Result<()> {
    let cohort = CohortKey::parse(key)?;
    let display_name = cohort.display_name(today());
    let category_name = cohort_category_name(&display_name);

    let staff = state.staff_role_ids(&STAFF_ROLE_NAMES);
    if staff.is_empty() {
        warn!(cohort = %key, "no staff roles resolved; cohort channels will lack staff access");
    }

    let category = state
        .find_or_create_category(directory, &category_name)
        .await?;
    let role = state
        .find_or_create_role(directory, &display_name, Some(0), None, None)
        .await?;

    let desired = cohort_category_overwrites(state.everyone, role.id);
    let current = state
        .channel(category.id)
        .map(|c| c.overwrites.clone())
        .unwrap_or_default();
    if !overwrites_equal(&current, &desired) {
        state
            .edit_channel(
                directory,
                category.id,
                ChannelEdit {
                    overwrites: Some(desired),
                    ..Default::default()
                },
            )
            .await?;
    }

    for channel_spec in shared.iter().chain(spec.channels.iter()) {
        reconcile_cohort_channel(state, directory, category.id, role.id, &staff, channel_spec)
            .await?;
    }

    let plan = channel_order_plan(&state.channels, category.id, shared, &spec.channels);
    for step in plan {
        state
            .set_channel_position(directory, step.id, step.position)
            .await?;
    }

    let used: BTreeSet<String> = shared
        .iter()
        .chain(spec.channels.iter())
        .map(|c| c.name.clone())
        .collect();
    prune_unused_channels(state, directory, category.id, &used).await?;

    info!(cohort = %key, category = %category_name, "cohort converged");
    Ok(())
}

/// Finds or creates one channel in the cohort category and applies its
/// permission grants; any failure aborts the cohort.
async fn reconcile_cohort_channel(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    category: Id,
    cohort_role: Id,
    staff: &[Id],
    spec: &ChannelSpec,
) -> Result<Channel> {
    let channel = state
        .find_or_create_channel(directory, &spec.name, spec.kind, category)
        .await?;

    let desired =
        cohort_channel_overwrites(state.everyone, cohort_role, spec.student_write, staff);
    if !overwrites_equal(&channel.overwrites, &desired) {
        state
            .edit_channel(
                directory,
                channel.id,
                ChannelEdit {
                    overwrites: Some(desired),
                    ..Default::default()
                },
            )
            .await?;
    }

    Ok(channel)
}

/// Global top-level reorder; a position write failing marks the run failed
/// but the remaining moves are still attempted.
async fn reorder_categories(
    ctx: &Context,
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
) -> Result<()> {
    let plan = category_order_plan(&state.channels, &ctx.baseline.categories);
    let mut first_error: Option<Error> = None;
    for step in plan {
        let name = state
            .channel(step.id)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        info!(category = %name, position = step.position, "setting category position");
        if let Err(e) = state
            .set_channel_position(directory, step.id, step.position)
            .await
        {
            error!(error = %e, category = %name, "error while sorting categories");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Every role except the maintainer loses "change own nickname"; the
/// maintainer gains it. Enforced every run; failures are logged only.
async fn adjust_nickname_capability(state: &mut RemoteState, directory: &dyn DirectoryClient) {
    use crate::directory::Capability::ChangeNickname;

    let snapshot: Vec<(Id, String, bool)> = state
        .roles
        .iter()
        .map(|r| (r.id, r.name.clone(), r.capabilities.contains(ChangeNickname)))
        .collect();

    for (id, name, has_capability) in snapshot {
        let is_maintainer = name == roles::MAINTAINER;
        if has_capability == is_maintainer {
            continue;
        }
        let current = state
            .roles
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.capabilities.clone())
            .unwrap_or_default();
        let next = if is_maintainer {
            current.with(ChangeNickname)
        } else {
            current.without(ChangeNickname)
        };
        match state
            .edit_role(
                directory,
                id,
                RoleEdit {
                    capabilities: Some(next),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(()) if is_maintainer => info!(role = %name, "enabled nickname change"),
            Ok(()) => info!(role = %name, "disabled nickname change"),
            Err(e) => error!(error = %e, role = %name, "failed to adjust nickname capability"),
        }
    }
}
