//! Archive policy: resources are never deleted, only moved into the Archive
//! category, renamed against collisions and permission-locked there.

use std::collections::BTreeSet;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::consts::{roles, ARCHIVE_CATEGORY_NAME};
use crate::directory::{ChannelEdit, DirectoryClient, Id};
use crate::sync::permissions::{archive_overwrites, overwrites_equal};
use crate::sync::state::RemoteState;
use crate::sync::types::{Error, Result};

/// Moves one channel into the Archive category.
///
/// Renames it to `"<name> (<previous-category-name>)"` (a timestamp when it
/// had no parent), denies View to everyone and grants View+Send to the
/// maintainer role only. Re-archiving an already archived channel is a
/// no-op.
pub(crate) async fn archive_channel(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    channel_id: Id,
) -> Result<()> {
    let archive = state
        .find_or_create_category(directory, ARCHIVE_CATEGORY_NAME)
        .await?;

    let channel = state
        .channel(channel_id)
        .cloned()
        .ok_or_else(|| Error::RemoteOperationFailed {
            op: "archive_channel",
            target: format!("channel {channel_id}"),
            source: crate::directory::DirectoryError::NotFound(format!(
                "channel {channel_id}"
            )),
        })?;

    if channel.parent == Some(archive.id) {
        return Ok(());
    }

    let origin = channel
        .parent
        .and_then(|parent| state.channel(parent))
        .map_or_else(
            || Utc::now().to_rfc3339(),
            |parent| parent.name.clone(),
        );
    let new_name = format!("{} ({})", channel.name, origin);

    let maintainer = state
        .find_or_create_role(directory, roles::MAINTAINER, None, None, None)
        .await
        .map(|r| r.id)
        .ok();
    let overwrites = archive_overwrites(state.everyone, maintainer);

    state
        .edit_channel(
            directory,
            channel_id,
            ChannelEdit {
                name: Some(new_name.clone()),
                parent: Some(archive.id),
                overwrites: Some(overwrites),
                ..Default::default()
            },
        )
        .await?;
    info!(channel = %channel.name, renamed = %new_name, "channel moved to Archive");

    lock_archive_category(state, directory, archive.id, maintainer).await
}

/// Keeps the Archive category itself visible to the maintainer role only.
async fn lock_archive_category(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    archive: Id,
    maintainer: Option<Id>,
) -> Result<()> {
    let desired = archive_overwrites(state.everyone, maintainer);
    let current = state
        .channel(archive)
        .map(|c| c.overwrites.clone())
        .unwrap_or_default();
    if overwrites_equal(&current, &desired) {
        return Ok(());
    }
    state
        .edit_channel(
            directory,
            archive,
            ChannelEdit {
                overwrites: Some(desired),
                ..Default::default()
            },
        )
        .await
}

/// Archives every channel of a category that is not in `used_names`.
pub(crate) async fn prune_unused_channels(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    category: Id,
    used_names: &BTreeSet<String>,
) -> Result<()> {
    let stale: Vec<Id> = state
        .members_of(category)
        .into_iter()
        .filter(|c| !used_names.contains(&c.name))
        .map(|c| c.id)
        .collect();

    for channel_id in stale {
        archive_channel(state, directory, channel_id).await?;
    }
    Ok(())
}

/// Drains every cohort category whose name no longer belongs to a key of the
/// current document: its channels move to the Archive (shared channels stay
/// behind), the category itself stays in place. A cohort that merely failed
/// to converge this run keeps its category intact.
///
/// Per-channel failures are logged and do not stop the drain; the first one
/// is reported at the end so the run is marked failed.
pub(crate) async fn archive_stale_cohorts(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    expected_names: &BTreeSet<String>,
    shared_names: &BTreeSet<String>,
) -> Result<()> {
    let stale_categories: Vec<Id> = state
        .categories()
        .filter(|c| {
            crate::sync::naming::is_cohort_category(&c.name) && !expected_names.contains(&c.name)
        })
        .map(|c| c.id)
        .collect();

    let mut first_error: Option<Error> = None;

    for category in stale_categories {
        let name = state
            .channel(category)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        warn!(category = %name, "cohort absent from config, draining");

        let members: Vec<Id> = state
            .members_of(category)
            .into_iter()
            .filter(|c| !shared_names.contains(&c.name))
            .map(|c| c.id)
            .collect();

        for channel_id in members {
            if let Err(e) = archive_channel(state, directory, channel_id).await {
                error!(error = %e, category = %name, "failed to archive channel from stale cohort");
                first_error.get_or_insert(e);
            }
        }

        // Renumber what remains so the drained category stays stable.
        let plan = crate::sync::order::channel_order_plan(&state.channels, category, &[], &[]);
        for step in plan {
            if let Err(e) = state
                .set_channel_position(directory, step.id, step.position)
                .await
            {
                error!(error = %e, category = %name, "failed to re-sort drained category");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
