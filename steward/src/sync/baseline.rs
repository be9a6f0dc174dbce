//! Baseline reconciler: applies the fixed, cohort-independent structure
//! (roles, categories, channels, one permission matrix) once per process.
//!
//! Every step diffs before writing and any single step's remote failure is
//! logged and skipped so the run converges as far as it can.

use tracing::{error, info, warn};

use crate::config::{BaselineConfig, BaselineRole};
use crate::consts::{
    roles, ARCHIVE_CATEGORY_NAME, PROMOTIONS_PLACEHOLDER, RESERVED_TOP_ROLES,
};
use crate::directory::{
    Capability, ChannelEdit, DirectoryClient, Id, RoleEdit,
};
use crate::sync::permissions::{archive_overwrites, baseline_overwrites, overwrites_equal};
use crate::sync::state::RemoteState;
use crate::sync::types::{Context, Result};

pub(crate) async fn apply(ctx: &Context) -> Result<()> {
    let directory = ctx.directory.as_ref();
    let baseline = ctx.baseline.as_ref();
    let mut state = RemoteState::refresh(directory).await?;

    strip_everyone_capability(&mut state, directory, Capability::ChangeNickname).await;

    let archive = match state
        .find_or_create_category(directory, ARCHIVE_CATEGORY_NAME)
        .await
    {
        Ok(category) => Some(category),
        Err(e) => {
            error!(error = %e, "failed to ensure Archive category");
            None
        }
    };

    reconcile_roles(&mut state, directory, &baseline.roles).await;
    reconcile_categories(&mut state, directory, baseline).await;

    if let Some(archive) = archive {
        let maintainer = state
            .find_or_create_role(directory, roles::MAINTAINER, None, None, None)
            .await
            .map(|r| r.id)
            .ok();
        let desired = archive_overwrites(state.everyone, maintainer);
        let current = state
            .channel(archive.id)
            .map(|c| c.overwrites.clone())
            .unwrap_or_default();
        if !overwrites_equal(&current, &desired) {
            if let Err(e) = state
                .edit_channel(
                    directory,
                    archive.id,
                    ChannelEdit {
                        overwrites: Some(desired),
                        ..Default::default()
                    },
                )
                .await
            {
                error!(error = %e, "failed to lock Archive category permissions");
            } else {
                info!("initialized permissions for the Archive category");
            }
        }
    }

    strip_everyone_capability(&mut state, directory, Capability::AddReactions).await;
    strip_role_capability(&mut state, directory, roles::EXTERNAL, Capability::AddReactions).await;

    Ok(())
}

/// Removes a capability from the everyone role if still present.
async fn strip_everyone_capability(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    capability: Capability,
) {
    let everyone = state.everyone;
    let Some(role) = state.roles.iter().find(|r| r.id == everyone) else {
        warn!("everyone role missing from roster");
        return;
    };
    if !role.capabilities.contains(capability) {
        return;
    }
    let next = role.capabilities.without(capability);
    if let Err(e) = state
        .edit_role(
            directory,
            everyone,
            RoleEdit {
                capabilities: Some(next),
                ..Default::default()
            },
        )
        .await
    {
        error!(error = %e, ?capability, "failed to strip capability from everyone");
    } else {
        info!(?capability, "stripped capability from everyone");
    }
}

/// Removes a capability from a named role if it exists and still has it.
async fn strip_role_capability(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    role_name: &str,
    capability: Capability,
) {
    let Some(role) = state.role_by_name(role_name).cloned() else {
        warn!(role = %role_name, "role not found, skipping capability strip");
        return;
    };
    if !role.capabilities.contains(capability) {
        return;
    }
    let next = role.capabilities.without(capability);
    if let Err(e) = state
        .edit_role(
            directory,
            role.id,
            RoleEdit {
                capabilities: Some(next),
                ..Default::default()
            },
        )
        .await
    {
        error!(error = %e, role = %role_name, ?capability, "failed to strip capability");
    } else {
        info!(role = %role_name, ?capability, "stripped capability");
    }
}

/// Finds or creates each declared role, updating attributes only on diff,
/// and places it below the reserved top slots in declaration order.
///
/// Positioning happens after every role exists: the targets are counted from
/// the final roster size, so the creating run computes the same slots as
/// every later one.
async fn reconcile_roles(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    declared: &[BaselineRole],
) {
    let mut ensured: Vec<(usize, Id, String)> = Vec::with_capacity(declared.len());
    for (index, role_config) in declared.iter().enumerate() {
        match state
            .find_or_create_role(
                directory,
                &role_config.name,
                Some(role_config.color_value()),
                Some(&role_config.capabilities),
                Some(role_config.display_separately),
            )
            .await
        {
            Ok(role) => ensured.push((index, role.id, role_config.name.clone())),
            Err(e) => {
                error!(error = %e, role = %role_config.name, "failed to ensure baseline role");
            }
        }
    }

    let roster = state.roles.len() as i64;
    for (index, id, name) in ensured {
        let target = roster - (RESERVED_TOP_ROLES + index as i64);
        let current = state.roles.iter().find(|r| r.id == id).map(|r| r.position);
        if current == Some(target) {
            continue;
        }
        if let Err(e) = directory.set_role_position(id, target).await {
            error!(error = %e, role = %name, "failed to set role position");
        } else if let Some(entry) = state.roles.iter_mut().find(|r| r.id == id) {
            entry.position = target;
        }
    }
}

/// Finds or creates each declared category and channel, applying topic,
/// permission matrix and in-category position; the cohort placeholder is
/// skipped entirely.
async fn reconcile_categories(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    baseline: &BaselineConfig,
) {
    for category_config in &baseline.categories {
        if category_config.name == PROMOTIONS_PLACEHOLDER {
            continue;
        }

        let category = match state
            .find_or_create_category(directory, &category_config.name)
            .await
        {
            Ok(category) => category,
            Err(e) => {
                error!(error = %e, category = %category_config.name, "failed to ensure category");
                continue;
            }
        };

        for (index, channel_config) in category_config.channels.iter().enumerate() {
            let name = crate::sync::naming::normalize_channel_name(&channel_config.name);
            let channel = match state
                .find_or_create_channel(directory, &name, channel_config.kind, category.id)
                .await
            {
                Ok(channel) => channel,
                Err(e) => {
                    error!(error = %e, channel = %name, "failed to ensure channel");
                    continue;
                }
            };

            if let Some(description) = &channel_config.description {
                if channel.topic.as_deref() != Some(description) {
                    if let Err(e) = state
                        .edit_channel(
                            directory,
                            channel.id,
                            ChannelEdit {
                                topic: Some(description.clone()),
                                ..Default::default()
                            },
                        )
                        .await
                    {
                        error!(error = %e, channel = %name, "failed to set description");
                    }
                }
            }

            apply_channel_matrix(state, directory, channel.id, channel_config).await;

            if let Some(live) = state.channel(channel.id) {
                if live.position != index as i64 {
                    if let Err(e) = state
                        .set_channel_position(directory, channel.id, index as i64)
                        .await
                    {
                        error!(error = %e, channel = %name, "failed to set channel position");
                    }
                }
            }
        }
    }
}

async fn apply_channel_matrix(
    state: &mut RemoteState,
    directory: &dyn DirectoryClient,
    channel: Id,
    channel_config: &crate::config::BaselineChannel,
) {
    let desired = baseline_overwrites(
        &state.roles,
        &channel_config.access,
        state.everyone,
        channel_config.kind.is_voice(),
    );
    let current = state
        .channel(channel)
        .map(|c| c.overwrites.clone())
        .unwrap_or_default();
    if overwrites_equal(&current, &desired) {
        return;
    }
    if let Err(e) = state
        .edit_channel(
            directory,
            channel,
            ChannelEdit {
                overwrites: Some(desired),
                ..Default::default()
            },
        )
        .await
    {
        error!(error = %e, channel = %channel_config.name, "failed to initialize channel permissions");
    } else {
        info!(channel = %channel_config.name, "initialized channel permissions");
    }
}
