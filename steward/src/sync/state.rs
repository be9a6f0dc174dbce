//! Snapshot of remote workspace state used within one reconciliation run.
//!
//! Fetched force-refreshed at the start of a run (stale caches would cause
//! false "not found" creates) and kept coherent locally as the run issues
//! mutations, so later steps in the same run see their own writes.

use tracing::{debug, info};

use crate::directory::{
    CapabilitySet, Channel, ChannelEdit, ChannelKind, DirectoryClient, Id, Role, RoleEdit,
};
use crate::sync::types::{Error, Result};

pub(crate) struct RemoteState {
    pub roles: Vec<Role>,
    pub channels: Vec<Channel>,
    pub everyone: Id,
}

impl RemoteState {
    /// Force-refreshes roles, channels and members before any diff.
    pub async fn refresh(directory: &dyn DirectoryClient) -> Result<Self> {
        let roles = directory
            .fetch_roles(true)
            .await
            .map_err(Error::remote("fetch_roles", "workspace"))?;
        let channels = directory
            .fetch_channels(true)
            .await
            .map_err(Error::remote("fetch_channels", "workspace"))?;
        let members = directory
            .fetch_members()
            .await
            .map_err(Error::remote("fetch_members", "workspace"))?;
        debug!(
            roles = roles.len(),
            channels = channels.len(),
            members,
            "refreshed remote state"
        );
        Ok(Self {
            roles,
            channels,
            everyone: directory.workspace_id(),
        })
    }

    pub fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn channel(&self, id: Id) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn category_by_name(&self, name: &str) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|c| c.kind == ChannelKind::Category && c.name == name)
    }

    pub fn channel_in_category(
        &self,
        parent: Id,
        name: &str,
        kind: ChannelKind,
    ) -> Option<&Channel> {
        self.channels
            .iter()
            .find(|c| c.parent == Some(parent) && c.name == name && c.kind == kind)
    }

    pub fn categories(&self) -> impl Iterator<Item = &Channel> {
        self.channels
            .iter()
            .filter(|c| c.kind == ChannelKind::Category)
    }

    pub fn members_of(&self, parent: Id) -> Vec<&Channel> {
        self.channels
            .iter()
            .filter(|c| c.parent == Some(parent))
            .collect()
    }

    /// Resolves the enumerated staff roles that exist in the roster.
    pub fn staff_role_ids(&self, names: &[&str]) -> Vec<Id> {
        names
            .iter()
            .filter_map(|name| self.role_by_name(name).map(|r| r.id))
            .collect()
    }

    /// Finds a role by name or creates it; when attributes are supplied,
    /// updates them only if they differ from the live role.
    pub async fn find_or_create_role(
        &mut self,
        directory: &dyn DirectoryClient,
        name: &str,
        color: Option<u32>,
        capabilities: Option<&CapabilitySet>,
        hoist: Option<bool>,
    ) -> Result<Role> {
        if let Some(existing) = self.role_by_name(name).cloned() {
            let mut edit = RoleEdit::default();
            if let Some(capabilities) = capabilities {
                if existing.capabilities != *capabilities {
                    edit.capabilities = Some(capabilities.clone());
                }
            }
            if let Some(hoist) = hoist {
                if existing.hoist != hoist {
                    edit.hoist = Some(hoist);
                }
            }
            if let Some(color) = color {
                if existing.color != color {
                    edit.color = Some(color);
                }
            }
            if edit.capabilities.is_some() || edit.hoist.is_some() || edit.color.is_some() {
                info!(role = %name, "updating role attributes");
                directory
                    .edit_role(existing.id, edit.clone())
                    .await
                    .map_err(Error::remote("edit_role", name))?;
                self.apply_role_edit(existing.id, &edit);
            }
            return Ok(self.role_by_name(name).cloned().unwrap_or(existing));
        }

        info!(role = %name, "role does not exist, creating");
        let role = directory
            .create_role(
                name,
                color.unwrap_or_default(),
                capabilities.cloned().unwrap_or_default(),
                hoist.unwrap_or(false),
            )
            .await
            .map_err(Error::remote("create_role", name))?;
        self.roles.push(role.clone());
        Ok(role)
    }

    pub async fn find_or_create_category(
        &mut self,
        directory: &dyn DirectoryClient,
        name: &str,
    ) -> Result<Channel> {
        if let Some(existing) = self.category_by_name(name) {
            return Ok(existing.clone());
        }
        info!(category = %name, "category does not exist, creating");
        let category = directory
            .create_category(name)
            .await
            .map_err(Error::remote("create_category", name))?;
        self.channels.push(category.clone());
        Ok(category)
    }

    pub async fn find_or_create_channel(
        &mut self,
        directory: &dyn DirectoryClient,
        name: &str,
        kind: ChannelKind,
        parent: Id,
    ) -> Result<Channel> {
        if let Some(existing) = self.channel_in_category(parent, name, kind) {
            return Ok(existing.clone());
        }
        info!(channel = %name, "channel does not exist, creating");
        let channel = directory
            .create_channel(name, kind, parent)
            .await
            .map_err(Error::remote("create_channel", name))?;
        self.channels.push(channel.clone());
        Ok(channel)
    }

    /// Issues a channel edit and mirrors it in the snapshot.
    pub async fn edit_channel(
        &mut self,
        directory: &dyn DirectoryClient,
        id: Id,
        edit: ChannelEdit,
    ) -> Result<()> {
        let target = self
            .channel(id)
            .map_or_else(|| format!("channel {id}"), |c| c.name.clone());
        directory
            .edit_channel(id, edit.clone())
            .await
            .map_err(Error::remote("edit_channel", target))?;
        self.apply_channel_edit(id, &edit);
        Ok(())
    }

    /// Issues a role edit and mirrors it in the snapshot.
    pub async fn edit_role(
        &mut self,
        directory: &dyn DirectoryClient,
        id: Id,
        edit: RoleEdit,
    ) -> Result<()> {
        let target = self
            .roles
            .iter()
            .find(|r| r.id == id)
            .map_or_else(|| format!("role {id}"), |r| r.name.clone());
        directory
            .edit_role(id, edit.clone())
            .await
            .map_err(Error::remote("edit_role", target))?;
        self.apply_role_edit(id, &edit);
        Ok(())
    }

    pub async fn set_channel_position(
        &mut self,
        directory: &dyn DirectoryClient,
        id: Id,
        position: i64,
    ) -> Result<()> {
        let target = self
            .channel(id)
            .map_or_else(|| format!("channel {id}"), |c| c.name.clone());
        directory
            .set_channel_position(id, position)
            .await
            .map_err(Error::remote("set_channel_position", target))?;
        if let Some(channel) = self.channels.iter_mut().find(|c| c.id == id) {
            channel.position = position;
        }
        Ok(())
    }

    fn apply_channel_edit(&mut self, id: Id, edit: &ChannelEdit) {
        if let Some(channel) = self.channels.iter_mut().find(|c| c.id == id) {
            if let Some(name) = &edit.name {
                channel.name = name.clone();
            }
            if let Some(topic) = &edit.topic {
                channel.topic = Some(topic.clone());
            }
            if let Some(parent) = edit.parent {
                channel.parent = Some(parent);
            }
            if let Some(overwrites) = &edit.overwrites {
                channel.overwrites = overwrites.clone();
            }
        }
    }

    fn apply_role_edit(&mut self, id: Id, edit: &RoleEdit) {
        if let Some(role) = self.roles.iter_mut().find(|r| r.id == id) {
            if let Some(color) = edit.color {
                role.color = color;
            }
            if let Some(capabilities) = &edit.capabilities {
                role.capabilities = capabilities.clone();
            }
            if let Some(hoist) = edit.hoist {
                role.hoist = hoist;
            }
        }
    }
}
