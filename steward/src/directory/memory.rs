//! In-memory directory implementation.
//!
//! Backs the engine tests (the mutation counter makes idempotence
//! observable) and local experiments. State lives behind a std mutex; no
//! lock is held across an await point.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    Capability, CapabilitySet, Channel, ChannelEdit, ChannelKind, DirectoryClient,
    DirectoryError, DirectoryResult, Id, Role, RoleEdit,
};
use crate::consts::EVERYONE_ROLE_NAME;

#[derive(Default)]
struct State {
    roles: Vec<Role>,
    channels: Vec<Channel>,
}

/// A workspace held entirely in memory.
pub struct MemoryDirectory {
    workspace: Id,
    state: Mutex<State>,
    next_id: AtomicU64,
    mutations: AtomicUsize,
    members: usize,
}

impl MemoryDirectory {
    /// Creates an empty workspace seeded with the implicit everyone role.
    #[must_use]
    pub fn new(workspace: Id) -> Self {
        let everyone = Role {
            id: workspace,
            name: EVERYONE_ROLE_NAME.to_string(),
            color: 0,
            capabilities: CapabilitySet::of(&[
                Capability::View,
                Capability::Send,
                Capability::ChangeNickname,
                Capability::AddReactions,
            ]),
            hoist: false,
            position: 0,
        };
        Self {
            workspace,
            state: Mutex::new(State {
                roles: vec![everyone],
                channels: Vec::new(),
            }),
            next_id: AtomicU64::new(workspace + 1),
            mutations: AtomicUsize::new(0),
            members: 0,
        }
    }

    /// Number of mutating calls issued so far (creates, edits, moves).
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Resets the mutation counter; convenient between reconciliation runs.
    pub fn reset_mutation_count(&self) {
        self.mutations.store(0, Ordering::SeqCst);
    }

    /// Seeds a channel directly, bypassing the mutation counter.
    pub fn seed_channel(
        &self,
        name: &str,
        kind: ChannelKind,
        parent: Option<Id>,
    ) -> Channel {
        let channel = Channel {
            id: self.allocate_id(),
            name: name.to_string(),
            kind,
            parent,
            topic: None,
            position: self.state.lock().unwrap().channels.len() as i64,
            overwrites: Vec::new(),
        };
        self.state.lock().unwrap().channels.push(channel.clone());
        channel
    }

    /// Seeds a role directly, bypassing the mutation counter.
    pub fn seed_role(&self, name: &str, capabilities: CapabilitySet) -> Role {
        let role = Role {
            id: self.allocate_id(),
            name: name.to_string(),
            color: 0,
            capabilities,
            hoist: false,
            position: self.state.lock().unwrap().roles.len() as i64,
        };
        self.state.lock().unwrap().roles.push(role.clone());
        role
    }

    #[must_use]
    pub fn role_named(&self, name: &str) -> Option<Role> {
        self.state
            .lock()
            .unwrap()
            .roles
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }

    #[must_use]
    pub fn channel_named(&self, name: &str) -> Option<Channel> {
        self.state
            .lock()
            .unwrap()
            .channels
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    #[must_use]
    pub fn category_named(&self, name: &str) -> Option<Channel> {
        self.state
            .lock()
            .unwrap()
            .channels
            .iter()
            .find(|c| c.kind == ChannelKind::Category && c.name == name)
            .cloned()
    }

    /// All channels parented under `category`, unsorted.
    #[must_use]
    pub fn channels_in(&self, category: Id) -> Vec<Channel> {
        self.state
            .lock()
            .unwrap()
            .channels
            .iter()
            .filter(|c| c.parent == Some(category))
            .cloned()
            .collect()
    }

    /// All categories ordered by their current position.
    #[must_use]
    pub fn categories_in_order(&self) -> Vec<Channel> {
        let mut categories: Vec<Channel> = self
            .state
            .lock()
            .unwrap()
            .channels
            .iter()
            .filter(|c| c.kind == ChannelKind::Category)
            .cloned()
            .collect();
        categories.sort_by_key(|c| c.position);
        categories
    }

    fn allocate_id(&self) -> Id {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn record_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    fn workspace_id(&self) -> Id {
        self.workspace
    }

    async fn fetch_roles(&self, _force: bool) -> DirectoryResult<Vec<Role>> {
        Ok(self.state.lock().unwrap().roles.clone())
    }

    async fn fetch_channels(&self, _force: bool) -> DirectoryResult<Vec<Channel>> {
        Ok(self.state.lock().unwrap().channels.clone())
    }

    async fn fetch_members(&self) -> DirectoryResult<usize> {
        Ok(self.members)
    }

    async fn create_role(
        &self,
        name: &str,
        color: u32,
        capabilities: CapabilitySet,
        hoist: bool,
    ) -> DirectoryResult<Role> {
        self.record_mutation();
        let role = Role {
            id: self.allocate_id(),
            name: name.to_string(),
            color,
            capabilities,
            hoist,
            position: self.state.lock().unwrap().roles.len() as i64,
        };
        self.state.lock().unwrap().roles.push(role.clone());
        Ok(role)
    }

    async fn edit_role(&self, id: Id, edit: RoleEdit) -> DirectoryResult<()> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let role = state
            .roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DirectoryError::NotFound(format!("role {id}")))?;
        if let Some(color) = edit.color {
            role.color = color;
        }
        if let Some(capabilities) = edit.capabilities {
            role.capabilities = capabilities;
        }
        if let Some(hoist) = edit.hoist {
            role.hoist = hoist;
        }
        Ok(())
    }

    async fn set_role_position(&self, id: Id, position: i64) -> DirectoryResult<()> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let role = state
            .roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DirectoryError::NotFound(format!("role {id}")))?;
        role.position = position;
        Ok(())
    }

    async fn create_category(&self, name: &str) -> DirectoryResult<Channel> {
        self.record_mutation();
        let category = Channel {
            id: self.allocate_id(),
            name: name.to_string(),
            kind: ChannelKind::Category,
            parent: None,
            topic: None,
            position: self.state.lock().unwrap().channels.len() as i64,
            overwrites: Vec::new(),
        };
        self.state.lock().unwrap().channels.push(category.clone());
        Ok(category)
    }

    async fn create_channel(
        &self,
        name: &str,
        kind: ChannelKind,
        parent: Id,
    ) -> DirectoryResult<Channel> {
        self.record_mutation();
        let channel = Channel {
            id: self.allocate_id(),
            name: name.to_string(),
            kind,
            parent: Some(parent),
            topic: None,
            position: self.state.lock().unwrap().channels.len() as i64,
            overwrites: Vec::new(),
        };
        self.state.lock().unwrap().channels.push(channel.clone());
        Ok(channel)
    }

    async fn edit_channel(&self, id: Id, edit: ChannelEdit) -> DirectoryResult<()> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let channel = state
            .channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| DirectoryError::NotFound(format!("channel {id}")))?;
        if let Some(name) = edit.name {
            channel.name = name;
        }
        if let Some(topic) = edit.topic {
            channel.topic = Some(topic);
        }
        if let Some(parent) = edit.parent {
            channel.parent = Some(parent);
        }
        if let Some(overwrites) = edit.overwrites {
            channel.overwrites = overwrites;
        }
        Ok(())
    }

    async fn set_channel_position(&self, id: Id, position: i64) -> DirectoryResult<()> {
        self.record_mutation();
        let mut state = self.state.lock().unwrap();
        let channel = state
            .channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| DirectoryError::NotFound(format!("channel {id}")))?;
        channel.position = position;
        Ok(())
    }
}
