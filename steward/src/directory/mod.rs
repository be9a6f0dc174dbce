//! Remote directory model and client trait.
//!
//! The directory is the single managed community workspace: its roles,
//! channels and categories (categories are channels of kind
//! [`ChannelKind::Category`]). The reconciliation engine only ever talks to
//! the remote side through [`DirectoryClient`]; implementations are thin I/O
//! wrappers with no invariants of their own.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod rest;

pub use memory::MemoryDirectory;
pub use rest::RestDirectory;

/// Stable platform identifier for roles, channels and the workspace itself.
pub type Id = u64;

/// Errors surfaced by directory implementations.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote rejected {op}: status {status}: {message}")]
    Rejected {
        op: &'static str,
        status: u16,
        message: String,
    },

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("malformed remote payload: {0}")]
    Malformed(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// A single permission capability on a role or a channel overwrite.
///
/// Serialized SCREAMING_SNAKE_CASE in configuration documents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    View,
    Send,
    Speak,
    SendInThreads,
    CreatePublicThreads,
    CreatePrivateThreads,
    ChangeNickname,
    AddReactions,
    Administer,
    Kick,
    Ban,
    Moderate,
    ManageMessages,
    ViewAuditLog,
    Mute,
    Deafen,
    Move,
    ReadHistory,
    Connect,
    Stream,
    PrioritySpeaker,
    MentionEveryone,
}

/// An ordered set of capabilities; compares structurally for diff-before-write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn of(capabilities: &[Capability]) -> Self {
        capabilities.iter().copied().collect()
    }

    #[must_use]
    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn insert(&mut self, capability: Capability) -> bool {
        self.0.insert(capability)
    }

    pub fn remove(&mut self, capability: Capability) -> bool {
        self.0.remove(&capability)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    /// Returns a copy with `capability` added.
    #[must_use]
    pub fn with(&self, capability: Capability) -> Self {
        let mut next = self.clone();
        next.insert(capability);
        next
    }

    /// Returns a copy with `capability` removed.
    #[must_use]
    pub fn without(&self, capability: Capability) -> Self {
        let mut next = self.clone();
        next.remove(capability);
        next
    }

    /// Removes every capability present in `other`.
    pub fn subtract(&mut self, other: &CapabilitySet) {
        for capability in other.iter() {
            self.0.remove(&capability);
        }
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(|c| format!("{c:?}")).collect();
        write!(f, "{}", names.join("+"))
    }
}

/// Channel kinds supported by configuration documents.
///
/// `Category` never appears in a document; it only classifies remote
/// channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Text,
    Forum,
    Announcement,
    Voice,
    Category,
}

impl ChannelKind {
    #[must_use]
    pub fn is_voice(self) -> bool {
        matches!(self, ChannelKind::Voice)
    }
}

/// A role in the workspace roster. The everyone role has `id` equal to the
/// workspace id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Id,
    pub name: String,
    pub color: u32,
    pub capabilities: CapabilitySet,
    pub hoist: bool,
    pub position: i64,
}

/// A channel or category in the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: Id,
    pub name: String,
    pub kind: ChannelKind,
    pub parent: Option<Id>,
    pub topic: Option<String>,
    pub position: i64,
    pub overwrites: Vec<PermissionOverwrite>,
}

/// A per-subject allow/deny capability set attached to a channel or category.
///
/// Exactly one overwrite exists per subject per resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub subject: Id,
    pub allow: CapabilitySet,
    pub deny: CapabilitySet,
}

/// Partial role update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RoleEdit {
    pub color: Option<u32>,
    pub capabilities: Option<CapabilitySet>,
    pub hoist: Option<bool>,
}

/// Partial channel update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ChannelEdit {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub parent: Option<Id>,
    pub overwrites: Option<Vec<PermissionOverwrite>>,
}

/// Fetch/create/edit operations over one workspace.
///
/// All operations are idempotent on the remote side except the `create_*`
/// calls, which the engine only issues after a failed name lookup.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Identifier of the managed workspace (also the everyone role id).
    fn workspace_id(&self) -> Id;

    /// Fetch the full role roster. `force` bypasses any client-side cache.
    async fn fetch_roles(&self, force: bool) -> DirectoryResult<Vec<Role>>;

    /// Fetch every channel and category. `force` bypasses any cache.
    async fn fetch_channels(&self, force: bool) -> DirectoryResult<Vec<Channel>>;

    /// Warm the member cache; returns the member count.
    async fn fetch_members(&self) -> DirectoryResult<usize>;

    async fn create_role(
        &self,
        name: &str,
        color: u32,
        capabilities: CapabilitySet,
        hoist: bool,
    ) -> DirectoryResult<Role>;

    async fn edit_role(&self, id: Id, edit: RoleEdit) -> DirectoryResult<()>;

    async fn set_role_position(&self, id: Id, position: i64) -> DirectoryResult<()>;

    async fn create_category(&self, name: &str) -> DirectoryResult<Channel>;

    async fn create_channel(
        &self,
        name: &str,
        kind: ChannelKind,
        parent: Id,
    ) -> DirectoryResult<Channel>;

    async fn edit_channel(&self, id: Id, edit: ChannelEdit) -> DirectoryResult<()>;

    async fn set_channel_position(&self, id: Id, position: i64) -> DirectoryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_set_builds_and_diffs() {
        let mut set = CapabilitySet::of(&[Capability::View, Capability::Send]);
        assert!(set.contains(Capability::View));
        assert!(!set.contains(Capability::Speak));

        set.subtract(&CapabilitySet::of(&[Capability::Send, Capability::Speak]));
        assert_eq!(set, CapabilitySet::of(&[Capability::View]));
    }

    #[test]
    fn capability_serializes_screaming_snake() {
        let json = serde_json::to_string(&Capability::SendInThreads).unwrap();
        assert_eq!(json, "\"SEND_IN_THREADS\"");

        let set = CapabilitySet::of(&[Capability::Send, Capability::View]);
        let json = serde_json::to_string(&set).unwrap();
        // BTreeSet ordering follows declaration order of the enum.
        assert_eq!(json, "[\"VIEW\",\"SEND\"]");
    }

    #[test]
    fn channel_kind_round_trips_lowercase() {
        for (kind, text) in [
            (ChannelKind::Text, "\"text\""),
            (ChannelKind::Forum, "\"forum\""),
            (ChannelKind::Announcement, "\"announcement\""),
            (ChannelKind::Voice, "\"voice\""),
        ] {
            assert_eq!(serde_json::to_string(&kind).unwrap(), text);
            assert_eq!(serde_json::from_str::<ChannelKind>(text).unwrap(), kind);
        }
    }
}
