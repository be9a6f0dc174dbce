//! REST-backed directory over the chat platform's HTTP API.
//!
//! Thin translation layer: snowflake ids arrive as decimal strings,
//! permissions as a bitfield string, channel kinds as integer discriminants.
//! Role and channel listings are cached per client; the engine passes
//! `force` at the start of every run so a run never diffs against stale
//! listings.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{
    Capability, CapabilitySet, Channel, ChannelEdit, ChannelKind, DirectoryClient,
    DirectoryError, DirectoryResult, Id, PermissionOverwrite, Role, RoleEdit,
};

const CAPABILITY_BITS: &[(Capability, u64)] = &[
    (Capability::View, 1 << 10),
    (Capability::Send, 1 << 11),
    (Capability::Speak, 1 << 21),
    (Capability::SendInThreads, 1 << 38),
    (Capability::CreatePublicThreads, 1 << 34),
    (Capability::CreatePrivateThreads, 1 << 35),
    (Capability::ChangeNickname, 1 << 26),
    (Capability::AddReactions, 1 << 6),
    (Capability::Administer, 1 << 3),
    (Capability::Kick, 1 << 1),
    (Capability::Ban, 1 << 2),
    (Capability::Moderate, 1 << 40),
    (Capability::ManageMessages, 1 << 13),
    (Capability::ViewAuditLog, 1 << 7),
    (Capability::Mute, 1 << 22),
    (Capability::Deafen, 1 << 23),
    (Capability::Move, 1 << 24),
    (Capability::ReadHistory, 1 << 16),
    (Capability::Connect, 1 << 20),
    (Capability::Stream, 1 << 9),
    (Capability::PrioritySpeaker, 1 << 8),
    (Capability::MentionEveryone, 1 << 17),
];

static BITS_BY_CAPABILITY: LazyLock<BTreeMap<Capability, u64>> =
    LazyLock::new(|| CAPABILITY_BITS.iter().copied().collect());

fn capabilities_to_bits(set: &CapabilitySet) -> u64 {
    set.iter()
        .filter_map(|c| BITS_BY_CAPABILITY.get(&c))
        .fold(0, |acc, bit| acc | bit)
}

fn bits_to_capabilities(bits: u64) -> CapabilitySet {
    CAPABILITY_BITS
        .iter()
        .filter(|(_, bit)| bits & bit != 0)
        .map(|(capability, _)| *capability)
        .collect()
}

fn kind_to_wire(kind: ChannelKind) -> u8 {
    match kind {
        ChannelKind::Text => 0,
        ChannelKind::Voice => 2,
        ChannelKind::Category => 4,
        ChannelKind::Announcement => 5,
        ChannelKind::Forum => 15,
    }
}

fn kind_from_wire(raw: u8) -> Option<ChannelKind> {
    match raw {
        0 => Some(ChannelKind::Text),
        2 => Some(ChannelKind::Voice),
        4 => Some(ChannelKind::Category),
        5 => Some(ChannelKind::Announcement),
        15 => Some(ChannelKind::Forum),
        _ => None,
    }
}

fn parse_id(raw: &str) -> DirectoryResult<Id> {
    raw.parse()
        .map_err(|_| DirectoryError::Malformed(format!("invalid snowflake '{raw}'")))
}

fn parse_bits(raw: &str) -> DirectoryResult<u64> {
    raw.parse()
        .map_err(|_| DirectoryError::Malformed(format!("invalid permission bitfield '{raw}'")))
}

#[derive(Debug, Deserialize)]
struct WireRole {
    id: String,
    name: String,
    color: u32,
    permissions: String,
    hoist: bool,
    position: i64,
}

impl WireRole {
    fn into_role(self) -> DirectoryResult<Role> {
        Ok(Role {
            id: parse_id(&self.id)?,
            name: self.name,
            color: self.color,
            capabilities: bits_to_capabilities(parse_bits(&self.permissions)?),
            hoist: self.hoist,
            position: self.position,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireOverwrite {
    id: String,
    allow: String,
    deny: String,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
    name: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    position: i64,
    #[serde(default)]
    permission_overwrites: Vec<WireOverwrite>,
}

impl WireChannel {
    fn into_channel(self) -> DirectoryResult<Option<Channel>> {
        // Unknown kinds (DMs, stage channels) are outside the managed set.
        let Some(kind) = kind_from_wire(self.kind) else {
            return Ok(None);
        };
        let mut overwrites = Vec::with_capacity(self.permission_overwrites.len());
        for raw in self.permission_overwrites {
            overwrites.push(PermissionOverwrite {
                subject: parse_id(&raw.id)?,
                allow: bits_to_capabilities(parse_bits(&raw.allow)?),
                deny: bits_to_capabilities(parse_bits(&raw.deny)?),
            });
        }
        Ok(Some(Channel {
            id: parse_id(&self.id)?,
            name: self.name,
            kind,
            parent: self.parent_id.as_deref().map(parse_id).transpose()?,
            topic: self.topic,
            position: self.position,
            overwrites,
        }))
    }
}

#[derive(Debug, Serialize)]
struct OverwritePayload {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    allow: String,
    deny: String,
}

fn overwrite_payload(overwrites: &[PermissionOverwrite]) -> Vec<OverwritePayload> {
    overwrites
        .iter()
        .map(|o| OverwritePayload {
            id: o.subject.to_string(),
            kind: 0,
            allow: capabilities_to_bits(&o.allow).to_string(),
            deny: capabilities_to_bits(&o.deny).to_string(),
        })
        .collect()
}

/// Directory client over the platform's REST API.
pub struct RestDirectory {
    http: reqwest::Client,
    base_url: String,
    token: String,
    workspace: Id,
    roles: Mutex<Option<Vec<Role>>>,
    channels: Mutex<Option<Vec<Channel>>>,
}

impl RestDirectory {
    pub const DEFAULT_BASE_URL: &'static str = "https://discord.com/api/v10";

    pub fn new(base_url: impl Into<String>, token: impl Into<String>, workspace: Id) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
            workspace,
            roles: Mutex::new(None),
            channels: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn expect_success(
        op: &'static str,
        response: reqwest::Response,
    ) -> DirectoryResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(format!("{op}: {message}")));
        }
        Err(DirectoryError::Rejected {
            op,
            status: status.as_u16(),
            message,
        })
    }

    async fn list_roles(&self) -> DirectoryResult<Vec<Role>> {
        let path = format!("/guilds/{}/roles", self.workspace);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let wire: Vec<WireRole> = Self::expect_success("fetch_roles", response)
            .await?
            .json()
            .await?;
        wire.into_iter().map(WireRole::into_role).collect()
    }

    async fn list_channels(&self) -> DirectoryResult<Vec<Channel>> {
        let path = format!("/guilds/{}/channels", self.workspace);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let wire: Vec<WireChannel> = Self::expect_success("fetch_channels", response)
            .await?
            .json()
            .await?;
        let mut channels = Vec::with_capacity(wire.len());
        for raw in wire {
            if let Some(channel) = raw.into_channel()? {
                channels.push(channel);
            }
        }
        Ok(channels)
    }
}

#[async_trait]
impl DirectoryClient for RestDirectory {
    fn workspace_id(&self) -> Id {
        self.workspace
    }

    #[instrument(skip(self))]
    async fn fetch_roles(&self, force: bool) -> DirectoryResult<Vec<Role>> {
        let mut cache = self.roles.lock().await;
        if !force {
            if let Some(cached) = cache.as_ref() {
                debug!("serving roles from cache");
                return Ok(cached.clone());
            }
        }
        let roles = self.list_roles().await?;
        *cache = Some(roles.clone());
        Ok(roles)
    }

    #[instrument(skip(self))]
    async fn fetch_channels(&self, force: bool) -> DirectoryResult<Vec<Channel>> {
        let mut cache = self.channels.lock().await;
        if !force {
            if let Some(cached) = cache.as_ref() {
                debug!("serving channels from cache");
                return Ok(cached.clone());
            }
        }
        let channels = self.list_channels().await?;
        *cache = Some(channels.clone());
        Ok(channels)
    }

    async fn fetch_members(&self) -> DirectoryResult<usize> {
        let path = format!("/guilds/{}/members?limit=1000", self.workspace);
        let response = self.request(reqwest::Method::GET, &path).send().await?;
        let members: Vec<serde_json::Value> = Self::expect_success("fetch_members", response)
            .await?
            .json()
            .await?;
        Ok(members.len())
    }

    async fn create_role(
        &self,
        name: &str,
        color: u32,
        capabilities: CapabilitySet,
        hoist: bool,
    ) -> DirectoryResult<Role> {
        let path = format!("/guilds/{}/roles", self.workspace);
        let body = json!({
            "name": name,
            "color": color,
            "permissions": capabilities_to_bits(&capabilities).to_string(),
            "hoist": hoist,
        });
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&body)
            .send()
            .await?;
        let wire: WireRole = Self::expect_success("create_role", response)
            .await?
            .json()
            .await?;
        let role = wire.into_role()?;
        if let Some(cache) = self.roles.lock().await.as_mut() {
            cache.push(role.clone());
        }
        Ok(role)
    }

    async fn edit_role(&self, id: Id, edit: RoleEdit) -> DirectoryResult<()> {
        let path = format!("/guilds/{}/roles/{id}", self.workspace);
        let mut body = serde_json::Map::new();
        if let Some(color) = edit.color {
            body.insert("color".into(), json!(color));
        }
        if let Some(capabilities) = &edit.capabilities {
            body.insert(
                "permissions".into(),
                json!(capabilities_to_bits(capabilities).to_string()),
            );
        }
        if let Some(hoist) = edit.hoist {
            body.insert("hoist".into(), json!(hoist));
        }
        let response = self
            .request(reqwest::Method::PATCH, &path)
            .json(&body)
            .send()
            .await?;
        Self::expect_success("edit_role", response).await?;
        *self.roles.lock().await = None;
        Ok(())
    }

    async fn set_role_position(&self, id: Id, position: i64) -> DirectoryResult<()> {
        let path = format!("/guilds/{}/roles", self.workspace);
        let body = json!([{ "id": id.to_string(), "position": position }]);
        let response = self
            .request(reqwest::Method::PATCH, &path)
            .json(&body)
            .send()
            .await?;
        Self::expect_success("set_role_position", response).await?;
        *self.roles.lock().await = None;
        Ok(())
    }

    async fn create_category(&self, name: &str) -> DirectoryResult<Channel> {
        let path = format!("/guilds/{}/channels", self.workspace);
        let body = json!({ "name": name, "type": kind_to_wire(ChannelKind::Category) });
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&body)
            .send()
            .await?;
        let wire: WireChannel = Self::expect_success("create_category", response)
            .await?
            .json()
            .await?;
        let category = wire
            .into_channel()?
            .ok_or_else(|| DirectoryError::Malformed("created category has unknown kind".into()))?;
        if let Some(cache) = self.channels.lock().await.as_mut() {
            cache.push(category.clone());
        }
        Ok(category)
    }

    async fn create_channel(
        &self,
        name: &str,
        kind: ChannelKind,
        parent: Id,
    ) -> DirectoryResult<Channel> {
        let path = format!("/guilds/{}/channels", self.workspace);
        let body = json!({
            "name": name,
            "type": kind_to_wire(kind),
            "parent_id": parent.to_string(),
        });
        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&body)
            .send()
            .await?;
        let wire: WireChannel = Self::expect_success("create_channel", response)
            .await?
            .json()
            .await?;
        let channel = wire
            .into_channel()?
            .ok_or_else(|| DirectoryError::Malformed("created channel has unknown kind".into()))?;
        if let Some(cache) = self.channels.lock().await.as_mut() {
            cache.push(channel.clone());
        }
        Ok(channel)
    }

    async fn edit_channel(&self, id: Id, edit: ChannelEdit) -> DirectoryResult<()> {
        let path = format!("/channels/{id}");
        let mut body = serde_json::Map::new();
        if let Some(name) = &edit.name {
            body.insert("name".into(), json!(name));
        }
        if let Some(topic) = &edit.topic {
            body.insert("topic".into(), json!(topic));
        }
        if let Some(parent) = edit.parent {
            body.insert("parent_id".into(), json!(parent.to_string()));
        }
        if let Some(overwrites) = &edit.overwrites {
            body.insert(
                "permission_overwrites".into(),
                serde_json::to_value(overwrite_payload(overwrites))
                    .map_err(|e| DirectoryError::Malformed(e.to_string()))?,
            );
        }
        let response = self
            .request(reqwest::Method::PATCH, &path)
            .json(&body)
            .send()
            .await?;
        Self::expect_success("edit_channel", response).await?;
        *self.channels.lock().await = None;
        Ok(())
    }

    async fn set_channel_position(&self, id: Id, position: i64) -> DirectoryResult<()> {
        let path = format!("/guilds/{}/channels", self.workspace);
        let body = json!([{ "id": id.to_string(), "position": position }]);
        let response = self
            .request(reqwest::Method::PATCH, &path)
            .json(&body)
            .send()
            .await?;
        Self::expect_success("set_channel_position", response).await?;
        *self.channels.lock().await = None;
        Ok(())
    }
}
