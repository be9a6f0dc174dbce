//! Configuration documents.
//!
//! Two shapes exist and nothing else: the static [`BaselineConfig`] applied
//! once per process, and the cohort-keyed [`StructureConfig`] consumed by the
//! promotion reconciler. Both are JSON with fixed field names that round-trip
//! through persistence unchanged.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::de::{Deserializer, Error as DeError};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::SHARED_KEY;
use crate::directory::{CapabilitySet, ChannelKind};
use crate::sync::naming::normalize_channel_name;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config document: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_student_write() -> bool {
    true
}

/// One declared channel inside a cohort or the shared list.
///
/// `rank` is the channel's index in its declaring list; it is assigned at
/// parse time and drives deterministic ordering, it never round-trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub kind: ChannelKind,
    #[serde(default = "default_student_write")]
    pub student_write: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip)]
    pub rank: usize,
}

/// The channel list specific to one cohort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionSpec {
    pub channels: Vec<ChannelSpec>,
}

/// The promotion layout document: cohort key -> spec, plus the reserved
/// `"*"` key holding channels shared by every cohort.
///
/// Selection of the shared list is by key equality to the sentinel, never by
/// structural inspection of the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructureConfig {
    pub shared: Vec<ChannelSpec>,
    pub cohorts: BTreeMap<String, PromotionSpec>,
}

impl StructureConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Normalizes every channel name and assigns list ranks. Applied once at
    /// parse time; applying again is a no-op.
    fn normalize(&mut self) {
        for (rank, channel) in self.shared.iter_mut().enumerate() {
            channel.name = normalize_channel_name(&channel.name);
            channel.rank = rank;
        }
        for spec in self.cohorts.values_mut() {
            for (rank, channel) in spec.channels.iter_mut().enumerate() {
                channel.name = normalize_channel_name(&channel.name);
                channel.rank = rank;
            }
        }
    }
}

impl Serialize for StructureConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cohorts.len() + 1))?;
        map.serialize_entry(SHARED_KEY, &self.shared)?;
        for (key, spec) in &self.cohorts {
            map.serialize_entry(key, spec)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for StructureConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let mut config = StructureConfig::default();
        for (key, value) in raw {
            if key == SHARED_KEY {
                config.shared =
                    serde_json::from_value(value).map_err(D::Error::custom)?;
            } else {
                let spec: PromotionSpec =
                    serde_json::from_value(value).map_err(D::Error::custom)?;
                config.cohorts.insert(key, spec);
            }
        }
        config.normalize();
        Ok(config)
    }
}

impl fmt::Display for StructureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} shared channel(s), {} cohort(s)",
            self.shared.len(),
            self.cohorts.len()
        )
    }
}

/// A role declared by the baseline document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRole {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub capabilities: CapabilitySet,
    #[serde(default)]
    pub display_separately: bool,
}

impl BaselineRole {
    /// Parses the `#RRGGBB` color declaration; unset or malformed is 0.
    #[must_use]
    pub fn color_value(&self) -> u32 {
        self.color
            .as_deref()
            .and_then(parse_color)
            .unwrap_or_default()
    }
}

/// Per-channel access rule: role-name lists with the `"*"` wildcard, plus an
/// absolute deny list evaluated first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub read: Vec<String>,
    pub write: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny: Option<Vec<String>>,
}

impl AccessRule {
    #[must_use]
    pub fn denies(&self, role_name: &str) -> bool {
        self.deny
            .as_deref()
            .is_some_and(|deny| deny.iter().any(|n| n == role_name))
    }
}

/// One channel in a baseline category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineChannel {
    pub name: String,
    pub kind: ChannelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub access: AccessRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineCategory {
    pub name: String,
    pub channels: Vec<BaselineChannel>,
}

/// The fixed, cohort-independent structural configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub roles: Vec<BaselineRole>,
    pub categories: Vec<BaselineCategory>,
}

impl BaselineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Parses `#RRGGBB` into its numeric value.
#[must_use]
pub fn parse_color(raw: &str) -> Option<u32> {
    let hex = raw.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    u32::from_str_radix(hex, 16).ok()
}
