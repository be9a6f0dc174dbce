/*
 * Steward - Community Workspace Reconciliation Engine
 * Copyright (C) 2025 Steward team
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Steward core library
//!
//! Converges a community workspace (roles, categories, channels, permission
//! grants) to a declarative configuration: a fixed baseline document applied
//! at startup and a cohort-keyed structure document re-applied on demand and
//! on a nightly schedule. Mutations are diffed against a fresh snapshot of
//! the remote state, so a converged workspace produces none.

pub mod config;
pub mod consts;
pub mod directory;
pub mod jobs;
pub mod persist;
pub mod sync;

pub use config::{BaselineConfig, StructureConfig};
pub use directory::{DirectoryClient, MemoryDirectory, RestDirectory};
pub use persist::{ConfigStore, JsonFileStore};
pub use sync::{
    run_baseline_reconciliation, run_promotion_reconciliation, Context, ProgressSink, SyncLock,
};
