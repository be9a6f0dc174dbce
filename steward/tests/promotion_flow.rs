//! End-to-end promotion reconciliation against the in-memory directory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use steward::config::{BaselineCategory, BaselineChannel, BaselineConfig, BaselineRole};
use steward::consts::{roles, ARCHIVE_CATEGORY_NAME, PROMOTIONS_PLACEHOLDER};
use steward::directory::{
    Capability, CapabilitySet, Channel, ChannelEdit, ChannelKind, DirectoryClient, DirectoryError,
    DirectoryResult, Id, MemoryDirectory, Role, RoleEdit,
};
use steward::sync::naming::{cohort_category_name, today, CohortKey};
use steward::sync::{run_promotion_reconciliation, Context};
use steward::StructureConfig;

fn baseline() -> BaselineConfig {
    BaselineConfig {
        roles: vec![
            BaselineRole {
                name: roles::MAINTAINER.to_string(),
                color: Some("#E74C3C".to_string()),
                capabilities: CapabilitySet::of(&[Capability::Administer]),
                display_separately: true,
            },
            BaselineRole {
                name: roles::EXTERNAL.to_string(),
                color: None,
                capabilities: CapabilitySet::new(),
                display_separately: false,
            },
        ],
        categories: vec![
            BaselineCategory {
                name: "GENERAL".to_string(),
                channels: vec![BaselineChannel {
                    name: "town-square".to_string(),
                    kind: steward::directory::ChannelKind::Text,
                    description: None,
                    access: steward::config::AccessRule {
                        read: vec!["*".to_string()],
                        write: vec!["*".to_string()],
                        deny: None,
                    },
                }],
            },
            BaselineCategory {
                name: PROMOTIONS_PLACEHOLDER.to_string(),
                channels: vec![],
            },
        ],
    }
}

fn context(directory: &Arc<MemoryDirectory>) -> Context {
    Context::new(directory.clone(), Arc::new(baseline()))
}

fn structure(raw: &str) -> StructureConfig {
    StructureConfig::from_json_str(raw).unwrap()
}

/// Delegates to the in-memory directory but rejects channel creation on
/// demand, standing in for a remote refusing one call mid-run.
struct FlakyDirectory {
    inner: MemoryDirectory,
    reject_channel_creation: AtomicBool,
}

impl FlakyDirectory {
    fn new(workspace: Id) -> Self {
        Self {
            inner: MemoryDirectory::new(workspace),
            reject_channel_creation: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DirectoryClient for FlakyDirectory {
    fn workspace_id(&self) -> Id {
        self.inner.workspace_id()
    }

    async fn fetch_roles(&self, force: bool) -> DirectoryResult<Vec<Role>> {
        self.inner.fetch_roles(force).await
    }

    async fn fetch_channels(&self, force: bool) -> DirectoryResult<Vec<Channel>> {
        self.inner.fetch_channels(force).await
    }

    async fn fetch_members(&self) -> DirectoryResult<usize> {
        self.inner.fetch_members().await
    }

    async fn create_role(
        &self,
        name: &str,
        color: u32,
        capabilities: CapabilitySet,
        hoist: bool,
    ) -> DirectoryResult<Role> {
        self.inner.create_role(name, color, capabilities, hoist).await
    }

    async fn edit_role(&self, id: Id, edit: RoleEdit) -> DirectoryResult<()> {
        self.inner.edit_role(id, edit).await
    }

    async fn set_role_position(&self, id: Id, position: i64) -> DirectoryResult<()> {
        self.inner.set_role_position(id, position).await
    }

    async fn create_category(&self, name: &str) -> DirectoryResult<Channel> {
        self.inner.create_category(name).await
    }

    async fn create_channel(
        &self,
        name: &str,
        kind: ChannelKind,
        parent: Id,
    ) -> DirectoryResult<Channel> {
        if self.reject_channel_creation.load(Ordering::SeqCst) {
            return Err(DirectoryError::Rejected {
                op: "create_channel",
                status: 403,
                message: "channel limit reached".to_string(),
            });
        }
        self.inner.create_channel(name, kind, parent).await
    }

    async fn edit_channel(&self, id: Id, edit: ChannelEdit) -> DirectoryResult<()> {
        self.inner.edit_channel(id, edit).await
    }

    async fn set_channel_position(&self, id: Id, position: i64) -> DirectoryResult<()> {
        self.inner.set_channel_position(id, position).await
    }
}

fn category_name_for(key: &str) -> String {
    let cohort = CohortKey::parse(key).unwrap();
    cohort_category_name(&cohort.display_name(today()))
}

fn role_name_for(key: &str) -> String {
    CohortKey::parse(key).unwrap().display_name(today())
}

#[tokio::test]
async fn cohort_category_role_and_channels_are_created() {
    let directory = Arc::new(MemoryDirectory::new(1));
    let ctx = context(&directory);
    let config = structure(
        r#"{
            "*": [{ "name": "General", "kind": "text" }],
            "PGE_2030": { "channels": [{ "name": "Projects", "kind": "forum" }] }
        }"#,
    );

    assert!(run_promotion_reconciliation(&ctx, &config, None).await);

    let category = directory
        .category_named(&category_name_for("PGE_2030"))
        .expect("cohort category");
    let names: Vec<String> = directory
        .channels_in(category.id)
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert!(names.contains(&"general".to_string()));
    assert!(names.contains(&"projects".to_string()));
    assert!(directory.role_named(&role_name_for("PGE_2030")).is_some());
}

#[tokio::test]
async fn second_run_issues_no_mutations() {
    let directory = Arc::new(MemoryDirectory::new(1));
    let ctx = context(&directory);
    let config = structure(
        r#"{
            "*": [{ "name": "General", "kind": "text" }],
            "PGE_2030": { "channels": [{ "name": "Projects", "kind": "forum" }] },
            "MSC_2029": { "channels": [{ "name": "Thesis", "kind": "text", "student_write": false }] }
        }"#,
    );

    assert!(run_promotion_reconciliation(&ctx, &config, None).await);
    directory.reset_mutation_count();

    assert!(run_promotion_reconciliation(&ctx, &config, None).await);
    assert_eq!(directory.mutation_count(), 0);
}

#[tokio::test]
async fn removed_channel_moves_to_archive_with_origin_suffix() {
    let directory = Arc::new(MemoryDirectory::new(1));
    let ctx = context(&directory);

    let before = structure(
        r#"{
            "*": [],
            "PGE_2030": { "channels": [
                { "name": "Projects", "kind": "text" },
                { "name": "Old News", "kind": "text" }
            ] }
        }"#,
    );
    assert!(run_promotion_reconciliation(&ctx, &before, None).await);

    let after = structure(
        r#"{ "*": [], "PGE_2030": { "channels": [{ "name": "Projects", "kind": "text" }] } }"#,
    );
    assert!(run_promotion_reconciliation(&ctx, &after, None).await);

    let archive = directory
        .category_named(ARCHIVE_CATEGORY_NAME)
        .expect("archive category");
    let origin = category_name_for("PGE_2030");
    let archived = directory
        .channel_named(&format!("old-news ({origin})"))
        .expect("archived channel");
    assert_eq!(archived.parent, Some(archive.id));
    // The maintainer role backing the archive lock exists from the first run.
    assert!(directory.role_named(roles::MAINTAINER).is_some());
}

#[tokio::test]
async fn archiving_is_idempotent_across_runs() {
    let directory = Arc::new(MemoryDirectory::new(1));
    let ctx = context(&directory);

    let before = structure(
        r#"{ "*": [], "PGE_2030": { "channels": [
            { "name": "Projects", "kind": "text" },
            { "name": "Old News", "kind": "text" }
        ] } }"#,
    );
    let after = structure(
        r#"{ "*": [], "PGE_2030": { "channels": [{ "name": "Projects", "kind": "text" }] } }"#,
    );

    assert!(run_promotion_reconciliation(&ctx, &before, None).await);
    assert!(run_promotion_reconciliation(&ctx, &after, None).await);
    directory.reset_mutation_count();

    assert!(run_promotion_reconciliation(&ctx, &after, None).await);
    assert_eq!(directory.mutation_count(), 0);
}

#[tokio::test]
async fn stale_cohort_is_drained_but_category_remains() {
    let directory = Arc::new(MemoryDirectory::new(1));
    let ctx = context(&directory);

    let before = structure(
        r#"{
            "*": [{ "name": "General", "kind": "text" }],
            "PGE_2030": { "channels": [{ "name": "Projects", "kind": "text" }] },
            "MSC_2029": { "channels": [{ "name": "Thesis", "kind": "text" }] }
        }"#,
    );
    assert!(run_promotion_reconciliation(&ctx, &before, None).await);

    let after = structure(
        r#"{
            "*": [{ "name": "General", "kind": "text" }],
            "PGE_2030": { "channels": [{ "name": "Projects", "kind": "text" }] }
        }"#,
    );
    assert!(run_promotion_reconciliation(&ctx, &after, None).await);

    let stale = directory
        .category_named(&category_name_for("MSC_2029"))
        .expect("drained category still exists");
    let remaining: Vec<String> = directory
        .channels_in(stale.id)
        .into_iter()
        .map(|c| c.name)
        .collect();
    // Shared channels stay behind; the cohort-specific one was archived.
    assert_eq!(remaining, vec!["general".to_string()]);

    let archive = directory.category_named(ARCHIVE_CATEGORY_NAME).unwrap();
    let archived: Vec<String> = directory
        .channels_in(archive.id)
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert!(archived.iter().any(|n| n.starts_with("thesis (")));
}

#[tokio::test]
async fn failed_cohort_keeps_its_channels_out_of_the_archive() {
    let directory = Arc::new(FlakyDirectory::new(1));
    let ctx = Context::new(directory.clone(), Arc::new(baseline()));

    let before = structure(
        r#"{ "*": [], "PGE_2030": { "channels": [{ "name": "Projects", "kind": "text" }] } }"#,
    );
    assert!(run_promotion_reconciliation(&ctx, &before, None).await);

    // Same key, one new channel; the remote now rejects its creation, so the
    // cohort fails partway while staying in the document.
    directory.reject_channel_creation.store(true, Ordering::SeqCst);
    let after = structure(
        r#"{ "*": [], "PGE_2030": { "channels": [
            { "name": "Projects", "kind": "text" },
            { "name": "Notices", "kind": "text" }
        ] } }"#,
    );
    assert!(run_promotion_reconciliation(&ctx, &after, None).await);

    let category = directory
        .inner
        .category_named(&category_name_for("PGE_2030"))
        .expect("live cohort category");
    let remaining: Vec<String> = directory
        .inner
        .channels_in(category.id)
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(remaining, vec!["projects".to_string()]);
    assert!(directory.inner.category_named(ARCHIVE_CATEGORY_NAME).is_none());
}

#[tokio::test]
async fn malformed_cohort_key_skips_only_that_cohort() {
    let directory = Arc::new(MemoryDirectory::new(1));
    let ctx = context(&directory);
    let config = structure(
        r#"{
            "*": [],
            "FOO_2030": { "channels": [{ "name": "Ghost", "kind": "text" }] },
            "PGE_2030": { "channels": [{ "name": "Projects", "kind": "text" }] }
        }"#,
    );

    assert!(run_promotion_reconciliation(&ctx, &config, None).await);

    assert!(directory
        .category_named(&category_name_for("PGE_2030"))
        .is_some());
    assert!(directory.channel_named("ghost").is_none());
}

#[tokio::test]
async fn categories_end_up_in_declared_order_with_archive_last() {
    let directory = Arc::new(MemoryDirectory::new(1));
    let ctx = context(&directory);
    directory.seed_channel("GENERAL", steward::directory::ChannelKind::Category, None);

    let before = structure(
        r#"{ "*": [], "MSC_2029": { "channels": [{ "name": "Thesis", "kind": "text" }] } }"#,
    );
    assert!(run_promotion_reconciliation(&ctx, &before, None).await);
    // Second document retires the cohort so the Archive category exists.
    let after = structure(r#"{ "*": [], "PGE_2030": { "channels": [] } }"#);
    assert!(run_promotion_reconciliation(&ctx, &after, None).await);

    let order: Vec<String> = directory
        .categories_in_order()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(order.first().map(String::as_str), Some("GENERAL"));
    assert_eq!(
        order.last().map(String::as_str),
        Some(ARCHIVE_CATEGORY_NAME)
    );
    assert!(order.contains(&category_name_for("PGE_2030")));
}

#[tokio::test]
async fn nickname_capability_is_reserved_to_the_maintainer() {
    let directory = Arc::new(MemoryDirectory::new(1));
    let ctx = context(&directory);
    directory.seed_role(roles::MAINTAINER, CapabilitySet::new());
    directory.seed_role(
        roles::STUDENT,
        CapabilitySet::of(&[Capability::ChangeNickname]),
    );

    let config = structure(r#"{ "*": [], "PGE_2030": { "channels": [] } }"#);
    assert!(run_promotion_reconciliation(&ctx, &config, None).await);

    let maintainer = directory.role_named(roles::MAINTAINER).unwrap();
    let student = directory.role_named(roles::STUDENT).unwrap();
    let everyone = directory.role_named("@everyone").unwrap();
    assert!(maintainer.capabilities.contains(Capability::ChangeNickname));
    assert!(!student.capabilities.contains(Capability::ChangeNickname));
    assert!(!everyone.capabilities.contains(Capability::ChangeNickname));
}

#[tokio::test]
async fn progress_messages_are_reported_in_order() {
    use std::sync::Mutex;

    let directory = Arc::new(MemoryDirectory::new(1));
    let ctx = context(&directory);
    let config = structure(r#"{ "*": [], "PGE_2030": { "channels": [] } }"#);

    let messages: Mutex<Vec<String>> = Mutex::new(Vec::new());
    let sink = |message: &str| messages.lock().unwrap().push(message.to_string());
    assert!(run_promotion_reconciliation(&ctx, &config, Some(&sink)).await);

    let messages = messages.into_inner().unwrap();
    assert_eq!(messages.first().map(String::as_str), Some("Processing PGE_2030"));
    assert_eq!(
        messages.last().map(String::as_str),
        Some("Config processed successfully")
    );
}
