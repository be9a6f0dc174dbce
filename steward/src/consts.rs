//! Fixed business constants for the managed workspace.
//!
//! Role names must match the ones declared in `base.config.json`; names are
//! the sole join key against remote state.

/// Prefix of cohort category names in the workspace.
pub const PROMOTION_PREFIX: &str = "➖➖PROMOTION";

/// Suffix of cohort category names in the workspace.
pub const PROMOTION_SUFFIX: &str = "➖➖";

/// Category holding resources no longer referenced by any active config.
pub const ARCHIVE_CATEGORY_NAME: &str = "ARCHIVE";

/// Placeholder entry in the baseline category list marking where cohort
/// categories are interleaved during the global reorder.
pub const PROMOTIONS_PLACEHOLDER: &str = "PROMOTIONS_PLACEHOLDER";

/// Display name of the implicit everyone role.
pub const EVERYONE_ROLE_NAME: &str = "@everyone";

/// Reserved config key selecting the shared channel list.
pub const SHARED_KEY: &str = "*";

/// Number of role slots reserved above the baseline roles.
pub const RESERVED_TOP_ROLES: i64 = 4;

/// Non-editable roles referenced by name throughout reconciliation.
pub mod roles {
    /// The staff role retained with elevated capabilities everywhere.
    pub const MAINTAINER: &str = "Maintainer";
    /// Guests from outside the community.
    pub const EXTERNAL: &str = "External";
    pub const FACULTY: &str = "Faculty";
    pub const DEVELOPMENT: &str = "Development";
    pub const COMMUNICATION: &str = "Communication";
    pub const MENTOR: &str = "Mentor";
    pub const INSTRUCTOR: &str = "Instructor";
    pub const ADMINISTRATION: &str = "Administration";
    pub const DIRECTION: &str = "Direction";
    pub const STUDENT: &str = "Student";
    pub const ALUMNI: &str = "Alumni";
}

/// Staff-type roles granted full access to every cohort channel.
pub const STAFF_ROLE_NAMES: [&str; 8] = [
    roles::FACULTY,
    roles::MAINTAINER,
    roles::DEVELOPMENT,
    roles::COMMUNICATION,
    roles::MENTOR,
    roles::INSTRUCTOR,
    roles::ADMINISTRATION,
    roles::DIRECTION,
];
