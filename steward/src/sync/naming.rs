//! Naming and classification utilities.
//!
//! Pure and deterministic; the current date is always injected so cohort
//! display names can be tested against a fixed calendar.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Utc};
use regex::Regex;

use crate::consts::{PROMOTION_PREFIX, PROMOTION_SUFFIX};
use crate::sync::types::Error;

static COHORT_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]+)_(\d+)$").expect("static pattern"));

/// Canonical channel name: lower-cased, trimmed, spaces replaced with
/// hyphens. Idempotent; applied before any remote lookup or comparison.
#[must_use]
pub fn normalize_channel_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "-")
}

/// Academic year containing `today`; the boundary sits at September, so
/// January through August still belong to the previous calendar year.
#[must_use]
pub fn academic_year(today: NaiveDate) -> i32 {
    if today.month() <= 8 {
        today.year() - 1
    } else {
        today.year()
    }
}

/// Today's date in UTC, the default input for display-name computation.
#[must_use]
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Enumerated cohort tracks with their fixed cursus parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Track {
    Pge,
    Msc,
    Wac,
}

impl Track {
    fn parse(code: &str) -> Option<Self> {
        match code {
            "PGE" => Some(Track::Pge),
            "MSC" => Some(Track::Msc),
            "WAC" => Some(Track::Wac),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Track::Pge => "PGE",
            Track::Msc => "MSC",
            Track::Wac => "WAC",
        }
    }

    /// Length of the cursus in years.
    #[must_use]
    pub fn cursus_length(self) -> i32 {
        match self {
            Track::Pge => 5,
            Track::Msc => 3,
            Track::Wac => 2,
        }
    }

    /// Offset applied to the declared graduation year before ranking.
    #[must_use]
    pub fn year_offset(self) -> i32 {
        match self {
            Track::Pge | Track::Msc => 0,
            Track::Wac => 1,
        }
    }
}

/// A parsed `<TRACK>_<YEAR>` cohort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortKey {
    pub track: Track,
    pub year: i32,
}

impl CohortKey {
    /// Parses a config key; malformed keys abort only that cohort's
    /// reconciliation.
    pub fn parse(key: &str) -> Result<Self, Error> {
        let captures = COHORT_KEY_RE.captures(key).ok_or_else(|| Error::InvalidConfigKey {
            key: key.to_string(),
            reason: "expected <TRACK>_<YEAR>".to_string(),
        })?;
        let track = Track::parse(&captures[1]).ok_or_else(|| Error::InvalidConfigKey {
            key: key.to_string(),
            reason: format!("unknown track '{}'", &captures[1]),
        })?;
        let year: i32 = captures[2].parse().map_err(|_| Error::InvalidConfigKey {
            key: key.to_string(),
            reason: "year is not a number".to_string(),
        })?;
        Ok(Self { track, year })
    }

    /// Cohort rank within its cursus for the given date, 1 being the final
    /// year: `cursus + 1 - (year - academic_year)`.
    #[must_use]
    pub fn rank(&self, today: NaiveDate) -> i32 {
        let promotion_year = self.year + self.track.year_offset();
        self.track.cursus_length() + 1 - (promotion_year - academic_year(today))
    }

    /// Display name used for both the cohort category and its role, e.g.
    /// `"PGE 3"`.
    #[must_use]
    pub fn display_name(&self, today: NaiveDate) -> String {
        format!("{} {}", self.track.code(), self.rank(today))
    }
}

/// Full category name for a cohort display name.
#[must_use]
pub fn cohort_category_name(display_name: &str) -> String {
    format!("{PROMOTION_PREFIX} {display_name}{PROMOTION_SUFFIX}")
}

/// Whether a category name carries the cohort marker.
///
/// Only the prefix is checked: the suffix is decoration, and a category
/// whose trailing separators were edited by hand must still be recognized
/// as a cohort category.
#[must_use]
pub fn is_cohort_category(name: &str) -> bool {
    name.contains(PROMOTION_PREFIX)
}
