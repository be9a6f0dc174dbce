//! Deterministic ordering of channels and categories.
//!
//! Pure planners: both functions compute the target order and emit position
//! writes only for entries whose current position differs, so an already
//! converged workspace produces an empty plan.

use crate::config::{BaselineCategory, ChannelSpec};
use crate::consts::{ARCHIVE_CATEGORY_NAME, PROMOTIONS_PLACEHOLDER};
use crate::directory::{Channel, ChannelKind, Id};
use crate::sync::naming::is_cohort_category;

/// One position write to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMove {
    pub id: Id,
    pub position: i64,
}

fn spec_rank(specs: &[ChannelSpec], name: &str) -> Option<usize> {
    specs.iter().find(|s| s.name == name).map(|s| s.rank)
}

/// Target order within a cohort category: shared channels by their list
/// rank, then cohort channels by theirs, then any remaining channels
/// alphabetically.
#[must_use]
pub fn channel_order_plan(
    channels: &[Channel],
    category: Id,
    shared: &[ChannelSpec],
    cohort: &[ChannelSpec],
) -> Vec<PositionMove> {
    let members: Vec<&Channel> = channels
        .iter()
        .filter(|c| c.parent == Some(category))
        .collect();

    let mut shared_members: Vec<&Channel> = Vec::new();
    let mut cohort_members: Vec<&Channel> = Vec::new();
    let mut remaining: Vec<&Channel> = Vec::new();

    for channel in members {
        if spec_rank(shared, &channel.name).is_some() {
            shared_members.push(channel);
        } else if spec_rank(cohort, &channel.name).is_some() {
            cohort_members.push(channel);
        } else {
            remaining.push(channel);
        }
    }

    shared_members.sort_by_key(|c| spec_rank(shared, &c.name));
    cohort_members.sort_by_key(|c| spec_rank(cohort, &c.name));
    remaining.sort_by(|a, b| a.name.cmp(&b.name));

    shared_members
        .into_iter()
        .chain(cohort_members)
        .chain(remaining)
        .enumerate()
        .filter(|(index, channel)| channel.position != *index as i64)
        .map(|(index, channel)| PositionMove {
            id: channel.id,
            position: index as i64,
        })
        .collect()
}

/// Target top-level category order: baseline categories in declared order,
/// with every cohort category interleaved at the placeholder position sorted
/// by descending name (newest cohort first), and the Archive category last.
#[must_use]
pub fn category_order_plan(
    channels: &[Channel],
    baseline_categories: &[BaselineCategory],
) -> Vec<PositionMove> {
    let categories: Vec<&Channel> = channels
        .iter()
        .filter(|c| c.kind == ChannelKind::Category)
        .collect();

    let mut cohort_categories: Vec<&Channel> = categories
        .iter()
        .copied()
        .filter(|c| is_cohort_category(&c.name))
        .collect();
    cohort_categories.sort_by(|a, b| b.name.cmp(&a.name));

    let mut ordered: Vec<&Channel> = Vec::with_capacity(categories.len());
    for declared in baseline_categories {
        if declared.name == PROMOTIONS_PLACEHOLDER {
            ordered.extend(cohort_categories.iter().copied());
            continue;
        }
        if declared.name == ARCHIVE_CATEGORY_NAME {
            continue;
        }
        if let Some(category) = categories
            .iter()
            .find(|c| c.name == declared.name && !is_cohort_category(&c.name))
        {
            ordered.push(category);
        }
    }
    if let Some(archive) = categories.iter().find(|c| c.name == ARCHIVE_CATEGORY_NAME) {
        ordered.push(archive);
    }

    ordered
        .into_iter()
        .enumerate()
        .filter(|(index, category)| category.position != *index as i64)
        .map(|(index, category)| PositionMove {
            id: category.id,
            position: index as i64,
        })
        .collect()
}
