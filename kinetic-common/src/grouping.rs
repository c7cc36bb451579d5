//! Motion grouping by primary muscle
//!
//! A motion is grouped under its stored `muscle_grouping_id` or, failing
//! that, under the best selectable muscle computed from its own targets.
//! Motion lists are then bucketed by root muscle, by grouping muscle, and
//! ordered base-before-variant inside each bucket.

use crate::hierarchy::MuscleCatalog;
use crate::model::{Motion, Record, ScoreMap, MOTIONS_TABLE};
use crate::scores::calculated_score;
use crate::selectable::{best_default, selectable_ids};
use crate::store::TableStore;
use crate::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Score a muscle must exceed to make its branch a default grouping choice
pub const GROUPING_THRESHOLD: f64 = 0.5;

/// Section label for motions without a resolvable grouping
pub const NO_PRIMARY_LABEL: &str = "No Primary Muscle";

/// Computed grouping for a score map, ignoring any stored override
pub fn default_grouping_id(scores: &ScoreMap, catalog: &MuscleCatalog, min_score: f64) -> Option<String> {
    let candidates: BTreeSet<String> = selectable_ids(scores, catalog, min_score)
        .into_iter()
        .filter(|id| calculated_score(&catalog.find_root(id), scores, catalog) > 0.0)
        .collect();

    best_default(scores, catalog, &candidates)
}

/// Stored override if set, computed default otherwise
pub fn effective_grouping_id(motion: &Motion, catalog: &MuscleCatalog) -> Option<String> {
    resolve_grouping_id(motion, catalog, GROUPING_THRESHOLD)
}

/// [`effective_grouping_id`] with a configurable candidate threshold
pub fn resolve_grouping_id(motion: &Motion, catalog: &MuscleCatalog, min_score: f64) -> Option<String> {
    match motion.muscle_grouping_id.as_deref() {
        Some(id) if !id.is_empty() => Some(id.to_string()),
        _ => default_grouping_id(&motion.muscle_targets, catalog, min_score),
    }
}

/// Persist (or clear, with `None`) a motion's grouping override
pub async fn save_grouping<S: TableStore + ?Sized>(store: &S, motion_id: &str, muscle_id: Option<&str>) -> Result<()> {
    let mut fields = Record::new();
    fields.insert(
        "muscle_grouping_id".to_string(),
        muscle_id.map_or(Value::Null, |id| Value::String(id.to_string())),
    );
    store.update_row(MOTIONS_TABLE, motion_id, fields).await?;
    debug!("Saved grouping {:?} for motion {}", muscle_id, motion_id);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderLevel {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionHeader {
    pub level: HeaderLevel,
    /// Muscle id; `None` for the "No Primary Muscle" section
    pub id: Option<String>,
    pub label: String,
}

/// One line of a grouped motion list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupedEntry {
    Header(SectionHeader),
    /// `depth` is 1 for a variant nested under its base motion
    Motion { motion: Motion, depth: usize },
}

/// Bucket and order a motion list for display
///
/// Root sections come first, sorted by label. A root section gets secondary
/// headers only when its motions are grouped under more than one muscle.
pub fn group_motions(motions: &[Motion], catalog: &MuscleCatalog) -> Vec<GroupedEntry> {
    group_motions_at(motions, catalog, GROUPING_THRESHOLD)
}

/// [`group_motions`] with a configurable candidate threshold
pub fn group_motions_at(motions: &[Motion], catalog: &MuscleCatalog, min_score: f64) -> Vec<GroupedEntry> {
    let mut by_root: HashMap<Option<String>, Vec<(&Motion, Option<String>)>> = HashMap::new();
    for motion in motions {
        let grouping = resolve_grouping_id(motion, catalog, min_score);
        let root = grouping.as_deref().map(|id| catalog.find_root(id));
        by_root.entry(root).or_default().push((motion, grouping));
    }

    let mut roots: Vec<Option<String>> = by_root.keys().cloned().collect();
    sort_sections(&mut roots, catalog);

    let mut entries = Vec::new();
    for root in roots {
        let members = by_root.remove(&root).unwrap_or_default();
        entries.push(GroupedEntry::Header(SectionHeader {
            level: HeaderLevel::Primary,
            label: section_label(root.as_deref(), catalog),
            id: root,
        }));

        let mut by_grouping: HashMap<Option<String>, Vec<&Motion>> = HashMap::new();
        for (motion, grouping) in members {
            by_grouping.entry(grouping).or_default().push(motion);
        }

        let mut groupings: Vec<Option<String>> = by_grouping.keys().cloned().collect();
        sort_sections(&mut groupings, catalog);
        let split = groupings.len() > 1;

        for grouping in groupings {
            let bucket = by_grouping.remove(&grouping).unwrap_or_default();
            if split {
                entries.push(GroupedEntry::Header(SectionHeader {
                    level: HeaderLevel::Secondary,
                    label: section_label(grouping.as_deref(), catalog),
                    id: grouping,
                }));
            }
            entries.extend(
                order_family(bucket)
                    .into_iter()
                    .map(|(motion, depth)| GroupedEntry::Motion {
                        motion: motion.clone(),
                        depth,
                    }),
            );
        }
    }

    entries
}

fn section_label(id: Option<&str>, catalog: &MuscleCatalog) -> String {
    match id {
        Some(id) => catalog.label_of(id).to_string(),
        None => NO_PRIMARY_LABEL.to_string(),
    }
}

fn sort_sections(ids: &mut [Option<String>], catalog: &MuscleCatalog) {
    ids.sort_by(|a, b| {
        let la = section_label(a.as_deref(), catalog).to_lowercase();
        let lb = section_label(b.as_deref(), catalog).to_lowercase();
        la.cmp(&lb).then_with(|| a.cmp(b))
    });
}

fn by_label(motions: &mut [&Motion]) {
    motions.sort_by(|a, b| {
        a.label
            .to_lowercase()
            .cmp(&b.label.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Base rows by label, each followed by its variants
///
/// Variants whose base is not in the bucket are listed at top level.
fn order_family(bucket: Vec<&Motion>) -> Vec<(&Motion, usize)> {
    let bases: HashSet<&str> = bucket
        .iter()
        .filter(|m| m.parent_id.is_none())
        .map(|m| m.id.as_str())
        .collect();

    let (mut nested, mut top): (Vec<&Motion>, Vec<&Motion>) = bucket
        .into_iter()
        .partition(|m| m.parent_id.as_deref().is_some_and(|p| bases.contains(p)));
    by_label(&mut top);
    by_label(&mut nested);

    let mut ordered = Vec::new();
    for motion in top {
        ordered.push((motion, 0));
        for child in nested
            .iter()
            .filter(|c| c.parent_id.as_deref() == Some(motion.id.as_str()))
        {
            ordered.push((*child, 1));
        }
    }
    ordered
}
