//! Selectable grouping set for a motion's score map
//!
//! The dropdown offered for "muscle grouping" contains every primary-chain
//! ancestor of a muscle scoring above the threshold, plus qualifying muscles
//! that have children of their own. A qualifying leaf is never offered by
//! itself; its nearest branch stands in for it.

use crate::hierarchy::MuscleCatalog;
use crate::scores::calculated_score;
use crate::model::ScoreMap;
use serde::Serialize;
use std::collections::BTreeSet;

/// Default separator between breadcrumb labels
pub const DEFAULT_PATH_SEPARATOR: &str = " > ";

/// Muscles offered as grouping choices
pub fn selectable_ids(scores: &ScoreMap, catalog: &MuscleCatalog, min_score: f64) -> BTreeSet<String> {
    let mut selectable = BTreeSet::new();

    for (id, &score) in scores {
        if score <= min_score {
            continue;
        }
        if catalog.has_children(id) {
            selectable.insert(id.clone());
        }
        for ancestor in catalog.primary_chain(id) {
            selectable.insert(ancestor);
        }
    }

    selectable
}

/// Best default among the selectable muscles
///
/// Highest calculated score wins; ties go to the muscle listed first in the
/// catalog.
pub fn best_default(scores: &ScoreMap, catalog: &MuscleCatalog, selectable: &BTreeSet<String>) -> Option<String> {
    let mut candidates: Vec<&String> = selectable.iter().collect();
    candidates.sort_by_key(|id| catalog.position(id));

    let mut best: Option<(&String, f64)> = None;
    for id in candidates {
        let score = calculated_score(id, scores, catalog);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((id, score)),
        }
    }

    best.map(|(id, _)| id.clone())
}

/// Root muscle heading one dropdown section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupPrimary {
    pub id: String,
    pub label: String,
}

/// One dropdown entry with its breadcrumb
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOption {
    pub id: String,
    pub label: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionGroup {
    pub primary: GroupPrimary,
    pub options: Vec<GroupOption>,
}

/// Arrange selectable muscles under their roots
///
/// Roots appear in catalog order and only when at least one muscle of their
/// primary subtree (the root included) is selectable. Options are listed
/// depth-first; `path` joins the labels from the root down to the option.
pub fn option_groups(selectable: &BTreeSet<String>, catalog: &MuscleCatalog, separator: &str) -> Vec<OptionGroup> {
    let mut groups = Vec::new();

    for root in catalog.roots() {
        let mut members = vec![root.id.clone()];
        members.extend(catalog.primary_descendants(&root.id));

        let options: Vec<GroupOption> = members
            .into_iter()
            .filter(|id| selectable.contains(id))
            .map(|id| GroupOption {
                label: catalog.label_of(&id).to_string(),
                path: breadcrumb(&id, catalog, separator),
                id,
            })
            .collect();

        if options.is_empty() {
            continue;
        }

        groups.push(OptionGroup {
            primary: GroupPrimary {
                id: root.id.clone(),
                label: root.label.clone(),
            },
            options,
        });
    }

    groups
}

/// Labels from the root down to `id`, joined by `separator`
pub fn breadcrumb(id: &str, catalog: &MuscleCatalog, separator: &str) -> String {
    let chain = catalog.primary_chain(id);
    let mut labels: Vec<&str> = chain.iter().map(|ancestor| catalog.label_of(ancestor)).collect();
    labels.reverse();
    labels.push(catalog.label_of(id));
    labels.join(separator)
}
