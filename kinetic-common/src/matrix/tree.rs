//! Tree views of one delta cell's score map
//!
//! Display tree: every scored muscle appears under each of its declared
//! parents; only scored leaves carry a number.
//!
//! Edit tree: primary parent only, one placement per muscle. Leaves hold the
//! editable explicit scores, internal nodes hold a derived rollup computed
//! once, bottom-up, when the tree is built.

use crate::hierarchy::MuscleCatalog;
use crate::model::ScoreMap;
use crate::scores::has_scored_descendant;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Node of the read-only display tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayNode {
    pub id: String,
    pub label: String,
    /// Present only on scored leaves
    pub score: Option<f64>,
    pub children: Vec<DisplayNode>,
}

/// Group a flat map under every ancestor path of each scored muscle
pub fn build_display_tree(scores: &ScoreMap, catalog: &MuscleCatalog) -> Vec<DisplayNode> {
    let paths: Vec<Vec<String>> = scores
        .keys()
        .flat_map(|id| catalog.ancestor_paths(id))
        .collect();
    let slices: Vec<&[String]> = paths.iter().map(Vec::as_slice).collect();
    grow_display(&slices, scores, catalog)
}

fn grow_display(paths: &[&[String]], scores: &ScoreMap, catalog: &MuscleCatalog) -> Vec<DisplayNode> {
    let mut heads: Vec<&String> = Vec::new();
    for path in paths {
        if let Some(head) = path.first() {
            if !heads.contains(&head) {
                heads.push(head);
            }
        }
    }
    heads.sort_by(|a, b| {
        catalog
            .position(a)
            .cmp(&catalog.position(b))
            .then_with(|| a.cmp(b))
    });

    heads
        .into_iter()
        .map(|head| {
            let tails: Vec<&[String]> = paths
                .iter()
                .filter(|p| p.len() > 1 && p[0] == *head)
                .map(|p| &p[1..])
                .collect();
            let children = grow_display(&tails, scores, catalog);
            let score = if children.is_empty() {
                scores.get(head.as_str()).copied()
            } else {
                None
            };

            DisplayNode {
                id: head.clone(),
                label: catalog.label_of(head).to_string(),
                score,
                children,
            }
        })
        .collect()
}

/// Node of the editable tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditNode {
    /// Directly editable explicit score
    Leaf { id: String, label: String, score: f64 },
    /// Read-only sum of its children
    Internal {
        id: String,
        label: String,
        derived_score: f64,
        children: Vec<EditNode>,
    },
}

impl EditNode {
    pub fn id(&self) -> &str {
        match self {
            EditNode::Leaf { id, .. } | EditNode::Internal { id, .. } => id,
        }
    }

    /// Leaf score or derived rollup
    pub fn score(&self) -> f64 {
        match self {
            EditNode::Leaf { score, .. } => *score,
            EditNode::Internal { derived_score, .. } => *derived_score,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, EditNode::Leaf { .. })
    }

    fn find(&self, target: &str) -> Option<&EditNode> {
        if self.id() == target {
            return Some(self);
        }
        match self {
            EditNode::Leaf { .. } => None,
            EditNode::Internal { children, .. } => children.iter().find_map(|c| c.find(target)),
        }
    }

    fn collect_leaves(&self, out: &mut ScoreMap) {
        match self {
            EditNode::Leaf { id, score, .. } => {
                out.insert(id.clone(), *score);
            }
            EditNode::Internal { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }
}

/// Editable tree over one cell's score map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditTree {
    scores: ScoreMap,
    roots: Vec<EditNode>,
}

impl EditTree {
    pub fn build(scores: &ScoreMap, catalog: &MuscleCatalog) -> Self {
        let mut members: BTreeSet<String> = BTreeSet::new();
        for id in scores.keys() {
            members.insert(id.clone());
            members.extend(catalog.primary_chain(id));
        }

        let mut roots: Vec<&String> = members
            .iter()
            .filter(|id| {
                catalog
                    .primary_parent(id)
                    .map_or(true, |parent| !members.contains(parent))
            })
            .collect();
        sort_by_catalog(&mut roots, catalog);

        let mut visited = HashSet::new();
        let roots = roots
            .into_iter()
            .map(|id| grow_edit(id, &members, scores, catalog, &mut visited))
            .collect();

        Self {
            scores: scores.clone(),
            roots,
        }
    }

    pub fn roots(&self) -> &[EditNode] {
        &self.roots
    }

    pub fn find(&self, id: &str) -> Option<&EditNode> {
        self.roots.iter().find_map(|root| root.find(id))
    }

    /// Flat map holding only leaf scores
    ///
    /// This is what gets saved. An explicit value stored on a muscle that has
    /// scored descendants is shown as the derived rollup and dropped here.
    pub fn flatten(&self) -> ScoreMap {
        let mut out = ScoreMap::new();
        for root in &self.roots {
            root.collect_leaves(&mut out);
        }
        out
    }

    /// Insert a muscle with score 0; existing muscles are left alone
    pub fn add_muscle(&mut self, muscle_id: &str, catalog: &MuscleCatalog) {
        if !self.scores.contains_key(muscle_id) {
            self.scores.insert(muscle_id.to_string(), 0.0);
            self.rebuild(catalog);
        }
    }

    /// Remove a muscle together with every primary descendant
    ///
    /// Returns the ids that were actually dropped from the map.
    pub fn remove_muscle(&mut self, muscle_id: &str, catalog: &MuscleCatalog) -> Vec<String> {
        let mut targets = vec![muscle_id.to_string()];
        targets.extend(catalog.primary_descendants(muscle_id));

        let removed: Vec<String> = targets
            .into_iter()
            .filter(|id| self.scores.remove(id).is_some())
            .collect();
        self.rebuild(catalog);
        removed
    }

    /// Set a leaf's score; internal nodes are derived and refuse edits
    pub fn set_score(&mut self, muscle_id: &str, score: f64, catalog: &MuscleCatalog) -> Result<()> {
        if has_scored_descendant(muscle_id, &self.scores, catalog) {
            return Err(Error::InvalidInput(format!(
                "{} is derived from its children and cannot be edited",
                muscle_id
            )));
        }
        self.scores.insert(muscle_id.to_string(), score);
        self.rebuild(catalog);
        Ok(())
    }

    fn rebuild(&mut self, catalog: &MuscleCatalog) {
        *self = Self::build(&self.scores, catalog);
    }
}

fn sort_by_catalog(ids: &mut [&String], catalog: &MuscleCatalog) {
    ids.sort_by(|a, b| {
        catalog
            .position(a)
            .cmp(&catalog.position(b))
            .then_with(|| a.cmp(b))
    });
}

fn grow_edit(
    id: &str,
    members: &BTreeSet<String>,
    scores: &ScoreMap,
    catalog: &MuscleCatalog,
    visited: &mut HashSet<String>,
) -> EditNode {
    let label = catalog.label_of(id).to_string();
    visited.insert(id.to_string());

    let mut child_ids: Vec<&String> = members
        .iter()
        .filter(|m| catalog.primary_parent(m) == Some(id) && !visited.contains(m.as_str()))
        .collect();
    sort_by_catalog(&mut child_ids, catalog);

    if child_ids.is_empty() {
        return EditNode::Leaf {
            id: id.to_string(),
            label,
            score: scores.get(id).copied().unwrap_or(0.0),
        };
    }

    let children: Vec<EditNode> = child_ids
        .into_iter()
        .map(|child| grow_edit(child, members, scores, catalog, visited))
        .collect();
    let derived_score = children.iter().map(EditNode::score).sum();

    EditNode::Internal {
        id: id.to_string(),
        label,
        derived_score,
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::sample_catalog;
    use crate::scores::calculated_score;

    fn scores(entries: &[(&str, f64)]) -> ScoreMap {
        entries.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_display_tree_places_muscle_under_every_parent() {
        let catalog = sample_catalog();
        let tree = build_display_tree(&scores(&[("BRACHIALIS", 2.0), ("BICEP_INNER", 1.0)]), &catalog);

        let roots: Vec<&str> = tree.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(roots, vec!["ARM", "FOREARM"]);

        let arm = &tree[0];
        assert_eq!(arm.score, None);
        let arm_children: Vec<&str> = arm.children.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(arm_children, vec!["BICEP", "BRACHIALIS"]);
        assert_eq!(arm.children[0].children[0].id, "BICEP_INNER");
        assert_eq!(arm.children[0].children[0].score, Some(1.0));

        assert_eq!(tree[1].children[0].id, "BRACHIALIS");
        assert_eq!(tree[1].children[0].score, Some(2.0));
    }

    #[test]
    fn test_display_tree_unknown_muscle_is_own_root() {
        let catalog = sample_catalog();
        let tree = build_display_tree(&scores(&[("GLUTE", 1.5)]), &catalog);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].label, "GLUTE");
        assert_eq!(tree[0].score, Some(1.5));
    }

    #[test]
    fn test_edit_tree_primary_placement_only() {
        let catalog = sample_catalog();
        let tree = EditTree::build(&scores(&[("BRACHIALIS", 2.0)]), &catalog);

        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.roots()[0].id(), "ARM");
        assert!(tree.find("FOREARM").is_none());
    }

    #[test]
    fn test_edit_tree_internal_scores_match_rollup() {
        let catalog = sample_catalog();
        let map = scores(&[("BICEP_INNER", 0.5), ("TRICEP", 0.25), ("QUAD", 1.0)]);
        let tree = EditTree::build(&map, &catalog);

        for id in ["ARM", "BICEP", "LEG"] {
            let node = tree.find(id).unwrap();
            assert!(!node.is_leaf());
            assert_eq!(node.score(), calculated_score(id, &map, &catalog));
        }
        assert!(tree.find("TRICEP").unwrap().is_leaf());
    }

    #[test]
    fn test_flatten_keeps_leaves() {
        let catalog = sample_catalog();
        let map = scores(&[("BICEP_INNER", 0.5), ("TRICEP", 0.25)]);
        assert_eq!(EditTree::build(&map, &catalog).flatten(), map);
    }

    #[test]
    fn test_flatten_drops_explicit_internal_values() {
        let catalog = sample_catalog();
        let map = scores(&[("BICEP", 0.3), ("BICEP_INNER", 0.5)]);
        let tree = EditTree::build(&map, &catalog);

        assert_eq!(tree.find("BICEP").unwrap().score(), 0.5);
        assert_eq!(tree.flatten(), scores(&[("BICEP_INNER", 0.5)]));
    }

    #[test]
    fn test_add_muscle_creates_ancestors_with_zero() {
        let catalog = sample_catalog();
        let mut tree = EditTree::build(&ScoreMap::new(), &catalog);
        tree.add_muscle("BICEP_INNER", &catalog);

        assert_eq!(tree.roots()[0].id(), "ARM");
        assert_eq!(tree.find("BICEP_INNER").unwrap().score(), 0.0);
        assert_eq!(tree.flatten(), scores(&[("BICEP_INNER", 0.0)]));
    }

    #[test]
    fn test_remove_muscle_removes_descendants() {
        let catalog = sample_catalog();
        let map = scores(&[("BICEP", 0.3), ("BICEP_INNER", 0.5), ("TRICEP", 0.25)]);
        let mut tree = EditTree::build(&map, &catalog);

        let mut removed = tree.remove_muscle("BICEP", &catalog);
        removed.sort();
        assert_eq!(removed, vec!["BICEP", "BICEP_INNER"]);
        assert_eq!(tree.flatten(), scores(&[("TRICEP", 0.25)]));
        assert!(tree.find("BICEP").is_none());
    }

    #[test]
    fn test_set_score_rejects_internal_node() {
        let catalog = sample_catalog();
        let mut tree = EditTree::build(&scores(&[("BICEP_INNER", 0.5)]), &catalog);

        assert!(tree.set_score("BICEP", 1.0, &catalog).is_err());
        tree.set_score("BICEP_INNER", 0.8, &catalog).unwrap();
        assert_eq!(tree.find("ARM").unwrap().score(), 0.8);
    }
}
