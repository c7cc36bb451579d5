//! Muscle hierarchy walks
//!
//! The catalog is a shallow forest (primary / secondary / tertiary by
//! convention). Two relations exist over `parent_ids`:
//! - the primary parent (`parent_ids[0]`) forms a single-parent tree used for
//!   grouping, selection and the edit tree;
//! - all declared parents let a muscle roll up under several branches in the
//!   display tree.
//!
//! Cycles are not valid input, but every walk carries a visited set so a bad
//! catalog cannot hang the engine.

use crate::model::Muscle;
use std::collections::{HashMap, HashSet};

/// Indexed muscle catalog
///
/// Preserves input order; every "catalog order" in the engine refers to it.
#[derive(Debug, Clone, Default)]
pub struct MuscleCatalog {
    muscles: Vec<Muscle>,
    index: HashMap<String, usize>,
    primary_children: HashMap<String, Vec<usize>>,
}

impl MuscleCatalog {
    /// Build the catalog; a duplicated id keeps its first occurrence
    pub fn new(muscles: Vec<Muscle>) -> Self {
        let mut kept: Vec<Muscle> = Vec::with_capacity(muscles.len());
        let mut index = HashMap::new();

        for muscle in muscles {
            if index.contains_key(&muscle.id) {
                continue;
            }
            index.insert(muscle.id.clone(), kept.len());
            kept.push(muscle);
        }

        let mut primary_children: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, muscle) in kept.iter().enumerate() {
            if let Some(parent) = muscle.primary_parent() {
                primary_children
                    .entry(parent.to_string())
                    .or_default()
                    .push(position);
            }
        }

        Self {
            muscles: kept,
            index,
            primary_children,
        }
    }

    pub fn muscles(&self) -> &[Muscle] {
        &self.muscles
    }

    pub fn get(&self, id: &str) -> Option<&Muscle> {
        self.index.get(id).map(|&i| &self.muscles[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Position in catalog order; unknown ids sort last
    pub fn position(&self, id: &str) -> usize {
        self.index.get(id).copied().unwrap_or(usize::MAX)
    }

    /// Label of a muscle, falling back to its id
    pub fn label_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).map(|m| m.label.as_str()).unwrap_or(id)
    }

    pub fn primary_parent(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(Muscle::primary_parent)
    }

    /// A muscle with no primary parent (unknown ids count as roots)
    pub fn is_root(&self, id: &str) -> bool {
        self.primary_parent(id).is_none()
    }

    /// Root muscles in catalog order
    pub fn roots(&self) -> impl Iterator<Item = &Muscle> {
        self.muscles.iter().filter(|m| m.primary_parent().is_none())
    }

    /// Follow primary parents up to a muscle without one
    ///
    /// Returns `id` unchanged if it is unknown or parentless. On a cycle the
    /// walk stops at the last muscle not yet visited.
    pub fn find_root(&self, id: &str) -> String {
        let mut current = id.to_string();
        let mut visited = HashSet::new();
        visited.insert(current.clone());

        while let Some(parent) = self.primary_parent(&current) {
            if !visited.insert(parent.to_string()) {
                break;
            }
            current = parent.to_string();
        }

        current
    }

    /// Primary ancestors, nearest first
    pub fn primary_chain(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id.to_string());

        let mut current = id.to_string();
        while let Some(parent) = self.primary_parent(&current) {
            if !visited.insert(parent.to_string()) {
                break;
            }
            chain.push(parent.to_string());
            current = parent.to_string();
        }

        chain
    }

    /// Every ancestor reachable through any declared parent, each once
    pub fn all_ancestors(&self, id: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id.to_string());
        self.collect_ancestors(id, &mut visited, &mut found);
        found
    }

    fn collect_ancestors(&self, id: &str, visited: &mut HashSet<String>, found: &mut Vec<String>) {
        let Some(muscle) = self.get(id) else {
            return;
        };
        for parent in &muscle.parent_ids {
            if visited.insert(parent.clone()) {
                found.push(parent.clone());
                self.collect_ancestors(parent, visited, found);
            }
        }
    }

    /// Every root-to-muscle path over all declared parents
    ///
    /// A muscle with two declared parents yields (at least) two paths. The
    /// last element of each path is `id` itself.
    pub fn ancestor_paths(&self, id: &str) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        let mut trail = vec![id.to_string()];
        self.extend_paths(id, &mut trail, &mut paths);
        paths
    }

    fn extend_paths(&self, id: &str, trail: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
        let parents: Vec<&String> = self
            .get(id)
            .map(|m| m.parent_ids.iter().filter(|p| !trail.contains(p)).collect())
            .unwrap_or_default();

        if parents.is_empty() {
            let mut path = trail.clone();
            path.reverse();
            paths.push(path);
            return;
        }

        for parent in parents {
            trail.push(parent.clone());
            self.extend_paths(parent, trail, paths);
            trail.pop();
        }
    }

    /// Direct primary children in catalog order
    pub fn primary_children(&self, id: &str) -> Vec<&Muscle> {
        self.primary_children
            .get(id)
            .map(|children| children.iter().map(|&i| &self.muscles[i]).collect())
            .unwrap_or_default()
    }

    pub fn has_children(&self, id: &str) -> bool {
        self.primary_children.get(id).is_some_and(|c| !c.is_empty())
    }

    /// All primary descendants, depth-first in catalog order
    pub fn primary_descendants(&self, id: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id.to_string());
        self.collect_descendants(id, &mut visited, &mut found);
        found
    }

    fn collect_descendants(&self, id: &str, visited: &mut HashSet<String>, found: &mut Vec<String>) {
        for child in self.primary_children(id) {
            if visited.insert(child.id.clone()) {
                found.push(child.id.clone());
                self.collect_descendants(&child.id, visited, found);
            }
        }
    }
}
