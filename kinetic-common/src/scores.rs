//! Score aggregation over the muscle hierarchy
//!
//! A flat score map only carries explicit values. The calculated score of a
//! muscle rolls those values up the primary tree: a muscle with no scored
//! descendant reports its own value, anything else reports the sum of its
//! children. Internal nodes are therefore always derived, leaves always
//! explicit.

use crate::hierarchy::MuscleCatalog;
use crate::model::ScoreMap;
use std::collections::HashSet;

/// Calculated score of one muscle for a flat map
pub fn calculated_score(muscle_id: &str, scores: &ScoreMap, catalog: &MuscleCatalog) -> f64 {
    let mut visited = HashSet::new();
    rollup(muscle_id, scores, catalog, &mut visited)
}

fn rollup(muscle_id: &str, scores: &ScoreMap, catalog: &MuscleCatalog, visited: &mut HashSet<String>) -> f64 {
    if !visited.insert(muscle_id.to_string()) {
        return 0.0;
    }

    if !has_scored_descendant(muscle_id, scores, catalog) {
        return scores.get(muscle_id).copied().unwrap_or(0.0);
    }

    catalog
        .primary_children(muscle_id)
        .iter()
        .map(|child| rollup(&child.id, scores, catalog, visited))
        .sum()
}

/// Whether any primary descendant of `muscle_id` has an explicit score
pub fn has_scored_descendant(muscle_id: &str, scores: &ScoreMap, catalog: &MuscleCatalog) -> bool {
    catalog
        .primary_descendants(muscle_id)
        .iter()
        .any(|id| scores.contains_key(id))
}

/// Muscle with the highest score
///
/// Ties go to the first key in map order (ascending id); `None` for an empty map.
pub fn argmax(scores: &ScoreMap) -> Option<&str> {
    let mut best: Option<(&str, f64)> = None;
    for (id, &score) in scores {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((id.as_str(), score)),
        }
    }
    best.map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::tests::sample_catalog;

    fn scores(entries: &[(&str, f64)]) -> ScoreMap {
        entries.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_leaf_uses_explicit_value() {
        let catalog = sample_catalog();
        let map = scores(&[("TRICEP", 0.4)]);
        assert_eq!(calculated_score("TRICEP", &map, &catalog), 0.4);
        assert_eq!(calculated_score("QUAD", &map, &catalog), 0.0);
    }

    #[test]
    fn test_internal_node_rolls_up_children() {
        let catalog = sample_catalog();
        let map = scores(&[("BICEP_INNER", 0.5), ("TRICEP", 0.25), ("ARM", 9.0)]);

        // BICEP has a scored child, ARM's explicit 9.0 is ignored
        assert_eq!(calculated_score("BICEP", &map, &catalog), 0.5);
        assert_eq!(calculated_score("ARM", &map, &catalog), 0.75);
    }

    #[test]
    fn test_explicit_internal_value_ignored_once_child_scored() {
        let catalog = sample_catalog();
        let map = scores(&[("BICEP", 0.9), ("BICEP_INNER", 0.2)]);
        assert_eq!(calculated_score("BICEP", &map, &catalog), 0.2);
    }

    #[test]
    fn test_rollup_survives_cycle() {
        use crate::model::Muscle;
        let catalog = MuscleCatalog::new(vec![
            Muscle::new("A", "A", &["B"]),
            Muscle::new("B", "B", &["A"]),
        ]);
        let map = scores(&[("A", 1.0), ("B", 2.0)]);
        // Terminates; exact value on invalid input is unspecified
        let _ = calculated_score("A", &map, &catalog);
    }

    #[test]
    fn test_argmax_picks_highest() {
        let map = scores(&[("A", 0.1), ("B", 0.7), ("C", 0.3)]);
        assert_eq!(argmax(&map), Some("B"));
    }

    #[test]
    fn test_argmax_tie_picks_exactly_one() {
        let map = scores(&[("B", 0.5), ("A", 0.5)]);
        assert_eq!(argmax(&map), Some("A"));
    }

    #[test]
    fn test_argmax_empty_is_none() {
        assert_eq!(argmax(&ScoreMap::new()), None);
    }

    #[test]
    fn test_argmax_result_dominates_every_entry() {
        let map = scores(&[("A", -1.0), ("B", -0.5), ("C", -3.0), ("D", -0.5)]);
        let winner = argmax(&map).unwrap();
        assert!(map.values().all(|&s| map[winner] >= s));
    }
}
