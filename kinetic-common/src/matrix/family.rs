//! Motion-path family plane
//!
//! A base motion and its direct variants share the motion-path table. Each
//! motion-path row can be handed from one family member to another; the rule
//! moves, it is never copied.

use super::{delta_rules_fields, sync_motions, DeltaMatrix};
use crate::model::{DeltaRow, DeltaTableKey, DeltaValue, Motion};
use crate::store::TableStore;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyMember {
    pub id: String,
    pub label: String,
    pub is_base: bool,
}

/// One motion-path row and the family members referencing it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyRow {
    pub row_id: String,
    pub row_label: String,
    pub owners: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilyPlane {
    pub base_id: String,
    /// Base first, then variants by label
    pub members: Vec<FamilyMember>,
    /// Every motion-path row, by label
    pub rows: Vec<FamilyRow>,
}

impl FamilyPlane {
    pub fn build(base_id: &str, motions: &[Motion], matrix: &DeltaMatrix) -> Result<Self> {
        let base = motions
            .iter()
            .find(|m| m.id == base_id)
            .ok_or_else(|| Error::NotFound(format!("motion {}", base_id)))?;

        let mut variants: Vec<&Motion> = motions
            .iter()
            .filter(|m| m.parent_id.as_deref() == Some(base_id) && m.id != base_id)
            .collect();
        variants.sort_by(|a, b| a.label.to_lowercase().cmp(&b.label.to_lowercase()));

        let mut members = vec![FamilyMember {
            id: base.id.clone(),
            label: base.label.clone(),
            is_base: true,
        }];
        members.extend(variants.into_iter().map(|m| FamilyMember {
            id: m.id.clone(),
            label: m.label.clone(),
            is_base: false,
        }));

        let mut path_rows: Vec<&DeltaRow> = matrix.table(DeltaTableKey::MotionPaths).iter().collect();
        path_rows.sort_by(|a, b| {
            a.label
                .to_lowercase()
                .cmp(&b.label.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });

        let rows = path_rows
            .into_iter()
            .map(|row| FamilyRow {
                row_id: row.id.clone(),
                row_label: row.label.clone(),
                owners: members
                    .iter()
                    .filter(|m| row.references(&m.id))
                    .map(|m| m.id.clone())
                    .collect(),
            })
            .collect();

        Ok(Self {
            base_id: base_id.to_string(),
            members,
            rows,
        })
    }

    pub fn is_member(&self, motion_id: &str) -> bool {
        self.members.iter().any(|m| m.id == motion_id)
    }

    /// First family member referencing the row
    pub fn owner_of(&self, row_id: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.row_id == row_id)
            .and_then(|r| r.owners.first())
            .map(String::as_str)
    }

    /// Row rules after moving `from`'s reference onto `to`
    ///
    /// The source key is deleted and the destination starts from an empty
    /// map. A destination that already references the row is rejected so its
    /// configured rule is never overwritten.
    pub fn plan_reassignment(&self, matrix: &DeltaMatrix, row_id: &str, from: &str, to: &str) -> Result<Map<String, Value>> {
        if !self.is_member(from) || !self.is_member(to) {
            return Err(Error::InvalidInput(format!(
                "{} and {} must both belong to the {} family",
                from, to, self.base_id
            )));
        }
        if from == to {
            return Err(Error::InvalidInput(format!("{} is already assigned {}", from, row_id)));
        }

        let row = matrix
            .row(DeltaTableKey::MotionPaths, row_id)
            .ok_or_else(|| Error::NotFound(format!("{}::{}", DeltaTableKey::MotionPaths, row_id)))?;

        if !row.references(from) {
            return Err(Error::InvalidInput(format!("{} does not reference {}", from, row_id)));
        }
        if row.references(to) {
            return Err(Error::InvalidInput(format!("{} already references {}", to, row_id)));
        }

        let mut rules = row.merged_rules(from, &DeltaValue::Absent);
        if let Some(value) = DeltaValue::empty().to_json() {
            rules.insert(to.to_string(), value);
        }
        Ok(rules)
    }
}

/// Result of a family reassignment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReassignOutcome {
    pub synced: Vec<String>,
    pub sync_warnings: Vec<String>,
}

/// Move a motion-path row from one family member to another
///
/// One row write; afterwards both motions are synced (failures only warn).
pub async fn reassign_motion_path<S: TableStore + ?Sized>(
    store: &S,
    matrix: &mut DeltaMatrix,
    plane: &FamilyPlane,
    row_id: &str,
    from: &str,
    to: &str,
) -> Result<ReassignOutcome> {
    let rules = plane.plan_reassignment(matrix, row_id, from, to)?;

    store
        .update_row(DeltaTableKey::MotionPaths.as_str(), row_id, delta_rules_fields(&rules))
        .await?;
    matrix.replace_rules(DeltaTableKey::MotionPaths, row_id, rules);
    info!("Moved motion path {} from {} to {}", row_id, from, to);

    let (synced, sync_warnings) = sync_motions(store, vec![from.to_string(), to.to_string()]).await;
    Ok(ReassignOutcome { synced, sync_warnings })
}
