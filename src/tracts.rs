// 🗺️ Tract Reconciliation Engine - comparable tracts across census revisions
// Restricts the official crosswalk to the region of interest, keeps only
// tracts whose current-vintage counterpart is unique, and clips reconciled
// boundaries to the shoreline before any area math.

use geo::{BooleanOps, MultiPolygon};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// RELATION
// ============================================================================

/// How a current-vintage tract maps back to legacy-vintage tracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    /// Exactly one legacy tract maps to exactly one current tract.
    OneToOne,

    /// The current tract was split or merged across the boundary revision.
    OneToMany,
}

impl Relation {
    /// Worst of two relations: `OneToMany` dominates.
    pub fn worst(self, other: Relation) -> Relation {
        if self == Relation::OneToMany || other == Relation::OneToMany {
            Relation::OneToMany
        } else {
            Relation::OneToOne
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::OneToOne => "one",
            Relation::OneToMany => "many",
        }
    }
}

// ============================================================================
// INPUT ROWS
// ============================================================================

/// One row of the official many-to-many crosswalk table.
///
/// Identifiers are fixed-width zero-padded codes and are never parsed as
/// integers (leading zeros are significant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrosswalkRow {
    pub current_id: String,
    pub legacy_id: String,
}

/// A legacy-vintage tract from the boundary file. Geometry is geographic
/// (degrees); it may be absent for malformed source rows.
#[derive(Debug, Clone)]
pub struct LegacyTract {
    pub legacy_id: String,
    pub name: Option<String>,
    pub boundary: Option<MultiPolygon<f64>>,
}

// ============================================================================
// OUTPUT RECORDS
// ============================================================================

/// A reconciled tract: unique across both vintages, with geometry.
/// Immutable once produced; only these enter the metric computation.
#[derive(Debug, Clone)]
pub struct TractRecord {
    pub legacy_id: String,
    pub current_id: String,
    pub relation: Relation,
    pub boundary: MultiPolygon<f64>,
}

/// One row of the full-tract label table (`tracts_2010_key` style): every
/// legacy tract annotated with the worst relation seen across its crosswalk
/// rows. Visualization only, never metric input.
#[derive(Debug, Clone)]
pub struct TractKeyRow {
    pub legacy_id: String,
    pub relation: Relation,
    pub name: Option<String>,
    pub boundary: MultiPolygon<f64>,
}

/// Reconciliation output plus the exclusion counts callers must surface.
/// Excluded tracts are a known analytical caveat, not an error.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationOutcome {
    pub tracts: Vec<TractRecord>,

    /// Current-vintage ids in the region set that never appear in the crosswalk.
    pub missing_from_crosswalk: usize,

    /// One-to-one crosswalk rows whose legacy id has no boundary geometry.
    pub missing_geometry: usize,

    /// Distinct current-vintage ids excluded for mapping one-to-many.
    pub one_to_many: usize,
}

impl ReconciliationOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Reconciled {} tracts ({} not in crosswalk, {} missing geometry, {} one-to-many)",
            self.tracts.len(),
            self.missing_from_crosswalk,
            self.missing_geometry,
            self.one_to_many
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct TractReconciler;

impl TractReconciler {
    pub fn new() -> Self {
        TractReconciler
    }

    /// Reconcile two tract vintages against the official crosswalk.
    ///
    /// 1. Restrict the crosswalk to rows whose current id is in `current_ids`.
    /// 2. Count legacy ids per current id; count == 1 means one-to-one.
    /// 3. Join one-to-one rows to legacy geometry, dropping rows without it.
    ///
    /// Output is sorted by current id so identical inputs always produce an
    /// identical set regardless of crosswalk row order.
    pub fn reconcile(
        &self,
        legacy: &[LegacyTract],
        current_ids: &HashSet<String>,
        crosswalk: &[CrosswalkRow],
    ) -> ReconciliationOutcome {
        let filtered: Vec<&CrosswalkRow> = crosswalk
            .iter()
            .filter(|row| current_ids.contains(&row.current_id))
            .collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for row in &filtered {
            *counts.entry(row.current_id.as_str()).or_insert(0) += 1;
        }

        let missing_from_crosswalk = current_ids
            .iter()
            .filter(|id| !counts.contains_key(id.as_str()))
            .count();
        let one_to_many = counts.values().filter(|&&n| n > 1).count();

        let geometry: HashMap<&str, &LegacyTract> = legacy
            .iter()
            .map(|t| (t.legacy_id.as_str(), t))
            .collect();

        let mut missing_geometry = 0;
        let mut tracts = Vec::new();
        for row in &filtered {
            if counts[row.current_id.as_str()] != 1 {
                continue;
            }
            match geometry.get(row.legacy_id.as_str()).and_then(|t| t.boundary.as_ref()) {
                Some(boundary) => tracts.push(TractRecord {
                    legacy_id: row.legacy_id.clone(),
                    current_id: row.current_id.clone(),
                    relation: Relation::OneToOne,
                    boundary: boundary.clone(),
                }),
                None => missing_geometry += 1,
            }
        }

        tracts.sort_by(|a, b| a.current_id.cmp(&b.current_id));

        let outcome = ReconciliationOutcome {
            tracts,
            missing_from_crosswalk,
            missing_geometry,
            one_to_many,
        };

        if outcome.missing_from_crosswalk > 0 || outcome.missing_geometry > 0 {
            warn!("{}", outcome.summary());
        } else {
            info!("{}", outcome.summary());
        }

        outcome
    }

    /// Full-tract label table: every legacy tract with geometry, annotated
    /// with the worst relation observed across its crosswalk rows.
    pub fn tracts_key(
        &self,
        legacy: &[LegacyTract],
        current_ids: &HashSet<String>,
        crosswalk: &[CrosswalkRow],
    ) -> Vec<TractKeyRow> {
        let filtered: Vec<&CrosswalkRow> = crosswalk
            .iter()
            .filter(|row| current_ids.contains(&row.current_id))
            .collect();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for row in &filtered {
            *counts.entry(row.current_id.as_str()).or_insert(0) += 1;
        }

        // Collapse to one relation per legacy id, worst wins.
        let mut by_legacy: HashMap<&str, Relation> = HashMap::new();
        for row in &filtered {
            let relation = if counts[row.current_id.as_str()] == 1 {
                Relation::OneToOne
            } else {
                Relation::OneToMany
            };
            by_legacy
                .entry(row.legacy_id.as_str())
                .and_modify(|r| *r = r.worst(relation))
                .or_insert(relation);
        }

        let mut rows: Vec<TractKeyRow> = legacy
            .iter()
            .filter_map(|tract| {
                let relation = *by_legacy.get(tract.legacy_id.as_str())?;
                let boundary = tract.boundary.clone()?;
                Some(TractKeyRow {
                    legacy_id: tract.legacy_id.clone(),
                    relation,
                    name: tract.name.clone(),
                    boundary,
                })
            })
            .collect();

        rows.sort_by(|a, b| a.legacy_id.cmp(&b.legacy_id));
        rows
    }

    /// Subtract the shoreline/water polygon from every reconciled boundary so
    /// usable tract area excludes open water. Without this, tracts partly
    /// over water would be misclassified as low-access.
    pub fn clip_shoreline(
        &self,
        mut tracts: Vec<TractRecord>,
        water: &MultiPolygon<f64>,
    ) -> Vec<TractRecord> {
        for tract in &mut tracts {
            tract.boundary = tract.boundary.difference(water);
        }
        tracts
    }
}

impl Default for TractReconciler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]])
    }

    fn legacy_tract(id: &str) -> LegacyTract {
        LegacyTract {
            legacy_id: id.to_string(),
            name: Some(format!("Census Tract {id}")),
            boundary: Some(square(0.0, 0.0, 1.0)),
        }
    }

    fn xwalk(current: &str, legacy: &str) -> CrosswalkRow {
        CrosswalkRow {
            current_id: current.to_string(),
            legacy_id: legacy.to_string(),
        }
    }

    fn current_set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_one_to_one_kept() {
        let reconciler = TractReconciler::new();
        let legacy = vec![legacy_tract("17031010100")];
        let crosswalk = vec![xwalk("17031010100", "17031010100")];

        let outcome =
            reconciler.reconcile(&legacy, &current_set(&["17031010100"]), &crosswalk);

        assert_eq!(outcome.tracts.len(), 1);
        assert_eq!(outcome.tracts[0].relation, Relation::OneToOne);
        assert_eq!(outcome.missing_from_crosswalk, 0);
        assert_eq!(outcome.missing_geometry, 0);
    }

    #[test]
    fn test_one_to_many_excluded() {
        let reconciler = TractReconciler::new();
        let legacy = vec![legacy_tract("A"), legacy_tract("B")];
        // Current tract X was merged from two legacy tracts
        let crosswalk = vec![xwalk("X", "A"), xwalk("X", "B")];

        let outcome = reconciler.reconcile(&legacy, &current_set(&["X"]), &crosswalk);

        assert!(outcome.tracts.is_empty());
        assert_eq!(outcome.one_to_many, 1);
    }

    #[test]
    fn test_crosswalk_restricted_to_region() {
        let reconciler = TractReconciler::new();
        let legacy = vec![legacy_tract("A"), legacy_tract("B")];
        // Row for "ELSEWHERE" is outside the region set and must be ignored
        let crosswalk = vec![xwalk("X", "A"), xwalk("ELSEWHERE", "B")];

        let outcome = reconciler.reconcile(&legacy, &current_set(&["X"]), &crosswalk);

        assert_eq!(outcome.tracts.len(), 1);
        assert_eq!(outcome.tracts[0].legacy_id, "A");
    }

    #[test]
    fn test_missing_geometry_dropped_and_counted() {
        let reconciler = TractReconciler::new();
        let legacy = vec![LegacyTract {
            legacy_id: "A".to_string(),
            name: None,
            boundary: None,
        }];
        let crosswalk = vec![xwalk("X", "A"), xwalk("Y", "NOT_IN_FILE")];

        let outcome = reconciler.reconcile(&legacy, &current_set(&["X", "Y"]), &crosswalk);

        assert!(outcome.tracts.is_empty());
        assert_eq!(outcome.missing_geometry, 2);
    }

    #[test]
    fn test_missing_from_crosswalk_counted() {
        let reconciler = TractReconciler::new();
        let legacy = vec![legacy_tract("A")];
        let crosswalk = vec![xwalk("X", "A")];

        let outcome =
            reconciler.reconcile(&legacy, &current_set(&["X", "ORPHAN"]), &crosswalk);

        assert_eq!(outcome.tracts.len(), 1);
        assert_eq!(outcome.missing_from_crosswalk, 1);
    }

    #[test]
    fn test_reconciliation_idempotent_under_row_order() {
        let reconciler = TractReconciler::new();
        let legacy = vec![legacy_tract("A"), legacy_tract("B"), legacy_tract("C")];
        let current = current_set(&["X", "Y", "Z"]);

        let forward = vec![xwalk("X", "A"), xwalk("Y", "B"), xwalk("Z", "C")];
        let mut reversed = forward.clone();
        reversed.reverse();

        let out1 = reconciler.reconcile(&legacy, &current, &forward);
        let out2 = reconciler.reconcile(&legacy, &current, &reversed);

        let ids1: Vec<(&str, &str)> = out1
            .tracts
            .iter()
            .map(|t| (t.legacy_id.as_str(), t.current_id.as_str()))
            .collect();
        let ids2: Vec<(&str, &str)> = out2
            .tracts
            .iter()
            .map(|t| (t.legacy_id.as_str(), t.current_id.as_str()))
            .collect();

        assert_eq!(ids1, ids2);
    }

    #[test]
    fn test_tracts_key_worst_relation_dominates() {
        let reconciler = TractReconciler::new();
        let legacy = vec![legacy_tract("A"), legacy_tract("B")];
        // Legacy A appears in a one-to-one row (X) and a one-to-many row (Y)
        let crosswalk = vec![xwalk("X", "A"), xwalk("Y", "A"), xwalk("Y", "B")];

        let key = reconciler.tracts_key(&legacy, &current_set(&["X", "Y"]), &crosswalk);

        assert_eq!(key.len(), 2);
        assert_eq!(key[0].legacy_id, "A");
        assert_eq!(key[0].relation, Relation::OneToMany);
        assert_eq!(key[1].relation, Relation::OneToMany);
    }

    #[test]
    fn test_tracts_key_keeps_non_reconciled() {
        let reconciler = TractReconciler::new();
        let legacy = vec![legacy_tract("A"), legacy_tract("B")];
        let crosswalk = vec![xwalk("X", "A"), xwalk("X", "B")];

        // Neither tract reconciles (X is one-to-many), but both stay in the key
        let key = reconciler.tracts_key(&legacy, &current_set(&["X"]), &crosswalk);
        assert_eq!(key.len(), 2);
    }

    #[test]
    fn test_shoreline_clip_reduces_area() {
        let reconciler = TractReconciler::new();
        let tracts = vec![TractRecord {
            legacy_id: "A".to_string(),
            current_id: "X".to_string(),
            relation: Relation::OneToOne,
            boundary: square(0.0, 0.0, 2.0),
        }];
        // Water covers the right half of the tract
        let water = square(1.0, 0.0, 2.0);

        let clipped = reconciler.clip_shoreline(tracts, &water);
        let area = clipped[0].boundary.unsigned_area();
        assert!((area - 2.0).abs() < 1e-6, "clipped area {area}");
    }
}
