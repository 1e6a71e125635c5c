// 📐 Buffer-Overlay Metric Engine - per-tract access ratios
// Projects tracts and stores into equal-area meters, builds 0.5-mile
// buffers, and takes each tract's polygon difference against the union of
// intersecting buffers. Union-then-difference handles buffer overlap in one
// step; pairwise double-count correction is a rejected historical approach.

use crate::classify::percent_label;
use crate::config::MetricConfig;
use crate::geometry::{circle, project_multi_polygon, project_point};
use crate::matching::UnifiedStore;
use crate::tracts::TractRecord;
use geo::{Area, BooleanOps, Intersects, MultiPolygon, Polygon};
use log::{info, warn};
use serde::{Deserialize, Serialize};

// ============================================================================
// BUFFERED STORE
// ============================================================================

/// A store's walking-distance footprint: a circle of the configured radius
/// around its projected point, in equal-area meters.
#[derive(Debug, Clone)]
pub struct BufferedStore {
    pub store_id: u32,
    pub footprint: Polygon<f64>,
}

// ============================================================================
// TRACT METRIC
// ============================================================================

/// The computation's output unit: one row per reconciled tract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TractMetric {
    /// Current-vintage tract identifier.
    pub tract_id: String,

    /// Usable (water-clipped) tract area, square meters.
    pub tract_area_m2: f64,

    /// Tract area not covered by any store buffer, square meters.
    pub uncovered_area_m2: f64,

    /// 1 - uncovered/area, always within [0, 1].
    pub access_ratio: f64,

    /// access_ratio below the configured cutoff (strict `<`).
    pub low_access: bool,

    /// "39.3%" style label for the map layer.
    pub display_label: String,

    /// Filled by the classification stage; None until then or when the
    /// income table has no row for this tract.
    pub median_household_income: Option<f64>,

    /// None when income is missing. Absence of income data is not the same
    /// as "not low income".
    pub low_income: Option<bool>,
}

/// Metric output plus exclusions the caller must surface.
#[derive(Debug, Clone, Default)]
pub struct MetricOutcome {
    pub metrics: Vec<TractMetric>,

    /// Tracts excluded for zero/near-zero area; the ratio is undefined
    /// there, never NaN or Inf.
    pub degenerate_tracts: Vec<String>,

    /// Ratios that fell outside [0, 1] and were clamped. Nonzero values
    /// point at an overlay bug, not a valid state.
    pub clamped_ratios: usize,
}

impl MetricOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Computed {} tract metrics ({} low-access, {} degenerate, {} clamped)",
            self.metrics.len(),
            self.metrics.iter().filter(|m| m.low_access).count(),
            self.degenerate_tracts.len(),
            self.clamped_ratios
        )
    }
}

// ============================================================================
// METRIC ENGINE
// ============================================================================

pub struct MetricEngine {
    /// Buffer radius in meters (default: 0.5 mile).
    pub buffer_radius_m: f64,

    /// Low-access cutoff on the access ratio (default: 1/3, strict `<`).
    pub low_access_cutoff: f64,

    /// Minimum projected tract area before the ratio is undefined, m^2.
    pub min_tract_area_m2: f64,

    /// Central meridian for the projection, degrees. Tracts and buffers
    /// must share it or their overlay is meaningless.
    pub reference_longitude: f64,
}

impl MetricEngine {
    pub fn new() -> Self {
        MetricEngine {
            buffer_radius_m: 804.67,
            low_access_cutoff: 1.0 / 3.0,
            min_tract_area_m2: 1.0,
            reference_longitude: -87.7,
        }
    }

    pub fn from_config(config: &MetricConfig) -> Self {
        MetricEngine {
            buffer_radius_m: config.buffer_radius_m,
            low_access_cutoff: config.low_access_cutoff,
            min_tract_area_m2: config.min_tract_area_m2,
            reference_longitude: config.reference_longitude,
        }
    }

    /// Build one circular buffer per store, in projected meters.
    pub fn buffer_stores(&self, stores: &[UnifiedStore]) -> Vec<BufferedStore> {
        stores
            .iter()
            .map(|store| BufferedStore {
                store_id: store.store_id,
                footprint: circle(
                    project_point(store.latitude, store.longitude, self.reference_longitude),
                    self.buffer_radius_m,
                ),
            })
            .collect()
    }

    /// Compute the access ratio for every reconciled tract.
    ///
    /// Per tract: project the boundary, find intersecting buffers, union
    /// them, and take the polygon difference. The uncovered area over the
    /// tract area gives `access_ratio = 1 - uncovered/area`.
    ///
    /// Edge cases, each branch-tested separately:
    /// - no intersecting buffer: uncovered == area, ratio = 0
    /// - empty difference (fully covered): ratio = 1
    /// - degenerate area below the minimum: excluded, reported
    pub fn compute(&self, tracts: &[TractRecord], buffers: &[BufferedStore]) -> MetricOutcome {
        let mut outcome = MetricOutcome::default();

        for tract in tracts {
            let projected = project_multi_polygon(&tract.boundary, self.reference_longitude);
            let tract_area = projected.unsigned_area();

            if tract_area < self.min_tract_area_m2 {
                warn!(
                    "Tract {} has degenerate area {:.3} m2; ratio undefined, excluded",
                    tract.current_id, tract_area
                );
                outcome.degenerate_tracts.push(tract.current_id.clone());
                continue;
            }

            let intersecting: Vec<&BufferedStore> = buffers
                .iter()
                .filter(|b| b.footprint.intersects(&projected))
                .collect();

            let (uncovered_area, mut ratio) = if intersecting.is_empty() {
                // No buffer reaches this tract at all
                (tract_area, 0.0)
            } else {
                let mut union = MultiPolygon::new(vec![intersecting[0].footprint.clone()]);
                for buffer in &intersecting[1..] {
                    union = union.union(&MultiPolygon::new(vec![buffer.footprint.clone()]));
                }

                let difference = projected.difference(&union);
                if difference.0.is_empty() {
                    // Fully covered: the difference yields no polygon at all
                    (0.0, 1.0)
                } else {
                    let uncovered = difference.unsigned_area();
                    (uncovered, 1.0 - uncovered / tract_area)
                }
            };

            if !(0.0..=1.0).contains(&ratio) {
                warn!(
                    "Tract {} access ratio {:.6} outside [0, 1]; clamping",
                    tract.current_id, ratio
                );
                ratio = ratio.clamp(0.0, 1.0);
                outcome.clamped_ratios += 1;
            }

            outcome.metrics.push(TractMetric {
                tract_id: tract.current_id.clone(),
                tract_area_m2: tract_area,
                uncovered_area_m2: uncovered_area,
                access_ratio: ratio,
                low_access: ratio < self.low_access_cutoff,
                display_label: percent_label(ratio),
                median_household_income: None,
                low_income: None,
            });
        }

        info!("{}", outcome.summary());
        outcome
    }
}

impl Default for MetricEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
