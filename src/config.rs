// ⚙️ Metric Configuration - all thresholds in one place
// Explicit inputs threaded through each stage instead of scattered literals.

use serde::{Deserialize, Serialize};

/// Process-wide read-only configuration for one pipeline run.
///
/// Every stage borrows this; nothing mutates it after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricConfig {
    /// Walking-distance buffer radius around each store, in meters (default: 0.5 mile).
    pub buffer_radius_m: f64,

    /// Maximum distance for two store records to match, in feet (default: 1000).
    pub max_match_distance_ft: f64,

    /// Access ratio below which a tract is low-access (default: 1/3).
    ///
    /// Strict `<` comparison: a tract sitting exactly on the cutoff is NOT
    /// low-access.
    pub low_access_cutoff: f64,

    /// Income at or below this fraction of the county reference is low-income
    /// (default: 0.8).
    pub low_income_ratio: f64,

    /// County-level reference median household income for the run, in dollars.
    pub county_reference_income: f64,

    /// Tracts with projected area below this are degenerate slivers and are
    /// excluded from ratio computation, in square meters (default: 1.0).
    pub min_tract_area_m2: f64,

    /// Central meridian for the equal-area projection, in degrees.
    ///
    /// Must sit inside the study region: the projection's shear grows with
    /// the longitude offset from this meridian, and buffers only stay
    /// ground-distance circles near it.
    pub reference_longitude: f64,
}

impl MetricConfig {
    pub fn new() -> Self {
        MetricConfig {
            buffer_radius_m: 804.67,        // 0.5 mile
            max_match_distance_ft: 1000.0,
            low_access_cutoff: 1.0 / 3.0,
            low_income_ratio: 0.8,
            county_reference_income: 78_304.0, // Cook County, ACS 2022 5-year
            min_tract_area_m2: 1.0,
            reference_longitude: -87.7, // central Chicago meridian
        }
    }

    /// Override the county reference income for the run.
    pub fn with_reference_income(mut self, income: f64) -> Self {
        self.county_reference_income = income;
        self
    }

    /// Override the match distance cutoff.
    pub fn with_match_distance(mut self, feet: f64) -> Self {
        self.max_match_distance_ft = feet;
        self
    }

    /// Re-center the projection for a different study region.
    pub fn with_reference_longitude(mut self, degrees: f64) -> Self {
        self.reference_longitude = degrees;
        self
    }
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self::new()
    }
}
