// 🏷️ Classification & Merge - income flags and historical comparison
// Joins the income reference table onto the computed metrics and compares
// the current access ratio against historical (Atlas-style) reference years.

use crate::config::MetricConfig;
use crate::metric::TractMetric;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// "39.3%" style label from a 0..1 share.
pub fn percent_label(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

// ============================================================================
// INCOME JOIN KEY
// ============================================================================

/// Build the tract identifier used by the income reference table:
/// zero-padded state (2) + county (3) + tract code.
///
/// Tract codes below 100000 are zero-padded to six digits; codes at or
/// above 100000 are emitted verbatim. This fixed-width quirk of the source
/// data must be replicated exactly or the join silently fails.
pub fn income_tract_key(state: u32, county: u32, tract: u32) -> String {
    if tract >= 100_000 {
        format!("{state:02}{county:03}{tract}")
    } else {
        format!("{state:02}{county:03}{tract:06}")
    }
}

/// One row of the income reference table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeRecord {
    pub state: u32,
    pub county: u32,
    pub tract: u32,
    pub median_household_income: Option<f64>,
}

impl IncomeRecord {
    pub fn tract_key(&self) -> String {
        income_tract_key(self.state, self.county, self.tract)
    }
}

// ============================================================================
// HISTORICAL REFERENCE
// ============================================================================

/// One row of the historical access table for one past year.
///
/// The source publishes a **low-access share** (share of the tract
/// *without* access), so values are inverted before comparison. Sources
/// that express the share as a 0-100 percentage set `percent_scaled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub tract_id: String,
    pub year: u16,
    pub low_access_share: f64,
    pub percent_scaled: bool,
}

impl HistoricalRecord {
    /// Normalize to an access share comparable with the computed ratio.
    pub fn access_share(&self) -> f64 {
        let share = if self.percent_scaled {
            self.low_access_share / 100.0
        } else {
            self.low_access_share
        };
        1.0 - share
    }
}

/// Three-way trend of the current ratio against one historical year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Better,
    Worse,
    Same,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Better => "Better",
            Trend::Worse => "Worse",
            Trend::Same => "Same",
        }
    }
}

/// Current-vs-historical comparison row for one tract and one past year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TractComparison {
    pub tract_id: String,
    pub year: u16,
    pub historical_access_share: f64,
    pub historical_label: String,
    pub trend: Trend,
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Income-join output counts. A failed key join is observable here, not a
/// silent disappearance.
#[derive(Debug, Clone, Default)]
pub struct IncomeJoinOutcome {
    pub matched: usize,

    /// Tracts with no row in the income table. `low_income` stays None.
    pub missing_income: usize,

    /// Income rows whose value was absent or a negative sentinel.
    pub invalid_income_rows: usize,
}

impl IncomeJoinOutcome {
    pub fn summary(&self) -> String {
        format!(
            "Income join: {} matched, {} tracts without income, {} invalid source rows",
            self.matched, self.missing_income, self.invalid_income_rows
        )
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct Classifier {
    /// Income at or below this fraction of the reference is low-income
    /// (default: 0.8, `<=` comparison).
    pub low_income_ratio: f64,

    /// County-level reference median household income, fixed per run.
    pub county_reference_income: f64,
}

impl Classifier {
    pub fn new(county_reference_income: f64) -> Self {
        Classifier {
            low_income_ratio: 0.8,
            county_reference_income,
        }
    }

    pub fn from_config(config: &MetricConfig) -> Self {
        Classifier {
            low_income_ratio: config.low_income_ratio,
            county_reference_income: config.county_reference_income,
        }
    }

    /// Join median household income onto the metrics and set the low-income
    /// flag. Tracts missing from the income table keep `low_income = None`;
    /// absence of income data is never defaulted to "not low income".
    pub fn classify_income(
        &self,
        metrics: &mut [TractMetric],
        income: &[IncomeRecord],
    ) -> IncomeJoinOutcome {
        let mut outcome = IncomeJoinOutcome::default();

        let mut by_key: HashMap<String, f64> = HashMap::new();
        for record in income {
            match record.median_household_income {
                // Census publishes large negative sentinels for suppressed values
                Some(value) if value > 0.0 => {
                    by_key.insert(record.tract_key(), value);
                }
                _ => outcome.invalid_income_rows += 1,
            }
        }

        let threshold = self.low_income_ratio * self.county_reference_income;
        for metric in metrics.iter_mut() {
            match by_key.get(&metric.tract_id) {
                Some(&value) => {
                    metric.median_household_income = Some(value);
                    metric.low_income = Some(value <= threshold);
                    outcome.matched += 1;
                }
                None => {
                    metric.median_household_income = None;
                    metric.low_income = None;
                    outcome.missing_income += 1;
                }
            }
        }

        if outcome.missing_income > 0 || outcome.invalid_income_rows > 0 {
            warn!("{}", outcome.summary());
        } else {
            info!("{}", outcome.summary());
        }
        outcome
    }

    /// Compare each tract's current ratio against every historical year
    /// available for it. Exact equality is "Same". Tracts absent from the
    /// historical table simply produce no comparison row.
    pub fn merge_historical(
        &self,
        metrics: &[TractMetric],
        historical: &[HistoricalRecord],
    ) -> Vec<TractComparison> {
        let current: HashMap<&str, f64> = metrics
            .iter()
            .map(|m| (m.tract_id.as_str(), m.access_ratio))
            .collect();

        let mut comparisons: Vec<TractComparison> = historical
            .iter()
            .filter_map(|record| {
                let ratio = *current.get(record.tract_id.as_str())?;
                let access_share = record.access_share();
                Some(TractComparison {
                    tract_id: record.tract_id.clone(),
                    year: record.year,
                    historical_access_share: access_share,
                    historical_label: percent_label(access_share),
                    trend: compare_ratio(ratio, access_share),
                })
            })
            .collect();

        comparisons.sort_by(|a, b| a.tract_id.cmp(&b.tract_id).then(a.year.cmp(&b.year)));
        info!(
            "Historical merge: {} comparison rows from {} reference rows",
            comparisons.len(),
            historical.len()
        );
        comparisons
    }
}

/// Trend of the current ratio against a historical access share.
fn compare_ratio(current: f64, historical: f64) -> Trend {
    if current < historical {
        Trend::Worse
    } else if current > historical {
        Trend::Better
    } else {
        Trend::Same
    }
}

// ============================================================================
// TESTS
// ============================================================================
