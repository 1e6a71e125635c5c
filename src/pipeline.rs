// 🔗 Metric Pipeline - end-to-end batch driver
// Single-threaded synchronous pipeline: each stage fully materializes its
// output before the next begins. Overlap correction depends on the full
// buffer set, so stages are not parallelized across tracts.

use crate::classify::{Classifier, HistoricalRecord, IncomeRecord, TractComparison};
use crate::config::MetricConfig;
use crate::matching::{
    filter_license_stores, filter_snap_stores, MatchEngine, RawStoreRecord, UnifiedStore,
};
use crate::metric::{MetricEngine, TractMetric};
use crate::tracts::{CrosswalkRow, LegacyTract, TractKeyRow, TractReconciler};
use chrono::{DateTime, Utc};
use geo::MultiPolygon;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

// ============================================================================
// INPUTS
// ============================================================================

/// Everything the excluded extract/cleanup layers feed into one run.
pub struct PipelineInputs {
    /// Legacy-vintage tract boundaries (geographic degrees).
    pub legacy_tracts: Vec<LegacyTract>,

    /// Current-vintage tract identifiers for the region of interest.
    pub current_ids: Vec<String>,

    /// Official many-to-many crosswalk between the two vintages.
    pub crosswalk: Vec<CrosswalkRow>,

    /// Shoreline/water geometry to subtract from every reconciled tract.
    pub shoreline: Option<MultiPolygon<f64>>,

    /// Raw store rows from the business-license registry.
    pub license_stores: Vec<RawStoreRecord>,

    /// Raw store rows from the SNAP retailer registry.
    pub snap_stores: Vec<RawStoreRecord>,

    /// Income reference table.
    pub income: Vec<IncomeRecord>,

    /// Historical access reference rows, one per tract per past year.
    pub historical: Vec<HistoricalRecord>,
}

// ============================================================================
// RUN REPORT
// ============================================================================

/// Per-run counts of everything that was excluded or flagged. No stage in
/// the pipeline is fatal; this is how partial results stay observable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub computed_at: DateTime<Utc>,

    pub reconciled_tracts: usize,
    pub tracts_missing_from_crosswalk: usize,
    pub tracts_missing_geometry: usize,
    pub tracts_one_to_many: usize,
    pub degenerate_tracts: usize,
    pub clamped_ratios: usize,

    pub license_stores: usize,
    pub snap_stores: usize,
    pub matched_pairs: usize,
    pub unified_stores: usize,

    pub tracts_missing_income: usize,
    pub invalid_income_rows: usize,
    pub historical_comparisons: usize,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "Run {}: {} tracts ({} excluded), {} stores ({} matched pairs), {} without income",
            self.run_id,
            self.reconciled_tracts,
            self.tracts_missing_from_crosswalk
                + self.tracts_missing_geometry
                + self.tracts_one_to_many,
            self.unified_stores,
            self.matched_pairs,
            self.tracts_missing_income
        )
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

pub struct PipelineOutput {
    /// One row per reconciled tract - the analytical table.
    pub metrics: Vec<TractMetric>,

    /// Full-tract relation labels, visualization only.
    pub tracts_key: Vec<TractKeyRow>,

    /// Unified store table, visualization only.
    pub stores: Vec<UnifiedStore>,

    /// Current-vs-historical trend rows.
    pub comparisons: Vec<TractComparison>,

    pub report: RunReport,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Run the full engine: reconcile, match, overlay, classify.
pub fn run(config: &MetricConfig, inputs: PipelineInputs) -> PipelineOutput {
    let run_id = Uuid::new_v4();
    info!("Starting metric pipeline run {run_id}");

    // Stage 1: tract reconciliation + shoreline restriction
    let reconciler = TractReconciler::new();
    let current_set: HashSet<String> = inputs.current_ids.iter().cloned().collect();
    let reconciliation =
        reconciler.reconcile(&inputs.legacy_tracts, &current_set, &inputs.crosswalk);
    let tracts_key =
        reconciler.tracts_key(&inputs.legacy_tracts, &current_set, &inputs.crosswalk);

    let tracts = match &inputs.shoreline {
        Some(water) => reconciler.clip_shoreline(reconciliation.tracts.clone(), water),
        None => reconciliation.tracts.clone(),
    };

    // Stage 2: store filtering + entity matching
    let mut licenses = filter_license_stores(&inputs.license_stores);
    let mut snap = filter_snap_stores(&inputs.snap_stores);
    let matcher = MatchEngine::from_config(config);
    let matched_pairs = matcher.match_stores(&mut licenses, &mut snap);
    let stores = matcher.assemble(&licenses, &snap);

    // Stage 3: buffer overlay
    let metric_engine = MetricEngine::from_config(config);
    let buffers = metric_engine.buffer_stores(&stores);
    let metric_outcome = metric_engine.compute(&tracts, &buffers);
    let mut metrics = metric_outcome.metrics;

    // Stage 4: classification + historical merge
    let classifier = Classifier::from_config(config);
    let income_outcome = classifier.classify_income(&mut metrics, &inputs.income);
    let comparisons = classifier.merge_historical(&metrics, &inputs.historical);

    let report = RunReport {
        run_id,
        computed_at: Utc::now(),
        // Reconciliation count, not metric count: degenerate tracts are
        // reconciled but drop out of the metric stage.
        reconciled_tracts: reconciliation.tracts.len(),
        tracts_missing_from_crosswalk: reconciliation.missing_from_crosswalk,
        tracts_missing_geometry: reconciliation.missing_geometry,
        tracts_one_to_many: reconciliation.one_to_many,
        degenerate_tracts: metric_outcome.degenerate_tracts.len(),
        clamped_ratios: metric_outcome.clamped_ratios,
        license_stores: licenses.len(),
        snap_stores: snap.len(),
        matched_pairs,
        unified_stores: stores.len(),
        tracts_missing_income: income_outcome.missing_income,
        invalid_income_rows: income_outcome.invalid_income_rows,
        historical_comparisons: comparisons.len(),
    };
    info!("{}", report.summary());

    PipelineOutput {
        metrics,
        tracts_key,
        stores,
        comparisons,
        report,
    }
}

// ============================================================================
// TESTS
// ============================================================================
