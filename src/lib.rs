// Food Access Metric Engine - Core Library
// Exposes all pipeline stages for use in the CLI, map layers, and tests

pub mod config;
pub mod geometry;
pub mod tracts;
pub mod matching;
pub mod metric;
pub mod classify;
pub mod pipeline;
pub mod io;
pub mod db;

// Re-export commonly used types
pub use config::MetricConfig;
pub use geometry::{haversine_feet, haversine_miles, EARTH_RADIUS_MI};
pub use tracts::{
    CrosswalkRow, LegacyTract, ReconciliationOutcome, Relation, TractKeyRow, TractReconciler,
    TractRecord,
};
pub use matching::{
    filter_license_stores, filter_snap_stores, MatchEngine, RawStoreRecord, StoreRecord,
    StoreSource, UnifiedStore,
};
pub use metric::{BufferedStore, MetricEngine, MetricOutcome, TractMetric};
pub use classify::{
    income_tract_key, Classifier, HistoricalRecord, IncomeJoinOutcome, IncomeRecord,
    TractComparison, Trend,
};
pub use pipeline::{run, PipelineInputs, PipelineOutput, RunReport};
pub use db::{
    get_tract_metrics, insert_comparisons, insert_stores, insert_tract_key,
    insert_tract_metrics, setup_database, verify_count,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
