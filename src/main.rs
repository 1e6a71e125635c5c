use anyhow::Result;
use rusqlite::Connection;
use std::env;
use std::path::{Path, PathBuf};

// Use library instead of local modules
use food_access::{
    db, io, pipeline, HistoricalRecord, MetricConfig, PipelineInputs,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"));
    let db_path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("food_access.db"));

    run_pipeline(&data_dir, &db_path)
}

fn run_pipeline(data_dir: &Path, db_path: &Path) -> Result<()> {
    println!("🥕 Food Access Metric Engine v{}", food_access::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Load input tables
    println!("\n📂 Loading input tables from {data_dir:?}...");
    let legacy_tracts = io::load_legacy_tracts(&data_dir.join("census_tracts_2010.geojson"))?;
    let current_ids = io::load_current_tract_ids(&data_dir.join("tracts_2020.csv"))?;
    let crosswalk = io::load_crosswalk(&data_dir.join("tract_crosswalk.txt"))?;
    let shoreline = io::load_shoreline(&data_dir.join("shoreline.geojson")).ok();
    let license_stores = io::load_license_stores(&data_dir.join("grocery_store_status.csv"))?;
    let snap_stores = io::load_snap_stores(&data_dir.join("snap_retailers.csv"))?;
    let income = io::load_income(&data_dir.join("tract_income.csv"))?;

    // Historical Atlas vintages; 2019 publishes shares as 0-100 percentages
    let mut historical: Vec<HistoricalRecord> = Vec::new();
    for (year, percent_scaled) in [(2010, false), (2015, false), (2019, true)] {
        let path = data_dir.join(format!("Atlas{year}.csv"));
        if path.exists() {
            historical.extend(io::load_atlas_year(&path, year, percent_scaled)?);
        }
    }

    println!(
        "✓ Loaded {} legacy tracts, {} current ids, {} crosswalk rows",
        legacy_tracts.len(),
        current_ids.len(),
        crosswalk.len()
    );
    println!(
        "✓ Loaded {} license stores, {} SNAP stores, {} income rows, {} historical rows",
        license_stores.len(),
        snap_stores.len(),
        income.len(),
        historical.len()
    );
    if shoreline.is_none() {
        println!("⚠ No shoreline file; tract areas will include open water");
    }

    // 2. Run the engine
    println!("\n📐 Computing access metrics...");
    let config = MetricConfig::new();
    let output = pipeline::run(
        &config,
        PipelineInputs {
            legacy_tracts,
            current_ids,
            crosswalk,
            shoreline,
            license_stores,
            snap_stores,
            income,
            historical,
        },
    );
    println!("✓ {}", output.report.summary());

    // 3. Persist output tables
    println!("\n💾 Writing output tables to {db_path:?}...");
    let conn = Connection::open(db_path)?;
    db::setup_database(&conn)?;
    db::insert_tract_metrics(&conn, &output.metrics)?;
    db::insert_tract_key(&conn, &output.tracts_key)?;
    db::insert_stores(&conn, &output.stores)?;
    db::insert_comparisons(&conn, &output.comparisons)?;

    // 4. Verify counts
    let metric_count = db::verify_count(&conn, "tract_metrics")?;
    let store_count = db::verify_count(&conn, "stores")?;
    println!("✓ Persisted {metric_count} tract metrics, {store_count} stores");

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    let low_access = output.metrics.iter().filter(|m| m.low_access).count();
    let low_income = output
        .metrics
        .iter()
        .filter(|m| m.low_income == Some(true))
        .count();
    println!("✅ {low_access} low-access tracts, {low_income} low-income tracts");

    Ok(())
}
