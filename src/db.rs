// 💾 Output Persistence - SQLite tables for the map/report layers
// The engine's three output tables land here so the excluded visualization
// layer can read them without re-running the pipeline.

use crate::classify::TractComparison;
use crate::io::geometry_to_value;
use crate::matching::UnifiedStore;
use crate::metric::TractMetric;
use crate::tracts::TractKeyRow;
use anyhow::{Context, Result};
use rusqlite::{params, Connection};

/// Create output tables and enable WAL mode.
pub fn setup_database(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("Failed to enable WAL mode")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tract_metrics (
            tract_id TEXT PRIMARY KEY,
            tract_area_m2 REAL NOT NULL,
            uncovered_area_m2 REAL NOT NULL,
            access_ratio REAL NOT NULL,
            low_access INTEGER NOT NULL,
            display_label TEXT NOT NULL,
            median_household_income REAL,
            low_income INTEGER
        );
        CREATE TABLE IF NOT EXISTS tract_key (
            legacy_id TEXT PRIMARY KEY,
            relation TEXT NOT NULL,
            name TEXT,
            boundary_geojson TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS stores (
            store_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            is_snap INTEGER NOT NULL,
            match_id INTEGER
        );
        CREATE TABLE IF NOT EXISTS tract_comparisons (
            tract_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            historical_access_share REAL NOT NULL,
            historical_label TEXT NOT NULL,
            trend TEXT NOT NULL,
            PRIMARY KEY (tract_id, year)
        );",
    )
    .context("Failed to create output tables")?;

    Ok(())
}

pub fn insert_tract_metrics(conn: &Connection, metrics: &[TractMetric]) -> Result<()> {
    let mut statement = conn.prepare(
        "INSERT OR REPLACE INTO tract_metrics
         (tract_id, tract_area_m2, uncovered_area_m2, access_ratio, low_access,
          display_label, median_household_income, low_income)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for metric in metrics {
        statement.execute(params![
            metric.tract_id,
            metric.tract_area_m2,
            metric.uncovered_area_m2,
            metric.access_ratio,
            metric.low_access,
            metric.display_label,
            metric.median_household_income,
            metric.low_income,
        ])?;
    }
    Ok(())
}

pub fn insert_tract_key(conn: &Connection, rows: &[TractKeyRow]) -> Result<()> {
    let mut statement = conn.prepare(
        "INSERT OR REPLACE INTO tract_key (legacy_id, relation, name, boundary_geojson)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for row in rows {
        statement.execute(params![
            row.legacy_id,
            row.relation.as_str(),
            row.name,
            geometry_to_value(&row.boundary).to_string(),
        ])?;
    }
    Ok(())
}

pub fn insert_stores(conn: &Connection, stores: &[UnifiedStore]) -> Result<()> {
    let mut statement = conn.prepare(
        "INSERT OR REPLACE INTO stores
         (store_id, name, address, latitude, longitude, is_snap, match_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for store in stores {
        statement.execute(params![
            store.store_id,
            store.name,
            store.address,
            store.latitude,
            store.longitude,
            store.is_snap,
            store.match_id,
        ])?;
    }
    Ok(())
}

pub fn insert_comparisons(conn: &Connection, comparisons: &[TractComparison]) -> Result<()> {
    let mut statement = conn.prepare(
        "INSERT OR REPLACE INTO tract_comparisons
         (tract_id, year, historical_access_share, historical_label, trend)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for comparison in comparisons {
        statement.execute(params![
            comparison.tract_id,
            comparison.year,
            comparison.historical_access_share,
            comparison.historical_label,
            comparison.trend.as_str(),
        ])?;
    }
    Ok(())
}

/// Row count of one output table, for post-insert verification.
pub fn verify_count(conn: &Connection, table: &str) -> Result<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

/// Read the metric table back, ordered by tract id.
pub fn get_tract_metrics(conn: &Connection) -> Result<Vec<TractMetric>> {
    let mut statement = conn.prepare(
        "SELECT tract_id, tract_area_m2, uncovered_area_m2, access_ratio, low_access,
                display_label, median_household_income, low_income
         FROM tract_metrics ORDER BY tract_id",
    )?;
    let metrics = statement
        .query_map([], |row| {
            Ok(TractMetric {
                tract_id: row.get(0)?,
                tract_area_m2: row.get(1)?,
                uncovered_area_m2: row.get(2)?,
                access_ratio: row.get(3)?,
                low_access: row.get(4)?,
                display_label: row.get(5)?,
                median_household_income: row.get(6)?,
                low_income: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(metrics)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Trend;
    use crate::tracts::Relation;
    use geo::{polygon, MultiPolygon};

    fn sample_metric(tract_id: &str, ratio: f64) -> TractMetric {
        TractMetric {
            tract_id: tract_id.to_string(),
            tract_area_m2: 1_000_000.0,
            uncovered_area_m2: (1.0 - ratio) * 1_000_000.0,
            access_ratio: ratio,
            low_access: ratio < 1.0 / 3.0,
            display_label: format!("{:.1}%", ratio * 100.0),
            median_household_income: Some(65_000.0),
            low_income: Some(false),
        }
    }

    #[test]
    fn test_metric_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let metrics = vec![
            sample_metric("17031010100", 0.4),
            sample_metric("17031010200", 0.1),
        ];
        insert_tract_metrics(&conn, &metrics).unwrap();

        assert_eq!(verify_count(&conn, "tract_metrics").unwrap(), 2);

        let loaded = get_tract_metrics(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].tract_id, "17031010100");
        assert!((loaded[0].access_ratio - 0.4).abs() < 1e-12);
        assert!(loaded[1].low_access);
        assert_eq!(loaded[0].low_income, Some(false));
    }

    #[test]
    fn test_null_income_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut metric = sample_metric("17031010100", 0.5);
        metric.median_household_income = None;
        metric.low_income = None;
        insert_tract_metrics(&conn, &[metric]).unwrap();

        let loaded = get_tract_metrics(&conn).unwrap();
        assert_eq!(loaded[0].median_household_income, None);
        assert_eq!(loaded[0].low_income, None);
    }

    #[test]
    fn test_store_and_key_tables() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let stores = vec![UnifiedStore {
            store_id: 1,
            name: "Neighborhood Grocer".to_string(),
            address: "100 Main St".to_string(),
            latitude: 41.88,
            longitude: -87.62,
            is_snap: true,
            match_id: Some(1),
        }];
        insert_stores(&conn, &stores).unwrap();

        let key_rows = vec![TractKeyRow {
            legacy_id: "17031010100".to_string(),
            relation: Relation::OneToMany,
            name: Some("Census Tract 101".to_string()),
            boundary: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ]]),
        }];
        insert_tract_key(&conn, &key_rows).unwrap();

        assert_eq!(verify_count(&conn, "stores").unwrap(), 1);
        assert_eq!(verify_count(&conn, "tract_key").unwrap(), 1);

        let relation: String = conn
            .query_row("SELECT relation FROM tract_key", [], |row| row.get(0))
            .unwrap();
        assert_eq!(relation, "many");
    }

    #[test]
    fn test_comparison_table() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let comparisons = vec![TractComparison {
            tract_id: "17031010100".to_string(),
            year: 2019,
            historical_access_share: 0.75,
            historical_label: "75.0%".to_string(),
            trend: Trend::Better,
        }];
        insert_comparisons(&conn, &comparisons).unwrap();

        let trend: String = conn
            .query_row("SELECT trend FROM tract_comparisons", [], |row| row.get(0))
            .unwrap();
        assert_eq!(trend, "Better");
    }
}
