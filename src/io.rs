// 📂 Table Loaders - CSV and GeoJSON inputs for the engine
// Thin wrappers only: each loader produces a typed table with known columns
// and leaves all semantics to the engine stages. Column names mirror the
// upstream sources so raw exports load without preprocessing.

use crate::classify::{HistoricalRecord, IncomeRecord};
use crate::matching::RawStoreRecord;
use crate::tracts::{CrosswalkRow, LegacyTract};
use anyhow::{Context, Result};
use geo::{LineString, MultiPolygon, Polygon};
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::io::Read;
use std::path::Path;

// ============================================================================
// GEOJSON GEOMETRY
// ============================================================================

fn ring_from_value(value: &Value) -> Option<LineString<f64>> {
    let coords: Vec<(f64, f64)> = value
        .as_array()?
        .iter()
        .filter_map(|pair| {
            let pair = pair.as_array()?;
            Some((pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
        })
        .collect();
    if coords.len() < 4 {
        return None;
    }
    Some(LineString::from(coords))
}

fn polygon_from_value(rings: &Value) -> Option<Polygon<f64>> {
    let rings = rings.as_array()?;
    let exterior = ring_from_value(rings.first()?)?;
    let interiors: Vec<LineString<f64>> =
        rings[1..].iter().filter_map(ring_from_value).collect();
    Some(Polygon::new(exterior, interiors))
}

/// Parse a GeoJSON geometry object (Polygon or MultiPolygon) into a
/// MultiPolygon. Returns None for anything else.
pub fn multipolygon_from_geometry(geometry: &Value) -> Option<MultiPolygon<f64>> {
    let coordinates = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Polygon" => Some(MultiPolygon::new(vec![polygon_from_value(coordinates)?])),
        "MultiPolygon" => {
            let polygons: Vec<Polygon<f64>> = coordinates
                .as_array()?
                .iter()
                .filter_map(polygon_from_value)
                .collect();
            if polygons.is_empty() {
                return None;
            }
            Some(MultiPolygon::new(polygons))
        }
        _ => None,
    }
}

/// Serialize a MultiPolygon back to a GeoJSON geometry object, for the
/// persisted output tables the map layer reads.
pub fn geometry_to_value(mp: &MultiPolygon<f64>) -> Value {
    let coordinates: Vec<Value> = mp
        .0
        .iter()
        .map(|polygon| {
            let mut rings = vec![ring_to_value(polygon.exterior())];
            rings.extend(polygon.interiors().iter().map(ring_to_value));
            Value::Array(rings)
        })
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": coordinates })
}

fn ring_to_value(ring: &LineString<f64>) -> Value {
    Value::Array(
        ring.coords()
            .map(|c| json!([c.x, c.y]))
            .collect(),
    )
}

// ============================================================================
// TRACT BOUNDARIES (GeoJSON)
// ============================================================================

/// Load legacy-vintage tract boundaries from a GeoJSON FeatureCollection
/// with `geoid10` / `namelsad10` properties. Features without usable
/// geometry keep `boundary = None` and are excluded (and counted) by the
/// reconciler, not here.
pub fn load_legacy_tracts(path: &Path) -> Result<Vec<LegacyTract>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tract boundary file: {path:?}"))?;
    let root: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse GeoJSON: {path:?}"))?;

    let features = root
        .get("features")
        .and_then(|f| f.as_array())
        .context("GeoJSON has no features array")?;

    let mut tracts = Vec::with_capacity(features.len());
    for feature in features {
        let properties = feature.get("properties");
        let legacy_id = match properties
            .and_then(|p| p.get("geoid10"))
            .and_then(|v| v.as_str())
        {
            Some(id) => id.to_string(),
            None => {
                warn!("Skipping tract feature without geoid10 in {path:?}");
                continue;
            }
        };
        let name = properties
            .and_then(|p| p.get("namelsad10"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let boundary = feature.get("geometry").and_then(multipolygon_from_geometry);

        tracts.push(LegacyTract {
            legacy_id,
            name,
            boundary,
        });
    }
    Ok(tracts)
}

/// Load the shoreline/water reference geometry: every polygon in the file
/// collapsed into one MultiPolygon.
pub fn load_shoreline(path: &Path) -> Result<MultiPolygon<f64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read shoreline file: {path:?}"))?;
    let root: Value = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse GeoJSON: {path:?}"))?;

    let features = root
        .get("features")
        .and_then(|f| f.as_array())
        .context("GeoJSON has no features array")?;

    let polygons: Vec<Polygon<f64>> = features
        .iter()
        .filter_map(|f| f.get("geometry"))
        .filter_map(multipolygon_from_geometry)
        .flat_map(|mp| mp.0)
        .collect();

    anyhow::ensure!(!polygons.is_empty(), "Shoreline file has no polygons: {path:?}");
    Ok(MultiPolygon::new(polygons))
}

// ============================================================================
// CURRENT TRACT IDS AND CROSSWALK (CSV)
// ============================================================================

/// Current-vintage tract identifiers: first column of each row, kept as
/// strings to preserve leading zeros.
pub fn load_current_tract_ids(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open tract id file: {path:?}"))?;
    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(id) = record.get(0) {
            if !id.is_empty() {
                ids.push(id.to_string());
            }
        }
    }
    Ok(ids)
}

#[derive(Debug, Deserialize)]
struct CrosswalkCsvRow {
    #[serde(rename = "GEOID_TRACT_20")]
    current_id: String,
    #[serde(rename = "GEOID_TRACT_10")]
    legacy_id: String,
}

/// Load the census relationship file (pipe-delimited, national coverage).
pub fn load_crosswalk(path: &Path) -> Result<Vec<CrosswalkRow>> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open crosswalk file: {path:?}"))?;
    read_crosswalk(file)
}

fn read_crosswalk<R: Read>(reader: R) -> Result<Vec<CrosswalkRow>> {
    let mut csv_reader = csv::ReaderBuilder::new().delimiter(b'|').from_reader(reader);
    let mut rows = Vec::new();
    for row in csv_reader.deserialize() {
        let row: CrosswalkCsvRow = row.context("Malformed crosswalk row")?;
        rows.push(CrosswalkRow {
            current_id: row.current_id,
            legacy_id: row.legacy_id,
        });
    }
    Ok(rows)
}

// ============================================================================
// STORE REGISTRIES (CSV)
// ============================================================================

#[derive(Debug, Deserialize)]
struct LicenseCsvRow {
    #[serde(rename = "Store Name")]
    store_name: String,
    #[serde(rename = "Address")]
    address: String,
    #[serde(rename = "New status")]
    status: String,
    #[serde(rename = "Location")]
    location: String,
}

/// Extract (longitude, latitude) from a `POINT (lon lat)` location column.
fn parse_point(location: &str) -> Option<(f64, f64)> {
    let inner = location
        .trim()
        .strip_prefix("POINT (")?
        .strip_suffix(')')?;
    let mut parts = inner.split_whitespace();
    let lon: f64 = parts.next()?.parse().ok()?;
    let lat: f64 = parts.next()?.parse().ok()?;
    Some((lon, lat))
}

/// Load the business-license registry export.
pub fn load_license_stores(path: &Path) -> Result<Vec<RawStoreRecord>> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open license store file: {path:?}"))?;
    read_license_stores(file)
}

fn read_license_stores<R: Read>(reader: R) -> Result<Vec<RawStoreRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for row in csv_reader.deserialize() {
        let row: LicenseCsvRow = row.context("Malformed license store row")?;
        let point = parse_point(&row.location);
        rows.push(RawStoreRecord {
            name: row.store_name,
            address: row.address,
            latitude: point.map(|(_, lat)| lat),
            longitude: point.map(|(lon, _)| lon),
            status: Some(row.status),
        });
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct SnapCsvRow {
    #[serde(rename = "Store_Name")]
    store_name: String,
    #[serde(rename = "Latitude")]
    latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    longitude: Option<f64>,
    #[serde(rename = "Store_Street_Address")]
    address: String,
}

/// Load the SNAP retailer registry export.
pub fn load_snap_stores(path: &Path) -> Result<Vec<RawStoreRecord>> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open SNAP store file: {path:?}"))?;
    read_snap_stores(file)
}

fn read_snap_stores<R: Read>(reader: R) -> Result<Vec<RawStoreRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for row in csv_reader.deserialize() {
        let row: SnapCsvRow = row.context("Malformed SNAP store row")?;
        rows.push(RawStoreRecord {
            name: row.store_name,
            address: row.address,
            latitude: row.latitude,
            longitude: row.longitude,
            status: None,
        });
    }
    Ok(rows)
}

// ============================================================================
// INCOME TABLE (CSV)
// ============================================================================

#[derive(Debug, Deserialize)]
struct IncomeCsvRow {
    state: String,
    county: String,
    tract: String,
    median_household_income: Option<f64>,
}

/// Load the tract-level income table. Rows whose geographic codes fail to
/// parse are skipped with a warning; they could never join anyway.
pub fn load_income(path: &Path) -> Result<Vec<IncomeRecord>> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open income file: {path:?}"))?;
    read_income(file)
}

fn read_income<R: Read>(reader: R) -> Result<Vec<IncomeRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for row in csv_reader.deserialize() {
        let row: IncomeCsvRow = row.context("Malformed income row")?;
        match (
            row.state.parse::<u32>(),
            row.county.parse::<u32>(),
            row.tract.parse::<u32>(),
        ) {
            (Ok(state), Ok(county), Ok(tract)) => rows.push(IncomeRecord {
                state,
                county,
                tract,
                median_household_income: row.median_household_income,
            }),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {skipped} income rows with unparsable geographic codes");
    }
    Ok(rows)
}

// ============================================================================
// HISTORICAL ATLAS TABLE (CSV)
// ============================================================================

#[derive(Debug, Deserialize)]
struct AtlasCsvRow {
    #[serde(rename = "CensusTract")]
    tract_id: String,
    #[serde(rename = "lapophalfshare")]
    low_access_share: Option<f64>,
}

/// Load one historical reference year. `percent_scaled` marks vintages
/// that publish the share as 0-100 instead of 0-1. Missing shares load as
/// zero, matching the upstream convention.
pub fn load_atlas_year(path: &Path, year: u16, percent_scaled: bool) -> Result<Vec<HistoricalRecord>> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open historical file: {path:?}"))?;
    read_atlas_year(file, year, percent_scaled)
}

fn read_atlas_year<R: Read>(
    reader: R,
    year: u16,
    percent_scaled: bool,
) -> Result<Vec<HistoricalRecord>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for row in csv_reader.deserialize() {
        let row: AtlasCsvRow = row.context("Malformed historical row")?;
        rows.push(HistoricalRecord {
            tract_id: row.tract_id,
            year,
            low_access_share: row.low_access_share.unwrap_or(0.0),
            percent_scaled,
        });
    }
    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================
