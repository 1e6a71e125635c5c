// 🛒 Entity Matching Engine - link store records across two registries
// Deterministic greedy matching on address number + great-circle distance.
// First candidate under threshold wins; this is a documented simplicity
// tradeoff, not a stable matching.

use crate::config::MetricConfig;
use crate::geometry::haversine_feet;
use log::info;
use serde::{Deserialize, Serialize};

/// Membership clubs are excluded before matching: they are not general
/// grocery access for the surrounding tract.
pub const MEMBERSHIP_STORES: [&str; 3] = ["Costco", "Sam's Club", "BJ's Wholesale Club"];

// ============================================================================
// STORE RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreSource {
    /// City business-license registry.
    LicenseRegistry,

    /// Federal SNAP retailer registry.
    SnapRegistry,
}

/// A raw store row as loaded from either registry, before filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStoreRecord {
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<String>,
}

/// A cleaned store record. Matching mutates `match_id` only, never the
/// identity or geometry fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub name: String,
    pub address: String,

    /// Leading numeric token of the address, a cheap secondary match key.
    pub address_number: String,

    pub latitude: f64,
    pub longitude: f64,
    pub source: StoreSource,

    /// Shared by at most one record from each source once matched.
    pub match_id: Option<u32>,
}

impl StoreRecord {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        latitude: f64,
        longitude: f64,
        source: StoreSource,
    ) -> Self {
        let address = address.into();
        let address_number = address
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        StoreRecord {
            name: name.into(),
            address,
            address_number,
            latitude,
            longitude,
            source,
            match_id: None,
        }
    }
}

/// One row of the unified store table handed to the overlay stage and the
/// visualization layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedStore {
    /// Dense 1..N identifier, the buffer/tract join key.
    pub store_id: u32,

    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,

    /// True when the store appears in the SNAP registry (matched license
    /// record, or a standalone SNAP record).
    pub is_snap: bool,

    pub match_id: Option<u32>,
}

// ============================================================================
// PRE-MATCH FILTERING
// ============================================================================

/// Filter raw license-registry rows: drop membership clubs, keep OPEN
/// stores, drop rows without coordinates.
pub fn filter_license_stores(raw: &[RawStoreRecord]) -> Vec<StoreRecord> {
    raw.iter()
        .filter(|r| !MEMBERSHIP_STORES.contains(&r.name.as_str()))
        .filter(|r| r.status.as_deref() == Some("OPEN"))
        .filter_map(|r| {
            let (lat, lon) = (r.latitude?, r.longitude?);
            Some(StoreRecord::new(
                r.name.clone(),
                r.address.clone(),
                lat,
                lon,
                StoreSource::LicenseRegistry,
            ))
        })
        .collect()
}

/// Filter raw SNAP-registry rows: drop rows without coordinates.
pub fn filter_snap_stores(raw: &[RawStoreRecord]) -> Vec<StoreRecord> {
    raw.iter()
        .filter_map(|r| {
            let (lat, lon) = (r.latitude?, r.longitude?);
            Some(StoreRecord::new(
                r.name.clone(),
                r.address.clone(),
                lat,
                lon,
                StoreSource::SnapRegistry,
            ))
        })
        .collect()
}

// ============================================================================
// MATCH ENGINE
// ============================================================================

pub struct MatchEngine {
    /// Maximum great-circle distance for a match, in feet (default: 1000).
    pub max_distance_feet: f64,
}

impl MatchEngine {
    pub fn new() -> Self {
        MatchEngine {
            max_distance_feet: 1000.0,
        }
    }

    pub fn from_config(config: &MetricConfig) -> Self {
        MatchEngine {
            max_distance_feet: config.max_match_distance_ft,
        }
    }

    /// Greedy first-match-wins pairing between the two registries.
    ///
    /// Both conditions must hold: equal address number AND haversine
    /// distance under the cutoff. Either alone is insufficient (shared
    /// address numbers across streets, or dense commercial strips).
    ///
    /// O(|A|*|B|); fine for low-thousands store counts. A spatial grid
    /// index would cut this down without changing the contract if counts
    /// grow.
    ///
    /// Returns the number of matched pairs. The claim bitsets are owned by
    /// this pass; no concurrent mutation is legal during a run.
    pub fn match_stores(
        &self,
        licenses: &mut [StoreRecord],
        snap: &mut [StoreRecord],
    ) -> usize {
        let mut claimed_license = vec![false; licenses.len()];
        let mut claimed_snap = vec![false; snap.len()];
        let mut next_id: u32 = 1;
        let mut pairs = 0;

        for i in 0..licenses.len() {
            if claimed_license[i] {
                continue;
            }
            for j in 0..snap.len() {
                if claimed_snap[j] {
                    continue;
                }
                if licenses[i].address_number != snap[j].address_number {
                    continue;
                }
                let feet = haversine_feet(
                    licenses[i].latitude,
                    licenses[i].longitude,
                    snap[j].latitude,
                    snap[j].longitude,
                );
                if feet <= self.max_distance_feet {
                    licenses[i].match_id = Some(next_id);
                    snap[j].match_id = Some(next_id);
                    claimed_license[i] = true;
                    claimed_snap[j] = true;
                    next_id += 1;
                    pairs += 1;
                    break; // first match wins, not closest
                }
            }
        }

        info!(
            "Matched {} store pairs ({} license, {} SNAP records)",
            pairs,
            licenses.len(),
            snap.len()
        );
        pairs
    }

    /// Assemble the unified store list after matching.
    ///
    /// Matched pairs collapse into one row preferring the license record's
    /// descriptive fields with `is_snap = true`; unmatched records from
    /// either source keep their own row. Dense `store_id`s are assigned
    /// after assembly.
    pub fn assemble(&self, licenses: &[StoreRecord], snap: &[StoreRecord]) -> Vec<UnifiedStore> {
        let mut rows = Vec::with_capacity(licenses.len() + snap.len());

        for store in licenses {
            rows.push(UnifiedStore {
                store_id: 0,
                name: store.name.clone(),
                address: title_case(&store.address),
                latitude: store.latitude,
                longitude: store.longitude,
                is_snap: store.match_id.is_some(),
                match_id: store.match_id,
            });
        }

        for store in snap.iter().filter(|s| s.match_id.is_none()) {
            rows.push(UnifiedStore {
                store_id: 0,
                name: store.name.clone(),
                address: title_case(&store.address),
                latitude: store.latitude,
                longitude: store.longitude,
                is_snap: true,
                match_id: None,
            });
        }

        for (index, row) in rows.iter_mut().enumerate() {
            row.store_id = index as u32 + 1;
        }
        rows
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Title-case an address for display ("1200 N CLARK ST" -> "1200 N Clark St").
fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::haversine_feet;

    // ~900 feet of latitude at Chicago's latitude
    const LAT_900_FT: f64 = 0.00247;

    fn license(name: &str, address: &str, lat: f64, lon: f64) -> StoreRecord {
        StoreRecord::new(name, address, lat, lon, StoreSource::LicenseRegistry)
    }

    fn snap(name: &str, address: &str, lat: f64, lon: f64) -> StoreRecord {
        StoreRecord::new(name, address, lat, lon, StoreSource::SnapRegistry)
    }

    #[test]
    fn test_address_number_extraction() {
        let store = license("Jewel-Osco", "1200 N Clark St", 41.9, -87.63);
        assert_eq!(store.address_number, "1200");

        let no_number = license("Corner Mart", "", 41.9, -87.63);
        assert_eq!(no_number.address_number, "");
    }

    #[test]
    fn test_match_same_address_within_distance() {
        let engine = MatchEngine::new();
        let mut a = vec![license("Store A", "100 Main St", 41.88, -87.62)];
        let mut b = vec![snap("STORE A", "100 Main St", 41.88 + LAT_900_FT, -87.62)];

        // Sanity: the offset really is under 1000 feet
        let feet = haversine_feet(41.88, -87.62, 41.88 + LAT_900_FT, -87.62);
        assert!(feet < 1000.0, "offset is {feet} ft");

        let pairs = engine.match_stores(&mut a, &mut b);
        assert_eq!(pairs, 1);
        assert_eq!(a[0].match_id, b[0].match_id);
        assert!(a[0].match_id.is_some());
    }

    #[test]
    fn test_no_match_different_address_number() {
        let engine = MatchEngine::new();
        // Same coordinates, different address number: must NOT match
        let mut a = vec![license("Store A", "100 Main St", 41.88, -87.62)];
        let mut b = vec![snap("Store C", "200 Main St", 41.88, -87.62)];

        let pairs = engine.match_stores(&mut a, &mut b);
        assert_eq!(pairs, 0);
        assert!(a[0].match_id.is_none());
        assert!(b[0].match_id.is_none());
    }

    #[test]
    fn test_no_match_beyond_distance() {
        let engine = MatchEngine::new();
        // Same address number, ~2 miles apart
        let mut a = vec![license("Store A", "100 Main St", 41.88, -87.62)];
        let mut b = vec![snap("Store B", "100 Other Ave", 41.91, -87.62)];

        let pairs = engine.match_stores(&mut a, &mut b);
        assert_eq!(pairs, 0);
    }

    #[test]
    fn test_matched_pairs_satisfy_both_conditions() {
        let engine = MatchEngine::new();
        let mut a = vec![
            license("A1", "100 Main St", 41.88, -87.62),
            license("A2", "500 State St", 41.89, -87.63),
        ];
        let mut b = vec![
            snap("B1", "500 State St", 41.89, -87.63),
            snap("B2", "100 Main St", 41.88 + LAT_900_FT, -87.62),
        ];

        engine.match_stores(&mut a, &mut b);

        for sa in &a {
            let Some(id) = sa.match_id else { continue };
            let sb = b.iter().find(|s| s.match_id == Some(id)).unwrap();
            assert_eq!(sa.address_number, sb.address_number);
            let feet = haversine_feet(sa.latitude, sa.longitude, sb.latitude, sb.longitude);
            assert!(feet <= engine.max_distance_feet);
        }
    }

    #[test]
    fn test_match_exclusivity_within_source() {
        let engine = MatchEngine::new();
        // Two license stores at the same address could both claim the one
        // SNAP record; only the first may get it.
        let mut a = vec![
            license("First", "100 Main St", 41.88, -87.62),
            license("Second", "100 Main St", 41.88, -87.62),
        ];
        let mut b = vec![snap("Only", "100 Main St", 41.88, -87.62)];

        let pairs = engine.match_stores(&mut a, &mut b);
        assert_eq!(pairs, 1);
        assert!(a[0].match_id.is_some());
        assert!(a[1].match_id.is_none());

        let mut seen = std::collections::HashSet::new();
        for s in a.iter().chain(b.iter()) {
            if let Some(id) = s.match_id {
                // (source, id) pairs must be unique
                assert!(seen.insert((s.source, id)));
            }
        }
    }

    #[test]
    fn test_first_match_wins_not_closest() {
        let engine = MatchEngine::new();
        let mut a = vec![license("A", "100 Main St", 41.88, -87.62)];
        // Both SNAP candidates qualify; the earlier row wins even though
        // the second is closer.
        let mut b = vec![
            snap("Farther", "100 Main St", 41.88 + LAT_900_FT, -87.62),
            snap("Closer", "100 Main St", 41.88, -87.62),
        ];

        engine.match_stores(&mut a, &mut b);
        assert!(b[0].match_id.is_some());
        assert!(b[1].match_id.is_none());
    }

    #[test]
    fn test_assemble_unified_rows() {
        let engine = MatchEngine::new();
        let mut a = vec![
            license("Matched Grocer", "100 MAIN ST", 41.88, -87.62),
            license("License Only", "900 Oak St", 41.90, -87.65),
        ];
        let mut b = vec![
            snap("Matched Grocer SNAP", "100 Main St", 41.88, -87.62),
            snap("Snap Only", "321 Elm St", 41.92, -87.66),
        ];
        engine.match_stores(&mut a, &mut b);

        let unified = engine.assemble(&a, &b);

        // 2 license rows + 1 unmatched SNAP row
        assert_eq!(unified.len(), 3);
        let ids: Vec<u32> = unified.iter().map(|s| s.store_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        // Matched row keeps license name/address, gains the SNAP flag
        assert_eq!(unified[0].name, "Matched Grocer");
        assert_eq!(unified[0].address, "100 Main St");
        assert!(unified[0].is_snap);

        assert!(!unified[1].is_snap);

        assert_eq!(unified[2].name, "Snap Only");
        assert!(unified[2].is_snap);
    }

    #[test]
    fn test_filter_license_stores() {
        let raw = vec![
            RawStoreRecord {
                name: "Costco".to_string(),
                address: "2746 N Clybourn Ave".to_string(),
                latitude: Some(41.93),
                longitude: Some(-87.67),
                status: Some("OPEN".to_string()),
            },
            RawStoreRecord {
                name: "Closed Mart".to_string(),
                address: "1 Somewhere".to_string(),
                latitude: Some(41.9),
                longitude: Some(-87.6),
                status: Some("CLOSED".to_string()),
            },
            RawStoreRecord {
                name: "No Coords".to_string(),
                address: "2 Somewhere".to_string(),
                latitude: None,
                longitude: None,
                status: Some("OPEN".to_string()),
            },
            RawStoreRecord {
                name: "Good Grocer".to_string(),
                address: "3 Somewhere".to_string(),
                latitude: Some(41.9),
                longitude: Some(-87.6),
                status: Some("OPEN".to_string()),
            },
        ];

        let stores = filter_license_stores(&raw);
        assert_eq!(stores.len(), 1);
        assert_eq!(stores[0].name, "Good Grocer");
        assert_eq!(stores[0].source, StoreSource::LicenseRegistry);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("1200 N CLARK ST"), "1200 N Clark St");
        assert_eq!(title_case("100 main st"), "100 Main St");
        assert_eq!(title_case(""), "");
    }
}
