use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;

use crate::taxonomy::ClusterLabel;

pub const CLUSTER_LABEL_COLUMN: &str = "cluster_label";
pub const CLUSTER_ID_COLUMN: &str = "cluster";

pub const HAS_NEXT_GEN: &str = "has_next_gen";
pub const IS_FLAGSHIP: &str = "is_flagship";
pub const NUM_OMNI_FEATURES: &str = "num_omni_features";
pub const NEAREST_NEIGHBOR_MILES: &str = "nearest_neighbor_miles";
pub const STORES_WITHIN_3_MILES: &str = "stores_within_3_miles";
pub const STORES_WITHIN_6_MILES: &str = "stores_within_6_miles";

/// One row of the source table. `values` line up with `StoreTable::columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct Store {
    pub values: Vec<String>,
    pub cluster_label: Option<ClusterLabel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Capabilities {
    pub has_geo: bool,
    pub has_cluster_column: bool,
    pub available_features: BTreeSet<String>,
}

impl Capabilities {
    pub fn from_columns(columns: &[String]) -> Self {
        let available_features: BTreeSet<String> = columns.iter().cloned().collect();
        Capabilities {
            has_geo: available_features.contains("latitude")
                && available_features.contains("longitude"),
            has_cluster_column: available_features.contains(CLUSTER_LABEL_COLUMN)
                || available_features.contains(CLUSTER_ID_COLUMN),
            available_features,
        }
    }

    pub fn has(&self, column: &str) -> bool {
        self.available_features.contains(column)
    }
}

#[derive(Debug, Clone)]
pub struct StoreTable {
    pub source: PathBuf,
    pub columns: Vec<String>,
    pub stores: Vec<Store>,
    pub capabilities: Capabilities,
    pub unmapped_labels: usize,
    index: HashMap<String, usize>,
}

impl StoreTable {
    pub fn new(
        source: PathBuf,
        columns: Vec<String>,
        stores: Vec<Store>,
        unmapped_labels: usize,
    ) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(position, name)| (name.clone(), position))
            .collect();
        let capabilities = Capabilities::from_columns(&columns);
        StoreTable {
            source,
            columns,
            stores,
            capabilities,
            unmapped_labels,
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// Non-empty cell text, if the column exists.
    pub fn text<'a>(&self, store: &'a Store, column: &str) -> Option<&'a str> {
        let position = self.column_index(column)?;
        store
            .values
            .get(position)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Numeric view of a cell. Boolean words read as 1.0 / 0.0.
    pub fn number(&self, store: &Store, column: &str) -> Option<f64> {
        self.text(store, column).and_then(parse_number)
    }

    pub fn flag(&self, store: &Store, column: &str) -> Option<bool> {
        self.number(store, column).map(|value| value != 0.0)
    }

    pub fn count(&self, store: &Store, column: &str) -> Option<u32> {
        self.number(store, column)
            .filter(|value| *value >= 0.0)
            .map(|value| value.round() as u32)
    }

    pub fn detail(&self, store: &Store) -> StoreDetail {
        StoreDetail {
            address: self.text(store, "address").map(str::to_string),
            city: self.text(store, "city").map(str::to_string),
            state: self.text(store, "state").map(str::to_string),
            cluster_label: store.cluster_label,
            nearest_neighbor_miles: self.number(store, NEAREST_NEIGHBOR_MILES),
            stores_within_3_miles: self.count(store, STORES_WITHIN_3_MILES),
            stores_within_6_miles: self.count(store, STORES_WITHIN_6_MILES),
            num_omni_features: self.count(store, NUM_OMNI_FEATURES),
            has_next_gen: self.flag(store, HAS_NEXT_GEN),
            is_flagship: self.flag(store, IS_FLAGSHIP),
        }
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let value = raw.trim();
    if let Ok(number) = value.parse::<f64>() {
        return number.is_finite().then_some(number);
    }
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Some(1.0),
        "false" | "no" => Some(0.0),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreDetail {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub cluster_label: Option<ClusterLabel>,
    pub nearest_neighbor_miles: Option<f64>,
    pub stores_within_3_miles: Option<u32>,
    pub stores_within_6_miles: Option<u32>,
    pub num_omni_features: Option<u32>,
    pub has_next_gen: Option<bool>,
    pub is_flagship: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub label: ClusterLabel,
    pub count: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtRiskSummary {
    pub total_stores: usize,
    pub total: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Median,
}

/// Per-cluster feature values in canonical cluster order. `None` marks a
/// cluster with no data for that feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTable {
    pub statistic: Statistic,
    pub precision: u32,
    pub features: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub label: ClusterLabel,
    pub values: Vec<Option<f64>>,
}

impl FeatureTable {
    pub fn value(&self, label: ClusterLabel, feature: &str) -> Option<f64> {
        let column = self.features.iter().position(|name| name == feature)?;
        self.rows
            .iter()
            .find(|row| row.label == label)
            .and_then(|row| row.values.get(column).copied().flatten())
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationRow {
    pub quarter_end: NaiveDate,
    pub sample_yoy: f64,
    pub reported_yoy: f64,
    pub predicted_yoy: f64,
    pub residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub label: ClusterLabel,
    pub color: &'static str,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub nearest_neighbor_miles: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MapView {
    Unavailable,
    Available {
        center: (f64, f64),
        points: Vec<MapPoint>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StoreTable {
        let columns = vec![
            "address".to_string(),
            "latitude".to_string(),
            "longitude".to_string(),
            HAS_NEXT_GEN.to_string(),
            NUM_OMNI_FEATURES.to_string(),
        ];
        let stores = vec![Store {
            values: vec![
                " 12 Main St ".to_string(),
                "40.1".to_string(),
                "".to_string(),
                "True".to_string(),
                "2.0".to_string(),
            ],
            cluster_label: Some(ClusterLabel::Redundant),
        }];
        StoreTable::new(PathBuf::from("stores.csv"), columns, stores, 0)
    }

    #[test]
    fn capabilities_reflect_columns() {
        let table = table();
        assert!(table.capabilities.has_geo);
        assert!(!table.capabilities.has_cluster_column);
        assert!(table.capabilities.has(HAS_NEXT_GEN));
        assert!(!table.capabilities.has(IS_FLAGSHIP));
    }

    #[test]
    fn typed_accessors_parse_cells() {
        let table = table();
        let store = &table.stores[0];
        assert_eq!(table.text(store, "address"), Some("12 Main St"));
        assert_eq!(table.number(store, "latitude"), Some(40.1));
        assert_eq!(table.number(store, "longitude"), None);
        assert_eq!(table.flag(store, HAS_NEXT_GEN), Some(true));
        assert_eq!(table.count(store, NUM_OMNI_FEATURES), Some(2));
        assert_eq!(table.text(store, "city"), None);
    }

    #[test]
    fn parse_number_accepts_flags() {
        assert_eq!(parse_number("0"), Some(0.0));
        assert_eq!(parse_number("FALSE"), Some(0.0));
        assert_eq!(parse_number("yes"), Some(1.0));
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("n/a"), None);
    }
}
