use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::error::{DashboardError, DashboardResult};
use crate::models::{Store, StoreTable, CLUSTER_ID_COLUMN, CLUSTER_LABEL_COLUMN};
use crate::taxonomy::ClusterLabel;

/// Reads a store table from a CSV file.
pub fn load(path: &Path) -> DashboardResult<StoreTable> {
    let file = std::fs::File::open(path).map_err(|e| DashboardError::unavailable(path, e))?;
    let table = read_stores(path, file)?;
    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns.len(),
        "loaded store table"
    );
    Ok(table)
}

pub fn read_stores<R: Read>(source: &Path, reader: R) -> DashboardResult<StoreTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut columns: Vec<String> = csv_reader
        .headers()
        .map_err(|e| DashboardError::unavailable(source, e))?
        .iter()
        .map(normalize_header)
        .collect();

    if columns.iter().all(|name| name.is_empty()) {
        return Err(DashboardError::unavailable(source, "missing header row"));
    }

    let mut rows = Vec::new();
    for (line_num, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| {
            DashboardError::unavailable(source, format!("parse error at line {}: {}", line_num + 2, e))
        })?;
        let mut values: Vec<String> = record.iter().map(str::to_string).collect();
        values.resize(columns.len(), String::new());
        rows.push(values);
    }

    let label_column = columns.iter().position(|name| name == CLUSTER_LABEL_COLUMN);
    let id_column = columns.iter().position(|name| name == CLUSTER_ID_COLUMN);

    let mut unmapped_labels = 0usize;
    let stores: Vec<Store> = match (label_column, id_column) {
        (Some(position), _) => rows
            .into_iter()
            .map(|values| {
                let cluster_label = values[position].parse::<ClusterLabel>().ok();
                if cluster_label.is_none() {
                    unmapped_labels += 1;
                }
                Store {
                    values,
                    cluster_label,
                }
            })
            .collect(),
        (None, Some(position)) => {
            columns.push(CLUSTER_LABEL_COLUMN.to_string());
            rows.into_iter()
                .map(|mut values| {
                    let cluster_label = parse_cluster_id(&values[position])
                        .and_then(ClusterLabel::from_cluster_id);
                    if cluster_label.is_none() {
                        unmapped_labels += 1;
                    }
                    values.push(
                        cluster_label
                            .map(|label| label.as_str().to_string())
                            .unwrap_or_default(),
                    );
                    Store {
                        values,
                        cluster_label,
                    }
                })
                .collect()
        }
        (None, None) => {
            warn!(path = %source.display(), "no cluster_label or cluster column; stores are unlabeled");
            rows.into_iter()
                .map(|values| Store {
                    values,
                    cluster_label: None,
                })
                .collect()
        }
    };

    if unmapped_labels > 0 {
        warn!(
            path = %source.display(),
            unmapped = unmapped_labels,
            "rows did not map to a known cluster"
        );
    }

    Ok(StoreTable::new(
        source.to_path_buf(),
        columns,
        stores,
        unmapped_labels,
    ))
}

fn normalize_header(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn parse_cluster_id(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if let Ok(id) = value.parse::<i64>() {
        return Some(id);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|id| id.is_finite() && id.fract() == 0.0)
        .map(|id| id as i64)
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

struct CacheEntry {
    table: Arc<StoreTable>,
    loaded_at: DateTime<Utc>,
}

/// Memoizes loaded tables by path. Without a TTL an entry lives until it is
/// invalidated.
pub struct StoreCache<C: Clock = SystemClock> {
    clock: C,
    ttl: Option<Duration>,
    entries: HashMap<PathBuf, CacheEntry>,
}

impl StoreCache<SystemClock> {
    pub fn new(ttl: Option<Duration>) -> Self {
        StoreCache::with_clock(SystemClock, ttl)
    }
}

impl<C: Clock> StoreCache<C> {
    pub fn with_clock(clock: C, ttl: Option<Duration>) -> Self {
        StoreCache {
            clock,
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&mut self, path: &Path) -> DashboardResult<Arc<StoreTable>> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.get(path) {
            let fresh = self
                .ttl
                .map_or(true, |ttl| now - entry.loaded_at < ttl);
            if fresh {
                debug!(path = %path.display(), "store table cache hit");
                return Ok(Arc::clone(&entry.table));
            }
            debug!(path = %path.display(), "store table cache entry expired");
        }

        let table = Arc::new(load(path)?);
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                table: Arc::clone(&table),
                loaded_at: now,
            },
        );
        Ok(table)
    }

    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    struct ManualClock {
        now: Cell<DateTime<Utc>>,
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }
    }

    impl Clock for &ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.now.get()
        }
    }

    #[test]
    fn headers_are_trimmed_and_lowercased() {
        let file = write_csv(&[" Address ,CITY,Cluster_Label", "1 Elm St,Austin,Redundant"]);
        let table = load(file.path()).unwrap();
        assert_eq!(table.columns, vec!["address", "city", "cluster_label"]);
        assert_eq!(table.stores[0].cluster_label, Some(ClusterLabel::Redundant));
        assert_eq!(table.unmapped_labels, 0);
    }

    #[test]
    fn cluster_ids_derive_labels() {
        let file = write_csv(&["cluster", "0", "1", "2", "3", "0"]);
        let table = load(file.path()).unwrap();
        let labels: Vec<Option<ClusterLabel>> =
            table.stores.iter().map(|s| s.cluster_label).collect();
        assert_eq!(
            labels,
            vec![
                Some(ClusterLabel::MiddleTier),
                Some(ClusterLabel::WeakerStore),
                Some(ClusterLabel::BestStores),
                Some(ClusterLabel::Redundant),
                Some(ClusterLabel::MiddleTier),
            ]
        );
        assert_eq!(table.columns, vec!["cluster", "cluster_label"]);
        assert_eq!(table.text(&table.stores[1], "cluster_label"), Some("Weaker Store"));
    }

    #[test]
    fn unknown_ids_are_counted_not_fatal() {
        let file = write_csv(&["cluster,city", "7,Austin", "2.0,Dallas", ",Waco"]);
        let table = load(file.path()).unwrap();
        assert_eq!(table.stores[0].cluster_label, None);
        assert_eq!(table.stores[1].cluster_label, Some(ClusterLabel::BestStores));
        assert_eq!(table.stores[2].cluster_label, None);
        assert_eq!(table.unmapped_labels, 2);
    }

    #[test]
    fn missing_cluster_columns_leave_rows_unlabeled() {
        let file = write_csv(&["address,city", "1 Elm St,Austin", "2 Oak Ave,Dallas"]);
        let table = load(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.stores.iter().all(|s| s.cluster_label.is_none()));
        assert!(!table.capabilities.has_cluster_column);
        assert!(!table.capabilities.has_geo);
    }

    #[test]
    fn short_rows_are_padded() {
        let file = write_csv(&["address,city,state", "1 Elm St,Austin"]);
        let table = load(file.path()).unwrap();
        assert_eq!(table.stores[0].values.len(), 3);
        assert_eq!(table.text(&table.stores[0], "state"), None);
    }

    #[test]
    fn missing_file_is_data_unavailable() {
        let err = load(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, DashboardError::DataUnavailable { .. }));
    }

    #[test]
    fn empty_file_is_data_unavailable() {
        let file = NamedTempFile::new().unwrap();
        let err = load(file.path()).unwrap_err();
        assert!(matches!(err, DashboardError::DataUnavailable { .. }));
    }

    #[test]
    fn header_only_file_loads_empty() {
        let file = write_csv(&["address,cluster"]);
        let table = load(file.path()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn cache_reuses_loaded_table() {
        let file = write_csv(&["cluster", "0"]);
        let mut cache = StoreCache::new(None);
        let first = cache.get(file.path()).unwrap();
        let second = cache.get(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate(file.path()));
        let third = cache.get(file.path()).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn cache_keys_entries_by_path() {
        let north = write_csv(&["cluster", "0"]);
        let south = write_csv(&["cluster", "3", "1"]);
        let mut cache = StoreCache::new(None);

        let a = cache.get(north.path()).unwrap();
        let b = cache.get(south.path()).unwrap();
        assert_eq!(cache.len(), 2);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);

        assert!(Arc::ptr_eq(&a, &cache.get(north.path()).unwrap()));
        assert!(cache.invalidate(north.path()));
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&b, &cache.get(south.path()).unwrap()));
    }

    #[test]
    fn cache_reloads_after_ttl() {
        let file = write_csv(&["cluster", "0"]);
        let clock = ManualClock {
            now: Cell::new(Utc::now()),
        };
        let mut cache = StoreCache::with_clock(&clock, Some(Duration::minutes(5)));

        let first = cache.get(file.path()).unwrap();
        clock.advance(Duration::minutes(4));
        let second = cache.get(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        clock.advance(Duration::minutes(2));
        let third = cache.get(file.path()).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn cache_does_not_store_failures() {
        let mut cache = StoreCache::new(None);
        assert!(cache.get(Path::new("/definitely/not/here.csv")).is_err());
        assert!(cache.is_empty());
        cache.clear();
    }
}
