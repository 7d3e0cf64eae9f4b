use crate::models::{MapPoint, MapView, Store, StoreDetail, StoreTable, NEAREST_NEIGHBOR_MILES};
use crate::taxonomy::{ClusterFilter, ClusterLabel};

const DEFAULT_MAP_CENTER: (f64, f64) = (39.5, -98.5);

pub fn filter_by_cluster<'a>(rows: &[&'a Store], cluster: ClusterFilter) -> Vec<&'a Store> {
    rows.iter()
        .copied()
        .filter(|store| cluster.matches(store.cluster_label))
        .collect()
}

/// Case-insensitive substring match against every cell of the row.
pub fn filter_by_search<'a>(rows: &[&'a Store], text: &str) -> Vec<&'a Store> {
    if text.is_empty() {
        return rows.to_vec();
    }
    let needle = text.to_lowercase();
    rows.iter()
        .copied()
        .filter(|store| {
            store
                .values
                .iter()
                .any(|value| value.to_lowercase().contains(&needle))
        })
        .collect()
}

pub fn filter_stores<'a>(
    table: &'a StoreTable,
    cluster: ClusterFilter,
    text: &str,
) -> Vec<&'a Store> {
    let all: Vec<&Store> = table.stores.iter().collect();
    let by_cluster = filter_by_cluster(&all, cluster);
    filter_by_search(&by_cluster, text)
}

pub fn store_details(table: &StoreTable, rows: &[&Store]) -> Vec<StoreDetail> {
    rows.iter().map(|store| table.detail(store)).collect()
}

pub fn map_view(table: &StoreTable, clusters: &[ClusterLabel]) -> MapView {
    if !table.capabilities.has_geo {
        return MapView::Unavailable;
    }

    let points: Vec<MapPoint> = table
        .stores
        .iter()
        .filter_map(|store| {
            let label = store.cluster_label.filter(|label| clusters.contains(label))?;
            Some(MapPoint {
                latitude: table.number(store, "latitude")?,
                longitude: table.number(store, "longitude")?,
                label,
                color: label.color(),
                address: table.text(store, "address").map(str::to_string),
                city: table.text(store, "city").map(str::to_string),
                state: table.text(store, "state").map(str::to_string),
                nearest_neighbor_miles: table.number(store, NEAREST_NEIGHBOR_MILES),
            })
        })
        .collect();

    let center = if points.is_empty() {
        DEFAULT_MAP_CENTER
    } else {
        let n = points.len() as f64;
        (
            points.iter().map(|p| p.latitude).sum::<f64>() / n,
            points.iter().map(|p| p.longitude).sum::<f64>() / n,
        )
    };

    MapView::Available { center, points }
}
