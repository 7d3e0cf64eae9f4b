use crate::error::{DashboardError, DashboardResult};
use crate::models::{
    AtRiskSummary, ClusterSummary, FeatureRow, FeatureTable, Statistic, StoreTable, HAS_NEXT_GEN,
    IS_FLAGSHIP, NEAREST_NEIGHBOR_MILES, NUM_OMNI_FEATURES, STORES_WITHIN_3_MILES,
    STORES_WITHIN_6_MILES,
};
use crate::taxonomy::ClusterLabel;

/// Features that hold 0/1 flags and are shown as percentages.
pub const PERCENT_FEATURES: [&str; 2] = [HAS_NEXT_GEN, IS_FLAGSHIP];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureView {
    Characteristics,
    Methodology,
}

pub fn feature_display_name(feature: &str, view: FeatureView) -> &str {
    match (view, feature) {
        (FeatureView::Characteristics, HAS_NEXT_GEN) => "Next Gen (%)",
        (FeatureView::Characteristics, IS_FLAGSHIP) => "Flagship (%)",
        (FeatureView::Characteristics, NUM_OMNI_FEATURES) => "Omni Features (%)",
        (FeatureView::Characteristics, NEAREST_NEIGHBOR_MILES) => "Nearest Store (mi)",
        (FeatureView::Characteristics, STORES_WITHIN_3_MILES) => "Stores < 3mi",
        (FeatureView::Characteristics, STORES_WITHIN_6_MILES) => "Stores < 6mi",
        (FeatureView::Methodology, HAS_NEXT_GEN) => "Next Gen Store",
        (FeatureView::Methodology, IS_FLAGSHIP) => "Flagship Store",
        (FeatureView::Methodology, NUM_OMNI_FEATURES) => "Number of Omni Features",
        (FeatureView::Methodology, NEAREST_NEIGHBOR_MILES) => "Nearest Neighbor (miles)",
        (FeatureView::Methodology, STORES_WITHIN_3_MILES) => "Stores Within 3 Miles",
        (FeatureView::Methodology, STORES_WITHIN_6_MILES) => "Stores Within 6 Miles",
        _ => feature,
    }
}

/// Half-to-even, so 0.125 rounds to 0.12.
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round_ties_even() / factor
}

pub fn percent_of(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(count as f64 / total as f64 * 100.0, 1)
}

pub fn counts_by_cluster(table: &StoreTable) -> DashboardResult<Vec<ClusterSummary>> {
    let total = table.len();
    if total == 0 {
        return Err(DashboardError::EmptyDataset);
    }

    let mut counts = [0usize; 4];
    for label in table.stores.iter().filter_map(|store| store.cluster_label) {
        counts[label.index()] += 1;
    }

    Ok(ClusterLabel::ALL
        .into_iter()
        .map(|label| ClusterSummary {
            label,
            count: counts[label.index()],
            percent: percent_of(counts[label.index()], total),
        })
        .collect())
}

pub fn at_risk(table: &StoreTable) -> DashboardResult<AtRiskSummary> {
    let counts = counts_by_cluster(table)?;
    let total: usize = counts
        .iter()
        .filter(|summary| summary.label.is_at_risk())
        .map(|summary| summary.count)
        .sum();

    Ok(AtRiskSummary {
        total_stores: table.len(),
        total,
        percent: percent_of(total, table.len()),
    })
}

/// Requested features that exist in the table, in request order.
pub fn usable_features<S: AsRef<str>>(table: &StoreTable, features: &[S]) -> Vec<String> {
    features
        .iter()
        .map(|feature| feature.as_ref())
        .filter(|feature| table.capabilities.has(feature))
        .map(str::to_string)
        .collect()
}

pub fn feature_means_by_cluster<S: AsRef<str>>(
    table: &StoreTable,
    features: &[S],
    precision: u32,
) -> FeatureTable {
    aggregate(table, features, Statistic::Mean, precision)
}

pub fn feature_medians_by_cluster<S: AsRef<str>>(
    table: &StoreTable,
    features: &[S],
    precision: u32,
) -> FeatureTable {
    aggregate(table, features, Statistic::Median, precision)
}

/// Mean table with flag features as percentages and the omni count replaced
/// by the share of stores offering at least one omni feature.
pub fn cluster_characteristics<S: AsRef<str>>(
    table: &StoreTable,
    features: &[S],
    precision: u32,
) -> FeatureTable {
    let mut means = feature_means_by_cluster(table, features, precision);
    let omni = omni_presence_by_cluster(table);

    for (column, feature) in means.features.iter().enumerate() {
        let is_percent = PERCENT_FEATURES.contains(&feature.as_str());
        let is_omni = feature == NUM_OMNI_FEATURES;
        for row in means.rows.iter_mut() {
            if is_percent {
                row.values[column] = row.values[column].map(|value| value * 100.0);
            } else if is_omni {
                row.values[column] = omni[row.label.index()];
            }
        }
    }

    means
}

/// Percent of stores per cluster with a positive omni feature count.
/// `None` for a cluster with no stores or when the column is missing.
pub fn omni_presence_by_cluster(table: &StoreTable) -> [Option<f64>; 4] {
    let mut presence = [None; 4];
    if !table.capabilities.has(NUM_OMNI_FEATURES) {
        return presence;
    }

    let mut totals = [0usize; 4];
    let mut with_omni = [0usize; 4];
    for store in &table.stores {
        let Some(label) = store.cluster_label else {
            continue;
        };
        totals[label.index()] += 1;
        if table
            .number(store, NUM_OMNI_FEATURES)
            .is_some_and(|count| count > 0.0)
        {
            with_omni[label.index()] += 1;
        }
    }

    for index in 0..4 {
        if totals[index] > 0 {
            presence[index] = Some(with_omni[index] as f64 / totals[index] as f64 * 100.0);
        }
    }
    presence
}

fn aggregate<S: AsRef<str>>(
    table: &StoreTable,
    features: &[S],
    statistic: Statistic,
    precision: u32,
) -> FeatureTable {
    let features = usable_features(table, features);

    let rows = ClusterLabel::ALL
        .into_iter()
        .map(|label| {
            let values = features
                .iter()
                .map(|feature| {
                    let mut samples: Vec<f64> = table
                        .stores
                        .iter()
                        .filter(|store| store.cluster_label == Some(label))
                        .filter_map(|store| table.number(store, feature))
                        .collect();
                    let value = match statistic {
                        Statistic::Mean => mean(&samples),
                        Statistic::Median => median(&mut samples),
                    };
                    value.map(|value| round_to(value, precision))
                })
                .collect();
            FeatureRow { label, values }
        })
        .collect();

    FeatureTable {
        statistic,
        precision,
        features,
        rows,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
