use std::fmt::Write;

use crate::error::{DashboardError, DashboardResult};
use crate::forecast::ForecastReport;
use crate::metrics::{self, FeatureView};
use crate::models::{FeatureTable, MapView, StoreDetail, StoreTable};
use crate::taxonomy::ClusterLabel;

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

fn flag(value: Option<bool>) -> String {
    cell(value.map(|v| if v { "yes" } else { "no" }))
}

pub fn render_summary(table: &StoreTable) -> DashboardResult<String> {
    let counts = metrics::counts_by_cluster(table)?;
    let at_risk = metrics::at_risk(table)?;
    let mut output = String::new();

    let _ = writeln!(output, "## Which Stores Will Close?");
    let _ = writeln!(
        output,
        "**{} stores ({:.1}%)** are high-priority candidates for closure evaluation.",
        at_risk.total, at_risk.percent
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "- Total stores: {}", at_risk.total_stores);
    let _ = writeln!(output, "- At risk stores: {}", at_risk.total);
    if table.unmapped_labels > 0 {
        let _ = writeln!(
            output,
            "- Stores without a known cluster: {}",
            table.unmapped_labels
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "### Store Clusters");
    for summary in &counts {
        let _ = writeln!(
            output,
            "- {} ({}): {} stores ({:.1}%), {}",
            summary.label,
            summary.label.color(),
            summary.count,
            summary.percent,
            summary.label.closure_priority()
        );
    }

    Ok(output)
}

pub fn render_closure_reasons() -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Closure Reasons by Cluster");
    for label in [ClusterLabel::WeakerStore, ClusterLabel::Redundant] {
        let _ = writeln!(output);
        let _ = writeln!(output, "### {}", label);
        for reason in label.closure_reasons() {
            let _ = writeln!(output, "- {}", reason);
        }
    }
    output
}

fn render_feature_table(output: &mut String, table: &FeatureTable, view: FeatureView) {
    if table.is_empty() {
        let _ = writeln!(output, "No cluster features available in this data set.");
        return;
    }

    let headers: Vec<&str> = table
        .features
        .iter()
        .map(|feature| metrics::feature_display_name(feature, view))
        .collect();
    let _ = writeln!(output, "| Cluster | {} |", headers.join(" | "));
    let _ = writeln!(output, "|---|{}", "---|".repeat(headers.len()));

    let precision = table.precision as usize;
    for row in &table.rows {
        let values: Vec<String> = row
            .values
            .iter()
            .map(|value| {
                value
                    .map(|v| format!("{:.*}", precision, v))
                    .unwrap_or_else(|| "n/a".to_string())
            })
            .collect();
        let _ = writeln!(output, "| {} | {} |", row.label, values.join(" | "));
    }
}

pub fn render_characteristics(table: &StoreTable, features: &[String], precision: u32) -> String {
    let characteristics = metrics::cluster_characteristics(table, features, precision);
    let mut output = String::new();
    let _ = writeln!(output, "## Cluster Characteristics (Mean Values)");
    render_feature_table(&mut output, &characteristics, FeatureView::Characteristics);
    output
}

pub fn render_profiles(table: &StoreTable, features: &[String], precision: u32) -> String {
    let means = metrics::feature_means_by_cluster(table, features, precision);
    let medians = metrics::feature_medians_by_cluster(table, features, precision);
    let mut output = String::new();

    let _ = writeln!(output, "## Cluster Profiles");
    let _ = writeln!(output);
    let _ = writeln!(output, "### Mean Values");
    render_feature_table(&mut output, &means, FeatureView::Methodology);
    let _ = writeln!(output);
    let _ = writeln!(output, "### Median Values");
    render_feature_table(&mut output, &medians, FeatureView::Methodology);
    output
}

/// `total` is the size of the filtered set; `details` may be a truncated prefix.
pub fn render_store_details(details: &[StoreDetail], total: usize) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Store Details");
    let _ = writeln!(output, "Showing **{}** stores", total);
    if details.is_empty() {
        return output;
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "| Address | City | State | Cluster | Nearest (mi) | < 3mi | < 6mi | Omni | Next Gen | Flagship |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|---|");
    for detail in details {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            cell(detail.address.as_deref()),
            cell(detail.city.as_deref()),
            cell(detail.state.as_deref()),
            cell(detail.cluster_label),
            cell(detail.nearest_neighbor_miles.map(|miles| format!("{:.2}", miles))),
            cell(detail.stores_within_3_miles),
            cell(detail.stores_within_6_miles),
            cell(detail.num_omni_features),
            flag(detail.has_next_gen),
            flag(detail.is_flagship),
        );
    }
    if total > details.len() {
        let _ = writeln!(output, "({} more not listed)", total - details.len());
    }
    output
}

pub fn render_map(view: &MapView) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "## Store Geographic Distribution");
    match view {
        MapView::Unavailable => {
            let _ = writeln!(output, "Geographic data not available.");
        }
        MapView::Available { center, points } => {
            let _ = writeln!(
                output,
                "{} stores, centered at ({:.4}, {:.4})",
                points.len(),
                center.0,
                center.1
            );
            for point in points {
                let _ = writeln!(
                    output,
                    "- [{}] {} ({:.4}, {:.4}) {}, {}, {} nearest store {} mi",
                    point.color,
                    point.label,
                    point.latitude,
                    point.longitude,
                    cell(point.address.as_deref()),
                    cell(point.city.as_deref()),
                    cell(point.state.as_deref()),
                    cell(point.nearest_neighbor_miles.map(|miles| format!("{:.2}", miles))),
                );
            }
        }
    }
    output
}

pub fn render_forecast(report: &ForecastReport) -> String {
    let calibration = &report.calibration;
    let mut output = String::new();

    let _ = writeln!(output, "## {} Forecast", report.label);
    let _ = writeln!(output, "- Sample-only estimate: {}", pct(report.sample_only));
    let _ = writeln!(
        output,
        "- Regression-based forecast: {}",
        pct(report.regression_based)
    );
    let _ = writeln!(output, "- Bias-adjusted forecast: {}", pct(report.bias_adjusted));
    let _ = writeln!(
        output,
        "- 95% confidence interval: [{}, {}]",
        pct(report.ci_lower),
        pct(report.ci_upper)
    );
    let _ = writeln!(
        output,
        "- Model: reported_yoy = {} + {} x sample_yoy (R-squared {}), fit in {} as of {}",
        report.model.intercept, report.model.slope, report.r_squared, report.source, report.as_of
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "### Model Calibration Metrics");
    let _ = writeln!(output, "- Correlation: {:.3}", calibration.correlation);
    let _ = writeln!(output, "- Bias (reported - sample): {}", pct(calibration.bias));
    let _ = writeln!(output, "- RMSE (raw): {:.4}", calibration.rmse_raw);
    let _ = writeln!(output, "- RMSE (regression): {:.4}", calibration.rmse_regression);

    let _ = writeln!(output);
    let _ = writeln!(output, "### Calibration Data by Quarter");
    let _ = writeln!(
        output,
        "| Quarter End | Sample YoY (%) | Reported YoY (%) | Regression-based YoY (%) | Residual (%) |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|");
    for row in &calibration.rows {
        let _ = writeln!(
            output,
            "| {} | {:.2} | {:.2} | {:.2} | {:.2} |",
            row.quarter_end,
            row.sample_yoy * 100.0,
            row.reported_yoy * 100.0,
            row.predicted_yoy * 100.0,
            row.residual * 100.0
        );
    }

    output
}

/// Full markdown report over every view.
pub fn build_report(
    table: Result<&StoreTable, &DashboardError>,
    features: &[String],
    characteristics_precision: u32,
    profile_precision: u32,
    map: Option<&MapView>,
    details: &[StoreDetail],
    forecast: &ForecastReport,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Store Closure Analysis");
    let _ = writeln!(output);

    match table {
        Err(err) => {
            let _ = writeln!(output, "> Warning: {}", err);
        }
        Ok(table) => match render_summary(table) {
            Err(DashboardError::EmptyDataset) => {
                let _ = writeln!(output, "No store data loaded.");
            }
            Err(err) => {
                let _ = writeln!(output, "> Warning: {}", err);
            }
            Ok(summary) => {
                output.push_str(&summary);
                let _ = writeln!(output);
                output.push_str(&render_closure_reasons());
                let _ = writeln!(output);
                output.push_str(&render_characteristics(
                    table,
                    features,
                    characteristics_precision,
                ));
                let _ = writeln!(output);
                if let Some(map) = map {
                    output.push_str(&render_map(map));
                    let _ = writeln!(output);
                }
                output.push_str(&render_store_details(details, details.len()));
                let _ = writeln!(output);
                output.push_str(&render_profiles(table, features, profile_precision));
            }
        },
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "# Forecast Analysis");
    let _ = writeln!(output);
    output.push_str(&render_forecast(forecast));

    output
}
