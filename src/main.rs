use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use store_closure_insights::error::DashboardError;
use store_closure_insights::loader::StoreCache;
use store_closure_insights::models::{AtRiskSummary, ClusterSummary, FeatureTable, StoreTable};
use store_closure_insights::taxonomy::{ClusterFilter, ClusterLabel};
use store_closure_insights::{config, filter, forecast, logging, metrics, report};

#[derive(Parser)]
#[command(name = "store-closure-insights")]
#[command(about = "Store clustering and sales forecast insights for closure planning", long_about = None)]
struct Cli {
    /// TOML configuration file; embedded defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Store CSV, overriding the configured path
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Store totals, at-risk headline and cluster cards
    Summary,
    /// Per-cluster feature means with flags shown as percentages
    Characteristics,
    /// Per-cluster feature means and medians
    Profiles,
    /// List stores filtered by cluster and search text
    Stores {
        #[arg(long, default_value = "All")]
        cluster: ClusterFilter,
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Store locations for the selected clusters
    Map {
        /// Repeat to select several clusters; defaults to the at-risk clusters
        #[arg(long = "cluster")]
        clusters: Vec<ClusterLabel>,
    },
    /// Forecast results and calibration metrics
    Forecast,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct SummaryJson {
    at_risk: AtRiskSummary,
    clusters: Vec<ClusterSummary>,
    unmapped_labels: usize,
}

#[derive(Serialize)]
struct ProfilesJson {
    means: FeatureTable,
    medians: FeatureTable,
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Loads through the cache, turning an unavailable file into a printed
/// warning instead of a failure.
fn load_or_warn(cache: &mut StoreCache, path: &Path) -> Option<Arc<StoreTable>> {
    match cache.get(path) {
        Ok(table) => Some(table),
        Err(err) => {
            tracing::warn!("{err}");
            println!("Warning: {err}");
            None
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.verbose)?;

    let config = config::load_config(cli.config.as_deref())?;
    let data_path = cli.data.clone().unwrap_or_else(|| config.data.path.clone());
    let features = &config.aggregation.features;
    let mut cache = StoreCache::new(config.data.cache_ttl());

    match cli.command {
        Commands::Summary => {
            let Some(table) = load_or_warn(&mut cache, &data_path) else {
                return Ok(());
            };
            let counts = match metrics::counts_by_cluster(&table) {
                Ok(counts) => counts,
                Err(DashboardError::EmptyDataset) => {
                    println!("No store data found in {}.", data_path.display());
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };
            match cli.format {
                Format::Json => print_json(&SummaryJson {
                    at_risk: metrics::at_risk(&table)?,
                    clusters: counts,
                    unmapped_labels: table.unmapped_labels,
                })?,
                Format::Text => print!("{}", report::render_summary(&table)?),
            }
        }
        Commands::Characteristics => {
            let Some(table) = load_or_warn(&mut cache, &data_path) else {
                return Ok(());
            };
            let precision = config.aggregation.characteristics_precision;
            match cli.format {
                Format::Json => print_json(&metrics::cluster_characteristics(
                    &table, features, precision,
                ))?,
                Format::Text => {
                    print!("{}", report::render_closure_reasons());
                    println!();
                    print!(
                        "{}",
                        report::render_characteristics(&table, features, precision)
                    );
                }
            }
        }
        Commands::Profiles => {
            let Some(table) = load_or_warn(&mut cache, &data_path) else {
                return Ok(());
            };
            let precision = config.aggregation.profile_precision;
            match cli.format {
                Format::Json => print_json(&ProfilesJson {
                    means: metrics::feature_means_by_cluster(&table, features, precision),
                    medians: metrics::feature_medians_by_cluster(&table, features, precision),
                })?,
                Format::Text => print!("{}", report::render_profiles(&table, features, precision)),
            }
        }
        Commands::Stores {
            cluster,
            search,
            limit,
        } => {
            let Some(table) = load_or_warn(&mut cache, &data_path) else {
                return Ok(());
            };
            let rows = filter::filter_stores(&table, cluster, &search);
            let details = filter::store_details(&table, &rows);
            let shown = limit.unwrap_or(details.len()).min(details.len());
            match cli.format {
                Format::Json => print_json(&details[..shown])?,
                Format::Text => print!(
                    "{}",
                    report::render_store_details(&details[..shown], details.len())
                ),
            }
        }
        Commands::Map { clusters } => {
            let Some(table) = load_or_warn(&mut cache, &data_path) else {
                return Ok(());
            };
            let selected = if clusters.is_empty() {
                ClusterLabel::AT_RISK.to_vec()
            } else {
                clusters
            };
            let view = filter::map_view(&table, &selected);
            match cli.format {
                Format::Json => print_json(&view)?,
                Format::Text => print!("{}", report::render_map(&view)),
            }
        }
        Commands::Forecast => {
            let forecast = forecast::forecast(&config.forecast)
                .context("forecast configuration is inconsistent")?;
            match cli.format {
                Format::Json => print_json(&forecast)?,
                Format::Text => print!("{}", report::render_forecast(&forecast)),
            }
        }
        Commands::Report { out } => {
            let forecast = forecast::forecast(&config.forecast)
                .context("forecast configuration is inconsistent")?;
            let loaded = cache.get(&data_path);
            let (map, details) = match &loaded {
                Ok(table) => {
                    let rows = filter::filter_stores(table, ClusterFilter::All, "");
                    (
                        Some(filter::map_view(table, &ClusterLabel::AT_RISK)),
                        filter::store_details(table, &rows),
                    )
                }
                Err(err) => {
                    tracing::warn!("{err}");
                    (None, Vec::new())
                }
            };
            let report = report::build_report(
                loaded.as_deref(),
                features,
                config.aggregation.characteristics_precision,
                config.aggregation.profile_precision,
                map.as_ref(),
                &details,
                &forecast,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
