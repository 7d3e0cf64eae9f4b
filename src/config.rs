use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;

use crate::forecast::{CalibrationPoint, LinearModel};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    pub aggregation: AggregationConfig,
    pub forecast: ForecastConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub cache_ttl_secs: Option<i64>,
}

impl DataConfig {
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.and_then(Duration::try_seconds)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(secs) = self.cache_ttl_secs {
            if secs < 0 {
                bail!("cache_ttl_secs must not be negative, got {secs}");
            }
            if Duration::try_seconds(secs).is_none() {
                bail!("cache_ttl_secs is out of range: {secs}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregationConfig {
    pub features: Vec<String>,
    #[serde(default = "default_characteristics_precision")]
    pub characteristics_precision: u32,
    #[serde(default = "default_profile_precision")]
    pub profile_precision: u32,
}

fn default_characteristics_precision() -> u32 {
    2
}

fn default_profile_precision() -> u32 {
    3
}

/// Output of the offline regression fit, versioned by its provenance.
#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    pub label: String,
    pub target_quarter_end: NaiveDate,
    pub sample_yoy: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub r_squared: f64,
    pub model: LinearModel,
    pub provenance: Provenance,
    pub calibration: Vec<CalibrationPoint>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Provenance {
    pub source: String,
    pub as_of: NaiveDate,
}

const DEFAULT_CONFIG: &str = r#"
[data]
path = "closure_strategy.csv"

[aggregation]
features = [
    "has_next_gen",
    "is_flagship",
    "num_omni_features",
    "nearest_neighbor_miles",
    "stores_within_3_miles",
    "stores_within_6_miles",
]
characteristics_precision = 2
profile_precision = 3

[forecast]
label = "Q4 2022 Brand Comparable Sales Growth"
target_quarter_end = "2022-12-31"
sample_yoy = -0.1268
ci_lower = -0.141
ci_upper = -0.053
r_squared = 0.992

[forecast.model]
intercept = 0.0234
slope = 0.9533

[forecast.provenance]
source = "forecast_case.ipynb"
as_of = "2022-09-30"

[[forecast.calibration]]
quarter_end = "2020-12-31"
sample_yoy = -0.052056
reported_yoy = -0.059

[[forecast.calibration]]
quarter_end = "2021-03-31"
sample_yoy = 0.348227
reported_yoy = 0.359

[[forecast.calibration]]
quarter_end = "2021-06-30"
sample_yoy = 1.206119
reported_yoy = 1.183

[[forecast.calibration]]
quarter_end = "2021-09-30"
sample_yoy = 0.101995
reported_yoy = 0.075

[[forecast.calibration]]
quarter_end = "2021-12-31"
sample_yoy = 0.147930
reported_yoy = 0.178

[[forecast.calibration]]
quarter_end = "2022-03-31"
sample_yoy = 0.036052
reported_yoy = 0.021

[[forecast.calibration]]
quarter_end = "2022-06-30"
sample_yoy = -0.106425
reported_yoy = -0.056

[[forecast.calibration]]
quarter_end = "2022-09-30"
sample_yoy = -0.127600
reported_yoy = -0.032
"#;

impl Config {
    pub fn default_embedded() -> anyhow::Result<Config> {
        let config: Config =
            toml::from_str(DEFAULT_CONFIG).context("embedded default configuration is invalid")?;
        config.data.validate()?;
        Ok(config)
    }
}

/// Reads the TOML file at `path`, or the embedded defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::debug!("using embedded default configuration");
        return Config::default_embedded();
    };

    tracing::info!("loading config from {}", path.display());
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config
        .data
        .validate()
        .with_context(|| format!("invalid [data] section in {}", path.display()))?;
    Ok(config)
}
