use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ForecastConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::models::CalibrationRow;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub slope: f64,
}

impl LinearModel {
    pub fn predict(&self, sample_yoy: f64) -> f64 {
        self.intercept + self.slope * sample_yoy
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CalibrationPoint {
    pub quarter_end: NaiveDate,
    pub sample_yoy: f64,
    pub reported_yoy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationSummary {
    pub rows: Vec<CalibrationRow>,
    pub correlation: f64,
    pub bias: f64,
    pub rmse_raw: f64,
    pub rmse_regression: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub label: String,
    pub target_quarter_end: NaiveDate,
    pub sample_only: f64,
    pub regression_based: f64,
    pub bias_adjusted: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub r_squared: f64,
    pub model: LinearModel,
    pub source: String,
    pub as_of: NaiveDate,
    pub calibration: CalibrationSummary,
}

fn check_lengths(left: &[f64], right: &[f64]) -> DashboardResult<()> {
    if left.len() != right.len() {
        return Err(DashboardError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    if left.is_empty() {
        return Err(DashboardError::InsufficientData(
            "series is empty".to_string(),
        ));
    }
    Ok(())
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Pearson correlation coefficient.
pub fn correlation(a: &[f64], b: &[f64]) -> DashboardResult<f64> {
    check_lengths(a, b)?;
    if a.len() < 2 {
        return Err(DashboardError::InsufficientData(format!(
            "correlation needs at least 2 points, got {}",
            a.len()
        )));
    }

    let mean_a = mean(a);
    let mean_b = mean(b);
    let mut covariance = 0.0;
    let mut variance_a = 0.0;
    let mut variance_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        covariance += dx * dy;
        variance_a += dx * dx;
        variance_b += dy * dy;
    }

    let constant = |series: &[f64]| series.iter().all(|x| *x == series[0]);
    if constant(a) || constant(b) {
        return Err(DashboardError::InsufficientData(
            "correlation is undefined for a constant series".to_string(),
        ));
    }
    Ok(covariance / (variance_a.sqrt() * variance_b.sqrt()))
}

/// Mean of `reported - sample`.
pub fn bias(sample: &[f64], reported: &[f64]) -> DashboardResult<f64> {
    check_lengths(sample, reported)?;
    let diffs: Vec<f64> = reported.iter().zip(sample).map(|(r, s)| r - s).collect();
    Ok(mean(&diffs))
}

pub fn rmse(predicted: &[f64], actual: &[f64]) -> DashboardResult<f64> {
    check_lengths(predicted, actual)?;
    let squared: Vec<f64> = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).powi(2))
        .collect();
    Ok(mean(&squared).sqrt())
}

pub fn residual(reported: f64, predicted: f64) -> f64 {
    reported - predicted
}

pub fn calibrate(
    series: &[CalibrationPoint],
    model: &LinearModel,
) -> DashboardResult<CalibrationSummary> {
    if series
        .windows(2)
        .any(|pair| pair[0].quarter_end >= pair[1].quarter_end)
    {
        warn!("calibration series is not in chronological order");
    }

    let sample: Vec<f64> = series.iter().map(|point| point.sample_yoy).collect();
    let reported: Vec<f64> = series.iter().map(|point| point.reported_yoy).collect();
    let predicted: Vec<f64> = sample.iter().map(|x| model.predict(*x)).collect();

    let rows = series
        .iter()
        .zip(&predicted)
        .map(|(point, predicted_yoy)| CalibrationRow {
            quarter_end: point.quarter_end,
            sample_yoy: point.sample_yoy,
            reported_yoy: point.reported_yoy,
            predicted_yoy: *predicted_yoy,
            residual: residual(point.reported_yoy, *predicted_yoy),
        })
        .collect();

    Ok(CalibrationSummary {
        rows,
        correlation: correlation(&sample, &reported)?,
        bias: bias(&sample, &reported)?,
        rmse_raw: rmse(&sample, &reported)?,
        rmse_regression: rmse(&predicted, &reported)?,
    })
}

pub fn forecast(config: &ForecastConfig) -> DashboardResult<ForecastReport> {
    let calibration = calibrate(&config.calibration, &config.model)?;

    Ok(ForecastReport {
        label: config.label.clone(),
        target_quarter_end: config.target_quarter_end,
        sample_only: config.sample_yoy,
        regression_based: config.model.predict(config.sample_yoy),
        bias_adjusted: config.sample_yoy + calibration.bias,
        ci_lower: config.ci_lower,
        ci_upper: config.ci_upper,
        r_squared: config.r_squared,
        model: config.model,
        source: config.provenance.source.clone(),
        as_of: config.provenance.as_of,
        calibration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const MODEL: LinearModel = LinearModel {
        intercept: 0.0234,
        slope: 0.9533,
    };

    #[test]
    fn bias_matches_two_point_example() {
        let sample = [-0.052056, 0.348227];
        let reported = [-0.059, 0.359];
        let value = bias(&sample, &reported).unwrap();
        let expected = ((-0.059 - -0.052056) + (0.359 - 0.348227)) / 2.0;
        assert!((value - expected).abs() < 1e-12);
        assert!((value - 0.0019145).abs() < 1e-7);
    }

    #[test]
    fn model_prediction_matches_regression_forecast() {
        let predicted = MODEL.predict(-0.1268);
        assert!((predicted + 0.0975).abs() < 1e-4);
    }

    #[test]
    fn rmse_of_identical_series_is_zero() {
        let series = [0.1, -0.2, 0.35, 1.2];
        assert_eq!(rmse(&series, &series).unwrap(), 0.0);
    }

    #[test]
    fn rmse_rejects_bad_input() {
        assert!(matches!(
            rmse(&[0.1, 0.2], &[0.1]),
            Err(DashboardError::LengthMismatch { left: 2, right: 1 })
        ));
        assert!(matches!(
            rmse(&[], &[]),
            Err(DashboardError::InsufficientData(_))
        ));
    }

    #[test]
    fn rmse_known_value() {
        let value = rmse(&[1.0, 2.0], &[2.0, 4.0]).unwrap();
        assert!((value - 2.5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn correlation_is_symmetric() {
        let a = [1.0, 2.0, 3.5, 4.0];
        let b = [2.1, 3.9, 6.0, 8.2];
        let ab = correlation(&a, &b).unwrap();
        let ba = correlation(&b, &a).unwrap();
        assert!((ab - ba).abs() < 1e-12);
        assert!(ab > 0.9 && ab <= 1.0);
    }

    #[test]
    fn correlation_of_linear_series_is_one() {
        let a = [1.0, 2.0, 3.0];
        let b = [-2.0, -4.0, -6.0];
        assert!((correlation(&a, &b).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_needs_variance_and_points() {
        assert!(matches!(
            correlation(&[1.0], &[2.0]),
            Err(DashboardError::InsufficientData(_))
        ));
        assert!(matches!(
            correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(DashboardError::InsufficientData(_))
        ));
    }

    #[test]
    fn correlation_rejects_constant_fractional_series() {
        assert!(matches!(
            correlation(&[0.1, 0.1, 0.1], &[1.0, 2.0, 3.0]),
            Err(DashboardError::InsufficientData(_))
        ));
        assert!(matches!(
            correlation(&[1.0, 2.0, 3.0], &[0.3, 0.3, 0.3]),
            Err(DashboardError::InsufficientData(_))
        ));
    }

    #[test]
    fn residuals_are_reported_minus_predicted() {
        let series = vec![
            CalibrationPoint {
                quarter_end: NaiveDate::from_ymd_opt(2022, 6, 30).unwrap(),
                sample_yoy: -0.106425,
                reported_yoy: -0.056,
            },
            CalibrationPoint {
                quarter_end: NaiveDate::from_ymd_opt(2022, 9, 30).unwrap(),
                sample_yoy: -0.1276,
                reported_yoy: -0.032,
            },
        ];
        let summary = calibrate(&series, &MODEL).unwrap();
        for row in &summary.rows {
            assert!((row.residual - (row.reported_yoy - row.predicted_yoy)).abs() < 1e-12);
            assert!((row.predicted_yoy - MODEL.predict(row.sample_yoy)).abs() < 1e-12);
        }
    }

    #[test]
    fn default_configuration_reproduces_published_figures() {
        let config = Config::default_embedded().unwrap();
        let report = forecast(&config.forecast).unwrap();

        assert_eq!(report.calibration.rows.len(), 8);
        assert!((report.calibration.correlation - 0.996).abs() < 1e-3);
        assert!((report.calibration.bias - 0.014_345).abs() < 1e-5);
        assert!((report.calibration.rmse_raw - 0.0422).abs() < 1e-4);
        assert!((report.calibration.rmse_regression - 0.0348).abs() < 1e-4);
        assert!((report.regression_based + 0.0975).abs() < 1e-4);
        assert!((report.bias_adjusted + 0.1125).abs() < 1e-3);
        assert!(report.calibration.rmse_regression < report.calibration.rmse_raw);
        assert_eq!(report.sample_only, -0.1268);
    }
}
