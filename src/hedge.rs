use chrono::NaiveDate;
use serde::Serialize;

use crate::error::EngineError;
use crate::series::PairSeries;

const MIN_OBSERVATIONS: usize = 2;
const VARIANCE_EPS: f64 = 1e-12;

/// Fitted hedge relationship for a pair. The hedge ratio is estimated once
/// over the full sample and held static for the whole test window; rolling
/// re-estimation would be a behavior change, not a fix.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HedgeFit {
    pub beta: f64,
    pub alpha: f64,
    pub r_squared: f64,
    pub spread_mean: f64,
    pub spread_std: f64,
}

/// Per-date hedge output consumed by the signal generator and the reporters.
#[derive(Debug, Clone, Serialize)]
pub struct HedgeRecord {
    pub date: NaiveDate,
    pub y: f64,
    pub x: f64,
    pub beta: f64,
    pub spread: f64,
    pub zscore_full: f64,
}

/// OLS of Y on X with intercept over the aligned history, then
/// `spread[t] = y[t] - beta * x[t]`. The intercept only detrends the fit and
/// is not carried downstream.
pub fn estimate(pair: &PairSeries) -> Result<(HedgeFit, Vec<HedgeRecord>), EngineError> {
    let n = pair.len();
    if n < MIN_OBSERVATIONS {
        return Err(EngineError::InsufficientData {
            required: MIN_OBSERVATIONS,
            actual: n,
        });
    }

    let y = pair.y();
    let x = pair.x();
    let mean_y = y.iter().sum::<f64>() / n as f64;
    let mean_x = x.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        cov += dx * (y[i] - mean_y);
        var_x += dx * dx;
    }
    if var_x.abs() < VARIANCE_EPS {
        return Err(EngineError::SingularRegression);
    }

    let beta = cov / var_x;
    let alpha = mean_y - beta * mean_x;

    // R^2 from residuals of the full fit (alpha + beta * x).
    let mut rss = 0.0;
    let mut tss = 0.0;
    for i in 0..n {
        let resid = y[i] - (alpha + beta * x[i]);
        rss += resid * resid;
        let dy = y[i] - mean_y;
        tss += dy * dy;
    }
    let r_squared = if tss < VARIANCE_EPS { 0.0 } else { 1.0 - rss / tss };

    let spreads: Vec<f64> = (0..n).map(|i| y[i] - beta * x[i]).collect();
    let spread_mean = spreads.iter().sum::<f64>() / n as f64;
    let spread_var = spreads
        .iter()
        .map(|s| {
            let d = s - spread_mean;
            d * d
        })
        .sum::<f64>()
        / (n - 1) as f64;
    let spread_std = spread_var.sqrt();

    let records = pair
        .dates()
        .iter()
        .enumerate()
        .map(|(i, date)| {
            let zscore_full = if spread_std < VARIANCE_EPS {
                0.0
            } else {
                (spreads[i] - spread_mean) / spread_std
            };
            HedgeRecord {
                date: *date,
                y: y[i],
                x: x[i],
                beta,
                spread: spreads[i],
                zscore_full,
            }
        })
        .collect();

    let fit = HedgeFit {
        beta,
        alpha,
        r_squared,
        spread_mean,
        spread_std,
    };
    log::info!(
        "[hedge] {}-{}: beta={:.4}, alpha={:.4}, R2={:.3}, spread mean={:.4} std={:.4}",
        pair.y_ticker,
        pair.x_ticker,
        fit.beta,
        fit.alpha,
        fit.r_squared,
        fit.spread_mean,
        fit.spread_std
    );
    Ok((fit, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::testutil::pair_from_values;

    #[test]
    fn recovers_beta_on_noiseless_pair() {
        // Y = 2 * X exactly: beta must come back ~2 and the spread ~0.
        let x = [10.0, 11.0, 12.5, 13.0, 14.2, 15.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let pair = pair_from_values(&y, &x);

        let (fit, records) = estimate(&pair).unwrap();
        assert!((fit.beta - 2.0).abs() < 1e-9);
        assert!(fit.alpha.abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        for record in &records {
            assert!(record.spread.abs() < 1e-9);
            assert_eq!(record.zscore_full, 0.0);
        }
    }

    #[test]
    fn recovers_intercept() {
        let x = [10.0, 11.0, 12.0, 13.0];
        let y: Vec<f64> = x.iter().map(|v| 1.5 * v + 4.0).collect();
        let pair = pair_from_values(&y, &x);

        let (fit, _) = estimate(&pair).unwrap();
        assert!((fit.beta - 1.5).abs() < 1e-9);
        assert!((fit.alpha - 4.0).abs() < 1e-9);
    }

    #[test]
    fn one_observation_is_insufficient() {
        let pair = pair_from_values(&[10.0], &[5.0]);
        assert!(matches!(
            estimate(&pair),
            Err(EngineError::InsufficientData { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn constant_regressor_is_singular() {
        let pair = pair_from_values(&[10.0, 11.0, 12.0], &[5.0, 5.0, 5.0]);
        assert!(matches!(estimate(&pair), Err(EngineError::SingularRegression)));
    }
}
