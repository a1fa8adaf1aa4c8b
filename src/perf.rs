use serde::Serialize;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Risk/return statistics derived from a daily equity curve. Stateless and
/// recomputable from any curve; both engines report through this one path so
/// their numbers stay comparable.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_vol: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub num_days: usize,
}

impl PerformanceSummary {
    fn empty() -> Self {
        Self {
            total_return: 0.0,
            annualized_return: 0.0,
            annualized_vol: 0.0,
            sharpe: 0.0,
            max_drawdown: 0.0,
            num_days: 0,
        }
    }

    pub fn from_equity(equity: &[f64]) -> Self {
        if equity.len() < 2 || equity[0] == 0.0 {
            return Self::empty();
        }
        let num_days = equity.len() - 1;

        let returns: Vec<f64> = equity
            .windows(2)
            .map(|w| if w[0] == 0.0 { 0.0 } else { w[1] / w[0] - 1.0 })
            .collect();

        let total_return = equity[equity.len() - 1] / equity[0] - 1.0;
        let annualized_return = if total_return <= -1.0 {
            -1.0
        } else {
            (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / num_days as f64) - 1.0
        };

        let mean_ret = returns.iter().sum::<f64>() / returns.len() as f64;
        let daily_vol = if returns.len() < 2 {
            0.0
        } else {
            let var = returns
                .iter()
                .map(|r| {
                    let d = r - mean_ret;
                    d * d
                })
                .sum::<f64>()
                / (returns.len() - 1) as f64;
            var.sqrt()
        };
        let annualized_vol = if daily_vol > 0.0 {
            daily_vol * TRADING_DAYS_PER_YEAR.sqrt()
        } else {
            0.0
        };
        // zero volatility reports a zero Sharpe instead of dividing by it
        let sharpe = if annualized_vol > 0.0 {
            annualized_return / annualized_vol
        } else {
            0.0
        };

        let mut running_max = equity[0];
        let mut max_drawdown = 0.0f64;
        for value in equity {
            if *value > running_max {
                running_max = *value;
            }
            if running_max > 0.0 {
                let drawdown = value / running_max - 1.0;
                if drawdown < max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }

        Self {
            total_return,
            annualized_return,
            annualized_vol,
            sharpe,
            max_drawdown,
            num_days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonically_increasing_curve_has_zero_drawdown() {
        let equity = [100.0, 101.0, 103.0, 107.0, 110.0];
        let summary = PerformanceSummary::from_equity(&equity);
        assert_eq!(summary.max_drawdown, 0.0);
        assert!((summary.total_return - 0.10).abs() < 1e-12);
        assert_eq!(summary.num_days, 4);
    }

    #[test]
    fn half_loss_then_full_recovery_marks_the_trough() {
        let equity = [100.0, 80.0, 50.0, 75.0, 100.0];
        let summary = PerformanceSummary::from_equity(&equity);
        assert!((summary.max_drawdown - (-0.5)).abs() < 1e-12);
        assert_eq!(summary.total_return, 0.0);
    }

    #[test]
    fn flat_curve_reports_zero_vol_and_zero_sharpe() {
        let equity = [100.0; 10];
        let summary = PerformanceSummary::from_equity(&equity);
        assert_eq!(summary.annualized_vol, 0.0);
        assert_eq!(summary.sharpe, 0.0);
        assert_eq!(summary.total_return, 0.0);
    }

    #[test]
    fn annualizes_with_the_stated_formula() {
        // one year of daily bars doubling in total
        let mut equity = vec![100.0];
        let n = 252;
        let per_day = 2.0f64.powf(1.0 / n as f64);
        for i in 0..n {
            equity.push(equity[i] * per_day);
        }
        let summary = PerformanceSummary::from_equity(&equity);
        assert!((summary.total_return - 1.0).abs() < 1e-9);
        assert!((summary.annualized_return - 1.0).abs() < 1e-9);
        assert!(summary.annualized_vol < 1e-9 || summary.sharpe > 0.0);
    }

    #[test]
    fn short_or_degenerate_curves_are_all_zero() {
        assert_eq!(PerformanceSummary::from_equity(&[]).num_days, 0);
        assert_eq!(PerformanceSummary::from_equity(&[100.0]).num_days, 0);
        assert_eq!(PerformanceSummary::from_equity(&[0.0, 1.0]).total_return, 0.0);
    }
}
