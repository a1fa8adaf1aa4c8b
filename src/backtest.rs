use chrono::NaiveDate;
use serde::Serialize;

use crate::error::EngineError;
use crate::perf::PerformanceSummary;
use crate::series::PairSeries;
use crate::signal::{Position, SignalRecord};

/// Vectorized daily P&L over the hedged spread.
///
/// Accounting is cumulative cash P&L on a fixed starting notional: positions
/// are unit-notional, so daily P&L adds to equity rather than compounding it.
/// Sharpe and drawdown are therefore computed on the cash equity curve.
#[derive(Debug, Clone, Copy)]
pub struct BacktestParams {
    pub cost_per_trade: f64,
    pub start_notional: f64,
}

impl BacktestParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.start_notional.is_finite() || self.start_notional <= 0.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "start_notional must be positive, got {}",
                self.start_notional
            )));
        }
        if !self.cost_per_trade.is_finite() || self.cost_per_trade < 0.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "cost_per_trade must be non-negative, got {}",
                self.cost_per_trade
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestPoint {
    pub date: NaiveDate,
    pub position: Position,
    pub pnl: f64,
    pub equity: f64,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub points: Vec<BacktestPoint>,
    pub summary: PerformanceSummary,
}

impl BacktestResult {
    pub fn equity_curve(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.equity).collect()
    }
}

/// Replays the position series against realized price changes. Day t earns
/// yesterday's position times today's move in the hedged spread, so no future
/// price can leak into an earlier day's P&L. A fixed cost is charged on every
/// date where the position changes.
pub fn run(
    signals: &[SignalRecord],
    pair: &PairSeries,
    beta: f64,
    params: &BacktestParams,
) -> Result<BacktestResult, EngineError> {
    params.validate()?;
    if signals.len() != pair.len() {
        return Err(EngineError::InvalidConfiguration(format!(
            "signal series length {} does not match price series length {}",
            signals.len(),
            pair.len()
        )));
    }
    if signals.is_empty() {
        return Err(EngineError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }

    let y = pair.y();
    let x = pair.x();
    let mut points = Vec::with_capacity(signals.len());
    let mut equity = params.start_notional;
    let mut trades = 0usize;

    // day 0 has no prior position; only an immediate entry can cost anything
    let mut pnl = 0.0;
    if signals[0].position != Position::Flat {
        pnl -= params.cost_per_trade;
        trades += 1;
    }
    equity += pnl;
    points.push(BacktestPoint {
        date: signals[0].date,
        position: signals[0].position,
        pnl,
        equity,
    });

    for t in 1..signals.len() {
        let spread_change = (y[t] - y[t - 1]) - beta * (x[t] - x[t - 1]);
        let mut pnl = signals[t - 1].position.sign() * spread_change;
        if signals[t].position != signals[t - 1].position {
            pnl -= params.cost_per_trade;
            trades += 1;
        }
        equity += pnl;
        points.push(BacktestPoint {
            date: signals[t].date,
            position: signals[t].position,
            pnl,
            equity,
        });
    }

    let curve: Vec<f64> = points.iter().map(|p| p.equity).collect();
    let summary = PerformanceSummary::from_equity(&curve);
    log::info!(
        "[backtest] {} days, {} rebalances, total return {:.2}%, sharpe {:.2}, max drawdown {:.2}%",
        summary.num_days,
        trades,
        summary.total_return * 100.0,
        summary.sharpe,
        summary.max_drawdown * 100.0
    );
    Ok(BacktestResult { points, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::testutil::pair_from_values;
    use crate::signal::Position;

    fn params(cost: f64) -> BacktestParams {
        BacktestParams {
            cost_per_trade: cost,
            start_notional: 1_000.0,
        }
    }

    fn signals_for(pair: &PairSeries, positions: &[Position]) -> Vec<SignalRecord> {
        assert_eq!(pair.len(), positions.len());
        pair.dates()
            .iter()
            .zip(positions.iter())
            .map(|(date, position)| SignalRecord {
                date: *date,
                zscore: None,
                position: *position,
            })
            .collect()
    }

    #[test]
    fn pnl_uses_yesterdays_position() {
        use Position::*;
        let pair = pair_from_values(&[100.0, 102.0, 105.0, 103.0], &[50.0, 50.0, 50.0, 50.0]);
        let signals = signals_for(&pair, &[Flat, LongSpread, LongSpread, Flat]);
        let result = run(&signals, &pair, 1.0, &params(0.0)).unwrap();

        // entered at the close of day 1: day 1 move earns nothing
        assert_eq!(result.points[1].pnl, 0.0);
        // day 2 move (+3) accrues to the long entered the day before
        assert_eq!(result.points[2].pnl, 3.0);
        // exited at the close of day 3: that day's move (-2) still hits
        assert_eq!(result.points[3].pnl, -2.0);
        assert_eq!(result.points[3].equity, 1_001.0);
    }

    #[test]
    fn future_prices_cannot_change_past_pnl() {
        use Position::*;
        let base = [100.0, 102.0, 105.0, 103.0, 104.0];
        let x = [50.0; 5];
        let positions = [Flat, LongSpread, LongSpread, LongSpread, Flat];

        let pair_a = pair_from_values(&base, &x);
        let mut mutated = base;
        mutated[4] = 900.0; // shock the last day only
        let pair_b = pair_from_values(&mutated, &x);

        let result_a = run(&signals_for(&pair_a, &positions), &pair_a, 1.0, &params(0.0)).unwrap();
        let result_b = run(&signals_for(&pair_b, &positions), &pair_b, 1.0, &params(0.0)).unwrap();

        for t in 0..4 {
            assert_eq!(result_a.points[t].pnl, result_b.points[t].pnl, "day {}", t);
        }
        assert_ne!(result_a.points[4].pnl, result_b.points[4].pnl);
    }

    #[test]
    fn hedged_leg_offsets_the_common_move() {
        use Position::*;
        // Y and 2*X move in lockstep, the hedged spread never moves
        let x = [50.0, 51.0, 53.0, 52.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let pair = pair_from_values(&y, &x);
        let signals = signals_for(&pair, &[LongSpread; 4]);
        let result = run(&signals, &pair, 2.0, &params(0.0)).unwrap();
        for point in &result.points {
            assert_eq!(point.pnl, 0.0);
        }
    }

    #[test]
    fn fixed_cost_charged_on_every_position_change() {
        use Position::*;
        let pair = pair_from_values(&[10.0; 6], &[5.0; 6]);
        let signals = signals_for(
            &pair,
            &[Flat, ShortSpread, ShortSpread, Flat, LongSpread, Flat],
        );
        let result = run(&signals, &pair, 1.0, &params(2.5)).unwrap();
        // four changes: enter, exit, enter, exit
        let total_cost: f64 = result.points.iter().map(|p| p.pnl).sum();
        assert_eq!(total_cost, -10.0);
        assert_eq!(result.points.last().unwrap().equity, 990.0);
    }

    #[test]
    fn rejects_mismatched_series() {
        let pair = pair_from_values(&[10.0, 11.0], &[5.0, 6.0]);
        let signals = signals_for(&pair, &[Position::Flat, Position::Flat]);
        assert!(run(&signals[..1], &pair, 1.0, &params(0.0)).is_err());
    }

    #[test]
    fn rejects_bad_params() {
        let pair = pair_from_values(&[10.0, 11.0], &[5.0, 6.0]);
        let signals = signals_for(&pair, &[Position::Flat, Position::Flat]);
        let bad = BacktestParams {
            cost_per_trade: -1.0,
            start_notional: 1_000.0,
        };
        assert!(matches!(
            run(&signals, &pair, 1.0, &bad),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }
}
