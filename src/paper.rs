use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::EngineError;
use crate::perf::PerformanceSummary;
use crate::series::PairSeries;
use crate::signal::{Position, SignalRecord};

/// Day-by-day replay of the signal series through a simulated account. Unlike
/// the vectorized backtest this keeps an explicit cash/inventory ledger, so
/// fees, sizing and mark-to-market come out of realized account state.
#[derive(Debug, Clone, Copy)]
pub struct PaperParams {
    pub start_cash: f64,
    pub risk_frac: f64,
    pub fee_per_trade: f64,
    pub force_close_at_end: bool,
}

impl PaperParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.start_cash.is_finite() || self.start_cash <= 0.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "start_cash must be positive, got {}",
                self.start_cash
            )));
        }
        if !self.risk_frac.is_finite() || self.risk_frac <= 0.0 || self.risk_frac > 1.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "risk_frac must be in (0, 1], got {}",
                self.risk_frac
            )));
        }
        if !self.fee_per_trade.is_finite() || self.fee_per_trade < 0.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "fee_per_trade must be non-negative, got {}",
                self.fee_per_trade
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TradeSide {
    OpenLong,
    OpenShort,
    Close,
}

/// One rebalance fill covering both legs. Quantities are signed from the
/// account's perspective (negative shares were sold/shorted).
#[derive(Debug, Clone, Serialize)]
pub struct Trade {
    pub id: String,
    pub date: NaiveDate,
    pub side: TradeSide,
    pub shares_y: Decimal,
    pub shares_x: Decimal,
    pub price_y: Decimal,
    pub price_x: Decimal,
    pub fee: Decimal,
}

/// End-of-day account snapshot. Short inventory is carried as negative shares
/// and marks as a liability.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerState {
    pub date: NaiveDate,
    pub cash: Decimal,
    pub shares_y: Decimal,
    pub shares_x: Decimal,
    pub equity: Decimal,
    pub cumulative_fees: Decimal,
}

/// Residual inventory left open when the replay ends without a forced close.
#[derive(Debug, Clone, Serialize)]
pub struct OpenExposure {
    pub shares_y: Decimal,
    pub shares_x: Decimal,
    pub market_value: Decimal,
}

#[derive(Debug, Clone)]
pub struct PaperResult {
    pub states: Vec<BrokerState>,
    pub trades: Vec<Trade>,
    pub summary: PerformanceSummary,
    pub open_exposure: Option<OpenExposure>,
}

impl PaperResult {
    pub fn equity_curve(&self) -> Vec<f64> {
        use rust_decimal::prelude::ToPrimitive;
        self.states
            .iter()
            .map(|s| s.equity.to_f64().unwrap_or(0.0))
            .collect()
    }
}

/// The one place true sequential state lives. Owned by a single replay run
/// and threaded through it by exclusive mutable reference.
#[derive(Debug)]
struct PaperBroker {
    cash: Decimal,
    shares_y: Decimal,
    shares_x: Decimal,
    fees_paid: Decimal,
    trades: Vec<Trade>,
}

impl PaperBroker {
    fn new(start_cash: Decimal) -> Self {
        Self {
            cash: start_cash,
            shares_y: Decimal::ZERO,
            shares_x: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
            trades: Vec::new(),
        }
    }

    fn holds_inventory(&self) -> bool {
        !self.shares_y.is_zero() || !self.shares_x.is_zero()
    }

    fn equity(&self, price_y: Decimal, price_x: Decimal) -> Decimal {
        self.cash + self.shares_y * price_y + self.shares_x * price_x
    }

    fn fill(
        &mut self,
        date: NaiveDate,
        side: TradeSide,
        shares_y: Decimal,
        shares_x: Decimal,
        price_y: Decimal,
        price_x: Decimal,
        fee: Decimal,
    ) {
        self.shares_y += shares_y;
        self.shares_x += shares_x;
        // buys debit cash, sells/shorts credit it
        self.cash -= shares_y * price_y + shares_x * price_x;
        self.cash -= fee;
        self.fees_paid += fee;
        let trade = Trade {
            id: rand::random::<u64>().to_string(),
            date,
            side,
            shares_y,
            shares_x,
            price_y,
            price_x,
            fee,
        };
        log::debug!(
            "[paper] fill {:?} on {}: y {} @ {}, x {} @ {}, fee {}",
            trade.side,
            trade.date,
            trade.shares_y,
            trade.price_y,
            trade.shares_x,
            trade.price_x,
            trade.fee
        );
        self.trades.push(trade);
    }

    /// Closes out whatever inventory is held at the given prices.
    fn liquidate(&mut self, date: NaiveDate, price_y: Decimal, price_x: Decimal, fee: Decimal) {
        let shares_y = -self.shares_y;
        let shares_x = -self.shares_x;
        self.fill(date, TradeSide::Close, shares_y, shares_x, price_y, price_x, fee);
    }

    /// Opens a hedge-neutral position sized to `risk_frac` of current equity:
    /// shares_y = exposure / price_y, shares_x = beta * shares_y, signs by
    /// direction.
    fn open(
        &mut self,
        date: NaiveDate,
        target: Position,
        price_y: Decimal,
        price_x: Decimal,
        beta: Decimal,
        risk_frac: Decimal,
        fee: Decimal,
    ) {
        let equity_now = self.equity(price_y, price_x);
        if equity_now <= Decimal::ZERO {
            log::warn!(
                "[paper] {}: equity {} is non-positive, skipping entry",
                date,
                equity_now
            );
            return;
        }
        let exposure = risk_frac * equity_now;
        let unit_y = exposure / price_y;
        let unit_x = beta * unit_y;
        let (shares_y, shares_x, side) = match target {
            Position::LongSpread => (unit_y, -unit_x, TradeSide::OpenLong),
            Position::ShortSpread => (-unit_y, unit_x, TradeSide::OpenShort),
            Position::Flat => return,
        };
        self.fill(date, side, shares_y, shares_x, price_y, price_x, fee);
    }
}

fn to_decimal(value: f64, what: &str) -> Result<Decimal, EngineError> {
    Decimal::from_f64(value).ok_or_else(|| {
        EngineError::InvalidConfiguration(format!("{} is not representable: {}", what, value))
    })
}

/// Replays the signals through a fresh broker. One fee is charged per
/// rebalance event; the final open position, if any, is reported as open
/// exposure unless `force_close_at_end` liquidates it at the last price.
pub fn replay(
    signals: &[SignalRecord],
    pair: &PairSeries,
    beta: f64,
    params: &PaperParams,
) -> Result<PaperResult, EngineError> {
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

    let beta_dec = to_decimal(beta, "beta")?;
    let risk_frac = to_decimal(params.risk_frac, "risk_frac")?;
    let fee = to_decimal(params.fee_per_trade, "fee_per_trade")?;
    let start_cash = to_decimal(params.start_cash, "start_cash")?;

    let mut broker = PaperBroker::new(start_cash);
    let mut states: Vec<BrokerState> = Vec::with_capacity(signals.len());
    let mut held = Position::Flat;

    for (t, signal) in signals.iter().enumerate() {
        let price_y = to_decimal(pair.y()[t], "price_y")?;
        let price_x = to_decimal(pair.x()[t], "price_x")?;

        if signal.position != held {
            // one rebalance event, one fee: the leg that changes the book
            // carries it, the companion leg (if any) fills fee-free
            if broker.holds_inventory() {
                broker.liquidate(signal.date, price_y, price_x, fee);
                if signal.position != Position::Flat {
                    broker.open(
                        signal.date,
                        signal.position,
                        price_y,
                        price_x,
                        beta_dec,
                        risk_frac,
                        Decimal::ZERO,
                    );
                }
            } else if signal.position != Position::Flat {
                broker.open(
                    signal.date,
                    signal.position,
                    price_y,
                    price_x,
                    beta_dec,
                    risk_frac,
                    fee,
                );
            }
            held = signal.position;
        }

        states.push(BrokerState {
            date: signal.date,
            cash: broker.cash,
            shares_y: broker.shares_y,
            shares_x: broker.shares_x,
            equity: broker.equity(price_y, price_x),
            cumulative_fees: broker.fees_paid,
        });
    }

    let mut open_exposure = None;
    if broker.holds_inventory() {
        let last = signals.len() - 1;
        let price_y = to_decimal(pair.y()[last], "price_y")?;
        let price_x = to_decimal(pair.x()[last], "price_x")?;
        if params.force_close_at_end {
            broker.liquidate(signals[last].date, price_y, price_x, fee);
            // the forced close replaces the last day's snapshot
            let state = states.last_mut().expect("non-empty replay");
            state.cash = broker.cash;
            state.shares_y = broker.shares_y;
            state.shares_x = broker.shares_x;
            state.equity = broker.equity(price_y, price_x);
            state.cumulative_fees = broker.fees_paid;
            log::info!("[paper] forced close at period end on {}", signals[last].date);
        } else {
            let market_value = broker.shares_y * price_y + broker.shares_x * price_x;
            log::info!(
                "[paper] open exposure at period end: y={}, x={}, value={}",
                broker.shares_y,
                broker.shares_x,
                market_value
            );
            open_exposure = Some(OpenExposure {
                shares_y: broker.shares_y,
                shares_x: broker.shares_x,
                market_value,
            });
        }
    }

    let curve: Vec<f64> = {
        use rust_decimal::prelude::ToPrimitive;
        states
            .iter()
            .map(|s| s.equity.to_f64().unwrap_or(0.0))
            .collect()
    };
    let summary = PerformanceSummary::from_equity(&curve);
    log::info!(
        "[paper] {} days, {} trades, fees paid {}, total return {:.2}%, max drawdown {:.2}%",
        summary.num_days,
        broker.trades.len(),
        broker.fees_paid,
        summary.total_return * 100.0,
        summary.max_drawdown * 100.0
    );

    Ok(PaperResult {
        states,
        trades: broker.trades,
        summary,
        open_exposure,
    })
}
