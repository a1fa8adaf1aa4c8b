use chrono::NaiveDate;
use serde::Serialize;
use std::collections::VecDeque;

use crate::error::EngineError;
use crate::hedge::HedgeRecord;

const STD_EPS: f64 = 1e-12;

/// Spread position held at the end of a date. The long side is long Y / short
/// beta * X; a direct long-to-short flip is not allowed, the state machine
/// must pass through flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Position {
    Flat,
    LongSpread,
    ShortSpread,
}

impl Position {
    /// Signed unit exposure used by the vectorized backtest.
    pub fn sign(self) -> f64 {
        match self {
            Position::Flat => 0.0,
            Position::LongSpread => 1.0,
            Position::ShortSpread => -1.0,
        }
    }
}

/// Per-date signal output. `zscore` is `None` while the rolling window is
/// warming up or when the rolling std is zero; the position rules treat the
/// two cases differently (forced flat vs. hold).
#[derive(Debug, Clone, Serialize)]
pub struct SignalRecord {
    pub date: NaiveDate,
    pub zscore: Option<f64>,
    pub position: Position,
}

#[derive(Debug, Clone, Copy)]
pub struct SignalParams {
    pub window: usize,
    pub entry_z: f64,
    pub exit_z: f64,
}

impl SignalParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.window < 2 {
            return Err(EngineError::InvalidConfiguration(format!(
                "window must be >= 2, got {}",
                self.window
            )));
        }
        if !self.entry_z.is_finite() || self.entry_z <= 0.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "entry_z must be positive, got {}",
                self.entry_z
            )));
        }
        if !self.exit_z.is_finite() || self.exit_z < 0.0 {
            return Err(EngineError::InvalidConfiguration(format!(
                "exit_z must be non-negative, got {}",
                self.exit_z
            )));
        }
        if self.exit_z >= self.entry_z {
            return Err(EngineError::InvalidConfiguration(format!(
                "exit_z ({}) must be below entry_z ({})",
                self.exit_z, self.entry_z
            )));
        }
        Ok(())
    }
}

/// Entry/exit band transition, carrying yesterday's position forward.
fn step(prev: Position, z: f64, entry_z: f64, exit_z: f64) -> Position {
    match prev {
        Position::Flat => {
            if z <= -entry_z {
                Position::LongSpread
            } else if z >= entry_z {
                Position::ShortSpread
            } else {
                Position::Flat
            }
        }
        Position::LongSpread => {
            if z >= -exit_z {
                Position::Flat
            } else {
                Position::LongSpread
            }
        }
        Position::ShortSpread => {
            if z <= exit_z {
                Position::Flat
            } else {
                Position::ShortSpread
            }
        }
    }
}

/// Rolling mean and sample standard deviation (ddof = 1) of the window.
fn mean_std(window: &VecDeque<f64>) -> Option<(f64, f64)> {
    if window.len() < 2 {
        return None;
    }
    let mean = window.iter().copied().sum::<f64>() / window.len() as f64;
    let var = window
        .iter()
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>()
        / (window.len() - 1) as f64;
    Some((mean, var.sqrt()))
}

/// Walks the spread series and emits one record per date. Dates inside the
/// warmup period are forced flat; a zero-variance window after warmup holds
/// the previous day's position.
pub fn generate(
    records: &[HedgeRecord],
    params: &SignalParams,
) -> Result<Vec<SignalRecord>, EngineError> {
    params.validate()?;

    let mut window: VecDeque<f64> = VecDeque::with_capacity(params.window);
    let mut position = Position::Flat;
    let mut signals = Vec::with_capacity(records.len());

    for record in records {
        if window.len() >= params.window {
            window.pop_front();
        }
        window.push_back(record.spread);

        let (zscore, next_position) = if window.len() < params.window {
            // warmup: not enough trailing observations for a defined z
            (None, Position::Flat)
        } else {
            match mean_std(&window) {
                Some((mean, std)) if std > STD_EPS => {
                    let z = (record.spread - mean) / std;
                    (Some(z), step(position, z, params.entry_z, params.exit_z))
                }
                // undefined statistic: hold state rather than trade on it
                _ => (None, position),
            }
        };

        if next_position != position {
            log::debug!(
                "[signals] {}: {:?} -> {:?} (z={:?})",
                record.date,
                position,
                next_position,
                zscore
            );
        }
        position = next_position;
        signals.push(SignalRecord {
            date: record.date,
            zscore,
            position,
        });
    }

    let changes = signals
        .windows(2)
        .filter(|w| w[1].position != w[0].position)
        .count();
    log::info!(
        "[signals] {} records, window={}, entry_z={}, exit_z={}, position changes={}",
        signals.len(),
        params.window,
        params.entry_z,
        params.exit_z,
        changes
    );
    Ok(signals)
}
