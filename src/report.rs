use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::backtest::BacktestPoint;
use crate::hedge::{HedgeFit, HedgeRecord};
use crate::paper::{BrokerState, OpenExposure, Trade};
use crate::perf::PerformanceSummary;
use crate::signal::{Position, SignalRecord};

/// Writes every result series for a run under one directory, named by pair.
/// CSV for the time series, JSONL for the trade log, JSON for the summaries;
/// the plotting/reporting collaborator consumes these files as-is.
pub struct RunWriter {
    dir: PathBuf,
    pair: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryReport<'a> {
    pub pair: &'a str,
    pub hedge: &'a HedgeFit,
    pub backtest: &'a PerformanceSummary,
    pub paper: &'a PerformanceSummary,
    pub open_exposure: Option<&'a OpenExposure>,
}

fn position_label(position: Position) -> i8 {
    match position {
        Position::Flat => 0,
        Position::LongSpread => 1,
        Position::ShortSpread => -1,
    }
}

impl RunWriter {
    pub fn new<P: AsRef<Path>>(dir: P, pair: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        Ok(Self {
            dir,
            pair: pair.to_string(),
        })
    }

    fn open(&self, stem: &str, ext: &str) -> Result<BufWriter<File>> {
        let path = self.dir.join(format!("{}_{}.{}", stem, self.pair, ext));
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        Ok(BufWriter::new(file))
    }

    pub fn write_hedge(&self, records: &[HedgeRecord]) -> Result<()> {
        let mut out = self.open("hedge", "csv")?;
        writeln!(out, "date,y,x,beta,spread,zscore_full")?;
        for r in records {
            writeln!(
                out,
                "{},{},{},{},{},{}",
                r.date.format("%Y-%m-%d"),
                r.y,
                r.x,
                r.beta,
                r.spread,
                r.zscore_full
            )?;
        }
        out.flush().context("failed to flush hedge csv")
    }

    pub fn write_signals(&self, signals: &[SignalRecord]) -> Result<()> {
        let mut out = self.open("signals", "csv")?;
        writeln!(out, "date,zscore,position")?;
        for s in signals {
            let zscore = s
                .zscore
                .map(|z| z.to_string())
                .unwrap_or_default();
            writeln!(
                out,
                "{},{},{}",
                s.date.format("%Y-%m-%d"),
                zscore,
                position_label(s.position)
            )?;
        }
        out.flush().context("failed to flush signals csv")
    }

    pub fn write_backtest(&self, points: &[BacktestPoint]) -> Result<()> {
        let mut out = self.open("backtest", "csv")?;
        writeln!(out, "date,position,pnl,equity")?;
        for p in points {
            writeln!(
                out,
                "{},{},{},{}",
                p.date.format("%Y-%m-%d"),
                position_label(p.position),
                p.pnl,
                p.equity
            )?;
        }
        out.flush().context("failed to flush backtest csv")
    }

    pub fn write_broker_states(&self, states: &[BrokerState]) -> Result<()> {
        let mut out = self.open("paper", "csv")?;
        writeln!(out, "date,cash,shares_y,shares_x,equity,cumulative_fees")?;
        for s in states {
            writeln!(
                out,
                "{},{},{},{},{},{}",
                s.date.format("%Y-%m-%d"),
                s.cash,
                s.shares_y,
                s.shares_x,
                s.equity,
                s.cumulative_fees
            )?;
        }
        out.flush().context("failed to flush paper csv")
    }

    pub fn write_trades(&self, trades: &[Trade]) -> Result<()> {
        let mut out = self.open("trades", "jsonl")?;
        for trade in trades {
            let line = serde_json::to_string(trade).context("failed to serialize trade")?;
            writeln!(out, "{line}")?;
        }
        out.flush().context("failed to flush trade log")
    }

    pub fn write_summary(&self, report: &SummaryReport) -> Result<()> {
        let mut out = self.open("summary", "json")?;
        let json =
            serde_json::to_string_pretty(report).context("failed to serialize summary")?;
        writeln!(out, "{json}")?;
        out.flush().context("failed to flush summary json")
    }
}
