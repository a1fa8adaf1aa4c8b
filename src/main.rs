use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;
use std::str::FromStr;

use pairsim::config::SimConfig;
use pairsim::report::{RunWriter, SummaryReport};
use pairsim::series::{PairSeries, PriceTable};
use pairsim::{backtest, hedge, paper, signal};

fn init_logging() {
    let offset_seconds = env::var("TIMEZONE_OFFSET")
        .unwrap_or_else(|_| "0".to_string())
        .parse::<i32>()
        .expect("Invalid TIMEZONE_OFFSET");
    let offset = FixedOffset::east_opt(offset_seconds).expect("Invalid offset");
    Builder::from_default_env()
        .format(move |buf, record| {
            let utc_now: DateTime<Utc> = Utc::now();
            let local_now = utc_now.with_timezone(&offset);
            writeln!(
                buf,
                "{} [{}] - {}",
                local_now.format("%Y-%m-%dT%H:%M:%S%z"),
                record.level(),
                record.args()
            )
        })
        .filter(
            None,
            LevelFilter::from_str(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
                .unwrap_or(LevelFilter::Info),
        )
        .init();
}

fn main() -> Result<()> {
    init_logging();

    let cfg = SimConfig::from_env_or_yaml().context("invalid pairsim config")?;
    log::info!(
        "[pairsim] pair={}, window={}, entry_z={}, exit_z={}, risk_frac={}",
        cfg.pair_label(),
        cfg.window,
        cfg.entry_z,
        cfg.exit_z,
        cfg.risk_frac
    );

    let table = PriceTable::from_csv_path(&cfg.prices_file)
        .with_context(|| format!("failed to load price table {}", cfg.prices_file))?;
    let y = table.series(&cfg.y_ticker)?;
    let x = table.series(&cfg.x_ticker)?;
    let pair = PairSeries::align(&cfg.y_ticker, &cfg.x_ticker, &y, &x)?;
    log::info!("[pairsim] {} aligned trading days", pair.len());

    let (fit, hedge_records) = hedge::estimate(&pair)?;
    let signals = signal::generate(&hedge_records, &cfg.signal_params())?;
    let backtest_result = backtest::run(&signals, &pair, fit.beta, &cfg.backtest_params())?;
    let paper_result = paper::replay(&signals, &pair, fit.beta, &cfg.paper_params())?;

    let writer = RunWriter::new(&cfg.out_dir, &cfg.pair_label())?;
    writer.write_hedge(&hedge_records)?;
    writer.write_signals(&signals)?;
    writer.write_backtest(&backtest_result.points)?;
    writer.write_broker_states(&paper_result.states)?;
    writer.write_trades(&paper_result.trades)?;
    writer.write_summary(&SummaryReport {
        pair: &cfg.pair_label(),
        hedge: &fit,
        backtest: &backtest_result.summary,
        paper: &paper_result.summary,
        open_exposure: paper_result.open_exposure.as_ref(),
    })?;

    log_summary("backtest", &backtest_result.summary);
    log_summary("paper", &paper_result.summary);
    log::info!("[pairsim] results written to {}", cfg.out_dir);
    Ok(())
}

fn log_summary(tag: &str, summary: &pairsim::perf::PerformanceSummary) {
    log::info!("[{}] ===== Performance summary =====", tag);
    log::info!("[{}] Days: {}", tag, summary.num_days);
    log::info!("[{}] Total return: {:.2}%", tag, summary.total_return * 100.0);
    log::info!(
        "[{}] Annual return: {:.2}%",
        tag,
        summary.annualized_return * 100.0
    );
    log::info!("[{}] Annual vol: {:.2}%", tag, summary.annualized_vol * 100.0);
    log::info!("[{}] Sharpe: {:.2}", tag, summary.sharpe);
    log::info!(
        "[{}] Max drawdown: {:.2}%",
        tag,
        summary.max_drawdown * 100.0
    );
}
