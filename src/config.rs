use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::Path;

use crate::backtest::BacktestParams;
use crate::error::EngineError;
use crate::paper::PaperParams;
use crate::signal::SignalParams;

const DEFAULT_WINDOW: usize = 60;
const DEFAULT_ENTRY_Z: f64 = 2.0;
const DEFAULT_EXIT_Z: f64 = 0.5;
const DEFAULT_COST_PER_TRADE: f64 = 1.0;
const DEFAULT_FEE_PER_TRADE: f64 = 1.0;
const DEFAULT_START_CASH: f64 = 100_000.0;
const DEFAULT_RISK_FRAC: f64 = 0.5;
const DEFAULT_PRICES_FILE: &str = "data/interim/adj_close_clean.csv";
const DEFAULT_OUT_DIR: &str = "data/processed";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct SimYaml {
    pair: Option<String>,
    window: Option<usize>,
    entry_z_score: Option<f64>,
    exit_z_score: Option<f64>,
    cost_per_trade: Option<f64>,
    fee_per_trade: Option<f64>,
    start_cash: Option<f64>,
    risk_frac: Option<f64>,
    force_close_at_end: Option<bool>,
    prices_file: Option<String>,
    out_dir: Option<String>,
}

/// Full configuration surface of a single simulation run. Values only; the
/// mechanism (YAML file vs. environment) is resolved here and nowhere else.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub y_ticker: String,
    pub x_ticker: String,
    pub window: usize,
    pub entry_z: f64,
    pub exit_z: f64,
    pub cost_per_trade: f64,
    pub fee_per_trade: f64,
    pub start_cash: f64,
    pub risk_frac: f64,
    pub force_close_at_end: bool,
    pub prices_file: String,
    pub out_dir: String,
}

impl SimConfig {
    pub fn from_env_or_yaml() -> Result<Self> {
        let config_path = env::var("PAIRSIM_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty());
        if let Some(path) = config_path {
            return Self::from_yaml_path(path);
        }
        Self::from_env()
    }

    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open pairsim config {}", path_ref.display()))?;
        let yaml: SimYaml = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse pairsim config {}", path_ref.display()))?;

        let pair = yaml
            .pair
            .context("config must set 'pair' (like KO_PEP)")?;
        let (y_ticker, x_ticker) = parse_pair(&pair)?;

        let cfg = SimConfig {
            y_ticker,
            x_ticker,
            window: yaml.window.unwrap_or(DEFAULT_WINDOW),
            entry_z: yaml.entry_z_score.unwrap_or(DEFAULT_ENTRY_Z),
            exit_z: yaml.exit_z_score.unwrap_or(DEFAULT_EXIT_Z),
            cost_per_trade: yaml.cost_per_trade.unwrap_or(DEFAULT_COST_PER_TRADE),
            fee_per_trade: yaml.fee_per_trade.unwrap_or(DEFAULT_FEE_PER_TRADE),
            start_cash: yaml.start_cash.unwrap_or(DEFAULT_START_CASH),
            risk_frac: yaml.risk_frac.unwrap_or(DEFAULT_RISK_FRAC),
            force_close_at_end: yaml.force_close_at_end.unwrap_or(false),
            prices_file: yaml
                .prices_file
                .unwrap_or_else(|| DEFAULT_PRICES_FILE.to_string()),
            out_dir: yaml.out_dir.unwrap_or_else(|| DEFAULT_OUT_DIR.to_string()),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let pair = env::var("PAIRSIM_PAIR").context("PAIRSIM_PAIR must be set (like KO_PEP)")?;
        let (y_ticker, x_ticker) = parse_pair(&pair)?;

        let cfg = SimConfig {
            y_ticker,
            x_ticker,
            window: env_parse("PAIRSIM_WINDOW", DEFAULT_WINDOW),
            entry_z: env_parse("PAIRSIM_ENTRY_Z", DEFAULT_ENTRY_Z),
            exit_z: env_parse("PAIRSIM_EXIT_Z", DEFAULT_EXIT_Z),
            cost_per_trade: env_parse("PAIRSIM_COST_PER_TRADE", DEFAULT_COST_PER_TRADE),
            fee_per_trade: env_parse("PAIRSIM_FEE_PER_TRADE", DEFAULT_FEE_PER_TRADE),
            start_cash: env_parse("PAIRSIM_START_CASH", DEFAULT_START_CASH),
            risk_frac: env_parse("PAIRSIM_RISK_FRAC", DEFAULT_RISK_FRAC),
            force_close_at_end: env::var("PAIRSIM_FORCE_CLOSE")
                .map(|v| v.trim().to_ascii_lowercase() == "true")
                .unwrap_or(false),
            prices_file: env::var("PAIRSIM_PRICES_FILE")
                .unwrap_or_else(|_| DEFAULT_PRICES_FILE.to_string()),
            out_dir: env::var("PAIRSIM_OUT_DIR").unwrap_or_else(|_| DEFAULT_OUT_DIR.to_string()),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fatal, fail-fast parameter checks. Runs before any data is loaded so a
    /// bad configuration can never produce a partial run.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.y_ticker == self.x_ticker {
            return Err(EngineError::InvalidConfiguration(format!(
                "pair legs must differ, got {}_{}",
                self.y_ticker, self.x_ticker
            )));
        }
        self.signal_params().validate()?;
        self.backtest_params().validate()?;
        self.paper_params().validate()?;
        Ok(())
    }

    pub fn pair_label(&self) -> String {
        format!("{}_{}", self.y_ticker, self.x_ticker)
    }

    pub fn signal_params(&self) -> SignalParams {
        SignalParams {
            window: self.window,
            entry_z: self.entry_z,
            exit_z: self.exit_z,
        }
    }

    pub fn backtest_params(&self) -> BacktestParams {
        BacktestParams {
            cost_per_trade: self.cost_per_trade,
            start_notional: self.start_cash,
        }
    }

    pub fn paper_params(&self) -> PaperParams {
        PaperParams {
            start_cash: self.start_cash,
            risk_frac: self.risk_frac,
            fee_per_trade: self.fee_per_trade,
            force_close_at_end: self.force_close_at_end,
        }
    }
}

fn parse_pair(raw: &str) -> Result<(String, String)> {
    let mut parts = raw.trim().splitn(2, '_');
    match (parts.next(), parts.next()) {
        (Some(y), Some(x)) if !y.is_empty() && !x.is_empty() => {
            Ok((y.to_uppercase(), x.to_uppercase()))
        }
        _ => anyhow::bail!("pair must look like Y_X (got '{}')", raw),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_yaml_with_defaults() {
        let file = write_yaml("pair: ko_pep\nwindow: 30\n");
        let cfg = SimConfig::from_yaml_path(file.path()).unwrap();
        assert_eq!(cfg.y_ticker, "KO");
        assert_eq!(cfg.x_ticker, "PEP");
        assert_eq!(cfg.window, 30);
        assert_eq!(cfg.entry_z, DEFAULT_ENTRY_Z);
        assert_eq!(cfg.risk_frac, DEFAULT_RISK_FRAC);
        assert!(!cfg.force_close_at_end);
        assert_eq!(cfg.pair_label(), "KO_PEP");
    }

    #[test]
    fn yaml_without_pair_is_an_error() {
        let file = write_yaml("window: 30\n");
        assert!(SimConfig::from_yaml_path(file.path()).is_err());
    }

    #[test]
    fn rejects_inverted_bands_before_running() {
        let file = write_yaml("pair: KO_PEP\nentry_z_score: 1.0\nexit_z_score: 2.0\n");
        assert!(SimConfig::from_yaml_path(file.path()).is_err());
    }

    #[test]
    fn rejects_out_of_range_risk_frac() {
        let file = write_yaml("pair: KO_PEP\nrisk_frac: 1.2\n");
        assert!(SimConfig::from_yaml_path(file.path()).is_err());
        let file = write_yaml("pair: KO_PEP\nrisk_frac: 0.0\n");
        assert!(SimConfig::from_yaml_path(file.path()).is_err());
    }

    #[test]
    fn rejects_identical_legs() {
        let file = write_yaml("pair: KO_KO\n");
        assert!(SimConfig::from_yaml_path(file.path()).is_err());
    }

    #[test]
    fn pair_parsing_requires_two_legs() {
        assert!(parse_pair("KO").is_err());
        assert!(parse_pair("_PEP").is_err());
        assert_eq!(
            parse_pair("xom_cvx").unwrap(),
            ("XOM".to_string(), "CVX".to_string())
        );
    }
}
