// src/lib.rs
pub mod backtest;
pub mod config;
pub mod error;
pub mod hedge;
pub mod paper;
pub mod perf;
pub mod report;
pub mod series;
pub mod signal;
