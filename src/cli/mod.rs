//! CLI interface for poly-weather
//!
//! Subcommands:
//! - `run`: start the trading engine (paper execution)
//! - `scan`: one-shot market scan with edge report
//! - `config`: show effective configuration

mod run;
mod scan;

pub use run::RunArgs;
pub use scan::ScanArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "poly-weather")]
#[command(about = "Reactive trading engine for Polymarket NYC daily-high temperature markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the trading engine
    Run(RunArgs),
    /// One-shot market scan with edge report, no trading
    Scan(ScanArgs),
    /// Show effective configuration
    Config,
}
