use clap::Parser;
use poly_weather::cli::{Cli, Commands};
use poly_weather::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Warning: could not load config from {}: {}", cli.config, err);
            eprintln!("Using default configuration");
            Config::from_toml(include_str!("../config.toml.example"))?
        }
    };

    poly_weather::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!("starting trading engine");
            args.execute(config).await?;
        }
        Commands::Scan(args) => {
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Discovery: {}", config.discovery.search_term);
            println!("  Execution: {:?}", config.execution.mode);
            println!(
                "  Risk: kelly={}, max_exposure={}",
                config.risk.kelly_fraction, config.risk.max_exposure_per_market
            );
            println!(
                "  Engine: cycle={}s, advance_days={}",
                config.engine.check_interval_secs, config.engine.advance_days
            );
        }
    }

    Ok(())
}
