//! Run command implementation

use clap::Args;

use crate::config::Config;
use crate::engine::Engine;

#[derive(Args, Debug)]
pub struct RunArgs {}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let engine = Engine::from_config(config)?;

        let handle = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run().await })
        };

        tokio::signal::ctrl_c().await?;
        tracing::info!("shutdown signal received");
        engine.stop();
        handle.await??;

        Ok(())
    }
}
