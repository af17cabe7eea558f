//! # Brain Server - Entry Point
//! src/main.rs
//!
//! Punto de entrada: logging, configuración, motor y servidor.

use anyhow::anyhow;
use brain_server::config::Config;
use brain_server::engine::{EngineSettings, SeededEngine};
use brain_server::server::Server;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,brain_server=debug")),
        )
        .with_thread_names(true)
        .init();

    let config = Config::parse();
    config.validate().map_err(|e| anyhow!("invalid configuration: {}", e))?;
    config.log_summary();

    let engine = Arc::new(SeededEngine::new(EngineSettings {
        population_size: config.population_size,
        seed: config.seed,
        ..EngineSettings::default()
    }));

    let server = Server::bind(&config, engine)?;
    server.run()?;

    Ok(())
}
