//! modelrt - vending machine simulation
//!
//! Builds a runtime, installs the vending-machine model and plays a scripted
//! scenario against one machine.

use modelrt_core::{Entity, Runtime};
use modelrt_vending::schema::kinds;
use modelrt_vending::{install, seed_catalog, Config, Scenario, VendingMachine};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if MODELRT_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("MODELRT_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // If a config file was explicitly specified, fail on error
            if std::env::var("MODELRT_CONFIG").is_ok() || std::env::var("MODELRT_SCENARIO").is_ok()
            {
                tracing::error!("Failed to load config [{}]: {}", e.error_code(), e);
                return Err(e.into());
            }
            tracing::warn!("Invalid environment overrides ({}); using defaults", e);
            Config::default()
        }
    };

    tracing::info!("Starting modelrt");
    tracing::info!("  Max cascade: {}", config.engine.max_cascade);
    tracing::info!("  History limit: {}", config.engine.history_limit);
    tracing::info!(
        "  Payment timeout: {}s",
        config.machine.payment_timeout_secs
    );

    let runtime = Runtime::new(config.engine.clone());
    install(&runtime, &config)?;
    let products = seed_catalog(&runtime, &config.catalog)?;
    tracing::info!("  Catalog: {} product(s)", products.len());

    let ui = runtime.create(kinds::USER_INTERFACE)?;
    let machine = VendingMachine::spawn(&runtime, ui.handle())?;
    tracing::info!("Machine {} ready in state {}", machine.handle(), machine.state());

    let scenario = Scenario::from_config(&config);
    tracing::info!("Playing {} scenario step(s)", scenario.steps().len());
    let outcomes = tokio::select! {
        outcomes = scenario.play(&runtime, machine.handle()) => outcomes,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping scenario...");
            Vec::new()
        }
    };

    let taken = outcomes.iter().filter(|o| o.taken).count();
    tracing::info!(
        "Scenario finished: {}/{} steps taken, machine in state {}",
        taken,
        outcomes.len(),
        machine.state()
    );
    for product in &products {
        let attrs = product.attrs().read();
        tracing::info!(
            "  {} {}: {} left",
            attrs.product_code,
            attrs.name,
            attrs.stock
        );
    }

    runtime.shutdown();
    Ok(())
}
