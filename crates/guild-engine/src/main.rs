//! Guild cache process.
//!
//! Mirrors guild and castle state owned by the authority process and
//! keeps it live: reconciles pushes, flushes exp, scores sieges, and
//! replays castle writes after an outage.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `guild-config.yaml` (defaults if missing)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to NATS and subscribe to authority pushes
//! 4. Request persisted castle state
//! 5. Run the engine loop until Ctrl-C
//! 6. Flush and drain the publisher

mod adapters;
mod channel;
mod driver;
mod error;

use std::path::Path;

use guild_cache::GuildConfig;
use guild_cache::config::LoggingConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::channel::AuthorityChannel;
use crate::driver::Engine;
use crate::error::EngineError;

/// Application entry point for the guild engine.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or the authority
/// channel cannot be reached.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("guild-engine starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }
    info!(
        castles = config.castles.len(),
        war_enabled = config.war.enabled,
        grace_secs = config.war.grace_secs,
        nats_url = %config.infrastructure.nats_url,
        "Configuration loaded"
    );

    // 3. Connect to the authority.
    let AuthorityChannel {
        link,
        mut events,
        publisher,
    } = AuthorityChannel::connect(&config.infrastructure).await?;
    info!("Authority channel connected");

    // 4. Request castle state.
    let mut engine = Engine::new(config, link);
    engine.startup();

    // 5. Run until interrupted.
    engine.run(&mut events, shutdown_signal()).await;

    // 6. Dropping the engine closes the request queue; wait for the
    //    publisher to drain it.
    drop(engine);
    if let Err(e) = publisher.await {
        warn!(error = %e, "Publisher task failed");
    }

    info!("guild-engine shutdown complete");
    Ok(())
}

/// Load `guild-config.yaml` from the working directory.
///
/// Returns the configuration and whether it came from the file.
fn load_config() -> Result<(GuildConfig, bool), EngineError> {
    let config_path = Path::new("guild-config.yaml");
    if config_path.exists() {
        Ok((GuildConfig::from_file(config_path)?, true))
    } else {
        let mut config = GuildConfig::default();
        config.infrastructure.apply_env_overrides();
        Ok((config, false))
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed the process
/// runs until killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
