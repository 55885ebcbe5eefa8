use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use powerguard_daemon::{
    config::Config,
    engine::ThrottleService,
    lists::{self, ListKind},
    platform::NativePlatform,
    policy::ProcessPolicy,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    info!("PowerGuard daemon starting...");

    // Load configuration
    let config_path = Config::config_path();
    let config = if config_path.exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        info!("No config file found, using defaults");
        Config::default()
    };

    // Load allow/deny lists (written with defaults on first run)
    let allow_path = config
        .lists
        .allow_path
        .clone()
        .unwrap_or_else(|| lists::list_path(ListKind::Allow));
    let deny_path = config
        .lists
        .deny_path
        .clone()
        .unwrap_or_else(|| lists::list_path(ListKind::Deny));
    let allow_text = lists::load_list(ListKind::Allow, &allow_path)?;
    let deny_text = lists::load_list(ListKind::Deny, &deny_path)?;

    let policy = ProcessPolicy::from_lists(&allow_text, &deny_text);
    info!(
        allow = policy.allow.len(),
        deny = policy.deny.len(),
        "policy lists loaded"
    );

    let platform = Arc::new(NativePlatform::new());
    let service = ThrottleService::new(
        platform,
        policy,
        Duration::from_secs(config.general.housekeeping_interval_secs),
    );
    service.start()?;

    info!("Daemon ready; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down, restoring process power states");
    service.stop();
    Ok(())
}
