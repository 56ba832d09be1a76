use log::{debug, info};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::config::AppConfig;
use crate::drivers::{FleetDriver, GracefulShutdown};
use crate::management::manager::FleetRegistry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct ApplicationState {
    pub config: AppConfig,
    pub registry: FleetRegistry,
    pub stop_notify: Arc<Notify>,
}
pub type AppState = Arc<ApplicationState>;

impl ApplicationState {
    pub fn new(config: AppConfig) -> AppState {
        let registry = FleetRegistry::from_config(&config);
        Arc::new(Self {
            config,
            registry,
            stop_notify: Arc::new(Notify::new()),
        })
    }
}

fn init_app_state() -> AppState {
    let config = AppConfig::get();
    debug!(
        "config loaded: {}",
        serde_json::to_string_pretty(config).unwrap_or_default()
    );
    ApplicationState::new(config.clone())
}

pub async fn run_app() -> anyhow::Result<()> {
    info!("mcfleet {} starting", VERSION);
    let state = init_app_state();
    let mut gs = GracefulShutdown::new();
    gs.add_driver(FleetDriver::new(state.clone()));

    gs.watch(state.stop_notify.clone()).await;
    info!("Bye.");
    Ok(())
}
