use log::warn;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::management::config::{ControlConfig, FleetConfig, RconConfig};
use crate::publish::PublisherConfig;
use crate::storage::{FileIoWithBackup, JsonFile};

pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// immutable through full lifetime of app, unless restart app.
#[serde(default)]
pub struct AppConfig {
    pub fleet: FleetConfig,
    pub rcon: RconConfig,
    pub publisher: PublisherConfig,
    pub control: ControlConfig,
}

impl FileIoWithBackup for AppConfig {}

impl JsonFile for AppConfig {}

impl AppConfig {
    fn load_from_disk() -> AppConfig {
        let mut config = Self::load_or_default(CONFIG_FILE, Self::default).unwrap_or_else(|err| {
            warn!("{:#}, falling back to defaults", err);
            Self::default()
        });
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// `MCSERVER_PATH` and `MCSERVER_DOMAIN` take precedence over the file.
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(root) = lookup("MCSERVER_PATH").filter(|v| !v.is_empty()) {
            self.fleet.root = PathBuf::from(root);
        }
        if let Some(domain) = lookup("MCSERVER_DOMAIN").filter(|v| !v.is_empty()) {
            self.fleet.domain_base = domain;
        }
    }
}

static APP_CONFIG: LazyLock<AppConfig> = LazyLock::new(AppConfig::load_from_disk);

impl AppConfig {
    pub fn get() -> &'static AppConfig {
        &APP_CONFIG
    }
}
