use mcfleet_protocol::utils::Encoding;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// 存放所有实例目录的根目录
    pub root: PathBuf,
    /// Advertised host when an instance declares neither domain nor ip.
    pub domain_base: String,
    pub scan_interval_secs: u64,
    pub autostart_on_boot: bool,
    pub title: String,
    pub notice: String,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("servers"),
            domain_base: "localhost".to_owned(),
            scan_interval_secs: 10,
            autostart_on_boot: false,
            title: "伺服器清單".to_owned(),
            notice: "如果有沒有啥異狀或是要op或白名單就去主頻道tag服主".to_owned(),
        }
    }
}

impl FleetConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    pub host: String,
    /// Upper bound for connecting and for every single read/write.
    pub timeout_ms: u64,
    pub encoding: Encoding,
    /// Server types that understand the `tps` command.
    pub tps_server_types: Cow<'static, [Cow<'static, str>]>,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            timeout_ms: 3000,
            encoding: Encoding::UTF8,
            tps_server_types: Cow::Borrowed(&[
                Cow::Borrowed("paper"),
                Cow::Borrowed("purpur"),
                Cow::Borrowed("spigot"),
                Cow::Borrowed("bukkit"),
                Cow::Borrowed("pufferfish"),
            ]),
        }
    }
}

impl RconConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub timeout_secs: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl ControlConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
