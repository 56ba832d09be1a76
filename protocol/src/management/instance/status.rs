use serde::{Deserialize, Serialize};
use std::fmt;

/// RCON 连通状态, 每个扫描周期评估一次
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// Not evaluated for the current configuration (new or hidden instance).
    #[default]
    Unconfigured,
    /// RCON disabled, or its port/password missing from the properties.
    NoRcon,
    Offline,
    Online,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Unconfigured => write!(f, "unconfigured"),
            Connectivity::NoRcon => write!(f, "no_rcon"),
            Connectivity::Offline => write!(f, "offline"),
            Connectivity::Online => write!(f, "online"),
        }
    }
}
