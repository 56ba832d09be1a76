//! 实例目录下各配置文件的解析
//!
//! Everything here is stateless: each call reads the files again and returns
//! fresh values.

use lazy_static::lazy_static;
use log::debug;
use mcfleet_protocol::management::instance::LaunchMeta;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

pub const LAUNCH_SCRIPT: &str = "start.sh";
pub const PROPERTIES_FILE: &str = "server.properties";
pub const OPS_FILE: &str = "ops.json";
pub const WHITELIST_FILE: &str = "whitelist.json";
pub const AUTOSTART_MARKER: &str = "auto-start.sh";

pub type Properties = HashMap<String, String>;
pub type NameList = BTreeSet<String>;

lazy_static! {
    static ref META_PATTERN: Regex = Regex::new(
        r"^#\s*(server-name|server-version|server-type|server-port|server-ip|server-domain|visible-to-bot):\s*(.+)"
    )
    .expect("Failed to compile META_PATTERN regex");
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidInstance {
    #[error("launch script start.sh is missing or unreadable")]
    MissingLaunchScript,
    #[error("server.properties is missing or has no entries")]
    MissingProperties,
}

/// Reads the `# key: value` metadata comments of a launch script.
///
/// Returns `None` only when the file cannot be read. Later lines override
/// earlier ones, unknown lines are ignored.
pub async fn parse_launch_descriptor(path: &Path) -> Option<LaunchMeta> {
    let raw = tokio::fs::read(path).await.ok()?;
    Some(parse_launch_meta(&String::from_utf8_lossy(&raw)))
}

pub fn parse_launch_meta(content: &str) -> LaunchMeta {
    let mut meta = LaunchMeta::default();
    for line in content.lines() {
        let Some(caps) = META_PATTERN.captures(line) else {
            continue;
        };
        let value = caps[2].trim();
        let text = Some(value.to_owned()).filter(|v| !v.is_empty());
        match &caps[1] {
            "server-name" => meta.name = text,
            "server-version" => meta.version = text,
            "server-type" => meta.server_type = text,
            "server-port" => meta.port = text,
            "server-ip" => meta.ip = text,
            "server-domain" => meta.domain = text,
            "visible-to-bot" => meta.visible = value.to_lowercase() == "true",
            _ => {}
        }
    }
    meta
}

/// `key=value` per line, split on the first `=` only.
pub async fn parse_properties(path: &Path) -> Option<Properties> {
    let raw = tokio::fs::read(path).await.ok()?;
    Some(parse_properties_text(&String::from_utf8_lossy(&raw)))
}

pub fn parse_properties_text(content: &str) -> Properties {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
        .collect()
}

/// Names from a JSON array of `{ "name": .. }` objects.
///
/// The server rewrites these files at any time, so a missing or broken file
/// is an empty list rather than an error.
pub async fn parse_name_list(path: &Path) -> NameList {
    match tokio::fs::read(path).await {
        Ok(raw) => parse_name_list_text(&raw),
        Err(_) => NameList::new(),
    }
}

pub fn parse_name_list_text(raw: &[u8]) -> NameList {
    match serde_json::from_slice::<Vec<serde_json::Value>>(raw) {
        Ok(entries) => entries
            .iter()
            .filter_map(|entry| entry.get("name")?.as_str())
            .map(str::to_owned)
            .collect(),
        Err(err) => {
            debug!("ignoring malformed name list: {}", err);
            NameList::new()
        }
    }
}

pub async fn has_autostart_marker(dir: &Path) -> bool {
    tokio::fs::try_exists(dir.join(AUTOSTART_MARKER))
        .await
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconCredentials {
    pub port: u16,
    pub password: String,
}

/// `Some` only for `enable-rcon=true` with a usable port and a password.
pub fn rcon_credentials(properties: &Properties) -> Option<RconCredentials> {
    if properties.get("enable-rcon").map(String::as_str) != Some("true") {
        return None;
    }
    let port = properties.get("rcon.port")?.parse::<u16>().ok()?;
    let password = properties.get("rcon.password").filter(|p| !p.is_empty())?;
    Some(RconCredentials {
        port,
        password: password.clone(),
    })
}

/// Everything one scan reads from an instance directory.
#[derive(Debug, Clone, Default)]
pub struct InstanceFiles {
    pub meta: LaunchMeta,
    pub properties: Properties,
    pub ops: NameList,
    pub whitelist: NameList,
    pub autostart: bool,
}

impl InstanceFiles {
    pub async fn load(dir: &Path) -> Result<Self, InvalidInstance> {
        let meta = parse_launch_descriptor(&dir.join(LAUNCH_SCRIPT))
            .await
            .ok_or(InvalidInstance::MissingLaunchScript)?;
        let properties = parse_properties(&dir.join(PROPERTIES_FILE))
            .await
            .filter(|p| !p.is_empty())
            .ok_or(InvalidInstance::MissingProperties)?;

        Ok(Self {
            meta,
            properties,
            ops: parse_name_list(&dir.join(OPS_FILE)).await,
            whitelist: parse_name_list(&dir.join(WHITELIST_FILE)).await,
            autostart: has_autostart_marker(dir).await,
        })
    }
}
