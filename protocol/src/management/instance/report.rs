use crate::management::instance::config::LaunchMeta;
use crate::management::instance::status::Connectivity;
use crate::management::minecraft::{PlayerList, Tps};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Read-only snapshot of one instance, handed to consumers of the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceReport {
    pub id: String,
    pub connectivity: Connectivity,
    pub config: LaunchMeta,
    pub properties: HashMap<String, String>,
    pub ops: BTreeSet<String>,
    pub whitelist: BTreeSet<String>,
    pub autostart: bool,
    /// Only present while `connectivity` is `Online`.
    pub players: Option<PlayerList>,
    pub tps: Option<Tps>,
}
