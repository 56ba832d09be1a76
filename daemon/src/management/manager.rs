use crate::config::AppConfig;
use crate::management::comm::{run_script, ScriptError, ScriptOutcome};
use crate::management::config::{ControlConfig, FleetConfig, RconConfig};
use crate::management::inst_config::AUTOSTART_MARKER;
use crate::management::instance::{CommandError, McServer};
use crate::management::minecraft::execute_once;
use crate::management::summary::{render_section, render_summary};
use futures::future::join_all;
use log::{debug, info, warn};
use mcfleet_protocol::management::instance::InstanceReport;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type ServerHandle = Arc<Mutex<McServer>>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub added: usize,
    pub refreshed: usize,
    pub evicted: usize,
}

/// 所有实例的注册表, 键为实例目录名
///
/// Entries are only mutated by [`FleetRegistry::rescan`]. The entity lock is
/// taken for the file reload and again to commit the RCON probe result, never
/// across the probe itself, so readers see an entity either before or after
/// a refresh step, never halfway.
pub struct FleetRegistry {
    fleet: FleetConfig,
    rcon: RconConfig,
    control: ControlConfig,
    // use ahash to speed up ops
    servers: scc::HashMap<String, ServerHandle, ahash::RandomState>,
}

impl FleetRegistry {
    pub fn new(fleet: FleetConfig, rcon: RconConfig, control: ControlConfig) -> Self {
        Self {
            fleet,
            rcon,
            control,
            servers: scc::HashMap::default(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.fleet.clone(),
            config.rcon.clone(),
            config.control.clone(),
        )
    }

    pub fn fleet_config(&self) -> &FleetConfig {
        &self.fleet
    }

    /// One scan cycle: discover new instance directories, refresh tracked
    /// ones and evict those that stopped being valid.
    pub async fn rescan(&self) -> ScanStats {
        let mut stats = ScanStats::default();
        let mut ids = list_dir_names(&self.fleet.root).await;
        self.servers
            .scan_async(|id, _| {
                ids.insert(id.clone());
            })
            .await;

        for id in ids {
            match self.entry(&id).await {
                Some(server) => {
                    // 探测期间不持有实体锁
                    let reloaded = server.lock().await.reload(&self.rcon).await;
                    match reloaded {
                        Ok(pending) => {
                            if let Some(poll) = pending {
                                let outcome = poll.run(&self.rcon).await;
                                server.lock().await.commit(outcome);
                            }
                            stats.refreshed += 1;
                        }
                        Err(reason) => {
                            info!("server {} is invalid ({}), removing from cache", id, reason);
                            server.lock().await.close().await;
                            self.servers.remove_async(&id).await;
                            stats.evicted += 1;
                        }
                    }
                }
                None => {
                    let path = self.fleet.root.join(&id);
                    if !is_dir(&path).await {
                        continue;
                    }
                    let mut server = McServer::new(id.clone(), path);
                    match server.refresh(&self.rcon).await {
                        Ok(()) => {
                            info!("loaded server: {}", id);
                            let _ = self
                                .servers
                                .insert_async(id, Arc::new(Mutex::new(server)))
                                .await;
                            stats.added += 1;
                        }
                        Err(reason) => debug!("{} is not a server directory: {}", id, reason),
                    }
                }
            }
        }

        debug!(
            "scan finished: {} added, {} refreshed, {} evicted",
            stats.added, stats.refreshed, stats.evicted
        );
        stats
    }

    async fn entry(&self, id: &str) -> Option<ServerHandle> {
        self.servers.read_async(id, |_, server| server.clone()).await
    }

    async fn visible_entry(&self, id: &str) -> Option<ServerHandle> {
        let server = self.entry(id).await?;
        let visible = server.lock().await.visible();
        visible.then_some(server)
    }

    /// Entries ordered by id.
    async fn entries(&self) -> Vec<(String, ServerHandle)> {
        let mut entries = Vec::new();
        self.servers
            .scan_async(|id, server| entries.push((id.clone(), server.clone())))
            .await;
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Snapshot of a visible server. Hidden and unknown ids look the same.
    pub async fn lookup(&self, id: &str) -> Option<InstanceReport> {
        let server = self.visible_entry(id).await?;
        let report = server.lock().await.report();
        Some(report)
    }

    pub async fn list_visible_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for (id, server) in self.entries().await {
            if server.lock().await.visible() {
                ids.push(id);
            }
        }
        ids
    }

    pub async fn render_summary(&self) -> String {
        let mut sections = Vec::new();
        for (_, server) in self.entries().await {
            let server = server.lock().await;
            if server.visible() {
                sections.push(render_section(&server, &self.fleet.domain_base));
            }
        }
        render_summary(&self.fleet.title, &self.fleet.notice, &sections)
    }

    /// Sends one operator command over its own short-lived session.
    ///
    /// The entity is only locked to copy the credentials, the polling
    /// session is never touched.
    pub async fn run_command(&self, id: &str, command: &str) -> Result<String, CommandError> {
        let server = self
            .visible_entry(id)
            .await
            .ok_or_else(|| CommandError::NotFound(id.to_owned()))?;
        let credentials = server.lock().await.command_credentials()?;

        execute_once(
            &self.rcon.host,
            credentials.port,
            &credentials.password,
            command,
            self.rcon.timeout(),
            self.rcon.encoding,
        )
        .await
        .map_err(|source| CommandError::Connection {
            id: id.to_owned(),
            source,
        })
    }

    /// Runs a script from the instance directory and reports its exit status.
    pub async fn run_script(&self, id: &str, script: &str) -> Result<ScriptOutcome, ScriptError> {
        let server = self
            .visible_entry(id)
            .await
            .ok_or_else(|| ScriptError::UnknownServer(id.to_owned()))?;
        let dir = server.lock().await.path().to_path_buf();
        run_script(&dir, script, self.control.timeout()).await
    }

    /// Invokes the autostart script of every visible server carrying the marker.
    pub async fn autostart_all(&self) -> Vec<(String, Result<ScriptOutcome, ScriptError>)> {
        let mut results = Vec::new();
        for (id, server) in self.entries().await {
            let eligible = {
                let server = server.lock().await;
                server.visible() && server.files().autostart
            };
            if !eligible {
                continue;
            }
            let result = self.run_script(&id, AUTOSTART_MARKER).await;
            if let Err(err) = &result {
                warn!("autostart of {} failed: {}", id, err);
            }
            results.push((id, result));
        }
        results
    }

    /// Closes every session and empties the registry.
    pub async fn shutdown(&self) {
        let entries = self.entries().await;
        join_all(entries.iter().map(|(_, server)| async move {
            server.lock().await.close().await;
        }))
        .await;
        self.servers.clear_async().await;
        info!("closed {} server entries", entries.len());
    }
}

async fn list_dir_names(root: &Path) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut dir = match tokio::fs::read_dir(root).await {
        Ok(dir) => dir,
        Err(err) => {
            warn!("failed to list {}: {}", root.display(), err);
            return names;
        }
    };
    loop {
        match dir.next_entry().await {
            Ok(Some(entry)) => {
                if let Ok(name) = entry.file_name().into_string() {
                    names.insert(name);
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("failed to list {}: {}", root.display(), err);
                break;
            }
        }
    }
    names
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}
