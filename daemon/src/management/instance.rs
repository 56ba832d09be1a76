use crate::management::config::RconConfig;
use crate::management::inst_config::{
    rcon_credentials, InstanceFiles, InvalidInstance, RconCredentials,
};
use crate::management::minecraft::{
    Authenticated, RconClient, RconError, LIST_COMMAND, TPS_COMMAND,
};
use log::{debug, info, warn};
use mcfleet_protocol::management::instance::{Connectivity, InstanceReport, LaunchMeta};
use mcfleet_protocol::management::minecraft::{PlayerList, Tps};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("server `{0}` not found")]
    NotFound(String),
    #[error("server `{0}` does not have RCON enabled or its port/password set")]
    NotConfigured(String),
    #[error("failed to reach RCON of server `{id}`: {source}")]
    Connection {
        id: String,
        #[source]
        source: RconError,
    },
}

/// Long-lived polling connection, remembered together with what opened it.
struct RconSession {
    client: RconClient<Authenticated>,
    credentials: RconCredentials,
}

impl RconSession {
    async fn close(self) {
        self.client.close().await;
    }
}

#[derive(Debug, Default)]
struct Telemetry {
    players: Option<PlayerList>,
    tps: Option<Tps>,
}

/// 单个服务器实例: 静态配置 + 在线状态 + 轮询用的 RCON 会话
pub struct McServer {
    id: String,
    path: PathBuf,
    files: InstanceFiles,
    connectivity: Connectivity,
    session: Option<RconSession>,
    players: PlayerList,
    tps: Option<Tps>,
}

impl McServer {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            files: InstanceFiles::default(),
            connectivity: Connectivity::Unconfigured,
            session: None,
            players: PlayerList::default(),
            tps: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn visible(&self) -> bool {
        self.files.meta.visible
    }

    pub fn meta(&self) -> &LaunchMeta {
        &self.files.meta
    }

    pub fn files(&self) -> &InstanceFiles {
        &self.files
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Player counts, only while online.
    pub fn players(&self) -> Option<&PlayerList> {
        self.connectivity.is_online().then_some(&self.players)
    }

    pub fn tps(&self) -> Option<&Tps> {
        self.tps.as_ref().filter(|_| self.connectivity.is_online())
    }

    /// Re-reads the instance files and re-evaluates RCON connectivity.
    ///
    /// An `Err` means the directory is no longer a valid instance; the
    /// caller is expected to drop the entity.
    pub async fn refresh(&mut self, rcon: &RconConfig) -> Result<(), InvalidInstance> {
        if let Some(poll) = self.reload(rcon).await? {
            let outcome = poll.run(rcon).await;
            self.commit(outcome);
        }
        Ok(())
    }

    /// First half of a refresh: re-reads the files and settles every state
    /// that needs no network.
    ///
    /// When RCON has to be polled the retained session is handed out in the
    /// returned [`PendingPoll`], so the probe can run without access to the
    /// entity. Its result goes back in through [`McServer::commit`].
    pub async fn reload(
        &mut self,
        rcon: &RconConfig,
    ) -> Result<Option<PendingPoll>, InvalidInstance> {
        self.files = InstanceFiles::load(&self.path).await?;

        if !self.visible() {
            self.close().await;
            return Ok(None);
        }

        let Some(credentials) = rcon_credentials(&self.files.properties) else {
            // 会话保留, 但不会再发送命令
            self.clear_telemetry();
            self.set_connectivity(Connectivity::NoRcon);
            return Ok(None);
        };

        if self
            .session
            .as_ref()
            .is_some_and(|session| session.credentials != credentials)
        {
            debug!("rcon settings of {} changed, reopening session", self.id);
            self.release_session().await;
        }

        Ok(Some(PendingPoll {
            id: self.id.clone(),
            credentials,
            session: self.session.take(),
            sample_tps: self.files.meta.is_type_in(&rcon.tps_server_types[..]),
        }))
    }

    /// Second half of a refresh: applies the probe result.
    pub fn commit(&mut self, outcome: PollOutcome) {
        match outcome.result {
            Ok((session, telemetry)) => {
                self.session = Some(session);
                match telemetry.players {
                    Some(players) => self.players = players,
                    None => debug!("unrecognised player list reply from {}", self.id),
                }
                self.tps = telemetry.tps;
                self.set_connectivity(Connectivity::Online);
            }
            Err(err) => {
                match err {
                    RconError::Refused => debug!("rcon of {} refused the connection", self.id),
                    err => warn!("rcon of {} failed ({}): {}", self.id, err.kind(), err),
                }
                self.clear_telemetry();
                self.set_connectivity(Connectivity::Offline);
            }
        }
    }

    /// Credentials for a one-off operator command.
    pub fn command_credentials(&self) -> Result<RconCredentials, CommandError> {
        rcon_credentials(&self.files.properties)
            .ok_or_else(|| CommandError::NotConfigured(self.id.clone()))
    }

    pub fn report(&self) -> InstanceReport {
        InstanceReport {
            id: self.id.clone(),
            connectivity: self.connectivity,
            config: self.files.meta.clone(),
            properties: self.files.properties.clone(),
            ops: self.files.ops.clone(),
            whitelist: self.files.whitelist.clone(),
            autostart: self.files.autostart,
            players: self.players().cloned(),
            tps: self.tps().copied(),
        }
    }

    /// Releases the session and forgets all live state.
    pub async fn close(&mut self) {
        self.release_session().await;
        self.clear_telemetry();
        self.set_connectivity(Connectivity::Unconfigured);
    }

    async fn release_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    fn clear_telemetry(&mut self) {
        self.players = PlayerList::default();
        self.tps = None;
    }

    fn set_connectivity(&mut self, connectivity: Connectivity) {
        if self.connectivity != connectivity {
            info!(
                "server {} connectivity: {} -> {}",
                self.id, self.connectivity, connectivity
            );
            self.connectivity = connectivity;
        }
    }
}

/// RCON probe detached from its entity, see [`McServer::reload`].
pub struct PendingPoll {
    id: String,
    credentials: RconCredentials,
    session: Option<RconSession>,
    sample_tps: bool,
}

pub struct PollOutcome {
    result: Result<(RconSession, Telemetry), RconError>,
}

impl PendingPoll {
    pub async fn run(self, rcon: &RconConfig) -> PollOutcome {
        let Self {
            id,
            credentials,
            session,
            sample_tps,
        } = self;
        let result = match session {
            Some(mut session) => match probe(&mut session.client, sample_tps).await {
                Ok(telemetry) => Ok((session, telemetry)),
                Err(err) => {
                    // 服务端可能已经重启, 旧连接失效后立即重连一次
                    debug!(
                        "retained rcon session of {} failed ({}), reconnecting",
                        id, err
                    );
                    session.close().await;
                    connect_and_probe(credentials, rcon, sample_tps).await
                }
            },
            None => connect_and_probe(credentials, rcon, sample_tps).await,
        };
        PollOutcome { result }
    }
}

async fn connect_and_probe(
    credentials: RconCredentials,
    rcon: &RconConfig,
    sample_tps: bool,
) -> Result<(RconSession, Telemetry), RconError> {
    let mut client = RconClient::open(
        &rcon.host,
        credentials.port,
        &credentials.password,
        rcon.timeout(),
        rcon.encoding,
    )
    .await?;

    match probe(&mut client, sample_tps).await {
        Ok(telemetry) => Ok((
            RconSession {
                client,
                credentials,
            },
            telemetry,
        )),
        Err(err) => {
            client.close().await;
            Err(err)
        }
    }
}

async fn probe(
    client: &mut RconClient<Authenticated>,
    sample_tps: bool,
) -> Result<Telemetry, RconError> {
    let players = PlayerList::parse(&client.command(LIST_COMMAND).await?);
    let tps = if sample_tps {
        Tps::parse(&client.command(TPS_COMMAND).await?)
    } else {
        None
    };
    Ok(Telemetry { players, tps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::management::inst_config::{LAUNCH_SCRIPT, OPS_FILE, PROPERTIES_FILE};
    use crate::testing::{closed_port, MockRcon};
    use std::collections::BTreeSet;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn rcon_config() -> RconConfig {
        RconConfig {
            timeout_ms: 500,
            ..Default::default()
        }
    }

    fn write_instance(dir: &Path, start_sh: &str, properties: &str) {
        fs::write(dir.join(LAUNCH_SCRIPT), start_sh).unwrap();
        fs::write(dir.join(PROPERTIES_FILE), properties).unwrap();
    }

    fn rcon_properties(port: u16) -> String {
        format!("server-port=25565\nenable-rcon=true\nrcon.port={}\nrcon.password=x\n", port)
    }

    #[tokio::test]
    async fn properties_without_rcon_give_no_rcon() {
        let dir = tempfile::tempdir().unwrap();
        write_instance(
            dir.path(),
            "# server-name: Hub\n# visible-to-bot: true\n# server-port: 25565\n",
            "server-port=25565\n",
        );
        let mut server = McServer::new("hub", dir.path());
        server.refresh(&rcon_config()).await.unwrap();

        assert_eq!(server.connectivity(), Connectivity::NoRcon);
        assert!(server.players().is_none());
        assert!(server.tps().is_none());
    }

    #[tokio::test]
    async fn nothing_listening_gives_offline() {
        let dir = tempfile::tempdir().unwrap();
        let port = closed_port().await;
        write_instance(dir.path(), "# visible-to-bot: true\n", &rcon_properties(port));
        let mut server = McServer::new("survival", dir.path());

        server.refresh(&rcon_config()).await.unwrap();
        assert_eq!(server.connectivity(), Connectivity::Offline);
        assert!(!server.has_session());
    }

    #[tokio::test]
    async fn online_server_reports_players_and_tps() {
        let rcon = MockRcon::start("x", |cmd| match cmd {
            "list" => "There are 2 of a max of 20 players online: Alice, Bob".to_owned(),
            "tps" => "§6TPS from last 1m, 5m, 15m: §a20.0, §a19.9, §a19.8".to_owned(),
            _ => String::new(),
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        write_instance(
            dir.path(),
            "# visible-to-bot: true\n# server-type: paper\n",
            &rcon_properties(rcon.port),
        );
        let mut server = McServer::new("lobby", dir.path());
        server.refresh(&rcon_config()).await.unwrap();

        assert_eq!(server.connectivity(), Connectivity::Online);
        let players = server.players().unwrap();
        assert_eq!((players.current, players.max), (2, 20));
        assert_eq!(
            players.online,
            BTreeSet::from(["Alice".to_owned(), "Bob".to_owned()])
        );
        assert_eq!(server.tps().unwrap().samples(), [20.0, 19.9, 19.8]);

        server.close().await;
        assert!(server.players().is_none());
    }

    #[tokio::test]
    async fn session_is_reused_between_refreshes() {
        let rcon = MockRcon::start("x", |_| "There are 0 of a max of 5 players online: ".to_owned()).await;
        let dir = tempfile::tempdir().unwrap();
        write_instance(dir.path(), "# visible-to-bot: true\n", &rcon_properties(rcon.port));
        let mut server = McServer::new("smp", dir.path());

        server.refresh(&rcon_config()).await.unwrap();
        server.refresh(&rcon_config()).await.unwrap();

        assert_eq!(server.connectivity(), Connectivity::Online);
        assert_eq!(rcon.connections(), 1);
        assert_eq!(rcon.commands(), 2);
    }

    #[tokio::test]
    async fn malformed_replies_keep_previous_counts() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let rcon = MockRcon::start("x", {
            let calls = calls.clone();
            move |cmd| {
                let n = calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                match (cmd, n) {
                    ("list", 0) => "There are 1 of a max of 8 players online: Steve".to_owned(),
                    ("list", _) => "garbled".to_owned(),
                    _ => "Unknown command".to_owned(),
                }
            }
        })
        .await;
        let dir = tempfile::tempdir().unwrap();
        write_instance(
            dir.path(),
            "# visible-to-bot: true\n# server-type: purpur\n",
            &rcon_properties(rcon.port),
        );
        let mut server = McServer::new("smp", dir.path());

        server.refresh(&rcon_config()).await.unwrap();
        server.refresh(&rcon_config()).await.unwrap();

        assert_eq!(server.connectivity(), Connectivity::Online);
        assert_eq!(server.players().unwrap().current, 1);
        assert_eq!(server.players().unwrap().max, 8);
        assert!(server.tps().is_none());
    }

    #[tokio::test]
    async fn dead_session_is_replaced_in_the_same_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let first = MockRcon::start("x", |_| "There are 0 of a max of 5 players online: ".to_owned()).await;
        let port = first.port;
        write_instance(dir.path(), "# visible-to-bot: true\n", &rcon_properties(port));
        let mut server = McServer::new("smp", dir.path());
        server.refresh(&rcon_config()).await.unwrap();
        assert!(server.has_session());

        // 服务端在同一端口上重启, 旧连接已断开
        drop(first);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = MockRcon::start_on(port, "x", |_| {
            "There are 3 of a max of 5 players online: a, b, c".to_owned()
        })
        .await;

        server.refresh(&rcon_config()).await.unwrap();
        assert_eq!(server.connectivity(), Connectivity::Online);
        assert_eq!(server.players().unwrap().current, 3);
        assert_eq!(second.connections(), 1);
    }

    #[tokio::test]
    async fn stalled_list_reply_goes_offline_within_timeout() {
        let lists = Arc::new(AtomicUsize::new(0));
        let rcon = MockRcon::start_delayed(
            "x",
            {
                let lists = lists.clone();
                move |cmd: &str| {
                    // 第一次正常回复, 之后不再回复
                    (cmd == "list" && lists.fetch_add(1, Ordering::SeqCst) > 0)
                        .then(|| Duration::from_secs(3600))
                }
            },
            |_| "There are 1 of a max of 5 players online: Alice".to_owned(),
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        write_instance(dir.path(), "# visible-to-bot: true\n", &rcon_properties(rcon.port));
        let mut server = McServer::new("smp", dir.path());
        server.refresh(&rcon_config()).await.unwrap();
        assert_eq!(server.connectivity(), Connectivity::Online);

        // 旧会话超时, 重连后的会话也超时
        let started = Instant::now();
        server.refresh(&rcon_config()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
        assert_eq!(server.connectivity(), Connectivity::Offline);
        assert!(!server.has_session());
        assert!(server.players().is_none());
        assert_eq!(rcon.connections(), 2);
    }

    #[tokio::test]
    async fn server_that_never_answers_list_is_offline() {
        let rcon = MockRcon::start_delayed(
            "x",
            |_| Some(Duration::from_secs(3600)),
            |_| String::new(),
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        write_instance(dir.path(), "# visible-to-bot: true\n", &rcon_properties(rcon.port));
        let mut server = McServer::new("smp", dir.path());

        let started = Instant::now();
        server.refresh(&rcon_config()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
        assert_eq!(server.connectivity(), Connectivity::Offline);
        assert!(!server.has_session());
        assert_eq!(rcon.connections(), 1);
    }

    #[tokio::test]
    async fn changed_rcon_port_reopens_session() {
        let dir = tempfile::tempdir().unwrap();
        let first = MockRcon::start("x", |_| "There are 0 of a max of 5 players online: ".to_owned()).await;
        write_instance(dir.path(), "# visible-to-bot: true\n", &rcon_properties(first.port));
        let mut server = McServer::new("smp", dir.path());
        server.refresh(&rcon_config()).await.unwrap();

        let second = MockRcon::start("x", |_| "There are 1 of a max of 5 players online: a".to_owned()).await;
        fs::write(dir.path().join(PROPERTIES_FILE), rcon_properties(second.port)).unwrap();
        server.refresh(&rcon_config()).await.unwrap();

        assert_eq!(server.players().unwrap().current, 1);
        assert_eq!(first.connections(), 1);
        assert_eq!(second.connections(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(first.open_sessions(), 0);
    }

    #[tokio::test]
    async fn hidden_server_is_inert() {
        let rcon = MockRcon::start("x", |_| String::new()).await;
        let dir = tempfile::tempdir().unwrap();
        write_instance(dir.path(), "# visible-to-bot: false\n", &rcon_properties(rcon.port));
        fs::write(dir.path().join(OPS_FILE), "{broken").unwrap();
        let mut server = McServer::new("secret", dir.path());

        server.refresh(&rcon_config()).await.unwrap();
        assert!(!server.visible());
        assert_eq!(server.connectivity(), Connectivity::Unconfigured);
        assert!(server.files().ops.is_empty());
        assert_eq!(rcon.connections(), 0);
    }

    #[tokio::test]
    async fn missing_descriptor_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = McServer::new("empty", dir.path());
        assert_eq!(
            server.refresh(&rcon_config()).await.unwrap_err(),
            InvalidInstance::MissingLaunchScript
        );
    }

    #[test]
    fn command_credentials_require_rcon() {
        let server = McServer::new("bare", "/nonexistent");
        assert!(matches!(
            server.command_credentials(),
            Err(CommandError::NotConfigured(id)) if id == "bare"
        ));
    }
}
