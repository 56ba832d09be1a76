//! In-process RCON server used by the tests.

use mcfleet_protocol::management::minecraft::rcon::{
    RconPacket, AUTH_FAILED_ID, MAX_RESPONSE_FRAGMENT, SERVERDATA_AUTH, SERVERDATA_AUTH_RESPONSE,
    SERVERDATA_EXECCOMMAND, SERVERDATA_RESPONSE_VALUE,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;
type Delay = Arc<dyn Fn(&str) -> Option<Duration> + Send + Sync>;

pub struct MockRcon {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
    commands: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl MockRcon {
    pub async fn start<F>(password: &str, responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::start_on(0, password, responder).await
    }

    /// Binds a specific port, retrying while a previous server releases it.
    pub async fn start_on<F>(port: u16, password: &str, responder: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let no_delay = |_: &str| None::<Duration>;
        Self::spawn(port, password, Arc::new(no_delay), Arc::new(responder)).await
    }

    /// Holds back the reply to every command for which `delay` returns a
    /// duration.
    pub async fn start_delayed<D, F>(password: &str, delay: D, responder: F) -> Self
    where
        D: Fn(&str) -> Option<Duration> + Send + Sync + 'static,
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::spawn(0, password, Arc::new(delay), Arc::new(responder)).await
    }

    async fn spawn(port: u16, password: &str, delay: Delay, responder: Responder) -> Self {
        let mut attempts = 0;
        let listener = loop {
            match TcpListener::bind(("127.0.0.1", port)).await {
                Ok(listener) => break listener,
                Err(_) if attempts < 40 => {
                    attempts += 1;
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
                Err(err) => panic!("failed to bind mock rcon port {}: {}", port, err),
            }
        };
        let port = listener.local_addr().unwrap().port();
        let password = Arc::new(password.to_owned());
        let connections = Arc::new(AtomicUsize::new(0));
        let open_sessions = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn({
            let connections = connections.clone();
            let open_sessions = open_sessions.clone();
            let commands = commands.clone();
            async move {
                // 任务集随监听任务一起销毁, 断开所有连接
                let mut sessions = JoinSet::new();
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    open_sessions.fetch_add(1, Ordering::SeqCst);
                    let open_sessions = open_sessions.clone();
                    let password = password.clone();
                    let responder = responder.clone();
                    let delay = delay.clone();
                    let commands = commands.clone();
                    sessions.spawn(async move {
                        let _ = serve(stream, &password, &delay, &responder, &commands).await;
                        open_sessions.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            }
        });

        Self {
            port,
            connections,
            open_sessions,
            commands,
            handle,
        }
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }
}

impl Drop for MockRcon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    password: &str,
    delay: &Delay,
    responder: &Responder,
    commands: &AtomicUsize,
) -> std::io::Result<()> {
    loop {
        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).await?;
        let mut frame = vec![0u8; i32::from_le_bytes(prefix) as usize];
        stream.read_exact(&mut frame).await?;
        let Ok(packet) = RconPacket::decode(&frame) else {
            return Ok(());
        };
        let body = String::from_utf8_lossy(&packet.body).into_owned();

        match packet.kind {
            SERVERDATA_AUTH => {
                let id = if body == password { packet.id } else { AUTH_FAILED_ID };
                send(&mut stream, packet.id, SERVERDATA_RESPONSE_VALUE, b"").await?;
                send(&mut stream, id, SERVERDATA_AUTH_RESPONSE, b"").await?;
            }
            SERVERDATA_EXECCOMMAND => {
                commands.fetch_add(1, Ordering::SeqCst);
                if let Some(pause) = delay(&body) {
                    tokio::time::sleep(pause).await;
                }
                let reply = responder(&body);
                let bytes = reply.as_bytes();
                if bytes.is_empty() {
                    send(&mut stream, packet.id, SERVERDATA_RESPONSE_VALUE, b"").await?;
                }
                for chunk in bytes.chunks(MAX_RESPONSE_FRAGMENT) {
                    send(&mut stream, packet.id, SERVERDATA_RESPONSE_VALUE, chunk).await?;
                }
            }
            other => {
                let reply = format!("Unknown request {:x}", other);
                send(&mut stream, packet.id, SERVERDATA_RESPONSE_VALUE, reply.as_bytes()).await?;
            }
        }
    }
}

async fn send(stream: &mut TcpStream, id: i32, kind: i32, body: &[u8]) -> std::io::Result<()> {
    stream
        .write_all(&RconPacket::new(id, kind, body.to_vec()).encode())
        .await
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Accepts connections and never answers.
pub async fn silent_server() -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (port, handle)
}
