use log::debug;
use mcfleet_protocol::management::minecraft::rcon::{
    PacketError, RconPacket, AUTH_FAILED_ID, MAX_RESPONSE_FRAGMENT, SERVERDATA_AUTH,
    SERVERDATA_AUTH_RESPONSE, SERVERDATA_EXECCOMMAND, SERVERDATA_RESPONSE_VALUE,
};
use mcfleet_protocol::utils::Encoding;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub const LIST_COMMAND: &str = "list";
pub const TPS_COMMAND: &str = "tps";

#[derive(Debug, Error)]
pub enum RconError {
    #[error("connection refused")]
    Refused,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("authentication failed")]
    AuthFailed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] PacketError),
}

impl RconError {
    pub fn kind(&self) -> &'static str {
        match self {
            RconError::Refused => "refused",
            RconError::Timeout(_) => "timeout",
            RconError::AuthFailed => "auth",
            RconError::Io(_) => "io",
            RconError::Protocol(_) => "protocol",
        }
    }
}

// 状态机 trait
pub trait RconClientState {}

// 已连接, 未认证
pub struct Unauthenticated;
impl RconClientState for Unauthenticated {}

// 已认证, 可以发送命令
pub struct Authenticated;
impl RconClientState for Authenticated {}

pub struct RconClient<TState: RconClientState> {
    stream: TcpStream,
    last_id: i32,
    io_timeout: Duration,
    encoding: Encoding,
    _state: PhantomData<TState>,
}

impl RconClient<Unauthenticated> {
    pub async fn connect(
        host: &str,
        port: u16,
        io_timeout: Duration,
        encoding: Encoding,
    ) -> Result<Self, RconError> {
        let stream = match timeout(io_timeout, TcpStream::connect((host, port))).await {
            Err(_) => return Err(RconError::Timeout(io_timeout)),
            Ok(Err(err)) if err.kind() == ErrorKind::ConnectionRefused => {
                return Err(RconError::Refused)
            }
            Ok(Err(err)) => return Err(err.into()),
            Ok(Ok(stream)) => stream,
        };
        stream.set_nodelay(true)?;

        Ok(RconClient {
            stream,
            last_id: 0,
            io_timeout,
            encoding,
            _state: PhantomData,
        })
    }

    pub async fn authenticate(
        mut self,
        password: &str,
    ) -> Result<RconClient<Authenticated>, RconError> {
        let id = self.next_id();
        self.write_packet(RconPacket::new(id, SERVERDATA_AUTH, password))
            .await?;

        loop {
            let packet = self.read_packet().await?;
            // Source 风格的服务端会先回一个空的 RESPONSE_VALUE
            if packet.kind != SERVERDATA_AUTH_RESPONSE {
                continue;
            }
            if packet.id == AUTH_FAILED_ID {
                return Err(RconError::AuthFailed);
            }
            if packet.id == id {
                break;
            }
        }

        Ok(RconClient {
            stream: self.stream,
            last_id: self.last_id,
            io_timeout: self.io_timeout,
            encoding: self.encoding,
            _state: PhantomData,
        })
    }
}

impl<TState: RconClientState> RconClient<TState> {
    fn next_id(&mut self) -> i32 {
        self.last_id = self.last_id.wrapping_add(1).max(1);
        self.last_id
    }

    async fn write_packet(&mut self, packet: RconPacket) -> Result<(), RconError> {
        let data = packet.encode_request()?;
        let io_timeout = self.io_timeout;
        let stream = &mut self.stream;
        timeout(io_timeout, async move {
            stream.write_all(&data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| RconError::Timeout(io_timeout))??;
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<RconPacket, RconError> {
        let io_timeout = self.io_timeout;
        let stream = &mut self.stream;
        let frame = timeout(io_timeout, async move {
            let mut prefix = [0u8; 4];
            stream.read_exact(&mut prefix).await?;
            let mut frame = vec![0u8; RconPacket::frame_length(prefix)?];
            stream.read_exact(&mut frame).await?;
            Ok::<_, RconError>(frame)
        })
        .await
        .map_err(|_| RconError::Timeout(io_timeout))??;
        Ok(RconPacket::decode(&frame)?)
    }

    /// Shuts the connection down; errors are irrelevant at this point.
    pub async fn close(mut self) {
        let _ = timeout(self.io_timeout, self.stream.shutdown()).await;
    }
}

impl RconClient<Authenticated> {
    /// Connects and authenticates in one step.
    pub async fn open(
        host: &str,
        port: u16,
        password: &str,
        io_timeout: Duration,
        encoding: Encoding,
    ) -> Result<Self, RconError> {
        RconClient::connect(host, port, io_timeout, encoding)
            .await?
            .authenticate(password)
            .await
    }

    pub async fn command(&mut self, command: &str) -> Result<String, RconError> {
        let id = self.next_id();
        let payload = self.encoding.encode_lossy(command);
        self.write_packet(RconPacket::new(id, SERVERDATA_EXECCOMMAND, payload))
            .await?;

        let first = self.read_response(id).await?;
        let mut body = first.body;

        // 长回复会被拆成多个包, 用一个空包作为结束标记
        if body.len() >= MAX_RESPONSE_FRAGMENT {
            let sentinel = self.next_id();
            self.write_packet(RconPacket::new(
                sentinel,
                SERVERDATA_RESPONSE_VALUE,
                Vec::new(),
            ))
            .await?;
            loop {
                let packet = self.read_packet().await?;
                if packet.id == sentinel {
                    break;
                }
                if packet.id == id {
                    body.extend_from_slice(&packet.body);
                }
            }
        }

        Ok(self.encoding.decode_lossy(&body))
    }

    async fn read_response(&mut self, id: i32) -> Result<RconPacket, RconError> {
        loop {
            let packet = self.read_packet().await?;
            if packet.id == id {
                return Ok(packet);
            }
            debug!("skipping stray rcon packet (id={})", packet.id);
        }
    }
}

/// Opens a session for exactly one command and always closes it again.
pub async fn execute_once(
    host: &str,
    port: u16,
    password: &str,
    command: &str,
    io_timeout: Duration,
    encoding: Encoding,
) -> Result<String, RconError> {
    let mut client = RconClient::open(host, port, password, io_timeout, encoding).await?;
    let result = client.command(command).await;
    client.close().await;
    result
}
