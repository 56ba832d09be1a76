//! Source RCON framing as spoken by Minecraft servers.
//!
//! Every packet is `length | id | type | body | 0x00 0x00`, integers are
//! little-endian `i32`, `length` counts everything after itself.

use thiserror::Error;

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// 服务端返回的 id 为 -1 表示密码错误
pub const AUTH_FAILED_ID: i32 = -1;

/// Bodies longer than this are split by the server into several packets.
pub const MAX_RESPONSE_FRAGMENT: usize = 4096;
/// 客户端请求体上限 (vanilla 会直接断开更长的包)
pub const MAX_REQUEST_BODY: usize = 1446;

const HEADER_LEN: usize = 8;
const MIN_FRAME_LEN: usize = HEADER_LEN + 2;
const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("frame length {0} out of range")]
    InvalidLength(i32),
    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("missing null terminators")]
    MissingTerminator,
    #[error("request body of {0} bytes is too long")]
    BodyTooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub kind: i32,
    pub body: Vec<u8>,
}

impl RconPacket {
    pub fn new(id: i32, kind: i32, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    /// Serialises the packet including its length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let length = (HEADER_LEN + self.body.len() + 2) as i32;
        let mut buffer = Vec::with_capacity(length as usize + 4);
        buffer.extend_from_slice(&length.to_le_bytes());
        buffer.extend_from_slice(&self.id.to_le_bytes());
        buffer.extend_from_slice(&self.kind.to_le_bytes());
        buffer.extend_from_slice(&self.body);
        buffer.extend_from_slice(&[0, 0]);
        buffer
    }

    /// Like [`RconPacket::encode`] but rejects bodies the server would drop.
    pub fn encode_request(&self) -> Result<Vec<u8>, PacketError> {
        if self.body.len() > MAX_REQUEST_BODY {
            return Err(PacketError::BodyTooLong(self.body.len()));
        }
        Ok(self.encode())
    }

    /// Validates the length prefix and returns how many bytes follow it.
    pub fn frame_length(prefix: [u8; 4]) -> Result<usize, PacketError> {
        let length = i32::from_le_bytes(prefix);
        match usize::try_from(length) {
            Ok(len) if (MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&len) => Ok(len),
            _ => Err(PacketError::InvalidLength(length)),
        }
    }

    /// Parses one frame, without its length prefix.
    pub fn decode(frame: &[u8]) -> Result<Self, PacketError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(PacketError::Truncated {
                expected: MIN_FRAME_LEN,
                actual: frame.len(),
            });
        }
        let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let kind = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let payload = &frame[HEADER_LEN..];

        // 部分服务端只发送一个结尾的 0x00
        let body = match payload {
            [body @ .., 0, 0] => body,
            [body @ .., 0] => body,
            _ => return Err(PacketError::MissingTerminator),
        };

        Ok(Self {
            id,
            kind,
            body: body.to_vec(),
        })
    }
}
