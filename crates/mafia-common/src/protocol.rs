use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use uuid::Uuid;

use crate::player::Player;
use crate::room::{Room, RoomCode};
use crate::session::PlayerSession;
use crate::win::Winner;

// -- Framing --

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed_transport(stream: TcpStream) -> Transport {
    LengthDelimitedCodec::builder()
        .max_frame_length(64 * 1024)
        .new_framed(stream)
}

// -- Client -> Server Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    // Handshake
    Hello {
        version: String,
    },

    // Rooms
    CreateRoom {
        host_name: String,
    },
    GetRoom {
        code: String,
    },
    JoinRoom {
        code: String,
        player_name: String,
    },
    StartGame {
        code: String,
    },
    ShuffleRoles {
        code: String,
    },
    EliminatePlayer {
        code: String,
        player_id: Uuid,
    },
    ResetGame {
        code: String,
    },
    EndGame {
        code: String,
        reason: EndReason,
    },
    LeaveRoom {
        code: String,
        player_id: Uuid,
    },

    // Sessions
    ValidateSession {
        code: String,
        player_id: Option<Uuid>,
    },
    Reconnect {
        code: String,
        player_id: Uuid,
    },

    // Event channels
    Subscribe {
        code: String,
    },
    Unsubscribe {
        code: String,
    },

    // Connection
    Ping,
    Disconnect,
}

// -- Server -> Client Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    // Handshake
    Welcome {
        server_version: String,
    },
    HandshakeError {
        reason: String,
    },

    // Command replies
    RoomCreated {
        room: Room,
    },
    RoomState {
        room: Room,
    },
    Joined {
        session: PlayerSession,
    },
    RosterDealt {
        players: Vec<Player>,
    },
    RoomLeft,
    SessionValidated {
        valid: bool,
    },
    Reconnected {
        player: Player,
    },
    Subscribed {
        channel: String,
    },
    Unsubscribed {
        channel: String,
    },

    // Channel traffic
    RoomEvent {
        channel: String,
        event: RoomEvent,
    },

    // Errors
    Error {
        code: ErrorCode,
        message: String,
    },

    // Connection
    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    RoomNotFound,
    RoomFull,
    GameAlreadyStarted,
    GameNotStarted,
    RoomClosed,
    InsufficientPlayers,
    InvalidPlayerCount,
    InvalidRoleDistribution,
    InvalidSession,
    TooManyRequests,
    InternalError,
}

// -- Room events --

/// Why a game ended; carried on the game-ended event so clients can tell a
/// finished game from a torn-down room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    GameOver,
    HostEnded,
    HostLeft,
}

/// One notification on a room's channel. Every command that changes visible
/// room state publishes exactly one of these (plus a trailing `GameEnded`
/// when an elimination decides the game).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RoomEvent {
    PlayerJoined(Player),
    GameStarted(Vec<Player>),
    PlayerEliminated { player_id: Uuid },
    PlayerLeft { player_id: Uuid },
    GameEnded { reason: EndReason, winner: Option<Winner> },
    GameReset,
}

/// The channel subscribers bind to for one room's events.
pub fn channel_name(code: &RoomCode) -> String {
    format!("game-{}", code)
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    Ok(Bytes::from(json))
}

pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

// -- Transport helpers --

pub async fn send_message<T: Serialize>(
    transport: &mut Transport,
    msg: &T,
) -> anyhow::Result<()> {
    let bytes = serialize_message(msg).map_err(|e| anyhow::anyhow!("serialize error: {}", e))?;
    transport
        .send(bytes)
        .await
        .map_err(|e| anyhow::anyhow!("send error: {}", e))
}

pub async fn recv_message<T: for<'de> Deserialize<'de>>(
    transport: &mut Transport,
) -> anyhow::Result<Option<T>> {
    match transport.next().await {
        Some(Ok(frame)) => {
            let msg = deserialize_message(&frame)
                .map_err(|e| anyhow::anyhow!("deserialize error: {}", e))?;
            Ok(Some(msg))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("recv error: {}", e)),
        None => Ok(None),
    }
}
