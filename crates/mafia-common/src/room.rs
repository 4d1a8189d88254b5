use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::Player;
use crate::role::{self, RoleError};
use crate::win::{self, Verdict};

// -- Room codes --

/// Characters a room code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CODE_LEN: usize = 6;

/// Six uppercase alphanumeric characters naming one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Draw a fresh code. Uniqueness against live rooms is the registry's
    /// job; it redraws on collision.
    pub fn random(rng: &mut impl Rng) -> Self {
        let code = (0..CODE_LEN)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Normalize client input: trim, uppercase, check the shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim().to_ascii_uppercase();
        if code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
            Some(Self(code))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -- Room state machine --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Started,
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub code: RoomCode,
    pub host_name: String,
    pub players: Vec<Player>,
    pub status: RoomStatus,
    pub min_players: u8,
    pub max_players: u8,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(code: RoomCode, host_name: String, min_players: u8, max_players: u8) -> Self {
        Self {
            code,
            host_name,
            players: Vec::new(),
            status: RoomStatus::Waiting,
            min_players,
            max_players,
            created_at: Utc::now(),
        }
    }

    // -- Roster --

    /// Seat a new player. Join order is kept; it is the order role cards
    /// are handed out in.
    pub fn add_player(&mut self, name: String) -> Result<Player, RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::GameAlreadyStarted);
        }
        if self.players.len() >= self.max_players as usize {
            return Err(RoomError::RoomFull(self.max_players));
        }
        let player = Player::new(name);
        self.players.push(player.clone());
        Ok(player)
    }

    /// Drop a seat by id. Removing a stranger changes nothing; the return
    /// value says whether the roster shrank.
    pub fn remove_player(&mut self, player_id: Uuid) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != player_id);
        self.players.len() != before
    }

    pub fn player(&self, player_id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn has_player(&self, player_id: Uuid) -> bool {
        self.player(player_id).is_some()
    }

    // -- Lifecycle --

    /// Deal roles over the whole roster and move to Started.
    pub fn start(&mut self, rng: &mut impl Rng) -> Result<&[Player], RoomError> {
        if self.status != RoomStatus::Waiting {
            return Err(RoomError::GameAlreadyStarted);
        }
        if self.players.len() < self.min_players as usize {
            return Err(RoomError::InsufficientPlayers(self.min_players));
        }
        self.deal_roles(rng)?;
        self.status = RoomStatus::Started;
        Ok(&self.players)
    }

    /// Re-deal roles mid-game. Everyone comes back alive: a reshuffle
    /// starts a fresh round with the same roster.
    pub fn shuffle_roles(&mut self, rng: &mut impl Rng) -> Result<&[Player], RoomError> {
        if self.status != RoomStatus::Started {
            return Err(RoomError::GameNotStarted);
        }
        self.deal_roles(rng)?;
        Ok(&self.players)
    }

    fn deal_roles(&mut self, rng: &mut impl Rng) -> Result<(), RoomError> {
        let assigned = role::assign_roles(&self.players, rng)?;
        role::validate_distribution(&assigned)?;
        self.players = assigned;
        Ok(())
    }

    /// Mark a living member dead and check the win condition. Unknown or
    /// already-dead targets change nothing and return `None`.
    pub fn eliminate(&mut self, player_id: Uuid) -> Result<Option<Verdict>, RoomError> {
        if self.status != RoomStatus::Started {
            return Err(RoomError::GameNotStarted);
        }
        match self
            .players
            .iter_mut()
            .find(|p| p.id == player_id && p.is_alive)
        {
            Some(p) => {
                p.is_alive = false;
                Ok(Some(win::evaluate(&self.players)))
            }
            None => Ok(None),
        }
    }

    /// Back to the lobby with the roster intact: roles are cleared and
    /// everyone is alive again.
    pub fn reset(&mut self) -> Result<(), RoomError> {
        if self.status != RoomStatus::Started {
            return Err(RoomError::GameNotStarted);
        }
        for p in &mut self.players {
            p.role = None;
            p.is_alive = true;
        }
        self.status = RoomStatus::Waiting;
        Ok(())
    }

    /// Leaving is allowed right up until the room has ended.
    pub fn leave(&mut self, player_id: Uuid) -> Result<bool, RoomError> {
        if self.status == RoomStatus::Ended {
            return Err(RoomError::RoomClosed);
        }
        Ok(self.remove_player(player_id))
    }

    pub fn end(&mut self) {
        self.status = RoomStatus::Ended;
    }
}

// -- Errors --

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room not found")]
    RoomNotFound,
    #[error("room is full (max {0} players)")]
    RoomFull(u8),
    #[error("game already started")]
    GameAlreadyStarted,
    #[error("game has not started")]
    GameNotStarted,
    #[error("room has ended")]
    RoomClosed,
    #[error("need at least {0} players to start")]
    InsufficientPlayers(u8),
    #[error("no matching session in this room")]
    InvalidSession,
    #[error(transparent)]
    Role(#[from] RoleError),
}
