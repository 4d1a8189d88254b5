use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::player::Player;
use crate::role::Role;
use crate::room::RoomCode;

/// What a client holds on to between connections: its claim to a seat.
///
/// A session is a claim, not a credential. Validation checks that the code
/// names a live room and that the id is on its roster; there is no signed
/// token behind it, so anyone holding a code and a seat id can act for that
/// seat. Hosts are identified by the code alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSession {
    pub player_id: Uuid,
    pub player_name: String,
    pub room_code: RoomCode,
    pub role: Option<Role>,
}

impl PlayerSession {
    /// Snapshot the claim a joining or reconnecting client should keep.
    pub fn for_player(player: &Player, room_code: RoomCode) -> Self {
        Self {
            player_id: player.id,
            player_name: player.name.clone(),
            room_code,
            role: player.role,
        }
    }
}
