use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{Mutex, RwLock};

use mafia_common::room::{Room, RoomCode};

/// Authoritative table of live rooms.
///
/// The outer lock only guards creation, lookup and removal. Room state is
/// reached through the per-room mutex, which serializes every command for
/// one code (see service.rs).
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomCode, Arc<Mutex<Room>>>>,
    min_players: u8,
    max_players: u8,
}

impl RoomRegistry {
    pub fn new(min_players: u8, max_players: u8) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            min_players,
            max_players,
        }
    }

    /// Create a room under a code no live room is using. The draw happens
    /// under the write lock, so a collision with a concurrent create is
    /// impossible; a collision with an existing room redraws.
    pub async fn create(&self, host_name: String) -> Room {
        let mut rooms = self.rooms.write().await;
        let mut rng = StdRng::from_entropy();
        let code = loop {
            let candidate = RoomCode::random(&mut rng);
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        let room = Room::new(code.clone(), host_name, self.min_players, self.max_players);
        rooms.insert(code, Arc::new(Mutex::new(room.clone())));
        room
    }

    pub async fn get(&self, code: &RoomCode) -> Option<Arc<Mutex<Room>>> {
        self.rooms.read().await.get(code).cloned()
    }

    pub async fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.read().await.contains_key(code)
    }

    pub async fn remove(&self, code: &RoomCode) {
        self.rooms.write().await.remove(code);
    }
}
