use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;
use uuid::Uuid;

use mafia_common::player::Player;
use mafia_common::protocol::{EndReason, RoomEvent};
use mafia_common::room::{Room, RoomCode, RoomError};

use crate::broadcast::Broadcaster;
use crate::registry::RoomRegistry;

/// The command layer. Every room mutation enters here, takes the room's
/// lock, applies the state machine and publishes its event before the lock
/// is released, so events on a channel arrive in mutation order.
pub struct GameService {
    registry: Arc<RoomRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl GameService {
    pub fn new(registry: Arc<RoomRegistry>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            registry,
            broadcaster,
        }
    }

    async fn room(&self, code: &RoomCode) -> Result<Arc<Mutex<Room>>, RoomError> {
        self.registry.get(code).await.ok_or(RoomError::RoomNotFound)
    }

    pub async fn create_room(&self, host_name: String) -> Room {
        let room = self.registry.create(host_name).await;
        tracing::info!("Room {} created by '{}'", room.code, room.host_name);
        room
    }

    pub async fn get_room(&self, code: &RoomCode) -> Result<Room, RoomError> {
        let entry = self.room(code).await?;
        let room = entry.lock().await;
        Ok(room.clone())
    }

    pub async fn join_room(
        &self,
        code: &RoomCode,
        player_name: String,
    ) -> Result<Player, RoomError> {
        let entry = self.room(code).await?;
        let mut room = entry.lock().await;
        let player = room.add_player(player_name)?;
        self.broadcaster
            .publish(code, RoomEvent::PlayerJoined(player.clone()));
        tracing::info!(
            "'{}' joined room {} ({}/{} seats)",
            player.name,
            code,
            room.players.len(),
            room.max_players
        );
        Ok(player)
    }

    pub async fn start_game(&self, code: &RoomCode) -> Result<Vec<Player>, RoomError> {
        let entry = self.room(code).await?;
        let mut room = entry.lock().await;
        let mut rng = StdRng::from_entropy();
        let players = room.start(&mut rng)?.to_vec();
        self.broadcaster
            .publish(code, RoomEvent::GameStarted(players.clone()));
        tracing::info!("Room {} started with {} players", code, players.len());
        Ok(players)
    }

    /// Re-deal roles over the current roster. Subscribers get the same
    /// game-started event a fresh start produces, carrying the new roster.
    pub async fn shuffle_roles(&self, code: &RoomCode) -> Result<Vec<Player>, RoomError> {
        let entry = self.room(code).await?;
        let mut room = entry.lock().await;
        let mut rng = StdRng::from_entropy();
        let players = room.shuffle_roles(&mut rng)?.to_vec();
        self.broadcaster
            .publish(code, RoomEvent::GameStarted(players.clone()));
        tracing::info!("Room {} reshuffled roles", code);
        Ok(players)
    }

    /// Kill a seat and check the win condition. A decided game publishes
    /// the elimination and then the game-ended verdict, in that order.
    pub async fn eliminate_player(
        &self,
        code: &RoomCode,
        player_id: Uuid,
    ) -> Result<(), RoomError> {
        let entry = self.room(code).await?;
        let mut room = entry.lock().await;
        let Some(verdict) = room.eliminate(player_id)? else {
            tracing::debug!(
                "Eliminate in {} ignored: {} is not a living member",
                code,
                player_id
            );
            return Ok(());
        };

        self.broadcaster
            .publish(code, RoomEvent::PlayerEliminated { player_id });
        tracing::info!("Player {} eliminated in room {}", player_id, code);

        if verdict.game_over {
            room.end();
            self.broadcaster.publish(
                code,
                RoomEvent::GameEnded {
                    reason: EndReason::GameOver,
                    winner: verdict.winner,
                },
            );
            tracing::info!("Room {} game over, verdict: {:?}", code, verdict);
        }
        Ok(())
    }

    pub async fn reset_game(&self, code: &RoomCode) -> Result<(), RoomError> {
        let entry = self.room(code).await?;
        let mut room = entry.lock().await;
        room.reset()?;
        self.broadcaster.publish(code, RoomEvent::GameReset);
        tracing::info!("Room {} reset to the lobby", code);
        Ok(())
    }

    /// Tear a room down from any state: publish the end event, drop the
    /// room from the registry, close its channel.
    pub async fn end_game(&self, code: &RoomCode, reason: EndReason) -> Result<(), RoomError> {
        let entry = self.room(code).await?;
        {
            let mut room = entry.lock().await;
            room.end();
            self.broadcaster.publish(
                code,
                RoomEvent::GameEnded {
                    reason,
                    winner: None,
                },
            );
        }
        self.registry.remove(code).await;
        self.broadcaster.close(code);
        tracing::info!("Room {} ended ({:?})", code, reason);
        Ok(())
    }

    pub async fn leave_room(&self, code: &RoomCode, player_id: Uuid) -> Result<(), RoomError> {
        let entry = self.room(code).await?;
        let mut room = entry.lock().await;
        if room.leave(player_id)? {
            self.broadcaster
                .publish(code, RoomEvent::PlayerLeft { player_id });
            tracing::info!("Player {} left room {}", player_id, code);
        }
        Ok(())
    }

    // -- Sessions --

    /// Hosts are identified by possession of a live room's code; the
    /// "I created this" flag lives client-side (see mafia_common::session).
    pub async fn validate_host(&self, code: &RoomCode) -> bool {
        self.registry.contains(code).await
    }

    pub async fn validate_player(&self, code: &RoomCode, player_id: Uuid) -> bool {
        match self.registry.get(code).await {
            Some(entry) => entry.lock().await.has_player(player_id),
            None => false,
        }
    }

    /// Re-associate a client with its seat, returning the seat's current
    /// fields, including any role dealt while the client was away.
    pub async fn reconnect(&self, code: &RoomCode, player_id: Uuid) -> Result<Player, RoomError> {
        let entry = self.room(code).await?;
        let room = entry.lock().await;
        room.player(player_id)
            .cloned()
            .ok_or(RoomError::InvalidSession)
    }
}
