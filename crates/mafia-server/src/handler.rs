use uuid::Uuid;

use mafia_common::protocol::{channel_name, ClientMessage, EndReason, ErrorCode, ServerMessage};
use mafia_common::role::RoleError;
use mafia_common::room::{RoomCode, RoomError};
use mafia_common::session::PlayerSession;

use crate::connection;
use crate::server::SharedState;

pub async fn handle_message(
    conn_id: Uuid,
    msg: ClientMessage,
    state: &SharedState,
) -> anyhow::Result<()> {
    match msg {
        ClientMessage::Hello { .. } => {
            // Already greeted during the handshake.
        }

        ClientMessage::CreateRoom { host_name } => {
            let room = state.service.create_room(host_name).await;

            // Remember the hosted code so a dropped host tears the room down
            {
                let mut conns = state.connections.write().await;
                if let Some(conn) = conns.get_mut(&conn_id) {
                    conn.hosting = Some(room.code.clone());
                }
            }

            reply(conn_id, ServerMessage::RoomCreated { room }, state).await;
        }

        ClientMessage::GetRoom { code } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            match state.service.get_room(&code).await {
                Ok(room) => reply(conn_id, ServerMessage::RoomState { room }, state).await,
                Err(e) => reply_error(conn_id, &e, state).await,
            }
        }

        ClientMessage::JoinRoom { code, player_name } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            match state.service.join_room(&code, player_name).await {
                Ok(player) => {
                    let session = PlayerSession::for_player(&player, code);
                    reply(conn_id, ServerMessage::Joined { session }, state).await;
                }
                Err(e) => reply_error(conn_id, &e, state).await,
            }
        }

        ClientMessage::StartGame { code } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            match state.service.start_game(&code).await {
                Ok(players) => {
                    reply(conn_id, ServerMessage::RosterDealt { players }, state).await;
                }
                Err(e) => reply_error(conn_id, &e, state).await,
            }
        }

        ClientMessage::ShuffleRoles { code } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            match state.service.shuffle_roles(&code).await {
                Ok(players) => {
                    reply(conn_id, ServerMessage::RosterDealt { players }, state).await;
                }
                Err(e) => reply_error(conn_id, &e, state).await,
            }
        }

        ClientMessage::EliminatePlayer { code, player_id } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            // Success shows up as events on the room channel.
            if let Err(e) = state.service.eliminate_player(&code, player_id).await {
                reply_error(conn_id, &e, state).await;
            }
        }

        ClientMessage::ResetGame { code } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            if let Err(e) = state.service.reset_game(&code).await {
                reply_error(conn_id, &e, state).await;
            }
        }

        ClientMessage::EndGame { code, reason } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            match state.service.end_game(&code, reason).await {
                Ok(()) => {
                    let mut conns = state.connections.write().await;
                    if let Some(conn) = conns.get_mut(&conn_id) {
                        if conn.hosting.as_ref() == Some(&code) {
                            conn.hosting = None;
                        }
                    }
                }
                Err(e) => reply_error(conn_id, &e, state).await,
            }
        }

        ClientMessage::LeaveRoom { code, player_id } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            match state.service.leave_room(&code, player_id).await {
                Ok(()) => reply(conn_id, ServerMessage::RoomLeft, state).await,
                Err(e) => reply_error(conn_id, &e, state).await,
            }
        }

        ClientMessage::ValidateSession { code, player_id } => {
            // Validation answers a question, it never errors; a malformed
            // code is just an invalid session.
            let valid = match RoomCode::parse(&code) {
                Some(code) => match player_id {
                    Some(id) => state.service.validate_player(&code, id).await,
                    None => state.service.validate_host(&code).await,
                },
                None => false,
            };
            reply(conn_id, ServerMessage::SessionValidated { valid }, state).await;
        }

        ClientMessage::Reconnect { code, player_id } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            match state.service.reconnect(&code, player_id).await {
                Ok(player) => reply(conn_id, ServerMessage::Reconnected { player }, state).await,
                Err(e) => reply_error(conn_id, &e, state).await,
            }
        }

        ClientMessage::Subscribe { code } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            // Only live rooms get channels
            if let Err(e) = state.service.get_room(&code).await {
                reply_error(conn_id, &e, state).await;
                return Ok(());
            }
            let channel = channel_name(&code);
            let events = state.broadcaster.subscribe(&code);

            {
                let mut conns = state.connections.write().await;
                if let Some(conn) = conns.get_mut(&conn_id) {
                    let task = tokio::spawn(connection::forward_events(
                        channel.clone(),
                        events,
                        conn.tx.clone(),
                    ));
                    // A repeat subscribe replaces the old forwarder
                    if let Some(old) = conn.subscriptions.insert(channel.clone(), task) {
                        old.abort();
                    }
                }
            }

            reply(conn_id, ServerMessage::Subscribed { channel }, state).await;
        }

        ClientMessage::Unsubscribe { code } => {
            let Some(code) = parse_code(conn_id, &code, state).await else {
                return Ok(());
            };
            let channel = channel_name(&code);

            {
                let mut conns = state.connections.write().await;
                if let Some(conn) = conns.get_mut(&conn_id) {
                    if let Some(task) = conn.subscriptions.remove(&channel) {
                        task.abort();
                    }
                }
            }

            reply(conn_id, ServerMessage::Unsubscribed { channel }, state).await;
        }

        ClientMessage::Ping => {
            reply(conn_id, ServerMessage::Pong, state).await;
        }

        ClientMessage::Disconnect => {
            // The connection loop breaks on Disconnect before dispatching.
        }
    }

    Ok(())
}

pub async fn handle_disconnect(conn_id: Uuid, state: &SharedState) {
    let removed = state.connections.write().await.remove(&conn_id);
    let Some(handle) = removed else { return };

    for (_, task) in handle.subscriptions {
        task.abort();
    }

    // A dropped host takes its room with it. Player seats stay on the
    // roster so the client can reconnect.
    if let Some(code) = handle.hosting {
        tracing::info!("Host of room {} disconnected, ending the room", code);
        if let Err(e) = state.service.end_game(&code, EndReason::HostLeft).await {
            tracing::debug!("Host-left cleanup for {}: {}", code, e);
        }
    }
}

async fn parse_code(conn_id: Uuid, raw: &str, state: &SharedState) -> Option<RoomCode> {
    match RoomCode::parse(raw) {
        Some(code) => Some(code),
        None => {
            reply(
                conn_id,
                ServerMessage::Error {
                    code: ErrorCode::RoomNotFound,
                    message: format!("Malformed room code '{}'", raw),
                },
                state,
            )
            .await;
            None
        }
    }
}

async fn reply(conn_id: Uuid, msg: ServerMessage, state: &SharedState) {
    // The send happens outside the lock: a slow client only stalls itself.
    let tx = {
        let conns = state.connections.read().await;
        conns.get(&conn_id).map(|conn| conn.tx.clone())
    };
    if let Some(tx) = tx {
        let _ = tx.send(msg).await;
    }
}

async fn reply_error(conn_id: Uuid, err: &RoomError, state: &SharedState) {
    reply(
        conn_id,
        ServerMessage::Error {
            code: room_error_code(err),
            message: err.to_string(),
        },
        state,
    )
    .await;
}

fn room_error_code(e: &RoomError) -> ErrorCode {
    match e {
        RoomError::RoomNotFound => ErrorCode::RoomNotFound,
        RoomError::RoomFull(_) => ErrorCode::RoomFull,
        RoomError::GameAlreadyStarted => ErrorCode::GameAlreadyStarted,
        RoomError::GameNotStarted => ErrorCode::GameNotStarted,
        RoomError::RoomClosed => ErrorCode::RoomClosed,
        RoomError::InsufficientPlayers(_) => ErrorCode::InsufficientPlayers,
        RoomError::InvalidSession => ErrorCode::InvalidSession,
        RoomError::Role(RoleError::InvalidPlayerCount(_)) => ErrorCode::InvalidPlayerCount,
        RoomError::Role(RoleError::InvalidRoleDistribution(_)) => {
            ErrorCode::InvalidRoleDistribution
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{mpsc, RwLock};

    use mafia_common::protocol::RoomEvent;

    use crate::broadcast::ChannelBroadcaster;
    use crate::connection::ConnectionHandle;
    use crate::registry::RoomRegistry;
    use crate::server::{ServerLimits, ServerState};
    use crate::service::GameService;

    fn make_state() -> (SharedState, Arc<ChannelBroadcaster>) {
        let registry = Arc::new(RoomRegistry::new(6, 15));
        let broadcaster = Arc::new(ChannelBroadcaster::default());
        let service = GameService::new(registry, broadcaster.clone());
        let state: SharedState = Arc::new(ServerState {
            service,
            broadcaster: broadcaster.clone(),
            connections: RwLock::new(HashMap::new()),
            limits: ServerLimits {
                max_connections: 100,
                commands_per_sec: 10,
            },
        });
        (state, broadcaster)
    }

    async fn register(
        state: &SharedState,
        capacity: usize,
    ) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(capacity);
        let handle = ConnectionHandle {
            conn_id,
            tx,
            hosting: None,
            subscriptions: HashMap::new(),
        };
        state.connections.write().await.insert(conn_id, handle);
        (conn_id, rx)
    }

    #[tokio::test]
    async fn test_host_disconnect_ends_the_hosted_room() {
        let (state, broadcaster) = make_state();
        let (host_id, _host_rx) = register(&state, 8).await;

        let room = state.service.create_room("Alice".into()).await;
        {
            let mut conns = state.connections.write().await;
            conns.get_mut(&host_id).unwrap().hosting = Some(room.code.clone());
        }

        let mut rx = broadcaster.subscribe(&room.code);
        handle_disconnect(host_id, &state).await;

        assert!(matches!(
            state.service.get_room(&room.code).await,
            Err(RoomError::RoomNotFound)
        ));
        assert_eq!(
            rx.recv().await.unwrap(),
            RoomEvent::GameEnded {
                reason: EndReason::HostLeft,
                winner: None,
            }
        );
        assert!(!state.connections.read().await.contains_key(&host_id));
    }

    #[tokio::test]
    async fn test_player_disconnect_keeps_the_room() {
        let (state, _broadcaster) = make_state();
        let (host_id, _host_rx) = register(&state, 8).await;

        let room = state.service.create_room("Alice".into()).await;
        {
            let mut conns = state.connections.write().await;
            conns.get_mut(&host_id).unwrap().hosting = Some(room.code.clone());
        }

        let (player_conn, _player_rx) = register(&state, 8).await;
        state
            .service
            .join_room(&room.code, "Bob".into())
            .await
            .unwrap();

        handle_disconnect(player_conn, &state).await;

        // The seat stays so the client can reconnect; only the host's
        // disconnect tears the room down.
        let stored = state.service.get_room(&room.code).await.unwrap();
        assert_eq!(stored.players.len(), 1);
        assert!(state.connections.read().await.contains_key(&host_id));
    }

    #[tokio::test]
    async fn test_subscribe_to_unknown_room_is_rejected() {
        let (state, _broadcaster) = make_state();
        let (conn_id, mut rx) = register(&state, 8).await;

        handle_message(
            conn_id,
            ClientMessage::Subscribe {
                code: "NOROOM".into(),
            },
            &state,
        )
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            ServerMessage::Error { code, .. } => assert_eq!(code, ErrorCode::RoomNotFound),
            other => panic!("expected error, got {:?}", other),
        }
        let conns = state.connections.read().await;
        assert!(conns.get(&conn_id).unwrap().subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_forwards_room_events() {
        let (state, _broadcaster) = make_state();
        let (conn_id, mut rx) = register(&state, 8).await;
        let room = state.service.create_room("Alice".into()).await;

        handle_message(
            conn_id,
            ClientMessage::Subscribe {
                code: room.code.as_str().into(),
            },
            &state,
        )
        .await
        .unwrap();

        match rx.recv().await.unwrap() {
            ServerMessage::Subscribed { channel } => {
                assert_eq!(channel, channel_name(&room.code));
            }
            other => panic!("expected subscribed, got {:?}", other),
        }

        state
            .service
            .join_room(&room.code, "Bob".into())
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            ServerMessage::RoomEvent { channel, event } => {
                assert_eq!(channel, channel_name(&room.code));
                assert!(matches!(event, RoomEvent::PlayerJoined(_)));
            }
            other => panic!("expected room event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reply_to_stalled_client_does_not_hold_the_table() {
        let (state, _broadcaster) = make_state();
        let (stalled_id, _stalled_rx) = register(&state, 1).await;

        // Fill the stalled connection's queue so the next send pends.
        {
            let conns = state.connections.read().await;
            conns
                .get(&stalled_id)
                .unwrap()
                .tx
                .send(ServerMessage::Pong)
                .await
                .unwrap();
        }

        let pending = tokio::spawn({
            let state = state.clone();
            async move { reply(stalled_id, ServerMessage::Pong, &state).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The write lock must stay reachable while that send pends.
        let lock = tokio::time::timeout(Duration::from_millis(100), state.connections.write())
            .await;
        assert!(lock.is_ok());
        drop(lock);
        pending.abort();
    }
}
