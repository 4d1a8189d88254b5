use std::collections::HashMap;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use mafia_common::protocol::{
    self, framed_transport, serialize_message, ClientMessage, ErrorCode, RoomEvent, ServerMessage,
};
use mafia_common::room::RoomCode;

use crate::handler;
use crate::limiter::CommandLimiter;
use crate::server::SharedState;

pub struct ConnectionHandle {
    pub conn_id: Uuid,
    pub tx: mpsc::Sender<ServerMessage>,
    /// Room this connection created, if any. Dropping the connection tears
    /// that room down.
    pub hosting: Option<RoomCode>,
    /// Live event subscriptions, forwarder task per channel name.
    pub subscriptions: HashMap<String, JoinHandle<()>>,
}

pub async fn handle_connection(stream: TcpStream, state: SharedState) -> anyhow::Result<()> {
    let mut transport = framed_transport(stream);

    // Step 1: Handshake -- expect Hello
    let hello: ClientMessage = match protocol::recv_message(&mut transport).await? {
        Some(msg) => msg,
        None => return Ok(()),
    };

    let conn_id = match hello {
        ClientMessage::Hello { version } => {
            let id = Uuid::new_v4();
            tracing::info!("Client {} connected (client version: {})", id, version);
            protocol::send_message(
                &mut transport,
                &ServerMessage::Welcome {
                    server_version: env!("CARGO_PKG_VERSION").to_string(),
                },
            )
            .await?;
            id
        }
        _ => {
            protocol::send_message(
                &mut transport,
                &ServerMessage::HandshakeError {
                    reason: "Expected Hello message".into(),
                },
            )
            .await?;
            return Ok(());
        }
    };

    // Step 2: Create mpsc channel for outbound messages
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    // Register connection
    {
        let handle = ConnectionHandle {
            conn_id,
            tx: tx.clone(),
            hosting: None,
            subscriptions: HashMap::new(),
        };
        state.connections.write().await.insert(conn_id, handle);
    }

    // Step 3: Split transport for independent read/write
    let (mut sink, mut stream) = transport.split();

    // Writer task: drains rx and writes to sink
    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serialize_message(&msg) {
                Ok(bytes) => {
                    if sink.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                }
            }
        }
    });

    // Step 4: Reader loop
    let mut limiter = CommandLimiter::new(state.limits.commands_per_sec);
    loop {
        match stream.next().await {
            Some(Ok(frame)) => match protocol::deserialize_message::<ClientMessage>(&frame) {
                Ok(ClientMessage::Disconnect) => {
                    tracing::info!("Client {} asked to disconnect", conn_id);
                    break;
                }
                Ok(msg) => {
                    if !limiter.allow() {
                        let _ = tx
                            .send(ServerMessage::Error {
                                code: ErrorCode::TooManyRequests,
                                message: "Too many requests, slow down".into(),
                            })
                            .await;
                        continue;
                    }
                    if let Err(e) = handler::handle_message(conn_id, msg, &state).await {
                        tracing::error!("Handler error for {}: {}", conn_id, e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse message from {}: {}", conn_id, e);
                }
            },
            Some(Err(e)) => {
                tracing::warn!("Read error from {}: {}", conn_id, e);
                break;
            }
            None => {
                tracing::info!("Client {} disconnected", conn_id);
                break;
            }
        }
    }

    // Cleanup
    handler::handle_disconnect(conn_id, &state).await;
    write_task.abort();
    Ok(())
}

/// Pump one room channel into one connection's outbound queue. Runs until
/// the channel closes (room ended) or the connection goes away.
pub async fn forward_events(
    channel: String,
    mut events: broadcast::Receiver<RoomEvent>,
    tx: mpsc::Sender<ServerMessage>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let msg = ServerMessage::RoomEvent {
                    channel: channel.clone(),
                    event,
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("Subscriber lagged on {}, skipped {} events", channel, missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
