use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::broadcast::ChannelBroadcaster;
use crate::connection::{self, ConnectionHandle};
use crate::registry::RoomRegistry;
use crate::service::GameService;

#[derive(Debug, Clone, Copy)]
pub struct ServerLimits {
    pub max_connections: usize,
    pub commands_per_sec: u32,
}

pub struct ServerState {
    pub service: GameService,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub connections: RwLock<HashMap<Uuid, ConnectionHandle>>,
    pub limits: ServerLimits,
}

pub type SharedState = Arc<ServerState>;

pub async fn run(
    addr: SocketAddr,
    limits: ServerLimits,
    min_players: u8,
    max_players: u8,
) -> anyhow::Result<()> {
    let registry = Arc::new(RoomRegistry::new(min_players, max_players));
    let broadcaster = Arc::new(ChannelBroadcaster::default());
    let service = GameService::new(registry, broadcaster.clone());

    let state: SharedState = Arc::new(ServerState {
        service,
        broadcaster,
        connections: RwLock::new(HashMap::new()),
        limits,
    });

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;

        // Enforce max connections
        let conn_count = state.connections.read().await.len();
        if conn_count >= limits.max_connections {
            tracing::warn!(
                "Rejecting connection from {} (max {} reached)",
                peer_addr,
                limits.max_connections
            );
            drop(stream);
            continue;
        }

        tracing::info!(
            "New connection from {} ({}/{})",
            peer_addr,
            conn_count + 1,
            limits.max_connections
        );

        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = connection::handle_connection(stream, state).await {
                tracing::warn!("Connection error from {}: {}", peer_addr, e);
            }
        });
    }
}
