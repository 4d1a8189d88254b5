use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;

use mafia_common::protocol::{channel_name, RoomEvent};
use mafia_common::room::RoomCode;

/// How many events a slow subscriber may fall behind before it starts
/// losing them.
pub const CHANNEL_CAPACITY: usize = 64;

/// Outbound fan-out for room events.
///
/// `publish` is deliberately synchronous: the service calls it while still
/// holding the room's lock, which is what pins event order to mutation
/// order. Delivery past that point is best-effort. `close` retires a
/// room's channel once the room itself is gone.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, code: &RoomCode, event: RoomEvent);
    fn close(&self, code: &RoomCode);
}

/// Per-room broadcast channels for in-process subscribers. Channels come to
/// life on first publish or subscribe and die when the room is closed.
pub struct ChannelBroadcaster {
    channels: RwLock<HashMap<String, broadcast::Sender<RoomEvent>>>,
    capacity: usize,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Join (or create) the channel for a room code.
    pub fn subscribe(&self, code: &RoomCode) -> broadcast::Receiver<RoomEvent> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(channel_name(code))
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn publish(&self, code: &RoomCode, event: RoomEvent) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let name = channel_name(code);
        let tx = channels
            .entry(name.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        if tx.send(event).is_err() {
            tracing::debug!("No subscribers on {}", name);
        }
    }

    /// Receivers drain whatever is already queued and then see `Closed`.
    fn close(&self, code: &RoomCode) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels.remove(&channel_name(code));
    }
}
