//! Fan-out of roster changes to connected participants

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::{PeerInfo, ServerMsg};

use super::roster::Roster;

/// Outbound message queue of a single connection
pub type Outbox = mpsc::UnboundedSender<ServerMsg>;

/// Owns the roster and the outbox of every live connection.
///
/// All methods take `&mut self`; the owner is expected to serialize calls
/// (see [`super::PresenceHub`]).
pub struct PresenceBroadcaster {
    roster: Roster,
    outboxes: HashMap<Uuid, Outbox>,
}

impl PresenceBroadcaster {
    pub fn new(roster: Roster) -> Self {
        Self {
            roster,
            outboxes: HashMap::new(),
        }
    }

    /// Admit a new connection.
    ///
    /// The newcomer receives its identity and then the pre-join roster;
    /// everyone else receives a join notification.
    pub fn connect(&mut self, outbox: Outbox) -> Uuid {
        let id = self.roster.connect();
        let pos = self.roster.position(id).unwrap_or_default();
        let existing = self.roster.snapshot(id);

        let _ = outbox.send(ServerMsg::Id { id });
        let _ = outbox.send(ServerMsg::Players { players: existing });

        self.broadcast_except(id, ServerMsg::Join { id, pos });
        self.outboxes.insert(id, outbox);

        info!(
            peer_id = %id,
            participants = self.roster.len(),
            "Participant joined"
        );
        id
    }

    /// Drop a connection and tell everyone else. Unknown identities are ignored.
    pub fn disconnect(&mut self, id: Uuid) {
        self.outboxes.remove(&id);
        if !self.roster.disconnect(id) {
            debug!(peer_id = %id, "Disconnect for unknown participant");
            return;
        }

        self.broadcast_except(id, ServerMsg::Leave { id });

        info!(
            peer_id = %id,
            participants = self.roster.len(),
            "Participant left"
        );
    }

    /// Apply a position report and relay the clamped value to everyone but the sender
    pub fn report_position(&mut self, id: Uuid, x: f64, y: f64) {
        match self.roster.update_position(id, x, y) {
            Some(pos) => self.broadcast_except(id, ServerMsg::Pos { id, pos }),
            None => debug!(peer_id = %id, x, y, "Dropped position report"),
        }
    }

    pub fn snapshot(&self, excluding: Uuid) -> Vec<PeerInfo> {
        self.roster.snapshot(excluding)
    }

    pub fn participant_count(&self) -> usize {
        self.roster.len()
    }

    fn broadcast_except(&self, sender: Uuid, msg: ServerMsg) {
        for (id, outbox) in &self.outboxes {
            if *id == sender {
                continue;
            }
            // A closed outbox means the connection is going away; its
            // disconnect will arrive separately.
            let _ = outbox.send(msg.clone());
        }
    }
}

impl Default for PresenceBroadcaster {
    fn default() -> Self {
        Self::new(Roster::default())
    }
}
