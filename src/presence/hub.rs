//! Presence hub task: the single owner of the roster

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

use super::broadcaster::{Outbox, PresenceBroadcaster};
use super::roster::Roster;

/// Commands processed by the hub, in arrival order
#[derive(Debug)]
pub enum PresenceCommand {
    /// A transport connection opened
    Connect {
        outbox: Outbox,
        reply: oneshot::Sender<Uuid>,
    },
    /// A participant reported its own position
    Position { id: Uuid, x: f64, y: f64 },
    /// A transport connection closed
    Disconnect { id: Uuid },
}

/// Handle to the running hub
#[derive(Clone)]
pub struct PresenceHandle {
    cmd_tx: mpsc::Sender<PresenceCommand>,
    participant_count: Arc<AtomicUsize>,
}

impl PresenceHandle {
    /// Register a connection. Returns `None` if the hub has shut down.
    pub async fn connect(&self, outbox: Outbox) -> Option<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(PresenceCommand::Connect { outbox, reply })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn report_position(&self, id: Uuid, x: f64, y: f64) {
        if self
            .cmd_tx
            .send(PresenceCommand::Position { id, x, y })
            .await
            .is_err()
        {
            debug!(peer_id = %id, "Presence hub closed, position dropped");
        }
    }

    pub async fn disconnect(&self, id: Uuid) {
        if self
            .cmd_tx
            .send(PresenceCommand::Disconnect { id })
            .await
            .is_err()
        {
            debug!(peer_id = %id, "Presence hub closed, disconnect dropped");
        }
    }

    pub fn participant_count(&self) -> usize {
        self.participant_count.load(Ordering::Relaxed)
    }

    /// True once the hub task has stopped
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// Serializes every roster mutation through one task
pub struct PresenceHub {
    broadcaster: PresenceBroadcaster,
    cmd_rx: mpsc::Receiver<PresenceCommand>,
    participant_count: Arc<AtomicUsize>,
}

impl PresenceHub {
    pub fn new(world_limit: f64) -> (Self, PresenceHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let participant_count = Arc::new(AtomicUsize::new(0));

        let handle = PresenceHandle {
            cmd_tx,
            participant_count: participant_count.clone(),
        };

        let hub = Self {
            broadcaster: PresenceBroadcaster::new(Roster::new(world_limit)),
            cmd_rx,
            participant_count,
        };

        (hub, handle)
    }

    /// Process commands until every handle has been dropped
    pub async fn run(mut self) {
        info!("Presence hub started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle(cmd);
        }

        info!("Presence hub stopped");
    }

    fn handle(&mut self, cmd: PresenceCommand) {
        match cmd {
            PresenceCommand::Connect { outbox, reply } => {
                let id = self.broadcaster.connect(outbox);
                if reply.send(id).is_err() {
                    // The connection vanished while waiting for its identity.
                    self.broadcaster.disconnect(id);
                }
            }
            PresenceCommand::Position { id, x, y } => {
                self.broadcaster.report_position(id, x, y);
            }
            PresenceCommand::Disconnect { id } => {
                self.broadcaster.disconnect(id);
            }
        }

        self.participant_count
            .store(self.broadcaster.participant_count(), Ordering::Relaxed);
    }
}
