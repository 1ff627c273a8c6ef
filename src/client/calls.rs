//! Peer-to-peer audio call lifecycle

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Call setup failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallError {
    #[error("Audio capture unavailable: {0}")]
    Capture(String),

    #[error("Call negotiation failed: {0}")]
    Negotiation(String),

    #[error("Broker not registered")]
    NotRegistered,
}

/// Which side started the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallDirection {
    Outbound,
    Answered,
}

/// A call offered to us by another participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingCall {
    /// Identity of the caller
    pub from: Uuid,
    /// Broker-assigned call token
    pub call_id: Uuid,
}

/// The peer-connection broker that negotiates media sessions.
///
/// Identities are the same as the roster's. Inbound calls are delivered by
/// the broker implementation on a channel of [`IncomingCall`]s.
pub trait PeerBroker: Clone + Send + Sync + 'static {
    /// Local capture stream handed to the other side
    type Local: Send + 'static;
    /// Stream received from a peer
    type Remote: Send + 'static;

    /// Bind the broker to our identity
    fn register(&self, id: Uuid);

    /// Tear down the current identity and every session under it
    fn destroy(&self);

    fn capture_audio(&self) -> impl Future<Output = Result<Self::Local, CallError>> + Send;

    fn call(
        &self,
        target: Uuid,
        local: Self::Local,
    ) -> impl Future<Output = Result<Self::Remote, CallError>> + Send;

    fn answer(
        &self,
        call: IncomingCall,
        local: Self::Local,
    ) -> impl Future<Output = Result<Self::Remote, CallError>> + Send;
}

/// Result of one call attempt, reported back to the event loop
#[derive(Debug)]
pub struct CallOutcome<R> {
    pub peer: Uuid,
    pub direction: CallDirection,
    /// Session generation the attempt belongs to
    pub epoch: u64,
    pub result: Result<R, CallError>,
}

/// Spawns one task per call attempt and tracks them for cancellation
pub struct CallController<B: PeerBroker> {
    broker: B,
    epoch: u64,
    pending: HashMap<(Uuid, CallDirection), JoinHandle<()>>,
    outcome_tx: mpsc::UnboundedSender<CallOutcome<B::Remote>>,
}

impl<B: PeerBroker> CallController<B> {
    pub fn new(broker: B) -> (Self, mpsc::UnboundedReceiver<CallOutcome<B::Remote>>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let controller = Self {
            broker,
            epoch: 0,
            pending: HashMap::new(),
            outcome_tx,
        };
        (controller, outcome_rx)
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Capture local audio and call `target`
    pub fn start_call(&mut self, target: Uuid) {
        info!(peer_id = %target, "Calling peer");
        let broker = self.broker.clone();
        self.spawn(target, CallDirection::Outbound, async move {
            let local = broker.capture_audio().await?;
            broker.call(target, local).await
        });
    }

    /// Answer an inbound call with local audio
    pub fn answer(&mut self, call: IncomingCall) {
        info!(peer_id = %call.from, "Answering call");
        let broker = self.broker.clone();
        self.spawn(call.from, CallDirection::Answered, async move {
            let local = broker.capture_audio().await?;
            broker.answer(call, local).await
        });
    }

    /// Forget a completed attempt
    pub fn finish(&mut self, peer: Uuid, direction: CallDirection) {
        self.pending.remove(&(peer, direction));
    }

    /// Abort every in-flight attempt involving `peer`
    pub fn abandon(&mut self, peer: Uuid) {
        for direction in [CallDirection::Outbound, CallDirection::Answered] {
            if let Some(task) = self.pending.remove(&(peer, direction)) {
                task.abort();
                debug!(peer_id = %peer, ?direction, "Abandoned call attempt");
            }
        }
    }

    /// Abort everything and start a new generation; outcomes from older
    /// generations must be discarded by the receiver.
    pub fn reset(&mut self) {
        for (_, task) in self.pending.drain() {
            task.abort();
        }
        self.epoch += 1;
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn is_in_flight(&self, peer: Uuid) -> bool {
        self.pending.contains_key(&(peer, CallDirection::Outbound))
            || self.pending.contains_key(&(peer, CallDirection::Answered))
    }

    fn spawn<Fut>(&mut self, peer: Uuid, direction: CallDirection, attempt: Fut)
    where
        Fut: Future<Output = Result<B::Remote, CallError>> + Send + 'static,
    {
        let outcome_tx = self.outcome_tx.clone();
        let epoch = self.epoch;

        let task = tokio::spawn(async move {
            let result = attempt.await;
            let _ = outcome_tx.send(CallOutcome {
                peer,
                direction,
                epoch,
                result,
            });
        });

        if let Some(previous) = self.pending.insert((peer, direction), task) {
            previous.abort();
            warn!(peer_id = %peer, ?direction, "Replaced in-flight call attempt");
        }
    }
}

impl<B: PeerBroker> Drop for CallController<B> {
    fn drop(&mut self) {
        for (_, task) in self.pending.drain() {
            task.abort();
        }
    }
}

/// Placeholder media stream carrying no audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilentStream {
    pub id: Uuid,
    /// Peer on the other end, for remote streams
    pub peer: Option<Uuid>,
}

/// In-process broker producing silent streams.
///
/// Lets the headless client and tests exercise the call lifecycle without a
/// media stack. `failing` makes every negotiation fail.
#[derive(Debug, Clone)]
pub struct SilentBroker {
    latency: Duration,
    fail: bool,
    registered: std::sync::Arc<parking_lot::Mutex<Option<Uuid>>>,
}

impl SilentBroker {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            fail: false,
            registered: Default::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn identity(&self) -> Option<Uuid> {
        *self.registered.lock()
    }

    async fn negotiate(&self, peer: Uuid) -> Result<SilentStream, CallError> {
        if self.identity().is_none() {
            return Err(CallError::NotRegistered);
        }
        tokio::time::sleep(self.latency).await;
        if self.fail {
            return Err(CallError::Negotiation(format!("peer {} unreachable", peer)));
        }
        Ok(SilentStream {
            id: Uuid::new_v4(),
            peer: Some(peer),
        })
    }
}

impl Default for SilentBroker {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl PeerBroker for SilentBroker {
    type Local = SilentStream;
    type Remote = SilentStream;

    fn register(&self, id: Uuid) {
        *self.registered.lock() = Some(id);
    }

    fn destroy(&self) {
        *self.registered.lock() = None;
    }

    fn capture_audio(&self) -> impl Future<Output = Result<SilentStream, CallError>> + Send {
        let fail = self.fail;
        async move {
            if fail {
                return Err(CallError::Capture("no input device".to_string()));
            }
            Ok(SilentStream {
                id: Uuid::new_v4(),
                peer: None,
            })
        }
    }

    fn call(
        &self,
        target: Uuid,
        _local: SilentStream,
    ) -> impl Future<Output = Result<SilentStream, CallError>> + Send {
        let broker = self.clone();
        async move { broker.negotiate(target).await }
    }

    fn answer(
        &self,
        call: IncomingCall,
        _local: SilentStream,
    ) -> impl Future<Output = Result<SilentStream, CallError>> + Send {
        let broker = self.clone();
        async move { broker.negotiate(call.from).await }
    }
}
