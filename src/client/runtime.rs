//! WebSocket event loop driving a [`ClientSession`]

use futures::{SinkExt, StreamExt};
use std::future::pending;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::util::time::{frame_period, FrameClock};
use crate::ws::protocol::{ClientMsg, ServerMsg};

use super::calls::{CallOutcome, IncomingCall, PeerBroker};
use super::input::{PointerState, Viewport};
use super::session::ClientSession;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How often the session state is summarized at debug level
const SUMMARY_PERIOD: Duration = Duration::from_secs(5);

/// Transport-level client failures
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Failed to encode message: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Owns the session and every input feeding it
pub struct ClientRuntime<B: PeerBroker> {
    config: ClientConfig,
    session: ClientSession<B>,
    outbound_rx: mpsc::UnboundedReceiver<ClientMsg>,
    outcomes: mpsc::UnboundedReceiver<CallOutcome<B::Remote>>,
    incoming: mpsc::UnboundedReceiver<IncomingCall>,
    pointer: watch::Receiver<PointerState>,
    viewport: Viewport,
}

impl<B: PeerBroker> ClientRuntime<B> {
    /// `incoming` carries calls offered by the broker; `pointer` is the
    /// host's live mouse/touch state in canvas pixels.
    pub fn new(
        config: ClientConfig,
        broker: B,
        incoming: mpsc::UnboundedReceiver<IncomingCall>,
        pointer: watch::Receiver<PointerState>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (session, outcomes) = ClientSession::new(&config, broker, outbound_tx);

        Self {
            config,
            session,
            outbound_rx,
            outcomes,
            incoming,
            pointer,
            viewport: Viewport::default(),
        }
    }

    pub fn session(&self) -> &ClientSession<B> {
        &self.session
    }

    /// Connect, and reconnect after every drop. Never returns.
    pub async fn run(mut self) {
        loop {
            match self.run_connection().await {
                Ok(()) => info!("Connection closed by server"),
                Err(e) => warn!(error = %e, "Connection lost"),
            }
            sleep(self.config.reconnect_delay).await;
        }
    }

    /// Run a single connection until it closes.
    ///
    /// The session is torn down when the connection ends, so nothing from it
    /// leaks into the next one.
    pub async fn run_connection(&mut self) -> Result<(), ClientError> {
        let (ws, _) = connect_async(self.config.server_url.as_str()).await?;
        info!(url = %self.config.server_url, "Connected to presence server");

        let result = self.drive(ws).await;
        self.session.reset();
        result
    }

    async fn drive(&mut self, ws: WsStream) -> Result<(), ClientError> {
        let (mut ws_sink, mut ws_stream) = ws.split();

        // Reports queued while disconnected describe a session that no longer exists
        while self.outbound_rx.try_recv().is_ok() {}

        let mut frames = interval(frame_period(self.config.frame_rate));
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut clock = FrameClock::new();
        let mut summary = interval(SUMMARY_PERIOD);

        loop {
            let deadline = self.session.report_deadline();

            tokio::select! {
                now = frames.tick() => {
                    let dt = clock.tick(now);
                    let goal = self.pointer.borrow().goal(&self.viewport);
                    self.session.frame(now, dt, goal);
                }
                _ = report_timer(deadline) => {
                    self.session.poll_report(Instant::now());
                }
                Some(msg) = self.outbound_rx.recv() => {
                    let text = serde_json::to_string(&msg)?;
                    ws_sink.send(Message::Text(text)).await?;
                }
                frame = ws_stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMsg>(&text) {
                        Ok(msg) => self.session.handle_server_msg(msg),
                        Err(e) => warn!(error = %e, "Failed to parse server message"),
                    },
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(other)) => debug!(?other, "Ignoring non-text frame"),
                    Some(Err(e)) => return Err(e.into()),
                },
                Some(call) = self.incoming.recv() => {
                    self.session.handle_incoming_call(call);
                }
                Some(outcome) = self.outcomes.recv() => {
                    self.session.handle_call_outcome(outcome);
                }
                _ = summary.tick() => {
                    debug!(
                        identity = ?self.session.identity(),
                        calls_in_flight = self.session.calls().in_flight(),
                        peers = ?self.session.peers(),
                        "Session summary"
                    );
                }
            }
        }
    }
}

async fn report_timer(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
