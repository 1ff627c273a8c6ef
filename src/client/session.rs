//! Client-side view of the shared space
//!
//! A [`ClientSession`] consumes server events, call outcomes and animation
//! frames, one at a time, from a single event loop. It owns the local avatar,
//! one [`RemotePeerView`] per other participant and the call controller.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::util::throttle::Throttle;
use crate::ws::protocol::{ClientMsg, PeerInfo, Position, ServerMsg};

use super::calls::{CallController, CallOutcome, IncomingCall, PeerBroker};
use super::motion::{MotionConfig, MotionSystem, SelfView};
use super::spatial::{spatial_mix, ChannelSplitter, SpatialConfig, StereoGain};

type Reporter = Throttle<Position, Box<dyn FnMut(Position) + Send>>;

/// Another participant as seen locally
#[derive(Debug)]
pub struct RemotePeerView<S> {
    pub id: Uuid,
    /// Rendered position, smoothed every frame
    pub pos: Position,
    /// Latest position received from the network
    pub goal: Position,
    pub audio: Option<ChannelSplitter<S>>,
}

impl<S> RemotePeerView<S> {
    fn new(id: Uuid, pos: Position) -> Self {
        Self {
            id,
            pos,
            goal: pos,
            audio: None,
        }
    }

    fn close_audio(&mut self) {
        if let Some(mut splitter) = self.audio.take() {
            splitter.close();
        }
    }
}

/// Diagnostic snapshot of one peer view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerSummary {
    pub id: Uuid,
    pub pos: Position,
    pub goal: Position,
    /// `None` while no audio channel is attached
    pub gain: Option<StereoGain>,
}

pub struct ClientSession<B: PeerBroker> {
    identity: Option<Uuid>,
    me: SelfView,
    peers: HashMap<Uuid, RemotePeerView<B::Remote>>,
    calls: CallController<B>,
    reporter: Reporter,
    motion: MotionConfig,
    spatial: SpatialConfig,
}

impl<B: PeerBroker> ClientSession<B> {
    /// Build a session that writes position reports to `outbound`.
    ///
    /// The returned receiver yields call outcomes that must be fed back
    /// through [`ClientSession::handle_call_outcome`].
    pub fn new(
        config: &ClientConfig,
        broker: B,
        outbound: mpsc::UnboundedSender<ClientMsg>,
    ) -> (Self, mpsc::UnboundedReceiver<CallOutcome<B::Remote>>) {
        let (calls, outcomes) = CallController::new(broker);

        let emit: Box<dyn FnMut(Position) + Send> = Box::new(move |pos: Position| {
            if outbound.send(ClientMsg::Pos { x: pos.x, y: pos.y }).is_err() {
                trace!("Outbound queue closed, position report dropped");
            }
        });

        let session = Self {
            identity: None,
            me: SelfView::default(),
            peers: HashMap::new(),
            calls,
            reporter: Throttle::new(config.report_interval, emit),
            motion: config.motion,
            spatial: config.spatial,
        };

        (session, outcomes)
    }

    pub fn identity(&self) -> Option<Uuid> {
        self.identity
    }

    pub fn me(&self) -> &SelfView {
        &self.me
    }

    pub fn peer(&self, id: Uuid) -> Option<&RemotePeerView<B::Remote>> {
        self.peers.get(&id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn peers(&self) -> Vec<PeerSummary> {
        self.peers
            .values()
            .map(|view| PeerSummary {
                id: view.id,
                pos: view.pos,
                goal: view.goal,
                gain: view.audio.as_ref().map(|a| a.gain()),
            })
            .collect()
    }

    pub fn calls(&self) -> &CallController<B> {
        &self.calls
    }

    /// Apply one server event
    pub fn handle_server_msg(&mut self, msg: ServerMsg) {
        match msg {
            ServerMsg::Id { id } => self.assign_identity(id),
            ServerMsg::Players { players } => self.add_existing(players),
            ServerMsg::Join { id, pos } => self.peer_joined(id, pos),
            ServerMsg::Pos { id, pos } => match self.peers.get_mut(&id) {
                Some(view) => view.goal = pos,
                None => trace!(peer_id = %id, "Position for unknown peer dropped"),
            },
            ServerMsg::Leave { id } => self.peer_left(id),
        }
    }

    /// Answer an inbound call, whether or not the caller has a view yet
    pub fn handle_incoming_call(&mut self, call: IncomingCall) {
        self.calls.answer(call);
    }

    /// Attach the stream from a finished call attempt to its peer view
    pub fn handle_call_outcome(&mut self, outcome: CallOutcome<B::Remote>) {
        if outcome.epoch != self.calls.epoch() {
            debug!(peer_id = %outcome.peer, "Discarding call outcome from a previous session");
            return;
        }
        self.calls.finish(outcome.peer, outcome.direction);

        let stream = match outcome.result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(peer_id = %outcome.peer, direction = ?outcome.direction, error = %e, "Call failed");
                return;
            }
        };

        let Some(view) = self.peers.get_mut(&outcome.peer) else {
            debug!(peer_id = %outcome.peer, "Call completed after peer left, dropping stream");
            return;
        };

        view.close_audio();
        let splitter = ChannelSplitter::new(outcome.peer, stream);
        splitter.set_gain(spatial_mix(self.me.pos, view.pos, &self.spatial));
        view.audio = Some(splitter);

        info!(peer_id = %outcome.peer, direction = ?outcome.direction, "Audio channel established");
    }

    /// Advance one animation frame.
    ///
    /// `goal` is the pointer target in world space while an input is active.
    pub fn frame(&mut self, now: Instant, dt: f64, goal: Option<Position>) {
        self.me.advance(goal, dt, &self.motion);
        // Nothing is reported until the server has named us
        if self.identity.is_some() && self.me.report_due() {
            self.reporter.call(now, self.me.pos);
            self.me.mark_reported();
        }
        self.reporter.poll(now);

        for view in self.peers.values_mut() {
            view.pos = MotionSystem::smooth_remote(view.pos, view.goal, dt, &self.motion);
            if let Some(audio) = &view.audio {
                audio.set_gain(spatial_mix(self.me.pos, view.pos, &self.spatial));
            }
        }
    }

    /// When the pending trailing position report is due
    pub fn report_deadline(&self) -> Option<Instant> {
        self.reporter.deadline()
    }

    /// Send the trailing position report if it is due
    pub fn poll_report(&mut self, now: Instant) -> bool {
        self.reporter.poll(now)
    }

    /// Tear down every peer view, call and pending report
    pub fn reset(&mut self) {
        for view in self.peers.values_mut() {
            view.close_audio();
        }
        self.peers.clear();
        self.calls.reset();
        self.reporter.reset();
        self.me = SelfView::default();
        if self.identity.take().is_some() {
            self.calls.broker().destroy();
        }
    }

    fn assign_identity(&mut self, id: Uuid) {
        match self.identity {
            Some(current) if current == id => {}
            Some(current) => {
                info!(old_id = %current, new_id = %id, "Replacing identity");
                self.reset();
                self.identity = Some(id);
                self.calls.broker().register(id);
            }
            None => {
                info!(peer_id = %id, "Assigned identity");
                self.identity = Some(id);
                self.calls.broker().register(id);
            }
        }
    }

    fn add_existing(&mut self, players: Vec<PeerInfo>) {
        for PeerInfo { id, pos } in players {
            if Some(id) == self.identity {
                continue;
            }
            self.peers
                .entry(id)
                .and_modify(|view| view.goal = pos)
                .or_insert_with(|| RemotePeerView::new(id, pos));
        }
    }

    fn peer_joined(&mut self, id: Uuid, pos: Position) {
        if Some(id) == self.identity {
            return;
        }
        if let Some(view) = self.peers.get_mut(&id) {
            view.goal = pos;
            return;
        }

        self.peers.insert(id, RemotePeerView::new(id, pos));
        self.calls.start_call(id);
    }

    fn peer_left(&mut self, id: Uuid) {
        self.calls.abandon(id);
        match self.peers.remove(&id) {
            Some(mut view) => {
                view.close_audio();
                info!(peer_id = %id, "Peer left");
            }
            None => debug!(peer_id = %id, "Leave for unknown peer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::calls::{CallDirection, CallError, SilentBroker, SilentStream};
    use std::time::Duration;

    const DT: f64 = 1.0 / 60.0;

    fn session(
        broker: SilentBroker,
    ) -> (
        ClientSession<SilentBroker>,
        mpsc::UnboundedReceiver<ClientMsg>,
        mpsc::UnboundedReceiver<CallOutcome<SilentStream>>,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (session, outcomes) = ClientSession::new(&ClientConfig::default(), broker, out_tx);
        (session, out_rx, outcomes)
    }

    fn stream(peer: Uuid) -> SilentStream {
        SilentStream {
            id: Uuid::new_v4(),
            peer: Some(peer),
        }
    }

    #[tokio::test]
    async fn snapshot_creates_views_without_calling() {
        let (mut s, _out, _outcomes) = session(SilentBroker::default());
        let me = Uuid::new_v4();
        let a = Uuid::new_v4();

        s.handle_server_msg(ServerMsg::Id { id: me });
        s.handle_server_msg(ServerMsg::Players {
            players: vec![
                PeerInfo { id: a, pos: Position::new(5.0, 5.0) },
                PeerInfo { id: me, pos: Position::ORIGIN },
            ],
        });

        assert_eq!(s.peer_count(), 1);
        let view = s.peer(a).unwrap();
        assert_eq!(view.pos, Position::new(5.0, 5.0));
        assert_eq!(view.goal, Position::new(5.0, 5.0));
        assert_eq!(s.calls().in_flight(), 0);
    }

    #[tokio::test]
    async fn join_calls_and_attaches_audio() {
        let (mut s, _out, mut outcomes) = session(SilentBroker::default());
        let b = Uuid::new_v4();
        s.handle_server_msg(ServerMsg::Id { id: Uuid::new_v4() });
        s.handle_server_msg(ServerMsg::Join { id: b, pos: Position::ORIGIN });

        assert!(s.calls().is_in_flight(b));
        let outcome = outcomes.recv().await.unwrap();
        s.handle_call_outcome(outcome);

        let view = s.peer(b).unwrap();
        let audio = view.audio.as_ref().unwrap();
        assert_eq!(audio.gain(), StereoGain::FULL);
        assert_eq!(s.calls().in_flight(), 0);
    }

    #[tokio::test]
    async fn position_updates_goal_only_for_known_peers() {
        let (mut s, _out, _outcomes) = session(SilentBroker::default());
        let a = Uuid::new_v4();
        s.handle_server_msg(ServerMsg::Players {
            players: vec![PeerInfo { id: a, pos: Position::ORIGIN }],
        });

        s.handle_server_msg(ServerMsg::Pos { id: a, pos: Position::new(10.0, 20.0) });
        s.handle_server_msg(ServerMsg::Pos {
            id: Uuid::new_v4(),
            pos: Position::new(1.0, 1.0),
        });

        let view = s.peer(a).unwrap();
        assert_eq!(view.goal, Position::new(10.0, 20.0));
        assert_eq!(view.pos, Position::ORIGIN);
        assert_eq!(s.peer_count(), 1);
    }

    #[tokio::test]
    async fn frames_smooth_remote_toward_goal() {
        let (mut s, _out, _outcomes) = session(SilentBroker::default());
        let a = Uuid::new_v4();
        s.handle_server_msg(ServerMsg::Players {
            players: vec![PeerInfo { id: a, pos: Position::ORIGIN }],
        });
        s.handle_server_msg(ServerMsg::Pos { id: a, pos: Position::new(60.0, 0.0) });

        let now = Instant::now();
        s.frame(now, DT, None);
        let first = s.peer(a).unwrap().pos;
        s.frame(now, DT, None);
        let second = s.peer(a).unwrap().pos;

        assert!(first.x > 0.0 && first.x < 60.0);
        assert!(second.x > first.x && second.x < 60.0);
    }

    #[tokio::test]
    async fn leave_closes_audio_and_removes_view() {
        let (mut s, _out, mut outcomes) = session(SilentBroker::default());
        let b = Uuid::new_v4();
        s.handle_server_msg(ServerMsg::Id { id: Uuid::new_v4() });
        s.handle_server_msg(ServerMsg::Join { id: b, pos: Position::ORIGIN });
        s.handle_call_outcome(outcomes.recv().await.unwrap());
        let gain = s.peer(b).unwrap().audio.as_ref().unwrap().gain_handle();

        s.handle_server_msg(ServerMsg::Leave { id: b });

        assert!(s.peer(b).is_none());
        assert_eq!(*gain.read(), StereoGain::SILENT);

        // duplicate leave is harmless
        s.handle_server_msg(ServerMsg::Leave { id: b });
    }

    #[tokio::test]
    async fn late_answer_after_leave_is_ignored() {
        let (mut s, _out, _outcomes) = session(SilentBroker::default());
        let b = Uuid::new_v4();
        s.handle_server_msg(ServerMsg::Join { id: b, pos: Position::ORIGIN });
        s.handle_server_msg(ServerMsg::Leave { id: b });

        s.handle_call_outcome(CallOutcome {
            peer: b,
            direction: CallDirection::Outbound,
            epoch: 0,
            result: Ok(stream(b)),
        });

        assert!(s.peer(b).is_none());
    }

    #[tokio::test]
    async fn failed_call_leaves_peer_without_audio() {
        let (mut s, _out, _outcomes) = session(SilentBroker::default());
        let b = Uuid::new_v4();
        s.handle_server_msg(ServerMsg::Join { id: b, pos: Position::ORIGIN });

        s.handle_call_outcome(CallOutcome {
            peer: b,
            direction: CallDirection::Outbound,
            epoch: 0,
            result: Err(CallError::Negotiation("ice failed".to_string())),
        });

        assert!(s.peer(b).unwrap().audio.is_none());
    }

    #[tokio::test]
    async fn answered_call_attaches_to_existing_view() {
        let (mut s, _out, mut outcomes) = session(SilentBroker::default());
        let a = Uuid::new_v4();
        s.handle_server_msg(ServerMsg::Id { id: Uuid::new_v4() });
        s.handle_server_msg(ServerMsg::Players {
            players: vec![PeerInfo { id: a, pos: Position::new(300.0, 0.0) }],
        });

        s.handle_incoming_call(IncomingCall {
            from: a,
            call_id: Uuid::new_v4(),
        });
        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.direction, CallDirection::Answered);
        s.handle_call_outcome(outcome);

        let audio = s.peer(a).unwrap().audio.as_ref().unwrap();
        assert_eq!(audio.gain(), StereoGain::SILENT);
    }

    #[tokio::test]
    async fn local_motion_is_reported_through_the_throttle() {
        let (mut s, mut out, _outcomes) = session(SilentBroker::default());
        s.handle_server_msg(ServerMsg::Id { id: Uuid::new_v4() });
        let goal = Some(Position::new(50.0, 0.0));
        let t0 = Instant::now();

        // 60 Hz frames for 100 ms
        for i in 0..6u64 {
            s.frame(t0 + Duration::from_micros(16_667 * i), DT, goal);
        }

        let mut sent = Vec::new();
        while let Ok(ClientMsg::Pos { x, y }) = out.try_recv() {
            sent.push((x, y));
        }
        // leading report at t=0, then one per 25 ms window
        assert_eq!(sent.len(), 3);
        assert!(sent.windows(2).all(|w| w[1].0 > w[0].0));
        assert!(sent.iter().all(|(_, y)| *y == 0.0));
    }

    #[tokio::test]
    async fn motion_before_identity_is_held_back() {
        let (mut s, mut out, _outcomes) = session(SilentBroker::default());
        let goal = Some(Position::new(50.0, 0.0));
        let t0 = Instant::now();

        for i in 0..3u64 {
            s.frame(t0 + Duration::from_millis(30 * i), DT, goal);
        }
        assert!(out.try_recv().is_err());
        assert!(s.report_deadline().is_none());

        s.handle_server_msg(ServerMsg::Id { id: Uuid::new_v4() });
        s.frame(t0 + Duration::from_millis(90), DT, goal);

        let Ok(ClientMsg::Pos { x, y }) = out.try_recv() else {
            panic!("expected a report once identified");
        };
        assert_eq!((x, y), (s.me().pos.x, s.me().pos.y));
    }

    #[tokio::test]
    async fn reset_stops_reporting_until_the_next_identity() {
        let broker = SilentBroker::default();
        let (mut s, mut out, _outcomes) = session(broker.clone());
        let goal = Some(Position::new(200.0, 0.0));
        let t0 = Instant::now();

        s.handle_server_msg(ServerMsg::Id { id: Uuid::new_v4() });
        s.handle_server_msg(ServerMsg::Join { id: Uuid::new_v4(), pos: Position::ORIGIN });
        s.frame(t0, 1.0, goal);
        s.frame(t0 + Duration::from_millis(5), DT, goal);
        assert!(s.report_deadline().is_some());
        while out.try_recv().is_ok() {}

        s.reset();
        assert_eq!(s.identity(), None);
        assert_eq!(broker.identity(), None);
        assert_eq!(s.peer_count(), 0);
        assert_eq!(s.calls().in_flight(), 0);
        assert_eq!(s.me().pos, Position::ORIGIN);
        assert!(s.report_deadline().is_none());

        // The pointer is still held, but no one is listening for this session
        s.frame(t0 + Duration::from_millis(100), DT, goal);
        assert!(out.try_recv().is_err());
    }

    #[tokio::test]
    async fn standing_still_sends_nothing() {
        let (mut s, mut out, _outcomes) = session(SilentBroker::default());
        let t0 = Instant::now();

        for i in 0..10u64 {
            s.frame(t0 + Duration::from_millis(16 * i), DT, None);
        }

        assert!(out.try_recv().is_err());
        assert!(s.report_deadline().is_none());
    }

    #[tokio::test]
    async fn new_identity_resets_the_session() {
        let broker = SilentBroker::new(Duration::from_secs(10));
        let (mut s, _out, _outcomes) = session(broker.clone());
        let first = Uuid::new_v4();
        let b = Uuid::new_v4();

        s.handle_server_msg(ServerMsg::Id { id: first });
        s.handle_server_msg(ServerMsg::Join { id: b, pos: Position::ORIGIN });
        s.frame(Instant::now(), 0.5, Some(Position::new(40.0, 0.0)));
        assert_eq!(broker.identity(), Some(first));

        let second = Uuid::new_v4();
        s.handle_server_msg(ServerMsg::Id { id: second });

        assert_eq!(s.identity(), Some(second));
        assert_eq!(broker.identity(), Some(second));
        assert_eq!(s.peer_count(), 0);
        assert_eq!(s.calls().in_flight(), 0);
        assert_eq!(s.calls().epoch(), 1);
        assert_eq!(s.me().pos, Position::ORIGIN);

        // a stale outcome from the old session is discarded
        s.handle_server_msg(ServerMsg::Players {
            players: vec![PeerInfo { id: b, pos: Position::ORIGIN }],
        });
        s.handle_call_outcome(CallOutcome {
            peer: b,
            direction: CallDirection::Outbound,
            epoch: 0,
            result: Ok(stream(b)),
        });
        assert!(s.peer(b).unwrap().audio.is_none());
    }
}
