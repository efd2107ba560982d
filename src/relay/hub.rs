//! # Relay Hub
//!
//! The hub is the single owner of everything the connections share: the
//! trigger strategy (and its accumulator), the connection registry and the
//! broadcast cooldown. It runs as one actix actor, so its mailbox is the one
//! mutual-exclusion domain for ingest, fire decisions and registry changes.
//!
//! ## Message Flow:
//! 1. A connection actor forwards each audio frame as [`IngestAudio`]
//! 2. [`RelayCore::ingest`] decodes it, feeds the strategy and plans dispatches
//! 3. Each dispatch is spawned on the hub's context as a concurrent fan-out
//! 4. When a fan-out completes, failed recipients are pruned from the registry
//!
//! Dispatches capture a registry snapshot, so connections that come and go
//! while a fan-out is in flight do not affect it.

use crate::audio::AudioChunk;
use crate::error::RelayError;
use crate::protocol::ServerFrame;
use crate::relay::broadcaster::{broadcast, BroadcastReport, FrameSink, OutboundFrame};
use crate::relay::guard::ReentrancyGuard;
use crate::relay::registry::{ConnectionId, ConnectionRegistry};
use crate::state::AppState;
use crate::trigger::{Decision, TriggerStrategy};
use actix::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Why a frame is being fanned out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    /// Live relay of an incoming chunk to the sender's peers
    Relay,
    /// Accumulated audio released by a fire decision
    Fire,
}

/// One planned fan-out: a frame, the recipients snapshot and who to skip.
#[derive(Debug)]
pub struct Dispatch<S> {
    pub kind: DispatchKind,
    pub frame: Arc<str>,
    pub recipients: Vec<(ConnectionId, S)>,
    pub exclude: Option<ConnectionId>,
}

/// Everything that happened while ingesting one chunk.
#[derive(Debug)]
pub struct IngestOutcome<S> {
    pub decision: Decision,
    /// The strategy fired but the cooldown was still running
    pub throttled: bool,
    pub dispatches: Vec<Dispatch<S>>,
}

/// Relay state machine without the actor plumbing.
pub struct RelayCore<S> {
    engine: Box<dyn TriggerStrategy>,
    registry: ConnectionRegistry<S>,
    guard: ReentrancyGuard,
    send_timeout: Duration,
}

impl<S: FrameSink> RelayCore<S> {
    pub fn new(engine: Box<dyn TriggerStrategy>, cooldown: Duration, send_timeout: Duration) -> Self {
        Self {
            engine,
            registry: ConnectionRegistry::new(),
            guard: ReentrancyGuard::new(cooldown),
            send_timeout,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.engine.name()
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn connect(&mut self, id: ConnectionId, sink: S) -> usize {
        self.registry.insert(id, sink);
        self.registry.len()
    }

    pub fn disconnect(&mut self, id: &ConnectionId) -> bool {
        self.registry.remove(id)
    }

    /// Drop recipients whose delivery failed during a completed fan-out and
    /// ask each of them to close, so the client can reconnect.
    pub fn prune(&mut self, failed: &[ConnectionId]) -> usize {
        let removed = self.registry.remove_all(failed);
        for sink in &removed {
            sink.close();
        }
        removed.len()
    }

    pub fn status(&self, now: Instant) -> RelayStatus {
        RelayStatus {
            strategy: self.engine.name(),
            phase: self.engine.phase_name(),
            window_fill: self.engine.window_fill(),
            connections: self.registry.len(),
            stored_chunks: self.engine.stored_chunks(),
            cooldown_active: self.guard.is_active(now),
        }
    }

    /// Restart the strategy and release the cooldown. Connections are kept.
    pub fn reset(&mut self, now: Instant) {
        self.engine.reset(now);
        self.guard.release();
    }

    /// Decode one transfer-encoded chunk from `from`, run it through the
    /// strategy and plan the resulting fan-outs.
    ///
    /// ## Errors:
    /// - **RelayError::Decode**: the payload was rejected; the strategy never
    ///   saw it and nothing is dispatched
    pub fn ingest(&mut self, from: ConnectionId, data: &str, now: Instant) -> Result<IngestOutcome<S>, RelayError> {
        let chunk = AudioChunk::decode(data, now)?;
        let mut dispatches = Vec::new();

        if self.engine.relays_live() && self.registry.len() > 1 {
            let frame = ServerFrame::Audio {
                data: chunk.to_transfer(),
            };
            dispatches.push(Dispatch {
                kind: DispatchKind::Relay,
                frame: Arc::from(frame.to_json()),
                recipients: self.registry.snapshot(),
                exclude: Some(from),
            });
        }

        let decision = self.engine.ingest(chunk, now);
        let mut throttled = false;

        if decision.fire {
            if self.guard.try_acquire(now) {
                match self.engine.drain_for_broadcast() {
                    Some(payload) => {
                        info!(
                            strategy = self.engine.name(),
                            chunks = payload.chunk_count(),
                            span_ms = payload.span().as_millis() as u64,
                            recipients = self.registry.len(),
                            "Broadcasting stored audio"
                        );
                        dispatches.push(Dispatch {
                            kind: DispatchKind::Fire,
                            frame: Arc::from(payload.into_frame().to_json()),
                            recipients: self.registry.snapshot(),
                            exclude: None,
                        });
                    }
                    None => warn!("No stored audio to broadcast"),
                }
            } else {
                throttled = true;
                debug!(
                    remaining_ms = self.guard.remaining(now).as_millis() as u64,
                    "Broadcast cooldown active, fire dropped"
                );
            }
        }

        Ok(IngestOutcome {
            decision,
            throttled,
            dispatches,
        })
    }
}

/// Snapshot of the hub for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub strategy: &'static str,
    /// Cyclic phase (`accumulating` / `holding`), `None` for energy-gated
    pub phase: Option<&'static str>,
    /// Volume samples in the energy window, `None` for cyclic
    pub window_fill: Option<usize>,
    pub connections: usize,
    pub stored_chunks: usize,
    pub cooldown_active: bool,
}

/// Register a newly opened connection.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub id: ConnectionId,
    pub sink: Recipient<OutboundFrame>,
}

/// Unregister a closed connection.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: ConnectionId,
}

/// One audio frame, stamped with its arrival time.
#[derive(Message)]
#[rtype(result = "()")]
pub struct IngestAudio {
    pub from: ConnectionId,
    pub data: String,
    pub received_at: Instant,
}

#[derive(Message)]
#[rtype(result = "RelayStatus")]
pub struct GetStatus;

/// Restart the trigger strategy, discarding stored audio and the cooldown.
#[derive(Message)]
#[rtype(result = "()")]
pub struct ResetTrigger;

/// Actor wrapping [`RelayCore`] for live WebSocket connections.
pub struct RelayHub {
    core: RelayCore<Recipient<OutboundFrame>>,
    state: AppState,
}

impl RelayHub {
    pub fn new(engine: Box<dyn TriggerStrategy>, cooldown: Duration, send_timeout: Duration, state: AppState) -> Self {
        Self {
            core: RelayCore::new(engine, cooldown, send_timeout),
            state,
        }
    }

    fn spawn_dispatch(&mut self, dispatch: Dispatch<Recipient<OutboundFrame>>, ctx: &mut Context<Self>) {
        let Dispatch {
            kind,
            frame,
            recipients,
            exclude,
        } = dispatch;

        let fanout = broadcast(frame, recipients, exclude, self.core.send_timeout())
            .into_actor(self)
            .map(move |report, act, _ctx| act.finish_dispatch(kind, report));
        ctx.spawn(fanout);
    }

    fn finish_dispatch(&mut self, kind: DispatchKind, report: BroadcastReport) {
        if kind == DispatchKind::Fire {
            self.state.record_broadcast();
            if report.sent == 0 {
                warn!("Playback broadcast reached no live connections");
            }
        }

        if !report.failed.is_empty() {
            let removed = self.core.prune(&report.failed);
            self.state.record_send_failures(report.failed.len() as u64);
            self.state.set_active_connections(self.core.connection_count());
            warn!(
                failed = report.failed.len(),
                removed,
                remaining = self.core.connection_count(),
                "Pruned unreachable connections after broadcast"
            );
        }

        debug!(kind = ?kind, sent = report.sent, "Broadcast pass complete");
    }
}

impl Actor for RelayHub {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!(strategy = self.core.strategy_name(), "Relay hub started");
    }
}

impl Handler<Connect> for RelayHub {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) {
        let total = self.core.connect(msg.id, msg.sink);
        self.state.set_active_connections(total);
        info!(connection = %msg.id, total, "Client connected");
    }
}

impl Handler<Disconnect> for RelayHub {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) {
        if self.core.disconnect(&msg.id) {
            self.state.set_active_connections(self.core.connection_count());
            info!(connection = %msg.id, total = self.core.connection_count(), "Client disconnected");
        }
    }
}

impl Handler<IngestAudio> for RelayHub {
    type Result = ();

    fn handle(&mut self, msg: IngestAudio, ctx: &mut Self::Context) {
        match self.core.ingest(msg.from, &msg.data, msg.received_at) {
            Ok(outcome) => {
                self.state.record_chunk(outcome.decision.stored);
                if outcome.throttled {
                    self.state.record_throttled();
                }
                for dispatch in outcome.dispatches {
                    self.spawn_dispatch(dispatch, ctx);
                }
            }
            Err(err) => {
                self.state.record_decode_failure();
                warn!(connection = %msg.from, error = %err, "Dropping undecodable audio chunk");
            }
        }
    }
}

impl Handler<GetStatus> for RelayHub {
    type Result = MessageResult<GetStatus>;

    fn handle(&mut self, _msg: GetStatus, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.core.status(Instant::now()))
    }
}

impl Handler<ResetTrigger> for RelayHub {
    type Result = ();

    fn handle(&mut self, _msg: ResetTrigger, _ctx: &mut Self::Context) {
        info!(strategy = self.core.strategy_name(), "Resetting trigger");
        self.core.reset(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::relay::broadcaster::tests::MemorySink;
    use crate::trigger::{CyclicTrigger, EnergyTrigger};
    use std::cell::RefCell;
    use std::rc::Rc;

    const LOUD: &str = "AP8A/wD/AP8A/wD/AP8A/wD/AP8A/wD/";
    const QUIET: &str = "gICAgICAgICAgICAgICAgICAgICAgICA";

    fn cyclic_core(base: Instant, cooldown: Duration) -> RelayCore<MemorySink> {
        let engine = CyclicTrigger::new(Duration::from_secs(5), Duration::from_secs(5), base);
        RelayCore::new(Box::new(engine), cooldown, Duration::from_secs(1))
    }

    fn at(base: Instant, s: f64) -> Instant {
        base + Duration::from_secs_f64(s)
    }

    async fn run(dispatch: Dispatch<MemorySink>) -> BroadcastReport {
        broadcast(dispatch.frame, dispatch.recipients, dispatch.exclude, Duration::from_secs(1)).await
    }

    #[test]
    fn test_cyclic_fire_plans_playback_to_everyone() {
        let base = Instant::now();
        let mut core = cyclic_core(base, Duration::from_secs(5));
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        core.connect(a, MemorySink::default());
        core.connect(b, MemorySink::default());

        for s in [0.0, 1.0] {
            let outcome = core.ingest(a, "AQID", at(base, s)).unwrap();
            assert!(outcome.dispatches.is_empty());
        }

        let outcome = core.ingest(b, "BAUG", at(base, 5.1)).unwrap();
        assert!(outcome.decision.fire);
        assert_eq!(outcome.dispatches.len(), 1);

        let dispatch = &outcome.dispatches[0];
        assert_eq!(dispatch.kind, DispatchKind::Fire);
        assert_eq!(dispatch.exclude, None);
        assert_eq!(dispatch.recipients.len(), 2);
        assert_eq!(&*dispatch.frame, r#"{"type":"playback","chunks":["AQID","AQID"]}"#);
        assert_eq!(core.status(base).stored_chunks, 0);
    }

    #[test]
    fn test_decode_failure_leaves_engine_untouched() {
        let base = Instant::now();
        let engine = EnergyTrigger::new(3, 0.1, Duration::ZERO, 10);
        let mut core: RelayCore<MemorySink> = RelayCore::new(Box::new(engine), Duration::ZERO, Duration::from_secs(1));
        let a = ConnectionId::new();
        core.connect(a, MemorySink::default());

        core.ingest(a, LOUD, at(base, 0.0)).unwrap();
        let err = core.ingest(a, "%%%", at(base, 0.5)).unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
        let status = core.status(base);
        assert_eq!(status.window_fill, Some(1));
        assert_eq!(status.stored_chunks, 1);

        core.ingest(a, LOUD, at(base, 1.0)).unwrap();
        let err = core.ingest(a, "", at(base, 1.5)).unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
        let status = core.status(base);
        assert_eq!(status.window_fill, Some(2));
        assert_eq!(status.stored_chunks, 2);

        // Only the third valid chunk fills the window, and it still reads as
        // activity.
        let outcome = core.ingest(a, QUIET, at(base, 2.0)).unwrap();
        assert!(!outcome.decision.fire);
        let status = core.status(base);
        assert_eq!(status.window_fill, Some(3));
        assert_eq!(status.stored_chunks, 3);
    }

    #[test]
    fn test_throttled_fire_is_dropped() {
        let base = Instant::now();
        let engine = EnergyTrigger::new(1, 0.1, Duration::from_secs(1), 10);
        let mut core: RelayCore<MemorySink> =
            RelayCore::new(Box::new(engine), Duration::from_secs(10), Duration::from_secs(1));
        let a = ConnectionId::new();
        core.connect(a, MemorySink::default());

        core.ingest(a, LOUD, at(base, 0.0)).unwrap();
        let first = core.ingest(a, QUIET, at(base, 1.0)).unwrap();
        assert!(first.decision.fire);
        assert!(!first.throttled);
        assert_eq!(first.dispatches.len(), 1);

        core.ingest(a, LOUD, at(base, 2.0)).unwrap();
        let second = core.ingest(a, QUIET, at(base, 3.0)).unwrap();
        assert!(second.decision.fire);
        assert!(second.throttled);
        assert!(second.dispatches.is_empty());

        // Stored audio survives a throttled fire.
        assert_eq!(core.status(base).stored_chunks, 2);
        assert!(core.status(at(base, 3.0)).cooldown_active);
    }

    #[test]
    fn test_energy_relays_live_to_peers() {
        let base = Instant::now();
        let engine = EnergyTrigger::new(3, 0.1, Duration::from_secs(1), 10);
        let mut core: RelayCore<MemorySink> = RelayCore::new(Box::new(engine), Duration::ZERO, Duration::from_secs(1));
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        core.connect(a, MemorySink::default());

        // Alone: nobody to relay to.
        assert!(core.ingest(a, "AQID", base).unwrap().dispatches.is_empty());

        core.connect(b, MemorySink::default());
        let outcome = core.ingest(a, "AQID", at(base, 0.1)).unwrap();
        assert_eq!(outcome.dispatches.len(), 1);
        let relay = &outcome.dispatches[0];
        assert_eq!(relay.kind, DispatchKind::Relay);
        assert_eq!(relay.exclude, Some(a));
        assert_eq!(&*relay.frame, r#"{"type":"audio","data":"AQID"}"#);
    }

    #[tokio::test]
    async fn test_failed_recipient_pruned_before_next_broadcast() {
        let base = Instant::now();
        let mut core = cyclic_core(base, Duration::ZERO);
        let (a, b, c) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        let sink_a = MemorySink::default();
        let sink_b = MemorySink::broken();
        let sink_c = MemorySink::default();
        core.connect(a, sink_a.clone());
        core.connect(b, sink_b.clone());
        core.connect(c, sink_c.clone());

        core.ingest(a, "AQID", base).unwrap();
        let mut outcome = core.ingest(a, "AQID", at(base, 5.0)).unwrap();
        let report = run(outcome.dispatches.remove(0)).await;
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, vec![b]);
        assert_eq!(core.prune(&report.failed), 1);
        assert!(sink_b.is_closed());
        assert!(!sink_a.is_closed() && !sink_c.is_closed());

        // Next cycle: hold ends at 10s, record, fire at 15s.
        core.ingest(a, "AQID", at(base, 10.0)).unwrap();
        core.ingest(c, "BAUG", at(base, 11.0)).unwrap();
        let mut outcome = core.ingest(a, "AQID", at(base, 15.0)).unwrap();
        let dispatch = outcome.dispatches.remove(0);
        assert!(dispatch.recipients.iter().all(|(id, _)| *id != b));

        let report = run(dispatch).await;
        assert_eq!(report.sent, 2);
        assert!(report.failed.is_empty());
        assert_eq!(sink_a.received().len(), 2);
        assert_eq!(sink_c.received().len(), 2);
    }

    #[actix_web::test]
    async fn test_hub_actor_tracks_connections() {
        let config = AppConfig::default();
        let state = AppState::new(config.clone());
        let engine = crate::trigger::build(&config, Instant::now());
        let hub = RelayHub::new(engine, config.relay.cooldown(), config.relay.send_timeout(), state.clone()).start();

        let status = hub.send(GetStatus).await.unwrap();
        assert_eq!(status.strategy, "cyclic");
        assert_eq!(status.connections, 0);

        let id = ConnectionId::new();
        let sink = NullSink.start().recipient::<OutboundFrame>();
        hub.send(Connect { id, sink }).await.unwrap();
        hub.send(IngestAudio {
            from: id,
            data: "not-base64!".to_string(),
            received_at: Instant::now(),
        })
        .await
        .unwrap();

        let status = hub.send(GetStatus).await.unwrap();
        assert_eq!(status.connections, 1);
        assert_eq!(state.get_metrics_snapshot().decode_failures, 1);
        assert_eq!(state.get_metrics_snapshot().active_connections, 1);

        hub.send(Disconnect { id }).await.unwrap();
        let status = hub.send(GetStatus).await.unwrap();
        assert_eq!(status.connections, 0);
    }

    #[test]
    fn test_status_reports_cyclic_phase() {
        let base = Instant::now();
        let mut core = cyclic_core(base, Duration::from_secs(5));
        let a = ConnectionId::new();
        core.connect(a, MemorySink::default());

        let status = core.status(base);
        assert_eq!(status.strategy, "cyclic");
        assert_eq!(status.phase, Some("accumulating"));
        assert_eq!(status.window_fill, None);

        core.ingest(a, "AQID", at(base, 5.0)).unwrap();
        let status = core.status(at(base, 5.0));
        assert_eq!(status.phase, Some("holding"));
        assert!(status.cooldown_active);
        assert_eq!(status.connections, 1);
    }

    async fn wait_for_connections(hub: &Addr<RelayHub>, expected: usize) -> RelayStatus {
        for _ in 0..100 {
            let status = hub.send(GetStatus).await.unwrap();
            if status.connections == expected {
                return status;
            }
            actix_web::rt::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("hub never reached {} connections", expected);
    }

    #[actix_web::test]
    async fn test_hub_prunes_stopped_recipient_after_broadcast() {
        let config = AppConfig::default();
        let state = AppState::new(config.clone());
        let base = Instant::now();
        let engine = crate::trigger::build(&config, base);
        let hub = RelayHub::new(engine, config.relay.cooldown(), Duration::from_millis(200), state.clone()).start();

        let live_frames = Rc::new(RefCell::new(Vec::new()));
        let live = Recorder(Rc::clone(&live_frames)).start();
        let dead = Recorder(Rc::new(RefCell::new(Vec::new()))).start();
        let dead_sink = dead.clone().recipient::<OutboundFrame>();
        dead.send(Halt).await.unwrap();

        let (live_id, dead_id) = (ConnectionId::new(), ConnectionId::new());
        hub.send(Connect {
            id: live_id,
            sink: live.recipient(),
        })
        .await
        .unwrap();
        hub.send(Connect {
            id: dead_id,
            sink: dead_sink,
        })
        .await
        .unwrap();

        for (s, data) in [(0.0, "AQID"), (6.0, "BAUG")] {
            hub.send(IngestAudio {
                from: live_id,
                data: data.to_string(),
                received_at: at(base, s),
            })
            .await
            .unwrap();
        }

        let status = wait_for_connections(&hub, 1).await;
        assert_eq!(status.phase, Some("holding"));

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.broadcasts_sent, 1);
        assert_eq!(metrics.send_failures, 1);
        assert_eq!(metrics.active_connections, 1);
        assert_eq!(
            *live_frames.borrow(),
            vec![r#"{"type":"playback","chunks":["AQID"]}"#.to_string()]
        );

        hub.send(Disconnect { id: live_id }).await.unwrap();
        wait_for_connections(&hub, 0).await;
    }

    /// Records text frames; stops on `Halt` so its mailbox closes.
    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl Actor for Recorder {
        type Context = Context<Self>;
    }

    impl Handler<OutboundFrame> for Recorder {
        type Result = ();

        fn handle(&mut self, msg: OutboundFrame, _ctx: &mut Self::Context) {
            if let OutboundFrame::Text(text) = msg {
                self.0.borrow_mut().push(text.to_string());
            }
        }
    }

    #[derive(Message)]
    #[rtype(result = "()")]
    struct Halt;

    impl Handler<Halt> for Recorder {
        type Result = ();

        fn handle(&mut self, _msg: Halt, ctx: &mut Self::Context) {
            ctx.stop();
        }
    }

    struct NullSink;

    impl Actor for NullSink {
        type Context = Context<Self>;
    }

    impl Handler<OutboundFrame> for NullSink {
        type Result = ();

        fn handle(&mut self, _msg: OutboundFrame, _ctx: &mut Self::Context) {}
    }
}
