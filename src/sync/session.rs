//! Client session: one fixed-step tick and inbound dispatch

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::input::DirectionSource;
use crate::net::protocol::{decode_server_msg, ClientMsg, DirectionSet, InputCmd, ServerMsg};
use crate::net::transport::{spawn_delay_line, Outbound, TransportError, TransportEvent};
use crate::util::time::{unix_millis, unix_secs};

use super::input_log::Sequencer;
use super::latency::{LatencyProbe, LatencySample};
use super::motion::MotionModel;
use super::queue::MessageQueue;
use super::reconcile::Reconciler;
use super::view::{Renderer, WorldView};

/// Validated inbound item waiting for the next tick
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Server { msg: ServerMsg, received_at: u64 },
    Connected,
    Disconnected,
}

/// Producer side of the session's message queue.
///
/// This is all the network-arrival context may touch: it validates frames
/// and enqueues them, never the player table.
#[derive(Debug, Clone)]
pub struct Ingress {
    queue: MessageQueue<Inbound>,
    dropped: Arc<AtomicU64>,
}

impl Ingress {
    pub fn accept(&self, event: TransportEvent) {
        let inbound = match event {
            TransportEvent::Connected => Inbound::Connected,
            TransportEvent::Disconnected => Inbound::Disconnected,
            TransportEvent::Message(text) => match decode_server_msg(&text) {
                Ok(msg) => Inbound::Server {
                    msg,
                    received_at: unix_millis(),
                },
                Err(e) => {
                    warn!(error = %e, "Dropping invalid server message");
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            },
        };
        self.queue.send(inbound);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub ticks: u64,
    pub snapshots_applied: u64,
    pub inputs_logged: u64,
    pub inputs_sent: u64,
    pub probes_sent: u64,
    pub dropped_messages: u64,
}

/// Session knobs taken from [`Config`]
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub prediction_enabled: bool,
    pub motion: MotionModel,
    pub input_send_delay: Option<Duration>,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            prediction_enabled: config.prediction_enabled,
            motion: MotionModel::new(config.move_speed),
            input_send_delay: config.input_send_delay,
        }
    }
}

/// Everything the tick owns: player table, input sequencing, latency probe
pub struct ClientSession<S, R> {
    ingress: Ingress,
    reconciler: Reconciler,
    sequencer: Sequencer,
    latency: LatencyProbe,
    outbound: Arc<dyn Outbound>,
    input_outbound: Arc<dyn Outbound>,
    input: S,
    renderer: R,
    connected: bool,
    ever_connected: bool,
    report: SessionReport,
}

impl<S: DirectionSource, R: Renderer> ClientSession<S, R> {
    /// With `input_send_delay` set this must run inside a tokio runtime.
    pub fn new(
        settings: SessionSettings,
        outbound: Arc<dyn Outbound>,
        input: S,
        renderer: R,
    ) -> Self {
        let input_outbound = match settings.input_send_delay {
            Some(delay) => {
                warn!(delay_ms = delay.as_millis() as u64, "Artificial input send delay enabled");
                Arc::new(DelayedOutbound::spawn(delay, Arc::clone(&outbound))) as Arc<dyn Outbound>
            }
            None => Arc::clone(&outbound),
        };

        Self {
            ingress: Ingress {
                queue: MessageQueue::new(),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            reconciler: Reconciler::new(settings.motion, settings.prediction_enabled),
            sequencer: Sequencer::new(),
            latency: LatencyProbe::new(),
            outbound,
            input_outbound,
            input,
            renderer,
            connected: false,
            ever_connected: false,
            report: SessionReport::default(),
        }
    }

    /// Handle for the network-arrival context
    pub fn ingress(&self) -> Ingress {
        self.ingress.clone()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn latency(&self) -> watch::Receiver<Option<LatencySample>> {
        self.latency.subscribe()
    }

    pub fn report(&self) -> SessionReport {
        SessionReport {
            dropped_messages: self.ingress.dropped(),
            ..self.report
        }
    }

    /// One fixed step: drain inbound, sample input, predict and send, render
    pub fn tick(&mut self) {
        self.report.ticks += 1;

        self.drain_inbound();

        let directions = self.input.sample();
        if !directions.is_empty() {
            self.issue_input(directions);
        }

        let view = WorldView::capture(self.report.ticks, self.reconciler.registry_mut());
        self.renderer.render(&view);
    }

    /// Send a latency probe if connected
    pub fn send_probe(&mut self) {
        if !self.connected {
            debug!("Skipping latency probe while disconnected");
            return;
        }
        let probe = self.latency.probe(unix_millis());
        match self.outbound.send(&probe) {
            Ok(()) => self.report.probes_sent += 1,
            Err(e) => warn!(error = %e, "Failed to send latency probe"),
        }
    }

    fn drain_inbound(&mut self) {
        while let Some(inbound) = self.ingress.queue.recv() {
            match inbound {
                Inbound::Server { msg, received_at } => self.apply_server_msg(msg, received_at),
                Inbound::Connected => {
                    if self.ever_connected {
                        self.reconciler.on_reconnect();
                    }
                    self.ever_connected = true;
                    self.connected = true;
                    info!("Connected to server");
                }
                Inbound::Disconnected => {
                    self.connected = false;
                    warn!("Disconnected from server");
                }
            }
        }
    }

    fn apply_server_msg(&mut self, msg: ServerMsg, received_at: u64) {
        match msg {
            ServerMsg::MapUpdate(snapshot) => {
                let stats = self.reconciler.reconcile(&snapshot);
                self.report.snapshots_applied += 1;
                trace!(
                    players = snapshot.players.len(),
                    pruned = stats.pruned,
                    replayed = stats.replayed,
                    "Snapshot applied"
                );
            }
            ServerMsg::Login(descriptor) => {
                self.reconciler.login(descriptor);
            }
            ServerMsg::Logout { id } => {
                self.reconciler.logout(id);
            }
            ServerMsg::LatencyEcho {
                timestamp,
                processed,
            } => {
                self.latency.on_echo(timestamp, processed, received_at);
            }
        }
    }

    fn issue_input(&mut self, directions: DirectionSet) {
        if self.reconciler.registry().local_id().is_none() {
            trace!("Input ignored before login");
            return;
        }

        let input = InputCmd {
            seq: self.sequencer.next_seq(),
            time: unix_secs(),
            inputs: directions,
        };
        match self.reconciler.record_local_input(input) {
            Ok(true) => self.report.inputs_logged += 1,
            Ok(false) => return,
            Err(e) => {
                warn!(error = %e, "Local input rejected");
                return;
            }
        }

        if !self.connected {
            debug!(seq = input.seq, "Disconnected, input kept for local replay only");
            return;
        }
        match self.input_outbound.send(&ClientMsg::Input(input)) {
            Ok(()) => self.report.inputs_sent += 1,
            Err(e) => warn!(seq = input.seq, error = %e, "Failed to send input"),
        }
    }
}

/// Outbound wrapper that holds every message back by a fixed delay,
/// preserving order. Only for exercising latency in tests and demos.
struct DelayedOutbound {
    tx: tokio::sync::mpsc::UnboundedSender<ClientMsg>,
}

impl DelayedOutbound {
    fn spawn(delay: Duration, inner: Arc<dyn Outbound>) -> Self {
        let tx = spawn_delay_line(delay, move |msg: ClientMsg| {
            if let Err(e) = inner.send(&msg) {
                warn!(error = %e, "Delayed send failed");
            }
        });
        Self { tx }
    }
}

impl Outbound for DelayedOutbound {
    fn send(&self, msg: &ClientMsg) -> Result<(), TransportError> {
        self.tx.send(msg.clone()).map_err(|_| TransportError::Closed)
    }
}
