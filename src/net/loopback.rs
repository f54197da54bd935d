//! In-process authoritative server with simulated latency
//!
//! Stands in for the real game server in the demo binary and in end-to-end
//! tests. It speaks the same JSON protocol through the same transport seams,
//! so the client cannot tell the difference.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::input::{DirectionSource, WanderingBot};
use crate::sync::motion::MotionModel;
use crate::sync::scheduler::fixed_step;
use crate::util::time::unix_millis;

use super::protocol::{
    decode_client_msg, encode, ClientMsg, InputCmd, PlayerData, PlayerDescriptor, PlayerId,
    Position, ServerMsg, Snapshot,
};
use super::transport::{spawn_delay_line, ChannelOutbound, TransportEvent};

/// Loopback server settings
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// One-way delay applied in both directions
    pub latency: Duration,
    pub snapshot_interval: Duration,
    pub motion: MotionModel,
    pub bot_count: usize,
    pub seed: u64,
}

impl From<&Config> for LoopbackConfig {
    fn from(config: &Config) -> Self {
        Self {
            latency: config.simulated_latency,
            snapshot_interval: config.snapshot_interval(),
            motion: MotionModel::new(config.move_speed),
            bot_count: config.bot_count,
            seed: rand::random(),
        }
    }
}

/// Client-side ends of a loopback connection
pub struct LoopbackLink {
    pub outbound: ChannelOutbound,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
    pub control: LoopbackControl,
    pub task: JoinHandle<()>,
}

enum Control {
    Disconnect,
    Reconnect,
    RemoveBot,
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown,
}

/// Drives connection failures and inspects authoritative state
#[derive(Clone)]
pub struct LoopbackControl {
    tx: mpsc::UnboundedSender<Control>,
}

impl LoopbackControl {
    /// Drop the connection. Inputs in flight are lost.
    pub fn disconnect(&self) {
        let _ = self.tx.send(Control::Disconnect);
    }

    /// Re-establish the connection and log the client back in
    pub fn reconnect(&self) {
        let _ = self.tx.send(Control::Reconnect);
    }

    /// Log the most recently added bot out
    pub fn remove_bot(&self) {
        let _ = self.tx.send(Control::RemoveBot);
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Control::Shutdown);
    }

    /// Current authoritative state, undelayed
    pub async fn snapshot(&self) -> Option<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Control::Snapshot(tx)).ok()?;
        rx.await.ok()
    }
}

#[derive(Debug)]
struct ServerPlayer {
    pos: Position,
    last_input_seq: u64,
}

struct LoopbackServer {
    config: LoopbackConfig,
    client_id: PlayerId,
    players: BTreeMap<PlayerId, ServerPlayer>,
    bots: Vec<(PlayerId, WanderingBot)>,
    connected: bool,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

/// Start the server task and return the client's ends of the link
pub fn spawn(config: LoopbackConfig) -> LoopbackLink {
    let (client_tx, inbound) = mpsc::unbounded_channel();
    let to_client = spawn_delay_line(config.latency, move |event| {
        let _ = client_tx.send(event);
    });

    let (server_tx, from_client) = mpsc::unbounded_channel::<String>();
    let outbound = ChannelOutbound::new(spawn_delay_line(config.latency, move |text| {
        let _ = server_tx.send(text);
    }));

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let server = LoopbackServer::new(config, to_client);
    let task = tokio::spawn(server.run(from_client, control_rx));

    LoopbackLink {
        outbound,
        inbound,
        control: LoopbackControl { tx: control_tx },
        task,
    }
}

impl LoopbackServer {
    fn new(config: LoopbackConfig, to_client: mpsc::UnboundedSender<TransportEvent>) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut players = BTreeMap::new();

        let mut place = |rng: &mut ChaCha8Rng| {
            let id = PlayerId(uuid::Builder::from_random_bytes(rng.gen()).into_uuid());
            let pos = Position::new(
                rng.gen_range(0..800) as f32,
                rng.gen_range(0..600) as f32,
            );
            players.insert(
                id,
                ServerPlayer {
                    pos,
                    last_input_seq: 0,
                },
            );
            id
        };

        let client_id = place(&mut rng);
        let bots = (0..config.bot_count)
            .map(|_| (place(&mut rng), WanderingBot::new(rng.gen())))
            .collect();

        Self {
            config,
            client_id,
            players,
            bots,
            connected: false,
            to_client,
        }
    }

    async fn run(
        mut self,
        mut from_client: mpsc::UnboundedReceiver<String>,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) {
        info!(
            client_id = %self.client_id,
            bots = self.bots.len(),
            latency_ms = self.config.latency.as_millis() as u64,
            "Loopback server started"
        );

        let mut snapshots = fixed_step(self.config.snapshot_interval);
        self.connect();

        loop {
            tokio::select! {
                cmd = control.recv() => match cmd {
                    Some(Control::Disconnect) => self.disconnect(),
                    Some(Control::Reconnect) => self.connect(),
                    Some(Control::RemoveBot) => self.remove_bot(),
                    Some(Control::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Control::Shutdown) | None => break,
                },
                text = from_client.recv() => match text {
                    Some(text) => self.handle_client(&text),
                    None => break,
                },
                _ = snapshots.tick() => {
                    self.step_bots();
                    if self.connected {
                        self.emit(&ServerMsg::MapUpdate(self.snapshot()));
                    }
                }
            }
        }

        info!("Loopback server stopped");
    }

    fn connect(&mut self) {
        if self.connected {
            return;
        }
        self.connected = true;
        let _ = self.to_client.send(TransportEvent::Connected);

        // Own login first so the client designates itself
        let logins: Vec<PlayerDescriptor> = std::iter::once(self.client_id)
            .chain(self.bots.iter().map(|(id, _)| *id))
            .filter_map(|id| {
                self.players
                    .get(&id)
                    .map(|p| PlayerDescriptor { id, pos: p.pos })
            })
            .collect();
        for login in logins {
            self.emit(&ServerMsg::Login(login));
        }
        info!(client_id = %self.client_id, "Loopback client connected");
    }

    fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        let _ = self.to_client.send(TransportEvent::Disconnected);
        info!(client_id = %self.client_id, "Loopback client disconnected");
    }

    fn remove_bot(&mut self) {
        let Some((id, _)) = self.bots.pop() else {
            return;
        };
        self.players.remove(&id);
        if self.connected {
            self.emit(&ServerMsg::Logout { id });
        }
        info!(player_id = %id, "Bot left");
    }

    fn handle_client(&mut self, text: &str) {
        if !self.connected {
            debug!("Dropping client message sent before disconnect");
            return;
        }

        match decode_client_msg(text) {
            Ok(ClientMsg::Input(input)) => self.apply_input(self.client_id, &input),
            Ok(ClientMsg::LatencyProbe { timestamp }) => {
                self.emit(&ServerMsg::LatencyEcho {
                    timestamp,
                    processed: unix_millis(),
                });
            }
            Err(e) => warn!(error = %e, "Failed to parse client message"),
        }
    }

    fn apply_input(&mut self, id: PlayerId, input: &InputCmd) {
        let motion = self.config.motion;
        if let Some(player) = self.players.get_mut(&id) {
            if input.seq > player.last_input_seq {
                player.last_input_seq = input.seq;
                player.pos = motion.apply(player.pos, input);
            } else {
                debug!(seq = input.seq, last = player.last_input_seq, "Stale input ignored");
            }
        }
    }

    fn step_bots(&mut self) {
        let motion = self.config.motion;
        for (id, bot) in &mut self.bots {
            let inputs = bot.sample();
            if inputs.is_empty() {
                continue;
            }
            if let Some(player) = self.players.get_mut(id) {
                let input = InputCmd {
                    seq: player.last_input_seq + 1,
                    time: 0,
                    inputs,
                };
                player.last_input_seq = input.seq;
                player.pos = motion.apply(player.pos, &input);
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            players: self
                .players
                .iter()
                .map(|(id, p)| PlayerData {
                    id: *id,
                    pos: p.pos,
                    last_input_seq: p.last_input_seq,
                })
                .collect(),
        }
    }

    fn emit(&self, msg: &ServerMsg) {
        match encode(msg) {
            Ok(text) => {
                let _ = self.to_client.send(TransportEvent::Message(text));
            }
            Err(e) => warn!(error = %e, "Failed to encode server message"),
        }
    }
}
