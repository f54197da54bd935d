//! Player table and snapshot reconciliation

use std::collections::HashMap;

use tracing::{debug, info};

use crate::net::protocol::{InputCmd, PlayerDescriptor, PlayerId, Position, Snapshot};

use super::input_log::{InputLog, SequenceError};
use super::motion::MotionModel;

/// Opaque token pairing a player with whatever the presentation layer drew
/// for it. Released when the player is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresentationHandle(u64);

/// A player as known to this client
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    /// Authoritative position, advanced by any locally predicted inputs
    pub pos: Position,
    /// Pending inputs (only ever non-empty for the local player)
    pub inputs: InputLog,
    handle: PresentationHandle,
}

impl Player {
    pub fn handle(&self) -> PresentationHandle {
        self.handle
    }
}

/// All players known to this client. Only the tick context mutates it.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<PlayerId, Player>,
    local: Option<PlayerId>,
    next_handle: u64,
    released: Vec<PresentationHandle>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new player, or return the existing one untouched
    pub fn create(&mut self, id: PlayerId, pos: Position) -> &mut Player {
        let next_handle = &mut self.next_handle;
        self.players.entry(id).or_insert_with(|| {
            *next_handle += 1;
            Player {
                id,
                pos,
                inputs: InputLog::new(),
                handle: PresentationHandle(*next_handle),
            }
        })
    }

    pub fn get(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn get_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    /// Remove a player and queue its presentation handle for release
    pub fn remove(&mut self, id: &PlayerId) -> Option<Player> {
        let player = self.players.remove(id)?;
        self.released.push(player.handle);
        if self.local == Some(*id) {
            self.local = None;
        }
        Some(player)
    }

    /// Remove every player except the local one. Returns how many went.
    pub fn clear_remote(&mut self) -> usize {
        let remote: Vec<PlayerId> = self
            .players
            .keys()
            .filter(|id| Some(**id) != self.local)
            .copied()
            .collect();
        for id in &remote {
            self.remove(id);
        }
        remote.len()
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local
    }

    pub fn local(&self) -> Option<&Player> {
        self.local.and_then(|id| self.players.get(&id))
    }

    pub fn local_mut(&mut self) -> Option<&mut Player> {
        let id = self.local?;
        self.players.get_mut(&id)
    }

    fn set_local(&mut self, id: PlayerId) {
        self.local = Some(id);
    }

    /// Handles released since the last call
    pub fn take_released(&mut self) -> Vec<PresentationHandle> {
        std::mem::take(&mut self.released)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }
}

/// What a login notice did to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// First login of the session: this client's own player
    Local,
    /// Local player logged in again (reconnect); position re-baselined
    LocalRebased,
    Remote,
}

/// Per-snapshot summary
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    /// Inputs dropped from the local log (acknowledged or discarded)
    pub pruned: usize,
    /// Inputs replayed on top of the authoritative position
    pub replayed: usize,
    /// Distance between the local prediction before and after the snapshot
    pub correction: f32,
}

/// Applies authoritative snapshots to the player table
#[derive(Debug)]
pub struct Reconciler {
    registry: PlayerRegistry,
    motion: MotionModel,
    prediction_enabled: bool,
}

impl Reconciler {
    pub fn new(motion: MotionModel, prediction_enabled: bool) -> Self {
        Self {
            registry: PlayerRegistry::new(),
            motion,
            prediction_enabled,
        }
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PlayerRegistry {
        &mut self.registry
    }

    /// Reconcile one snapshot, in the snapshot's player order.
    ///
    /// Players missing from the snapshot are left alone; only logout removes.
    pub fn reconcile(&mut self, snapshot: &Snapshot) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let local = self.registry.local_id();

        for data in &snapshot.players {
            let Some(player) = self.registry.get_mut(&data.id) else {
                self.registry.create(data.id, data.pos);
                stats.created += 1;
                debug!(player_id = %data.id, "Player first seen in snapshot");
                continue;
            };

            let predicted = player.pos;
            player.pos = data.pos;
            stats.updated += 1;

            if !self.prediction_enabled {
                stats.pruned += player.inputs.len();
                player.inputs.clear();
                continue;
            }

            if Some(data.id) != local {
                continue;
            }

            stats.pruned += player.inputs.prune_acknowledged(data.last_input_seq);
            // Base was just reset to the server's value, so this is idempotent
            player.pos = self.motion.replay(player.pos, player.inputs.iter());
            stats.replayed += player.inputs.len();

            let (dx, dy) = (player.pos.x - predicted.x, player.pos.y - predicted.y);
            stats.correction = (dx * dx + dy * dy).sqrt();
            if stats.correction > f32::EPSILON {
                debug!(
                    player_id = %data.id,
                    ack = data.last_input_seq,
                    pending = player.inputs.len(),
                    oldest_pending = ?player.inputs.first_seq(),
                    correction = stats.correction,
                    "Prediction corrected"
                );
            }
        }

        stats
    }

    /// Log a locally issued input and, with prediction on, apply it now.
    ///
    /// Returns `Ok(false)` when there is no local player yet.
    pub fn record_local_input(&mut self, input: InputCmd) -> Result<bool, SequenceError> {
        let motion = self.motion;
        let predict = self.prediction_enabled;
        let Some(player) = self.registry.local_mut() else {
            return Ok(false);
        };

        player.inputs.append(input)?;
        if predict {
            player.pos = motion.apply(player.pos, &input);
        }
        Ok(true)
    }

    /// Apply a login notice
    pub fn login(&mut self, descriptor: PlayerDescriptor) -> LoginOutcome {
        match self.registry.local_id() {
            None => {
                // A snapshot may already have created this record
                self.registry.create(descriptor.id, descriptor.pos).pos = descriptor.pos;
                self.registry.set_local(descriptor.id);
                info!(player_id = %descriptor.id, "Logged in as local player");
                LoginOutcome::Local
            }
            Some(local) if local == descriptor.id => {
                // Inputs logged before this login can never be acknowledged
                let player = self.registry.create(descriptor.id, descriptor.pos);
                player.pos = descriptor.pos;
                let discarded = player.inputs.len();
                player.inputs.clear();
                info!(player_id = %descriptor.id, discarded, "Local player logged in again");
                LoginOutcome::LocalRebased
            }
            Some(_) => {
                self.registry.create(descriptor.id, descriptor.pos).pos = descriptor.pos;
                info!(player_id = %descriptor.id, "Remote player logged in");
                LoginOutcome::Remote
            }
        }
    }

    /// Apply a logout notice. Unknown ids are a no-op.
    pub fn logout(&mut self, id: PlayerId) -> bool {
        match self.registry.remove(&id) {
            Some(_) => {
                info!(player_id = %id, "Player logged out");
                true
            }
            None => {
                debug!(player_id = %id, "Logout for unknown player ignored");
                false
            }
        }
    }

    /// Drop remote players held over from before a reconnect
    pub fn on_reconnect(&mut self) -> usize {
        let cleared = self.registry.clear_remote();
        if cleared > 0 {
            info!(cleared, "Cleared remote players after reconnect");
        }
        cleared
    }
}
