//! Wire protocol message definitions
//! These are the wire types for client-server communication

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque player identifier assigned by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// World position in screen coordinates (+y points down)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Movement direction held on the input device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    fn bit(self) -> u8 {
        match self {
            Direction::Up => 0b0001,
            Direction::Down => 0b0010,
            Direction::Left => 0b0100,
            Direction::Right => 0b1000,
        }
    }
}

/// Set of directions active during one tick.
///
/// Serialized as a list, e.g. `["up", "right"]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Direction>", into = "Vec<Direction>")]
pub struct DirectionSet(u8);

impl DirectionSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, direction: Direction) {
        self.0 |= direction.bit();
    }

    pub fn contains(&self, direction: Direction) -> bool {
        self.0 & direction.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::ALL.into_iter().filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Direction> for DirectionSet {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        let mut set = Self::empty();
        for direction in iter {
            set.insert(direction);
        }
        set
    }
}

impl From<Vec<Direction>> for DirectionSet {
    fn from(directions: Vec<Direction>) -> Self {
        directions.into_iter().collect()
    }
}

impl From<DirectionSet> for Vec<Direction> {
    fn from(set: DirectionSet) -> Self {
        set.iter().collect()
    }
}

/// One locally issued input command
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputCmd {
    /// Per-player sequence number, starts at 1
    pub seq: u64,
    /// Capture time, Unix seconds
    pub time: u64,
    /// Directions held this tick
    pub inputs: DirectionSet,
}

/// Player entry in an authoritative snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    pub id: PlayerId,
    pub pos: Position,
    /// Last input sequence the server has applied for this player
    pub last_input_seq: u64,
}

/// Authoritative world state at one server tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub players: Vec<PlayerData>,
}

/// Player descriptor carried by login notices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerDescriptor {
    pub id: PlayerId,
    pub pos: Position,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Player input for one tick
    Input(InputCmd),

    /// Ping for latency measurement
    LatencyProbe {
        /// Client timestamp (Unix millis)
        timestamp: u64,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Player logged in. The first one a client receives is itself.
    Login(PlayerDescriptor),

    /// Player left
    Logout { id: PlayerId },

    /// Game state snapshot (sent at regular intervals)
    #[serde(alias = "snapshot")]
    MapUpdate(Snapshot),

    /// Echo of a latency probe
    LatencyEcho {
        /// Echo back client timestamp
        timestamp: u64,
        /// Server time when the probe was processed
        processed: u64,
    },
}

/// Rejected inbound or outbound message
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("non-finite position for player {0}")]
    NonFinitePosition(PlayerId),

    #[error("player {0} listed twice in one snapshot")]
    DuplicatePlayer(PlayerId),

    #[error("input sequence numbers start at 1")]
    ZeroSequence,
}

/// Decode and validate a server message at the transport boundary
pub fn decode_server_msg(text: &str) -> Result<ServerMsg, ProtocolError> {
    let msg: ServerMsg = serde_json::from_str(text)?;

    match &msg {
        ServerMsg::Login(player) if !player.pos.is_finite() => {
            return Err(ProtocolError::NonFinitePosition(player.id));
        }
        ServerMsg::MapUpdate(snapshot) => {
            let mut seen = HashSet::with_capacity(snapshot.players.len());
            for player in &snapshot.players {
                if !player.pos.is_finite() {
                    return Err(ProtocolError::NonFinitePosition(player.id));
                }
                if !seen.insert(player.id) {
                    return Err(ProtocolError::DuplicatePlayer(player.id));
                }
            }
        }
        _ => {}
    }

    Ok(msg)
}

/// Decode and validate a client message (server side of the boundary)
pub fn decode_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    let msg: ClientMsg = serde_json::from_str(text)?;
    if let ClientMsg::Input(input) = &msg {
        if input.seq == 0 {
            return Err(ProtocolError::ZeroSequence);
        }
    }
    Ok(msg)
}

/// Encode any protocol message to its JSON text form
pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}
