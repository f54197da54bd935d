//! Pressed-direction sources polled once per tick

use std::sync::Arc;

use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::net::protocol::{Direction, DirectionSet};

/// Abstract input device
pub trait DirectionSource: Send {
    fn is_active(&self, direction: Direction) -> bool;

    /// Called once per tick before the directions are polled
    fn advance(&mut self) {}

    /// Poll every direction
    fn sample(&mut self) -> DirectionSet {
        self.advance();
        Direction::ALL
            .into_iter()
            .filter(|d| self.is_active(*d))
            .collect()
    }
}

/// Directions held down, shared with whatever feeds key events.
///
/// Clones share state: keep one to press/release, hand one to the session.
#[derive(Debug, Clone, Default)]
pub struct HeldDirections {
    held: Arc<RwLock<DirectionSet>>,
}

impl HeldDirections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self, direction: Direction) {
        self.held.write().insert(direction);
    }

    pub fn release(&self, direction: Direction) {
        let mut held = self.held.write();
        *held = held.iter().filter(|d| *d != direction).collect();
    }

    pub fn release_all(&self) {
        *self.held.write() = DirectionSet::empty();
    }
}

impl DirectionSource for HeldDirections {
    fn is_active(&self, direction: Direction) -> bool {
        self.held.read().contains(direction)
    }
}

/// Scripted input that holds a random direction set for a random number of
/// ticks, sometimes idling. Deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct WanderingBot {
    rng: ChaCha8Rng,
    current: DirectionSet,
    ticks_left: u32,
}

impl WanderingBot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            current: DirectionSet::empty(),
            ticks_left: 0,
        }
    }

    fn pick(&mut self) {
        self.ticks_left = self.rng.gen_range(10..60);
        // One in four stretches is idle
        if self.rng.gen_ratio(1, 4) {
            self.current = DirectionSet::empty();
            return;
        }
        let horizontal = [None, Some(Direction::Left), Some(Direction::Right)];
        let vertical = [None, Some(Direction::Up), Some(Direction::Down)];
        let h = horizontal[self.rng.gen_range(0..horizontal.len())];
        let v = vertical[self.rng.gen_range(0..vertical.len())];
        self.current = h.into_iter().chain(v).collect();
    }
}

impl DirectionSource for WanderingBot {
    fn is_active(&self, direction: Direction) -> bool {
        self.current.contains(direction)
    }

    fn advance(&mut self) {
        if self.ticks_left == 0 {
            self.pick();
        }
        self.ticks_left = self.ticks_left.saturating_sub(1);
    }
}
