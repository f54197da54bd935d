//! Input sequencing and the log of unacknowledged inputs

use std::collections::VecDeque;

use crate::net::protocol::InputCmd;

/// Hands out input sequence numbers: 1, 2, 3, ...
///
/// Never reset within a session, including across reconnects, so a stale
/// acknowledgment can never prune a newer input.
#[derive(Debug, Default)]
pub struct Sequencer {
    last: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_seq(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Last sequence number handed out (0 before the first)
    pub fn last(&self) -> u64 {
        self.last
    }
}

/// Rejected append
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("input seq {seq} is not newer than log tail {tail}")]
    OutOfOrder { seq: u64, tail: u64 },
}

/// Inputs issued locally and not yet acknowledged by the server.
///
/// Always sorted ascending by `seq` with no duplicates.
#[derive(Debug, Default, Clone)]
pub struct InputLog {
    entries: VecDeque<InputCmd>,
}

impl InputLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push to the tail. `input.seq` must exceed every logged seq.
    pub fn append(&mut self, input: InputCmd) -> Result<(), SequenceError> {
        if let Some(tail) = self.entries.back() {
            if input.seq <= tail.seq {
                return Err(SequenceError::OutOfOrder {
                    seq: input.seq,
                    tail: tail.seq,
                });
            }
        }
        self.entries.push_back(input);
        Ok(())
    }

    /// Drop every entry with `seq <= last_seq`. Returns how many were removed.
    ///
    /// Acks for seqs the log never held (gaps, reconnects) prune nothing extra.
    pub fn prune_acknowledged(&mut self, last_seq: u64) -> usize {
        let before = self.entries.len();
        // Sorted, so acknowledged entries are a prefix
        while self.entries.front().is_some_and(|e| e.seq <= last_seq) {
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputCmd> {
        self.entries.iter()
    }

    pub fn first_seq(&self) -> Option<u64> {
        self.entries.front().map(|e| e.seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
