//! Round-trip latency measurement, independent of simulation state

use std::collections::VecDeque;

use tokio::sync::watch;
use tracing::debug;

use crate::net::protocol::ClientMsg;

/// One completed probe round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySample {
    /// Client time the probe left (Unix millis)
    pub sent_at: u64,
    /// Client time the echo arrived (Unix millis)
    pub echoed_at: u64,
    /// Server time the probe was processed (Unix millis)
    pub processed: u64,
}

impl LatencySample {
    pub fn round_trip_ms(&self) -> u64 {
        self.echoed_at.saturating_sub(self.sent_at)
    }

    /// Assumes a symmetric path
    pub fn one_way_ms(&self) -> u64 {
        self.round_trip_ms() / 2
    }

    /// Estimated server clock minus client clock
    pub fn clock_offset_ms(&self) -> i64 {
        let midpoint = self.sent_at + self.one_way_ms();
        self.processed as i64 - midpoint as i64
    }
}

/// Unanswered probes remembered for matching echoes
const MAX_OUTSTANDING_PROBES: usize = 16;

/// Sends timestamped probes and publishes the latest sample.
///
/// A missed echo is not an error; readers keep seeing the previous sample.
#[derive(Debug)]
pub struct LatencyProbe {
    latest: watch::Sender<Option<LatencySample>>,
    outstanding: VecDeque<u64>,
}

impl LatencyProbe {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest,
            outstanding: VecDeque::with_capacity(MAX_OUTSTANDING_PROBES),
        }
    }

    /// Read-only view of the latest sample
    pub fn subscribe(&self) -> watch::Receiver<Option<LatencySample>> {
        self.latest.subscribe()
    }

    /// Build the next probe stamped with `now`
    pub fn probe(&mut self, now: u64) -> ClientMsg {
        if self.outstanding.len() == MAX_OUTSTANDING_PROBES {
            self.outstanding.pop_front();
        }
        self.outstanding.push_back(now);
        ClientMsg::LatencyProbe { timestamp: now }
    }

    /// Record an echo received at `now`.
    ///
    /// Only echoes of outstanding probes count. An accepted echo retires its
    /// probe and every older one, so late echoes never overwrite a newer
    /// sample. Anything else returns `None`.
    pub fn on_echo(&mut self, timestamp: u64, processed: u64, now: u64) -> Option<LatencySample> {
        if timestamp > now {
            debug!(timestamp, now, "Latency echo from the future ignored");
            return None;
        }
        let Some(index) = self.outstanding.iter().position(|&t| t == timestamp) else {
            debug!(timestamp, "Latency echo matches no outstanding probe");
            return None;
        };
        self.outstanding.drain(..=index);

        let sample = LatencySample {
            sent_at: timestamp,
            echoed_at: now,
            processed,
        };
        self.latest.send_replace(Some(sample));
        debug!(
            round_trip_ms = sample.round_trip_ms(),
            clock_offset_ms = sample.clock_offset_ms(),
            "Latency updated"
        );
        Some(sample)
    }
}

impl Default for LatencyProbe {
    fn default() -> Self {
        Self::new()
    }
}
