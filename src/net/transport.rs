//! Transport boundary: outbound sends and inbound connection events

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::protocol::{encode, ClientMsg, ProtocolError};

/// Event delivered by the transport to the client session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection (re)established
    Connected,
    /// Connection lost; the transport owns reconnection
    Disconnected,
    /// Raw text frame, not yet validated
    Message(String),
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport channel closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Outbound half of the bidirectional message channel
pub trait Outbound: Send + Sync {
    fn send(&self, msg: &ClientMsg) -> Result<(), TransportError>;
}

/// Encodes messages to JSON and pushes them down an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelOutbound {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelOutbound {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl Outbound for ChannelOutbound {
    fn send(&self, msg: &ClientMsg) -> Result<(), TransportError> {
        let text = encode(msg)?;
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }
}

/// Forward items to `sink` after a fixed delay, in arrival order.
///
/// Items are stamped on arrival by one task and released by another, so a
/// sleeping release never delays the stamping. Both tasks end once every
/// sender is dropped.
pub fn spawn_delay_line<T, F>(delay: Duration, mut sink: F) -> mpsc::UnboundedSender<T>
where
    T: Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<T>();
    let (stamped_tx, mut stamped_rx) = mpsc::unbounded_channel::<(Instant, T)>();

    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if stamped_tx.send((Instant::now() + delay, item)).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some((due, item)) = stamped_rx.recv().await {
            tokio::time::sleep_until(due).await;
            sink(item);
        }
    });

    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::decode_client_msg;

    #[test]
    fn channel_outbound_sends_json() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outbound = ChannelOutbound::new(tx);
        let msg = ClientMsg::LatencyProbe { timestamp: 12 };

        outbound.send(&msg).unwrap();

        let text = rx.try_recv().unwrap();
        assert_eq!(decode_client_msg(&text).unwrap(), msg);
    }

    #[test]
    fn closed_channel_is_reported() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let outbound = ChannelOutbound::new(tx);

        assert!(matches!(
            outbound.send(&ClientMsg::LatencyProbe { timestamp: 1 }),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_line_holds_back_and_keeps_order() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let line = spawn_delay_line(Duration::from_millis(100), move |v: u32| {
            let _ = out_tx.send(v);
        });

        let start = Instant::now();
        for v in 0..5 {
            line.send(v).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(out_rx.try_recv().is_err());

        let mut got = Vec::new();
        for _ in 0..5 {
            got.push(out_rx.recv().await.unwrap());
        }
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
