//! Recurring schedule for a client session, with explicit teardown

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::input::DirectionSource;
use crate::net::TransportEvent;

use super::session::ClientSession;
use super::view::Renderer;

/// Recurring interval that skips missed ticks instead of bursting
pub fn fixed_step(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Owns a running session task.
///
/// `shutdown` stops the tick schedule and the latency probe schedule in one
/// call. Dropping the handle has the same effect, without waiting.
pub struct SessionHandle<S, R> {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<ClientSession<S, R>>,
}

impl<S, R> SessionHandle<S, R>
where
    S: DirectionSource + 'static,
    R: Renderer + 'static,
{
    /// Run `session` on its own task. Inbound transport events are pushed
    /// onto the session queue as they arrive; the tick drains it.
    pub fn spawn(
        session: ClientSession<S, R>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
        tick_period: Duration,
        probe_period: Duration,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_session(
            session,
            inbound,
            tick_period,
            probe_period,
            shutdown_rx,
        ));
        Self { shutdown, task }
    }

    /// Stop both schedules and hand the session back for inspection
    pub async fn shutdown(self) -> Result<ClientSession<S, R>, tokio::task::JoinError> {
        let _ = self.shutdown.send(true);
        self.task.await
    }
}

async fn run_session<S, R>(
    mut session: ClientSession<S, R>,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    tick_period: Duration,
    probe_period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> ClientSession<S, R>
where
    S: DirectionSource,
    R: Renderer,
{
    info!(
        tick_ms = tick_period.as_secs_f64() * 1000.0,
        probe_ms = probe_period.as_millis() as u64,
        "Session started"
    );

    let ingress = session.ingress();
    let mut ticker = fixed_step(tick_period);
    let mut prober = fixed_step(probe_period);
    let mut inbound_open = true;

    loop {
        tokio::select! {
            // Err means the handle was dropped
            changed = shutdown.changed() => {
                let stop = changed.is_err() || *shutdown.borrow();
                if stop {
                    break;
                }
            }
            event = inbound.recv(), if inbound_open => match event {
                Some(event) => ingress.accept(event),
                None => {
                    debug!("Transport closed its event stream");
                    ingress.accept(TransportEvent::Disconnected);
                    inbound_open = false;
                }
            },
            _ = ticker.tick() => session.tick(),
            _ = prober.tick() => session.send_probe(),
        }
    }

    let report = session.report();
    info!(
        ticks = report.ticks,
        snapshots = report.snapshots_applied,
        inputs_sent = report.inputs_sent,
        dropped = report.dropped_messages,
        "Session stopped"
    );
    session
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_test::assert_ok;

    use super::*;
    use crate::input::HeldDirections;
    use crate::net::loopback::{self, LoopbackConfig, LoopbackControl};
    use crate::net::protocol::{Direction, Position};
    use crate::sync::motion::MotionModel;
    use crate::sync::session::tests::RecordingRenderer;
    use crate::sync::session::SessionSettings;

    const TICK: Duration = Duration::from_millis(16);
    const PROBE: Duration = Duration::from_millis(200);

    struct Running {
        handle: SessionHandle<HeldDirections, RecordingRenderer>,
        keys: HeldDirections,
        renderer: RecordingRenderer,
        control: LoopbackControl,
    }

    fn start(prediction_enabled: bool, bot_count: usize) -> Running {
        let link = loopback::spawn(LoopbackConfig {
            latency: Duration::from_millis(50),
            snapshot_interval: Duration::from_millis(50),
            motion: MotionModel::new(1.0),
            bot_count,
            seed: 5,
        });
        let keys = HeldDirections::new();
        let renderer = RecordingRenderer::default();
        let session = ClientSession::new(
            SessionSettings {
                prediction_enabled,
                motion: MotionModel::new(1.0),
                input_send_delay: None,
            },
            Arc::new(link.outbound),
            keys.clone(),
            renderer.clone(),
        );

        Running {
            handle: SessionHandle::spawn(session, link.inbound, TICK, PROBE),
            keys,
            renderer,
            control: link.control,
        }
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn local_pos(renderer: &RecordingRenderer) -> Position {
        renderer.last().local().expect("logged in").pos
    }

    #[tokio::test(start_paused = true)]
    async fn converges_to_server_once_input_stops() {
        let run = start(true, 0);
        sleep_ms(150).await;
        run.keys.press(Direction::Right);
        run.keys.press(Direction::Down);
        sleep_ms(500).await;
        run.keys.release_all();
        sleep_ms(500).await;

        let session = assert_ok!(run.handle.shutdown().await);
        let server = run.control.snapshot().await.unwrap();
        let local = session.reconciler().registry().local().unwrap();
        let authoritative = server.players.iter().find(|p| p.id == local.id).unwrap();

        assert!(local.inputs.is_empty());
        assert_eq!(local.pos, authoritative.pos);
        let report = session.report();
        assert!(report.inputs_sent > 0);
        assert_eq!(authoritative.last_input_seq, report.inputs_sent);
        run.control.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn prediction_moves_before_server_round_trip() {
        let run = start(true, 0);
        sleep_ms(150).await;
        let before = local_pos(&run.renderer);

        run.keys.press(Direction::Right);
        // Well under the 100ms round trip
        sleep_ms(40).await;
        assert!(local_pos(&run.renderer).x > before.x);

        assert_ok!(run.handle.shutdown().await);
        run.control.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn without_prediction_nothing_moves_before_round_trip() {
        let run = start(false, 0);
        sleep_ms(150).await;
        let before = local_pos(&run.renderer);

        run.keys.press(Direction::Right);
        sleep_ms(40).await;
        assert_eq!(local_pos(&run.renderer), before);

        sleep_ms(300).await;
        assert!(local_pos(&run.renderer).x > before.x);

        assert_ok!(run.handle.shutdown().await);
        run.control.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_does_not_duplicate_remote_players() {
        let run = start(true, 2);
        sleep_ms(200).await;
        assert_eq!(run.renderer.last().players.len(), 3);

        run.control.disconnect();
        sleep_ms(100).await;
        run.control.reconnect();
        sleep_ms(200).await;

        assert_eq!(run.renderer.last().players.len(), 3);
        let released: usize = run
            .renderer
            .frames
            .lock()
            .iter()
            .map(|f| f.released.len())
            .sum();
        assert_eq!(released, 2);

        assert_ok!(run.handle.shutdown().await);
        run.control.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn converges_after_moving_while_disconnected() {
        let run = start(true, 0);
        sleep_ms(150).await;

        run.control.disconnect();
        sleep_ms(100).await;
        run.keys.press(Direction::Right);
        sleep_ms(100).await;
        run.keys.release_all();
        run.control.reconnect();
        sleep_ms(1000).await;

        let session = assert_ok!(run.handle.shutdown().await);
        let server = run.control.snapshot().await.unwrap();
        let local = session.reconciler().registry().local().unwrap();
        let authoritative = server.players.iter().find(|p| p.id == local.id).unwrap();

        assert!(session.report().inputs_logged > session.report().inputs_sent);
        assert!(local.inputs.is_empty());
        assert_eq!(local.pos, authoritative.pos);
        run.control.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn logout_removes_remote_player() {
        let run = start(true, 1);
        sleep_ms(200).await;
        assert_eq!(run.renderer.last().players.len(), 2);

        run.control.remove_bot();
        sleep_ms(200).await;
        assert_eq!(run.renderer.last().players.len(), 1);

        assert_ok!(run.handle.shutdown().await);
        run.control.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_observable_and_shutdown_stops_ticking() {
        let run = start(true, 0);
        sleep_ms(1000).await;

        let session = assert_ok!(run.handle.shutdown().await);
        assert!(session.latency().borrow().is_some());
        assert!(session.report().probes_sent >= 4);

        let frames = run.renderer.frames.lock().len();
        sleep_ms(500).await;
        assert_eq!(run.renderer.frames.lock().len(), frames);
        run.control.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_the_session() {
        let run = start(true, 0);
        sleep_ms(100).await;
        drop(run.handle);
        sleep_ms(50).await;

        let frames = run.renderer.frames.lock().len();
        sleep_ms(500).await;
        assert_eq!(run.renderer.frames.lock().len(), frames);
        run.control.shutdown();
    }
}
