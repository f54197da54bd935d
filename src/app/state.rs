//! Running client: session plus the loopback server it talks to

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::input::{DirectionSource, HeldDirections, WanderingBot};
use crate::net::loopback::{self, LoopbackConfig, LoopbackControl};
use crate::net::protocol::{Direction, DirectionSet};
use crate::sync::latency::LatencySample;
use crate::sync::scheduler::fixed_step;
use crate::sync::{ClientSession, LogRenderer, SessionHandle, SessionReport, SessionSettings};

/// Frames between renderer summaries
const RENDER_SUMMARY_EVERY: u64 = 60;

/// Everything started for one client session
pub struct ClientApp {
    session: SessionHandle<HeldDirections, LogRenderer>,
    keyboard: JoinHandle<()>,
    server: LoopbackControl,
    server_task: JoinHandle<()>,
    latency: watch::Receiver<Option<LatencySample>>,
}

impl ClientApp {
    /// Start the loopback server and the client session. Needs a tokio runtime.
    pub fn start(config: &Config) -> Self {
        let loopback_config = LoopbackConfig::from(config);
        let input_seed = loopback_config.seed.wrapping_add(1);
        let link = loopback::spawn(loopback_config);

        let keys = HeldDirections::new();
        let keyboard = tokio::spawn(press_keys(
            WanderingBot::new(input_seed),
            keys.clone(),
            config.tick_interval(),
        ));

        let session = ClientSession::new(
            SessionSettings::from(config),
            Arc::new(link.outbound),
            keys,
            LogRenderer::new(RENDER_SUMMARY_EVERY),
        );
        let latency = session.latency();
        let session = SessionHandle::spawn(
            session,
            link.inbound,
            config.tick_interval(),
            config.latency_probe_interval,
        );

        Self {
            session,
            keyboard,
            server: link.control,
            server_task: link.task,
            latency,
        }
    }

    /// Read-only latency observable
    pub fn latency(&self) -> watch::Receiver<Option<LatencySample>> {
        self.latency.clone()
    }

    /// Stop the session schedules, then the server
    pub async fn shutdown(self) -> SessionReport {
        self.keyboard.abort();
        let report = match self.session.shutdown().await {
            Ok(session) => session.report(),
            Err(e) => {
                warn!(error = %e, "Session task failed");
                SessionReport::default()
            }
        };

        self.server.shutdown();
        if let Err(e) = self.server_task.await {
            warn!(error = %e, "Loopback server task failed");
        }
        info!("Client shutdown complete");
        report
    }
}

/// Stand-in for a keyboard: turns a scripted bot into key press and
/// release events on the shared held-direction state
async fn press_keys(mut bot: WanderingBot, keys: HeldDirections, period: Duration) {
    let mut ticker = fixed_step(period);
    let mut held = DirectionSet::empty();
    loop {
        ticker.tick().await;
        let next = bot.sample();
        if next.is_empty() {
            keys.release_all();
            held = next;
            continue;
        }
        for direction in Direction::ALL {
            match (held.contains(direction), next.contains(direction)) {
                (false, true) => keys.press(direction),
                (true, false) => keys.release(direction),
                _ => {}
            }
        }
        held = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn keyboard_task_mirrors_the_bot() {
        let period = Duration::from_millis(10);
        let keys = HeldDirections::new();
        let task = tokio::spawn(press_keys(WanderingBot::new(3), keys.clone(), period));
        let mut twin = WanderingBot::new(3);
        let mut held = keys.clone();

        tokio::time::sleep(period / 2).await;
        for _ in 0..300 {
            assert_eq!(held.sample(), twin.sample());
            tokio::time::sleep(period).await;
        }
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn runs_and_shuts_down_cleanly() {
        let config = Config {
            simulated_latency: Duration::from_millis(30),
            ..Config::default()
        };
        let app = ClientApp::start(&config);
        let mut latency = app.latency();

        tokio::time::sleep(Duration::from_secs(3)).await;
        let report = app.shutdown().await;

        assert!(report.ticks > 100);
        assert!(report.snapshots_applied > 0);
        assert_eq!(report.dropped_messages, 0);
        assert!(latency.borrow_and_update().is_some());
    }
}
