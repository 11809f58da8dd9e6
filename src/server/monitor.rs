//! Background demotion of idle participants.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::protocol::{Availability, ServerEvent};
use crate::server::state::AppState;

/// How often the monitor sweeps the registry.
pub const MONITOR_TICK: Duration = Duration::from_secs(10);

/// How long an available participant may stay inactive before the monitor
/// marks it away.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Periodic sweeper that turns idle available participants away. Busy and
/// away participants are never touched.
pub struct ActivityMonitor {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ActivityMonitor {
    pub fn spawn(state: Arc<AppState>, idle_timeout: Duration, tick: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // The first tick of an interval completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => sweep(&state, idle_timeout).await,
                    _ = stopped.changed() => break,
                }
            }
        });
        Self { stop, task }
    }

    /// Signal the monitor to stop and wait for it; observed within one tick.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

async fn sweep(state: &AppState, idle_timeout: Duration) {
    for identifier in state.registry.demote_idle(idle_timeout).await {
        state
            .events
            .record(&format!("participant {identifier} set to away after inactivity"));
        let update = ServerEvent::AvailabilityUpdate {
            identifier,
            availability: Availability::Away,
        };
        state.registry.broadcast(&update.encode()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::logger::EventLog;
    use crate::protocol::ServerEvent;
    use crate::server::registry::RegisterOutcome;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    async fn connect(state: &Arc<AppState>, identifier: &str) -> UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        match state
            .registry
            .register(identifier, tx, "127.0.0.1:9000".parse().unwrap())
            .await
        {
            RegisterOutcome::Fresh(_) | RegisterOutcome::Reactivated(_) => rx,
            RegisterOutcome::DuplicateRejected => panic!("registration of {identifier} rejected"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn idle_participants_are_demoted_and_the_update_is_broadcast() {
        let state = Arc::new(AppState::new(EventLog::console_only()));
        let mut alice = connect(&state, "alice").await;
        let _bob = connect(&state, "bob").await;
        state
            .registry
            .set_availability("bob", Availability::Busy)
            .await;

        let monitor = ActivityMonitor::spawn(
            state.clone(),
            Duration::from_secs(60),
            Duration::from_secs(10),
        );

        tokio::time::sleep(Duration::from_secs(75)).await;

        let mut updates = Vec::new();
        while let Ok(frame) = alice.try_recv() {
            updates.push(ServerEvent::decode(&frame).expect("well-formed frame"));
        }
        assert_eq!(
            updates,
            [ServerEvent::AvailabilityUpdate {
                identifier: "alice".into(),
                availability: Availability::Away,
            }]
        );
        assert_eq!(
            state.registry.availability_of("alice").await,
            Some(Availability::Away)
        );
        // Busy participants are exempt from demotion.
        assert_eq!(
            state.registry.availability_of("bob").await,
            Some(Availability::Busy)
        );

        monitor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_observed_without_waiting_for_a_tick() {
        let state = Arc::new(AppState::new(EventLog::console_only()));
        let monitor = ActivityMonitor::spawn(state, Duration::from_secs(60), MONITOR_TICK);

        tokio::time::timeout(Duration::from_secs(1), monitor.shutdown())
            .await
            .expect("monitor must stop promptly");
    }
}
