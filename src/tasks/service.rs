//! Background jobs that run on a fixed period until stopped.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Handle to a running periodic service.
pub struct ServiceHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ServiceHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the service and wait for the current run to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.join.await;
        info!("Stopped service {}", self.name);
    }
}

/// Run `tick` every `period`, the first time after one full period.
///
/// A slow run delays the next one rather than stacking up missed ticks.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> ServiceHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (stop, mut stopped) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Running service {}", name);
                    tick().await;
                }
                _ = stopped.changed() => break,
            }
        }
    });

    info!(?period, "Started service {}", name);
    ServiceHandle { name, stop, join }
}
