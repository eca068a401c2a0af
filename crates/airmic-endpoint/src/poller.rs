//! Fixed-period level polling with cancellation.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Shortest period a poller runs at. Shorter requests, zero included, are
/// raised to this.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Run `tick` every `period` until `cancel` fires or `tick` breaks.
///
/// The first tick runs one full period after the call. Ticks missed while
/// the runtime was busy are skipped, not replayed. `period` is raised to at
/// least [`MIN_PERIOD`].
pub fn spawn_poller<F>(period: Duration, cancel: CancellationToken, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    let period = period.max(MIN_PERIOD);
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if tick().is_break() {
                        break;
                    }
                }
            }
        }
        tracing::trace!("Poller stopped");
    })
}
