use crate::ports;
use crate::schedule::AlertTimer;

use std::future::Future;
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tracing::debug;

/// Spawns the task behind one alert bucket: wait until `at`, then run `fire`.
/// Instants already in the past fire on the task's first poll.
pub(crate) fn spawn_timer<T, F, Fut>(
    runtime: &Handle,
    time: T,
    id: u64,
    at: OffsetDateTime,
    fire: F,
) -> AlertTimer
where
    T: ports::TimeProvider,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let handle = runtime.spawn(async move {
        if let Some(delay) = time.delay_until(at) {
            debug!("alert timer {id} sleeping {delay:?} until {at}");
            time.sleep(delay).await;
        }
        fire().await;
    });
    AlertTimer::new(id, handle)
}
