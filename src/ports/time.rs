use std::time::Duration;

use time::OffsetDateTime;

/// Clock used by the alert timers. Tests swap in a clock they advance by hand.
pub trait TimeProvider: Clone + Send + Sync + 'static {
    type Sleep<'a>: Future<Output = ()> + Send + 'a
    where
        Self: 'a;

    fn now(&self) -> OffsetDateTime;
    fn sleep<'a>(&'a self, duration: Duration) -> Self::Sleep<'a>;

    /// How long to wait for `at`, or `None` when it is already due.
    fn delay_until(&self, at: OffsetDateTime) -> Option<Duration> {
        let delay = at - self.now();
        if delay.is_positive() {
            Some(delay.try_into().unwrap_or(Duration::MAX))
        } else {
            None
        }
    }
}
