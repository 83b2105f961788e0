use embassy_time::Instant;

/// Monotonic tick clock plus the two ways the scheduler waits on it.
///
/// `sleep_until` takes an absolute deadline. Sleeping for a relative duration measured again every
/// cycle would accumulate drift.
#[allow(async_fn_in_trait)]
pub trait Clock {
    fn now(&self) -> Instant;

    async fn sleep_until(&self, deadline: Instant);

    /// let other tasks run between polls while phase locking
    async fn yield_now(&self);
}

/// embassy-time backed clock. Needs a time driver linked in (std, stm32, esp, ...)
#[cfg(feature = "embassy")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbassyClock;

#[cfg(feature = "embassy")]
impl Clock for EmbassyClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        embassy_time::Timer::at(deadline).await
    }

    async fn yield_now(&self) {
        embassy_futures::yield_now().await
    }
}
