//! The hand-off between the edge context (interrupt, exti task, timer thread) and the scheduler.
use core::cell::Cell;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant};

use crate::errors::If482Result;

pub const PULSE_PERIOD: Duration = Duration::from_secs(1);

/// Single slot wake channel that carries the tick of the most recent edge.
///
/// If two edges arrive before the scheduler gets to them, only the newest tick is kept.
pub struct PulseSignal(Signal<CriticalSectionRawMutex, Instant>);

impl Default for PulseSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseSignal {
    pub const fn new() -> Self {
        Self(Signal::new())
    }

    pub fn sender(&self) -> PulseSender<'_> {
        PulseSender(self)
    }

    pub fn receiver(&self) -> PulseReceiver<'_> {
        PulseReceiver(self)
    }
}

#[derive(Clone, Copy)]
pub struct PulseSender<'a>(&'a PulseSignal);

impl PulseSender<'_> {
    /// Safe to call from an interrupt handler: never blocks, never allocates, never logs.
    #[inline]
    pub fn on_edge(&self, tick: Instant) {
        self.0.0.signal(tick);
    }
}

pub struct PulseReceiver<'a>(&'a PulseSignal);

impl PulseReceiver<'_> {
    /// wait for the next edge and take it out of the slot
    pub async fn wait(&self) -> Instant {
        self.0.0.wait().await
    }

    /// an edge is waiting that hasn't been taken yet
    pub fn pending(&self) -> bool {
        self.0.0.signaled()
    }

    pub fn clear(&self) {
        self.0.0.reset();
    }
}

/// Tick of the most recent edge, armed or not.
///
/// A clock that only reads whole seconds and rolls over on the edges (the DS3231 and its square
/// wave) is only worth as much as the tick its current second started at. This is that tick.
pub struct EdgeStamp(Mutex<CriticalSectionRawMutex, Cell<Option<Instant>>>);

impl Default for EdgeStamp {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeStamp {
    pub const fn new() -> Self {
        Self(Mutex::new(Cell::new(None)))
    }

    /// interrupt safe, same as `PulseSender::on_edge`
    #[inline]
    pub fn mark(&self, tick: Instant) {
        self.0.lock(|last| last.set(Some(tick)));
    }

    pub fn last(&self) -> Option<Instant> {
        self.0.lock(Cell::get)
    }
}

/// The hardware (or timer) that raises one edge per second.
pub trait PulseSource<'a> {
    /// Set up the 1 Hz source. Must fail fast if the hardware can't be reached.
    fn configure(&mut self) -> If482Result<()>;

    /// Start forwarding edges. Only called once the scheduler is ready to receive them.
    fn arm(&mut self, edges: PulseSender<'a>);
}

#[cfg(test)]
mod tests {
    use super::{EdgeStamp, PulseSignal};
    use embassy_futures::block_on;
    use embassy_time::Instant;

    #[test]
    fn test_latest_edge_wins() {
        let signal = PulseSignal::new();
        let tx = signal.sender();
        let rx = signal.receiver();

        assert!(!rx.pending());

        tx.on_edge(Instant::from_millis(1_000));
        tx.on_edge(Instant::from_millis(2_000));
        tx.on_edge(Instant::from_millis(3_000));

        assert!(rx.pending());
        assert_eq!(block_on(rx.wait()), Instant::from_millis(3_000));
        assert!(!rx.pending());
    }

    #[test]
    fn test_clear() {
        let signal = PulseSignal::new();

        signal.sender().on_edge(Instant::from_millis(5));
        signal.receiver().clear();

        assert!(!signal.receiver().pending());
    }

    #[test]
    fn test_edge_stamp_keeps_latest() {
        let stamp = EdgeStamp::new();

        assert_eq!(stamp.last(), None);

        stamp.mark(Instant::from_millis(100));
        stamp.mark(Instant::from_millis(1_100));

        assert_eq!(stamp.last(), Some(Instant::from_millis(1_100)));
    }
}
