use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// A free-running, monotonically increasing tick counter.
pub trait TickSource {
    fn ticks(&self) -> u64;
}

/// Counts whole seconds elapsed since construction.
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        WallClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for WallClock {
    fn ticks(&self) -> u64 {
        self.epoch.elapsed().as_secs()
    }
}

/// Tick counter advanced by hand. Clones share the same counter.
#[derive(Clone, Debug, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) {
        self.0.set(self.0.get() + 1);
    }
}

impl TickSource for ManualClock {
    fn ticks(&self) -> u64 {
        self.0.get()
    }
}

/// Remembers the last observed tick so each advance is reported once.
pub struct Timer {
    source: Box<dyn TickSource>,
    last: u64,
}

impl Timer {
    pub fn new(source: Box<dyn TickSource>) -> Self {
        let last = source.ticks();
        Timer { source, last }
    }

    /// Returns the new tick count if the counter moved since the last poll.
    pub fn poll(&mut self) -> Option<u64> {
        let now = self.source.ticks();
        if now > self.last {
            self.last = now;
            return Some(now);
        }
        None
    }
}
