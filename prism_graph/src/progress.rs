//! Cooperative cancellation for long traversals.
//!
//! The graph never blocks and has no timeout of its own. A compilation
//! watchdog installs a [`ProgressSignal`] and the graph's iteration entry
//! points poll it at a bounded interval, stopping early once it fires.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Polled by graph traversals to decide whether to stop.
pub trait ProgressSignal: Send + Sync {
    fn should_abort(&self) -> bool;
}

/// Shared flag flipped by another thread to cancel a compilation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl ProgressSignal for CancellationToken {
    #[inline]
    fn should_abort(&self) -> bool {
        self.is_cancelled()
    }
}

/// Fires once a wall-clock instant has passed.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Deadline { at }
    }

    /// A deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self::at(Instant::now() + budget)
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

impl ProgressSignal for Deadline {
    fn should_abort(&self) -> bool {
        Instant::now() >= self.at
    }
}

// =============================================================================
// Monitor
// =============================================================================

/// Per-graph polling state.
///
/// Once the signal fires the monitor stays tripped until it is reset, so
/// every traversal after the first abort ends immediately.
pub(crate) struct ProgressMonitor {
    signal: Option<Arc<dyn ProgressSignal>>,
    interval: usize,
    tripped: Cell<bool>,
}

impl ProgressMonitor {
    pub(crate) fn new(interval: usize) -> Self {
        ProgressMonitor {
            signal: None,
            interval: interval.max(1),
            tripped: Cell::new(false),
        }
    }

    pub(crate) fn install(&mut self, signal: Option<Arc<dyn ProgressSignal>>) {
        self.signal = signal;
        self.tripped.set(false);
    }

    #[inline]
    pub(crate) fn is_tripped(&self) -> bool {
        self.tripped.get()
    }

    /// Poll the signal if `step` falls on the interval.
    #[inline]
    pub(crate) fn poll(&self, step: usize) -> bool {
        if self.tripped.get() {
            return false;
        }
        let Some(signal) = &self.signal else {
            return true;
        };
        if step % self.interval == 0 && signal.should_abort() {
            log::debug!("graph traversal aborted by progress signal after {} item(s)", step);
            self.tripped.set(true);
            return false;
        }
        true
    }
}

/// Iterator adaptor that stops when the progress signal fires.
pub struct Polled<'g, I> {
    inner: I,
    monitor: &'g ProgressMonitor,
    step: usize,
}

impl<'g, I> Polled<'g, I> {
    pub(crate) fn new(inner: I, monitor: &'g ProgressMonitor) -> Self {
        Polled {
            inner,
            monitor,
            step: 0,
        }
    }
}

impl<I: Iterator> Iterator for Polled<'_, I> {
    type Item = I::Item;

    #[inline]
    fn next(&mut self) -> Option<I::Item> {
        // An exhausted traversal finished; it must not trip the monitor.
        let item = self.inner.next()?;
        if !self.monitor.poll(self.step) {
            return None;
        }
        self.step += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

// =============================================================================
// Tests
// =============================================================================
