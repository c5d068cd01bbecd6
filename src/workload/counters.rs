use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use parking_lot::{Mutex, Once};

/// Hands out dataset indices in `[start, start + count)`, each exactly once.
#[derive(Debug)]
pub struct InsertCursor {
    next: AtomicU64,
    end: u64,
}

impl InsertCursor {
    pub fn new(start: u64, count: u64) -> Self {
        InsertCursor {
            next: AtomicU64::new(start),
            end: start.saturating_add(count),
        }
    }

    pub fn next(&self) -> Option<u64> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        (index < self.end).then_some(index)
    }
}

/// Highest index below which every insert has been acknowledged.
///
/// Inserts finish out of order across workers; an index only counts once
/// every index before it has finished too. Readers never take the lock.
#[derive(Debug)]
pub struct AcknowledgedCounter {
    start: u64,
    /// First index not yet covered by the contiguous run.
    frontier: AtomicU64,
    pending: Mutex<BTreeSet<u64>>,
}

impl AcknowledgedCounter {
    pub fn new(start: u64) -> Self {
        AcknowledgedCounter {
            start,
            frontier: AtomicU64::new(start),
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    /// Everything in `[start, start + count)` is already in the backend.
    pub fn preloaded(start: u64, count: u64) -> Self {
        AcknowledgedCounter {
            start,
            frontier: AtomicU64::new(start + count),
            pending: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn acknowledge(&self, index: u64) {
        let mut pending = self.pending.lock();
        let mut frontier = self.frontier.load(Ordering::Acquire);
        if index < frontier {
            return;
        }
        if index > frontier {
            pending.insert(index);
            return;
        }
        frontier += 1;
        while pending.remove(&frontier) {
            frontier += 1;
        }
        self.frontier.store(frontier, Ordering::Release);
    }

    /// `None` until the first index of the range is acknowledged.
    pub fn last_value(&self) -> Option<u64> {
        let frontier = self.frontier.load(Ordering::Acquire);
        (frontier > self.start).then(|| frontier - 1)
    }

    /// Acknowledged indices still waiting on an earlier one.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Lets exactly one worker run the table reset. Others arriving while it
/// runs wait until it has finished.
#[derive(Debug)]
pub struct ResetGate {
    once: Once,
    ran: AtomicBool,
}

impl Default for ResetGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ResetGate {
    pub fn new() -> Self {
        ResetGate {
            once: Once::new(),
            ran: AtomicBool::new(false),
        }
    }

    /// Runs `reset` if no worker has yet. Returns whether this call ran it.
    pub fn run_once<F: FnOnce()>(&self, reset: F) -> bool {
        let mut ran_here = false;
        self.once.call_once(|| {
            reset();
            ran_here = true;
        });
        if ran_here {
            self.ran.store(true, Ordering::Release);
        }
        ran_here
    }

    pub fn is_done(&self) -> bool {
        self.ran.load(Ordering::Acquire)
    }
}
