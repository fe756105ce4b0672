//! Explicit timer scheduler.
//!
//! Timers are plain data owned by whoever schedules them. Nothing runs on its
//! own: the owner calls [`Scheduler::due`] with the current time and acts on
//! the tasks returned. Cancelling a handle removes exactly that timer.

use std::time::{Duration, Instant};

/// Cancellation handle returned by the `schedule_*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone)]
struct TimerEntry<T> {
    handle: TimerHandle,
    task: T,
    deadline: Instant,
    /// `Some` for repeating timers.
    interval: Option<Duration>,
}

/// A set of pending one-shot and repeating timers carrying a task value `T`.
#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    next_handle: u64,
    entries: Vec<TimerEntry<T>>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            next_handle: 0,
            entries: Vec::new(),
        }
    }
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, task: T, deadline: Instant, interval: Option<Duration>) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(TimerEntry {
            handle,
            task,
            deadline,
            interval,
        });
        handle
    }

    /// Fire `task` every `interval`, first at `now + interval`.
    ///
    /// A zero interval is bumped to one millisecond.
    pub fn schedule_repeating(&mut self, task: T, interval: Duration, now: Instant) -> TimerHandle {
        let interval = interval.max(Duration::from_millis(1));
        self.push(task, now + interval, Some(interval))
    }

    /// Fire `task` once at `now + delay`.
    pub fn schedule_once(&mut self, task: T, delay: Duration, now: Instant) -> TimerHandle {
        self.push(task, now + delay, None)
    }

    /// Cancel a timer. Returns `false` if it already fired (one-shot) or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        self.entries.len() != before
    }

    /// Cancel every timer whose task matches `pred`. Returns how many were removed.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !pred(&e.task));
        before - self.entries.len()
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    /// Collect every task due at `now`, in deadline order.
    ///
    /// One-shot timers are removed. A repeating timer fires at most once per
    /// call; if the caller fell behind by more than one interval, the missed
    /// firings are dropped rather than replayed in a burst.
    pub fn due(&mut self, now: Instant) -> Vec<T> {
        let mut fired: Vec<(Instant, TimerHandle, T)> = Vec::new();
        self.entries.retain_mut(|entry| {
            if entry.deadline > now {
                return true;
            }
            fired.push((entry.deadline, entry.handle, entry.task.clone()));
            match entry.interval {
                Some(interval) => {
                    entry.deadline += interval;
                    if entry.deadline <= now {
                        entry.deadline = now + interval;
                    }
                    true
                }
                None => false,
            }
        });
        fired.sort_by_key(|(deadline, handle, _)| (*deadline, handle.0));
        fired.into_iter().map(|(_, _, task)| task).collect()
    }

    /// Earliest pending deadline, used by the owner to size its idle wait.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
