//! Sequenced block executor.
//!
//! Each block has a 1-based cursor (0 before the first step). A step advances
//! the cursor round-robin over the block's instructions and yields the write
//! of the instruction it lands on; the caller applies that write on its next
//! loop iteration, never inside the step itself.
//!
//! Auto-mode blocks with at least one instruction own one repeating timer in
//! the executor's [`Scheduler`]; [`SequencedBlockExecutor::sync_timers`]
//! reconciles those timers against the current store.

use crate::graph::{ObjectStore, SequencedBlock};
use crate::sequencer::scheduler::{Scheduler, TimerHandle};
use crate::types::{ObjectId, PropertyMap};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Debounce window after each step.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(100);

/// Auto intervals below this are clamped up to it.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Result of one `step` call.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Block is unknown or not a sequenced block.
    Missing,
    /// Previous step was less than one cooldown ago.
    Cooldown,
    /// Block has no instructions.
    Empty,
    /// Cursor moved to `order`; `write` is `None` if that instruction is unbound.
    Advanced {
        order: u32,
        write: Option<(ObjectId, PropertyMap)>,
    },
}

#[derive(Debug, Clone, Copy)]
struct BlockTimer {
    handle: TimerHandle,
    interval: Duration,
}

/// Cursor, cooldown and auto-timer state for every sequenced block.
#[derive(Debug)]
pub struct SequencedBlockExecutor {
    cursors: HashMap<ObjectId, u32>,
    /// Cooldown expiry per block.
    cooldowns: HashMap<ObjectId, Instant>,
    timers: HashMap<ObjectId, BlockTimer>,
    scheduler: Scheduler<ObjectId>,
    cooldown: Duration,
    min_interval: Duration,
}

impl Default for SequencedBlockExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, DEFAULT_MIN_INTERVAL)
    }
}

impl SequencedBlockExecutor {
    pub fn new(cooldown: Duration, min_interval: Duration) -> Self {
        Self {
            cursors: HashMap::new(),
            cooldowns: HashMap::new(),
            timers: HashMap::new(),
            scheduler: Scheduler::new(),
            cooldown,
            min_interval,
        }
    }

    /// Current cursor of a block (0 = not started).
    pub fn cursor(&self, block: &ObjectId) -> u32 {
        self.cursors.get(block).copied().unwrap_or(0)
    }

    /// All non-zero cursors, for the rendering snapshot.
    pub fn cursors(&self) -> BTreeMap<ObjectId, u32> {
        self.cursors
            .iter()
            .filter(|(_, order)| **order > 0)
            .map(|(id, order)| (id.clone(), *order))
            .collect()
    }

    pub fn in_cooldown(&self, block: &ObjectId, now: Instant) -> bool {
        self.cooldowns.get(block).is_some_and(|until| now < *until)
    }

    /// Advance `block_id` by one instruction.
    pub fn step(&mut self, store: &ObjectStore, block_id: &ObjectId, now: Instant) -> StepOutcome {
        let Some(block) = store.block(block_id) else {
            return StepOutcome::Missing;
        };
        if self.in_cooldown(block_id, now) {
            tracing::trace!("Block {} in cooldown; step ignored", block_id);
            return StepOutcome::Cooldown;
        }
        self.cooldowns.insert(block_id.clone(), now + self.cooldown);

        let count = block.instructions.len() as u32;
        if count == 0 {
            return StepOutcome::Empty;
        }
        let next_order = (self.cursor(block_id) % count) + 1;
        let write = block
            .instruction_at_order(next_order)
            .and_then(|instruction| instruction.write());
        self.cursors.insert(block_id.clone(), next_order);

        tracing::trace!("Block {} stepped to instruction {}", block_id, next_order);
        StepOutcome::Advanced {
            order: next_order,
            write,
        }
    }

    // ── Auto-mode timers ──

    fn wants_timer(&self, block: &SequencedBlock) -> Option<Duration> {
        if block.is_auto() && !block.instructions.is_empty() {
            Some(Duration::from_millis(block.auto_interval_ms).max(self.min_interval))
        } else {
            None
        }
    }

    /// Create, retune or cancel auto-mode timers so they match `store`.
    pub fn sync_timers(&mut self, store: &ObjectStore, now: Instant) {
        let mut wanted: HashMap<ObjectId, Duration> = HashMap::new();
        for block in store.blocks() {
            if let Some(interval) = self.wants_timer(block) {
                wanted.insert(block.id.clone(), interval);
            }
        }

        let stale: Vec<ObjectId> = self
            .timers
            .iter()
            .filter(|(id, timer)| wanted.get(*id) != Some(&timer.interval))
            .map(|(id, _)| id.clone())
            .collect();
        for id in stale {
            if let Some(timer) = self.timers.remove(&id) {
                self.scheduler.cancel(timer.handle);
                tracing::debug!("Cancelled auto timer for block {}", id);
            }
        }

        for (id, interval) in wanted {
            if self.timers.contains_key(&id) {
                continue;
            }
            let handle = self.scheduler.schedule_repeating(id.clone(), interval, now);
            tracing::debug!("Scheduled block {} every {:?}", id, interval);
            self.timers.insert(id, BlockTimer { handle, interval });
        }
    }

    /// Blocks whose auto timer is due at `now`.
    pub fn due(&mut self, now: Instant) -> Vec<ObjectId> {
        self.scheduler.due(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    pub fn has_timer(&self, block: &ObjectId) -> bool {
        self.timers.contains_key(block)
    }

    /// Drop every piece of state held for `block`.
    pub fn remove(&mut self, block: &ObjectId) {
        if let Some(timer) = self.timers.remove(block) {
            self.scheduler.cancel(timer.handle);
        }
        self.cursors.remove(block);
        self.cooldowns.remove(block);
    }

    /// Drop all state (document reload).
    pub fn clear(&mut self) {
        self.cursors.clear();
        self.cooldowns.clear();
        self.timers.clear();
        self.scheduler.clear();
    }
}
