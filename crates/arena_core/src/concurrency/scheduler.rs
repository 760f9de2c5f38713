//! Delta-time driven timer tasks.
//!
//! The scheduler owns no clock. Each [`Scheduler::tick`] advances every task
//! by the supplied delta; a task fires once per full interval accumulated and
//! carries the remainder into its next period.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How many times a task fires before it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Times(u32),
    Forever,
}

/// Identifies a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

/// Hands out [`TaskHandle`]s. Clones share one sequence, so handles can be
/// reserved before the task reaches the scheduler.
#[derive(Debug, Clone, Default)]
pub struct HandleAllocator {
    next: Arc<AtomicU64>,
}

impl HandleAllocator {
    pub fn allocate(&self) -> TaskHandle {
        TaskHandle(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Boxed task callback.
pub type TaskFn<C> = Box<dyn FnMut(&mut C) + Send>;

struct ScheduledTask<C> {
    handle: TaskHandle,
    interval: Duration,
    accumulated: Duration,
    remaining: Repeat,
    callback: TaskFn<C>,
}

impl<C> ScheduledTask<C> {
    fn is_done(&self) -> bool {
        self.remaining == Repeat::Times(0)
    }

    fn tick(&mut self, dt: Duration, ctx: &mut C) -> u32 {
        if self.is_done() {
            return 0;
        }

        // A zero interval fires once per tick instead of looping forever.
        if self.interval.is_zero() {
            self.fire(ctx);
            return 1;
        }

        self.accumulated += dt;
        let mut fired = 0;
        while self.accumulated >= self.interval && !self.is_done() {
            self.accumulated -= self.interval;
            self.fire(ctx);
            fired += 1;
        }
        fired
    }

    fn fire(&mut self, ctx: &mut C) {
        if let Repeat::Times(n) = &mut self.remaining {
            *n -= 1;
        }
        (self.callback)(ctx);
    }
}

/// Registry of timer tasks run against a context `C`.
///
/// Tasks run in registration order. Completed tasks stay registered until
/// the owner removes them; removal is queued and applied at the start of the
/// next tick, never mid-iteration.
pub struct Scheduler<C> {
    tasks: Vec<Option<ScheduledTask<C>>>,
    index: HashMap<TaskHandle, usize>,
    pending_removals: Vec<TaskHandle>,
    tombstones: usize,
    handles: HandleAllocator,
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self::with_allocator(HandleAllocator::default())
    }

    pub fn with_allocator(handles: HandleAllocator) -> Self {
        Self {
            tasks: Vec::new(),
            index: HashMap::new(),
            pending_removals: Vec::new(),
            tombstones: 0,
            handles,
        }
    }

    pub fn allocator(&self) -> HandleAllocator {
        self.handles.clone()
    }

    /// Registers `task` to fire every `interval`.
    pub fn add<F>(&mut self, interval: Duration, repeat: Repeat, task: F) -> TaskHandle
    where
        F: FnMut(&mut C) + Send + 'static,
    {
        let handle = self.handles.allocate();
        self.insert(handle, interval, repeat, Box::new(task));
        handle
    }

    /// Registers a task under a handle reserved from [`Scheduler::allocator`].
    pub fn add_with_handle(
        &mut self,
        handle: TaskHandle,
        interval: Duration,
        repeat: Repeat,
        task: TaskFn<C>,
    ) {
        self.insert(handle, interval, repeat, task);
    }

    /// Queues `handle` for removal at the start of the next tick.
    pub fn remove(&mut self, handle: TaskHandle) {
        self.pending_removals.push(handle);
    }

    /// Queues removal of every task that has finished.
    pub fn remove_finished(&mut self) -> usize {
        let before = self.pending_removals.len();
        for task in self.tasks.iter().flatten() {
            if task.is_done() {
                self.pending_removals.push(task.handle);
            }
        }
        self.pending_removals.len() - before
    }

    /// `None` if the task is not registered.
    pub fn is_done(&self, handle: TaskHandle) -> Option<bool> {
        self.task(handle).map(ScheduledTask::is_done)
    }

    pub fn contains(&self, handle: TaskHandle) -> bool {
        self.index.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Applies queued removals, then advances every task by `dt`. Returns
    /// the number of firings.
    pub fn tick(&mut self, dt: Duration, ctx: &mut C) -> u32 {
        self.apply_removals();

        let mut fired = 0;
        for task in self.tasks.iter_mut().flatten() {
            fired += task.tick(dt, ctx);
        }
        fired
    }

    fn insert(&mut self, handle: TaskHandle, interval: Duration, repeat: Repeat, callback: TaskFn<C>) {
        self.index.insert(handle, self.tasks.len());
        self.tasks.push(Some(ScheduledTask {
            handle,
            interval,
            accumulated: Duration::ZERO,
            remaining: repeat,
            callback,
        }));
    }

    fn task(&self, handle: TaskHandle) -> Option<&ScheduledTask<C>> {
        let slot = *self.index.get(&handle)?;
        self.tasks[slot].as_ref()
    }

    fn apply_removals(&mut self) {
        if self.pending_removals.is_empty() {
            return;
        }
        for handle in std::mem::take(&mut self.pending_removals) {
            if let Some(slot) = self.index.remove(&handle) {
                self.tasks[slot] = None;
                self.tombstones += 1;
            }
        }

        if self.tombstones * 2 > self.tasks.len() {
            self.tasks.retain(Option::is_some);
            self.index.clear();
            for (slot, task) in self.tasks.iter().flatten().enumerate() {
                self.index.insert(task.handle, slot);
            }
            self.tombstones = 0;
        }
    }
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}
