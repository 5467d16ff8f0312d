//! TaskQueue - serialization point for user-facing session operations.
//!
//! Each operation kind carries a mask of the kinds it must not overlap
//! with. Tasks dispatch strictly in enqueue order: the head of the queue
//! runs once nothing currently running conflicts with it in either
//! direction. Kinds with disjoint masks (find/fetch) may run concurrently;
//! everything else serializes behind the head.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::SessionError;

/// Kinds of user-facing session operations.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Action {
    Save,
    Remove,
    Detach,
    Flush,
    Clear,
    Find,
    Refresh,
    Merge,
    Fetch,
}

impl Action {
    const COUNT: u16 = 9;

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// The kinds this action must not run concurrently with.
    ///
    /// Writers tolerate overlap only with their own kind; flush and clear
    /// are global barriers (they exclude their own kind too); find and
    /// fetch are reads and tolerate each other.
    pub const fn invalidates(self) -> ActionMask {
        match self {
            Action::Save => ActionMask::ALL.without(Action::Save),
            Action::Remove => ActionMask::ALL.without(Action::Remove),
            Action::Detach => ActionMask::ALL.without(Action::Detach),
            Action::Refresh => ActionMask::ALL.without(Action::Refresh),
            Action::Merge => ActionMask::ALL.without(Action::Merge),
            Action::Flush | Action::Clear => ActionMask::ALL,
            Action::Find => ActionMask::ALL.without(Action::Fetch),
            Action::Fetch => ActionMask::ALL.without(Action::Find),
        }
    }
}

/// Bit set over [`Action`] kinds.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ActionMask(u16);

impl ActionMask {
    pub const NONE: ActionMask = ActionMask(0);
    pub const ALL: ActionMask = ActionMask((1 << Action::COUNT) - 1);

    pub const fn with(self, action: Action) -> ActionMask {
        ActionMask(self.0 | action.bit())
    }

    pub const fn without(self, action: Action) -> ActionMask {
        ActionMask(self.0 & !action.bit())
    }

    pub const fn contains(self, action: Action) -> bool {
        self.0 & action.bit() != 0
    }
}

struct Waiting {
    seq: u64,
    action: Action,
}

struct Running {
    seq: u64,
    action: Action,
    invalidates: ActionMask,
}

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    pending: VecDeque<Waiting>,
    running: Vec<Running>,
}

pub struct TaskQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            state: Mutex::new(QueueState::default()),
            wake: Condvar::new(),
        }
    }

    /// Enqueue a task of the given kind and block until it is dispatched.
    /// The returned permit marks the task complete when dropped.
    pub fn acquire(&self, action: Action) -> Result<TaskPermit<'_>, SessionError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SessionError::LockPoisoned("task queue"))?;

        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push_back(Waiting { seq, action });

        loop {
            let at_head = state.pending.front().map(|w| w.seq) == Some(seq);
            if at_head && eligible(&state.running, action) {
                state.pending.pop_front();
                state.running.push(Running {
                    seq,
                    action,
                    invalidates: action.invalidates(),
                });
                // The next pending task may be dispatchable alongside this one.
                self.wake.notify_all();
                return Ok(TaskPermit { queue: self, seq });
            }

            state = self
                .wake
                .wait(state)
                .map_err(|_| SessionError::LockPoisoned("task queue"))?;
        }
    }

    /// How many tasks are currently dispatched.
    pub fn running(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.running.len(),
            Err(_) => 0,
        }
    }

    fn complete(&self, seq: u64) {
        // Completion must always run or everything queued behind the task
        // deadlocks, so recover the lock even when poisoned.
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.running.retain(|r| r.seq != seq);
        self.wake.notify_all();
    }
}

fn eligible(running: &[Running], action: Action) -> bool {
    let mask = action.invalidates();
    running
        .iter()
        .all(|r| !mask.contains(r.action) && !r.invalidates.contains(action))
}

/// Marker for a dispatched task; completion happens on drop.
pub struct TaskPermit<'a> {
    queue: &'a TaskQueue,
    seq: u64,
}

impl Drop for TaskPermit<'_> {
    fn drop(&mut self) {
        self.queue.complete(self.seq);
    }
}
