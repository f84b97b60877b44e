//! Watcher Queue
//!
//! Watchers notified outside of sync mode are queued here and run together
//! in one flush, scheduled through [`next_tick`].
//!
//! # Flush Order
//!
//! The queue is sorted by [`WatcherId`] before running. Ids are handed out in
//! creation order, so
//!
//! 1. parents run before children,
//! 2. user watchers run before the render watcher of the same scope,
//! 3. a child torn down while its parent runs is skipped (it is inactive).
//!
//! Watchers queued while a flush is running are spliced in by id after the
//! cursor, so they still run in this flush.
//!
//! # Runaway Updates
//!
//! With [`Config::dev_diagnostics`](crate::Config) on, a watcher that queues
//! itself again from its own run more than
//! [`Config::max_update_count`](crate::Config) times aborts the flush with a
//! warning.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::config;
use crate::error::{report, warn, Error, Result};
use crate::reactive::{Watcher, WatcherId};

use super::next_tick::next_tick;

/// An entity activated during a flush, handed back through
/// [`FlushHooks::activated`].
pub type Activated = Rc<dyn Any>;

/// Collaborator notified after every flush, once scheduler state is reset.
pub trait FlushHooks {
    /// Entities passed to [`queue_activated`] during the flush.
    fn activated(&self, _entities: &[Activated]) {}

    /// Every watcher the flush ran, in run order.
    fn updated(&self, _watchers: &[Watcher]) {}
}

/// Summary of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Watchers run.
    pub ran: usize,
    /// The watcher that tripped the runaway breaker, if any.
    pub runaway: Option<WatcherId>,
}

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    has: HashSet<WatcherId>,
    circular: HashMap<WatcherId, usize>,
    activated: Vec<Activated>,
    index: usize,
    waiting: bool,
    flushing: bool,
}

impl SchedulerState {
    fn reset(&mut self) {
        self.queue.clear();
        self.has.clear();
        self.circular.clear();
        self.activated.clear();
        self.index = 0;
        self.waiting = false;
        self.flushing = false;
    }
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    static HOOKS: RefCell<Option<Rc<dyn FlushHooks>>> = const { RefCell::new(None) };
}

/// Install (or clear) the post-flush hooks for this thread.
pub fn set_flush_hooks(hooks: Option<Rc<dyn FlushHooks>>) {
    HOOKS.with(|h| *h.borrow_mut() = hooks);
}

/// Queue a watcher for the next flush. Already queued watchers are ignored.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let schedule = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.insert(id) {
            return false;
        }
        if state.flushing {
            let mut pos = state.queue.len();
            while pos > state.index + 1 && state.queue[pos - 1].id() > id {
                pos -= 1;
            }
            state.queue.insert(pos, watcher);
        } else {
            state.queue.push(watcher);
        }
        trace!(watcher = %id, flushing = state.flushing, "queued watcher");
        !std::mem::replace(&mut state.waiting, true)
    });
    if !schedule {
        return;
    }

    if config::get().async_flush {
        next_tick(|| flush().map(drop));
    } else if let Err(err) = flush() {
        report(&err, "scheduler flush");
    }
}

/// Record an entity activated during the current flush.
pub fn queue_activated(entity: Activated) {
    STATE.with(|state| state.borrow_mut().activated.push(entity));
}

/// Whether a flush is running on this thread.
pub fn is_flushing() -> bool {
    STATE.with(|state| state.borrow().flushing)
}

/// Watchers waiting in the queue.
pub fn queued() -> usize {
    STATE.with(|state| {
        let state = state.borrow();
        state.queue.len() - state.index
    })
}

/// Run every queued watcher.
///
/// Normally called through `next_tick`; hosts may call it directly. A call
/// made while a flush is already running does nothing. If a watcher returns
/// an error the queue is dropped, state is reset and the error is returned
/// without calling the [`FlushHooks`].
pub fn flush() -> Result<FlushStats> {
    let started = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if state.flushing {
            return false;
        }
        state.flushing = true;
        state.queue.sort_by_key(Watcher::id);
        true
    });
    if !started {
        return Ok(FlushStats::default());
    }

    let config = config::get();
    let mut stats = FlushStats::default();

    loop {
        let next = STATE.with(|state| {
            let state = state.borrow();
            state.queue.get(state.index).cloned()
        });
        let Some(watcher) = next else { break };
        let id = watcher.id();

        watcher.call_before();
        STATE.with(|state| state.borrow_mut().has.remove(&id));
        trace!(watcher = %id, "running watcher");
        if let Err(err) = watcher.run() {
            STATE.with(|state| state.borrow_mut().reset());
            return Err(err);
        }
        stats.ran += 1;

        if config.dev_diagnostics && tripped(id, config.max_update_count) {
            let err = Error::RunawayUpdate {
                watcher: id,
                expression: watcher.expression().to_string(),
                limit: config.max_update_count,
            };
            warn(&err.to_string());
            stats.runaway = Some(id);
            break;
        }

        STATE.with(|state| state.borrow_mut().index += 1);
    }

    let (activated, updated) = STATE.with(|state| {
        let mut state = state.borrow_mut();
        let activated = std::mem::take(&mut state.activated);
        let updated = std::mem::take(&mut state.queue);
        state.reset();
        (activated, updated)
    });
    debug!(ran = stats.ran, activated = activated.len(), "flushed watchers");

    if let Some(hooks) = HOOKS.with(|h| h.borrow().clone()) {
        hooks.activated(&activated);
        hooks.updated(&updated);
    }
    Ok(stats)
}

/// Count a re-queue of `id` from its own run; true once past `limit`.
fn tripped(id: WatcherId, limit: usize) -> bool {
    STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.contains(&id) {
            return false;
        }
        let count = state.circular.entry(id).or_insert(0);
        *count += 1;
        *count > limit
    })
}
