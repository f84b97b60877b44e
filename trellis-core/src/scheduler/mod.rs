//! Batched Scheduling
//!
//! Watchers notified by a state change are not run on the spot. They are
//! queued, and the queue is flushed once per synchronous turn through the
//! deferred-callback primitive ([`next_tick`]). The turn boundary itself is
//! supplied by a pluggable [`TickDriver`].

mod driver;
mod next_tick;
mod queue;

pub use driver::{
    pending_microtasks, run_microtasks, set_driver, LocalSpawnDriver, MicrotaskDriver, TickDriver,
};
pub use next_tick::{next_tick, pending_callbacks, tick, NextTick};
pub use queue::{
    flush, is_flushing, queue_activated, queue_watcher, queued, set_flush_hooks, Activated,
    FlushHooks, FlushStats,
};
