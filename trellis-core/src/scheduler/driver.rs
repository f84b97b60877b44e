//! Tick Drivers
//!
//! A [`TickDriver`] decides *when* the deferred-callback queue is drained.
//! The runtime never drains it on its own: it asks the driver once per batch
//! and the driver arranges for the job to run after the current synchronous
//! turn.
//!
//! - [`MicrotaskDriver`] (default) keeps a per-thread checkpoint queue. The
//!   host drains it with [`run_microtasks`] at the end of each turn.
//! - [`LocalSpawnDriver`] hands the job to the tokio `LocalSet` the caller is
//!   running in.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;

/// Arranges for a job to run after the current synchronous turn.
pub trait TickDriver {
    fn request_flush(&self, job: fn());
}

thread_local! {
    static DRIVER: RefCell<Rc<dyn TickDriver>> = RefCell::new(Rc::new(MicrotaskDriver));
    static MICROTASKS: RefCell<VecDeque<fn()>> = const { RefCell::new(VecDeque::new()) };
}

/// Install the driver for this thread.
pub fn set_driver(driver: Rc<dyn TickDriver>) {
    DRIVER.with(|d| *d.borrow_mut() = driver);
}

pub(crate) fn current() -> Rc<dyn TickDriver> {
    DRIVER.with(|d| d.borrow().clone())
}

/// Per-thread microtask checkpoint queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrotaskDriver;

impl TickDriver for MicrotaskDriver {
    fn request_flush(&self, job: fn()) {
        MICROTASKS.with(|q| q.borrow_mut().push_back(job));
    }
}

/// Drain the microtask queue, including jobs queued while draining.
///
/// Returns the number of jobs run.
pub fn run_microtasks() -> usize {
    let mut ran = 0;
    while let Some(job) = MICROTASKS.with(|q| q.borrow_mut().pop_front()) {
        job();
        ran += 1;
    }
    if ran > 0 {
        trace!(ran, "microtask checkpoint");
    }
    ran
}

/// Jobs waiting for the next [`run_microtasks`].
pub fn pending_microtasks() -> usize {
    MICROTASKS.with(|q| q.borrow().len())
}

/// Spawns each job on the current tokio `LocalSet`.
///
/// Requesting a flush outside a `LocalSet` panics, as
/// `tokio::task::spawn_local` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSpawnDriver;

impl TickDriver for LocalSpawnDriver {
    fn request_flush(&self, job: fn()) {
        drop(tokio::task::spawn_local(async move { job() }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static HITS: Cell<usize> = const { Cell::new(0) };
    }

    fn hit() {
        HITS.with(|h| h.set(h.get() + 1));
    }

    fn hit_and_requeue() {
        hit();
        if HITS.with(Cell::get) < 3 {
            MicrotaskDriver.request_flush(hit_and_requeue);
        }
    }

    #[test]
    fn microtasks_wait_for_checkpoint() {
        MicrotaskDriver.request_flush(hit);
        MicrotaskDriver.request_flush(hit);
        assert_eq!(pending_microtasks(), 2);
        assert_eq!(HITS.with(Cell::get), 0);

        assert_eq!(run_microtasks(), 2);
        assert_eq!(HITS.with(Cell::get), 2);
        assert_eq!(pending_microtasks(), 0);
    }

    #[test]
    fn checkpoint_drains_requeued_jobs() {
        MicrotaskDriver.request_flush(hit_and_requeue);
        assert_eq!(run_microtasks(), 3);
        assert_eq!(pending_microtasks(), 0);
    }

    #[tokio::test]
    async fn local_spawn_runs_on_local_set() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                LocalSpawnDriver.request_flush(hit);
                assert_eq!(HITS.with(Cell::get), 0);
                tokio::task::yield_now().await;
            })
            .await;
        // run_until returns once the future completes; drain leftovers.
        local.await;
        assert_eq!(HITS.with(Cell::get), 1);
    }
}
