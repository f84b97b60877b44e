//! Deferred Callbacks
//!
//! [`next_tick`] queues a callback to run after the current synchronous turn.
//! Any number of calls within one turn share a single request to the
//! [`TickDriver`](super::TickDriver); the callbacks then run in FIFO order.
//!
//! The queue is copied and cleared before it runs, so a callback that calls
//! `next_tick` again lands in the following batch.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{report, Result};

use super::driver;

type Callback = Box<dyn FnOnce()>;

thread_local! {
    static CALLBACKS: RefCell<Vec<Callback>> = const { RefCell::new(Vec::new()) };
    static PENDING: Cell<bool> = const { Cell::new(false) };
}

/// Run `callback` after the current synchronous turn.
///
/// An error from the callback is reported as `"nextTick"`.
pub fn next_tick(callback: impl FnOnce() -> Result<()> + 'static) {
    push(Box::new(move || {
        if let Err(err) = callback() {
            report(&err, "nextTick");
        }
    }));
}

/// A future resolving once the pending callback batch has run.
///
/// ```rust,ignore
/// state.set("count", 2);
/// tick().await;
/// // watchers have flushed
/// ```
pub fn tick() -> NextTick {
    let (tx, rx) = oneshot::channel();
    push(Box::new(move || {
        // The receiver may have been dropped; nothing to do then.
        let _ = tx.send(());
    }));
    NextTick { rx }
}

/// Callbacks waiting for the next batch.
pub fn pending_callbacks() -> usize {
    CALLBACKS.with(|c| c.borrow().len())
}

fn push(callback: Callback) {
    CALLBACKS.with(|c| c.borrow_mut().push(callback));
    if !PENDING.with(|p| p.replace(true)) {
        driver::current().request_flush(flush_callbacks);
    }
}

fn flush_callbacks() {
    PENDING.with(|p| p.set(false));
    let callbacks = CALLBACKS.with(|c| std::mem::take(&mut *c.borrow_mut()));
    trace!(count = callbacks.len(), "running next_tick callbacks");
    for callback in callbacks {
        callback();
    }
}

/// Future returned by [`tick`].
#[derive(Debug)]
pub struct NextTick {
    rx: oneshot::Receiver<()>,
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A closed channel means the batch ran and was dropped; resolve too.
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}
