//! Error Types and Reporting
//!
//! Errors raised while evaluating or notifying reactive computations mostly
//! surface in deferred contexts (a scheduler flush, a `next_tick` callback)
//! where there is no caller left to hand them to. Those are routed through a
//! per-thread reporting channel instead of being propagated.
//!
//! # Reporting
//!
//! - [`report`] delivers an error together with an `info` string naming where
//!   it happened (`getter for watcher "…"`, `nextTick`, ...). The default sink
//!   is `tracing::error!`; hosts install their own with [`set_error_handler`].
//! - [`warn`] delivers diagnostics that are not errors (root data mutation,
//!   runaway update loops). The default sink is `tracing::warn!`; hosts
//!   install their own with [`set_warn_handler`]. Suppressed by
//!   [`Config::silent`](crate::Config).

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::config;
use crate::reactive::WatcherId;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the reactive runtime and by user computations.
#[derive(Debug, Error)]
pub enum Error {
    /// A free-form failure raised by a getter or callback.
    #[error("{0}")]
    Message(String),

    /// A failure from some other library, boxed.
    #[error(transparent)]
    Source(Box<dyn std::error::Error + 'static>),

    /// `set`/`del` was called on a value that cannot hold properties.
    #[error("cannot {op} reactive property on {found} value")]
    InvalidTarget { op: &'static str, found: &'static str },

    /// The key kind does not fit the container (e.g. a name on an array).
    #[error("invalid key {key:?} for {found} value")]
    InvalidKey { key: String, found: &'static str },

    /// A watcher kept re-queueing itself within one flush.
    #[error(
        "possible infinite update loop in watcher {expression:?} ({watcher}): \
         re-ran more than {limit} times in one flush"
    )]
    RunawayUpdate {
        watcher: WatcherId,
        expression: String,
        limit: usize,
    },

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Build an error from anything printable.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        Self::Message(message.to_string())
    }

    /// Box an error from another library.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + 'static,
    {
        Self::Source(Box::new(err))
    }
}

/// Handler receiving every reported error and where it happened.
pub type ErrorHandler = Rc<dyn Fn(&Error, &str)>;

/// Handler receiving warning text.
pub type WarnHandler = Rc<dyn Fn(&str)>;

#[derive(Default)]
struct Handlers {
    error: Option<ErrorHandler>,
    warn: Option<WarnHandler>,
}

thread_local! {
    static HANDLERS: RefCell<Handlers> = RefCell::new(Handlers::default());
}

/// Install (or with `None`, remove) the error handler for this thread.
pub fn set_error_handler(handler: Option<ErrorHandler>) {
    HANDLERS.with(|h| h.borrow_mut().error = handler);
}

/// Install (or with `None`, remove) the warning handler for this thread.
pub fn set_warn_handler(handler: Option<WarnHandler>) {
    HANDLERS.with(|h| h.borrow_mut().warn = handler);
}

/// Report an error that has no caller to propagate to.
pub fn report(err: &Error, info: &str) {
    // Clone the handler out so it may itself install a new one.
    let handler = HANDLERS.with(|h| h.borrow().error.clone());
    match handler {
        Some(handler) => handler(err, info),
        None => tracing::error!(error = %err, info, "unhandled error in reactive runtime"),
    }
}

/// Emit a diagnostic warning.
pub fn warn(message: &str) {
    if config::get().silent {
        return;
    }
    let handler = HANDLERS.with(|h| h.borrow().warn.clone());
    match handler {
        Some(handler) => handler(message),
        None => tracing::warn!("{message}"),
    }
}
