//! Trellis Core
//!
//! This crate provides the change-tracking runtime behind the Trellis
//! reactive view layer. It implements:
//!
//! - Observable objects and arrays with per-property dependency tracking
//! - Watchers, computed values and owning scopes
//! - A batched, ordered scheduler flushed once per turn
//! - A deferred-callback primitive (`next_tick`) with pluggable drivers
//!
//! Everything is single-threaded: runtime state lives in thread-locals and
//! handles are `Rc`-based, so each thread runs an independent runtime.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Observable data, dependency tracking, watchers
//! - `scheduler`: Watcher queue, flush ordering, `next_tick`, tick drivers
//! - `config`: Per-thread runtime switches
//! - `error`: Error type and the reporting channel for deferred failures
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use trellis_core::reactive::{observe, Value, Watcher, WatcherOptions};
//! use trellis_core::scheduler::run_microtasks;
//!
//! let state = Value::from(json!({ "count": 0 }));
//! observe(&state, true);
//! let obj = state.as_object().unwrap().clone();
//!
//! let reader = obj.clone();
//! let _watcher = Watcher::new(
//!     move || Ok(reader.get("count")),
//!     |new, old| {
//!         println!("count: {old:?} -> {new:?}");
//!         Ok(())
//!     },
//!     WatcherOptions::default(),
//! )?;
//!
//! obj.set("count", 1);
//! obj.set("count", 2);
//! // One callback, at the end of the turn: "count: 0 -> 2"
//! run_microtasks();
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;

pub use config::Config;
pub use error::{report, set_error_handler, set_warn_handler, warn, Error, Result};
pub use scheduler::{next_tick, tick};
