//! Reactive Primitives
//!
//! This module implements dependency tracking: observable data, the watchers
//! that read it, and the bookkeeping connecting the two.
//!
//! # Concepts
//!
//! ## Observable Data
//!
//! [`Object`] and [`Array`] are shared, mutable containers. Once a value has
//! been passed through [`observe`], every property of an object carries its
//! own [`Dep`], and every container carries a shape `Dep` (owned by its
//! [`Observer`]) that fires when keys are added or removed or the array is
//! mutated in place.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a getter and records every `Dep` read along the
//! way. When one of them fires, the watcher is queued with the scheduler
//! (or marked dirty, if lazy; or re-run on the spot, if sync). Each run
//! collects a fresh dependency set and unsubscribes from the ones no longer
//! read.
//!
//! ## Computed Values and Scopes
//!
//! A [`Computed`] is a lazy watcher with a cached result. A [`Scope`] owns a
//! group of watchers and tears them down together.
//!
//! # Implementation Notes
//!
//! Which watcher is evaluating is tracked in a thread-local stack
//! ([`EvalContext`]). Reading a reactive property checks the top of the stack
//! and, if a watcher is there, subscribes it to the property's `Dep`.

mod array;
mod computed;
mod context;
mod dep;
mod id;
mod object;
mod observer;
mod scope;
mod traverse;
mod value;
mod watcher;

pub use array::{Array, MAX_INDEX};
pub use computed::{Computed, ComputedSetter};
pub use context::{untracked, EvalContext};
pub use dep::Dep;
pub use id::{DepId, WatcherId};
pub use object::{Object, PropertyGetter, PropertyOptions, PropertySetter, SetHook};
pub use observer::{
    define_reactive, del, depend_array, is_observing, observe, set, toggle_observing, Observer,
};
pub use scope::{call_hook, Scope, WatchOptions};
pub use traverse::traverse;
pub use value::{Key, Opaque, Value};
pub use watcher::{BeforeHook, Callback, Getter, Watcher, WatcherOptions};
