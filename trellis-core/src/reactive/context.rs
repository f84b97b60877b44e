//! Evaluation Context
//!
//! The evaluation context tracks which watcher is currently evaluating.
//! This enables automatic dependency tracking: when a reactive property is
//! read, the dependency backing it subscribes the current watcher.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a context pushes a target (a watcher,
//! or `None` to suppress tracking while opaque callbacks run) and returns a
//! guard that pops it again on drop. The top of the stack is the current
//! target. Because popping is tied to the guard, entries are removed in
//! strict stack order even if the computation panics.

use std::cell::RefCell;

use super::watcher::Watcher;

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = RefCell::new(Vec::new());
}

/// Guard that pops the context when dropped.
#[must_use = "the evaluation context is exited when this guard is dropped"]
pub struct EvalContext {
    depth: usize,
}

impl EvalContext {
    /// Enter a new evaluation context.
    ///
    /// With `Some(watcher)`, reactive reads made until the guard drops
    /// register `watcher` as a dependent. With `None`, reads are untracked.
    pub fn enter(target: Option<Watcher>) -> Self {
        let depth = TARGET_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(target);
            stack.len()
        });
        Self { depth }
    }

    /// Check if a watcher is currently collecting dependencies.
    pub fn is_active() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// The watcher currently collecting dependencies, if any.
    pub fn current() -> Option<Watcher> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Nesting depth of the stack (including untracked entries).
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }

    /// Run `f` with tracking suppressed.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _ctx = Self::enter(None);
        f()
    }
}

impl Drop for EvalContext {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(
                stack.len(),
                self.depth,
                "EvalContext popped out of order"
            );
            stack.pop();
        });
    }
}

/// Run `f` without registering any dependencies.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    EvalContext::untracked(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Value, WatcherOptions};

    fn lazy_watcher() -> Watcher {
        let options = WatcherOptions {
            lazy: true,
            ..WatcherOptions::default()
        };
        Watcher::new(|| Ok(Value::Null), |_, _| Ok(()), options).unwrap()
    }

    #[test]
    fn context_tracks_target() {
        let watcher = lazy_watcher();

        assert!(!EvalContext::is_active());
        assert!(EvalContext::current().is_none());

        {
            let _ctx = EvalContext::enter(Some(watcher.clone()));
            assert!(EvalContext::is_active());
            assert_eq!(EvalContext::current().map(|w| w.id()), Some(watcher.id()));
        }

        assert!(!EvalContext::is_active());
        assert_eq!(EvalContext::depth(), 0);
    }

    #[test]
    fn nested_contexts_restore_outer() {
        let outer = lazy_watcher();
        let inner = lazy_watcher();

        let _outer = EvalContext::enter(Some(outer.clone()));
        {
            let _inner = EvalContext::enter(Some(inner.clone()));
            assert_eq!(EvalContext::current().map(|w| w.id()), Some(inner.id()));
        }
        assert_eq!(EvalContext::current().map(|w| w.id()), Some(outer.id()));
    }

    #[test]
    fn untracked_suppresses_outer_target() {
        let watcher = lazy_watcher();
        let _ctx = EvalContext::enter(Some(watcher));

        let active = untracked(EvalContext::is_active);
        assert!(!active);
        assert!(EvalContext::is_active());
    }
}
