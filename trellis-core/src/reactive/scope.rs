//! Scopes
//!
//! A [`Scope`] owns the watchers created through it, the way a component
//! instance owns its render watcher, its `watch` callbacks and its computed
//! values. Tearing the scope down (explicitly, or by dropping its last
//! handle) tears down every owned watcher. A watcher torn down on its own
//! removes itself from the scope's registry.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{report, Result};

use super::computed::Computed;
use super::context::EvalContext;
use super::id::WatcherId;
use super::value::Value;
use super::watcher::{BeforeHook, Watcher, WatcherOptions};

#[derive(Default)]
pub(crate) struct ScopeInner {
    watchers: RefCell<Vec<Watcher>>,
    tearing_down: Cell<bool>,
    torn_down: Cell<bool>,
}

impl ScopeInner {
    fn teardown(&self) {
        if self.torn_down.get() {
            return;
        }
        self.tearing_down.set(true);
        let watchers = std::mem::take(&mut *self.watchers.borrow_mut());
        for watcher in watchers {
            watcher.teardown();
        }
        self.tearing_down.set(false);
        self.torn_down.set(true);
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Options for [`Scope::watch`].
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub deep: bool,
    /// Invoke the callback once right away with `(value, Null)`.
    pub immediate: bool,
    pub sync: bool,
    pub expression: Option<String>,
}

/// Owning registry of watchers.
///
/// Cloning a `Scope` creates another handle to the same registry.
#[derive(Clone, Default)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn downgrade(&self) -> Weak<ScopeInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<ScopeInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn register(&self, watcher: Watcher) {
        self.inner.watchers.borrow_mut().push(watcher);
    }

    /// Forget a watcher that tore itself down. Skipped while the scope
    /// itself is tearing down.
    pub(crate) fn unregister(&self, id: WatcherId) {
        if self.inner.tearing_down.get() {
            return;
        }
        self.inner.watchers.borrow_mut().retain(|w| w.id() != id);
    }

    /// Create a watcher owned by this scope.
    ///
    /// On a torn-down scope the watcher is created inactive and never runs.
    pub fn watcher<G, C>(&self, getter: G, callback: C, options: WatcherOptions) -> Result<Watcher>
    where
        G: Fn() -> Result<Value> + 'static,
        C: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        Watcher::build(Box::new(getter), Box::new(callback), options, Some(self), false)
    }

    /// Watch `getter` and call `callback(new, old)` when it changes.
    ///
    /// The watcher runs as user code: errors from either closure are reported
    /// rather than returned. Tear down the returned watcher to stop watching.
    pub fn watch<G, C>(&self, getter: G, callback: C, options: WatchOptions) -> Result<Watcher>
    where
        G: Fn() -> Result<Value> + 'static,
        C: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        let callback = Rc::new(callback);
        let shared = callback.clone();
        let watcher_options = WatcherOptions {
            deep: options.deep,
            user: true,
            sync: options.sync,
            expression: options.expression,
            ..WatcherOptions::default()
        };
        let watcher = Watcher::build(
            Box::new(getter),
            Box::new(move |new: &Value, old: &Value| shared(new, old)),
            watcher_options,
            Some(self),
            false,
        )?;

        if options.immediate {
            let _ctx = EvalContext::enter(None);
            if let Err(err) = callback(&watcher.value(), &Value::Null) {
                report(
                    &err,
                    &format!("callback for immediate watcher {:?}", watcher.expression()),
                );
            }
        }
        Ok(watcher)
    }

    /// Create a cached derived value owned by this scope.
    pub fn computed<G>(&self, getter: G) -> Computed
    where
        G: Fn() -> Result<Value> + 'static,
    {
        Computed::build(Box::new(getter), None, Some(self))
    }

    /// Create a render watcher: each run computes a tree with `render` and
    /// hands it to `patch`. `before` fires ahead of every queued re-run.
    ///
    /// Errors from either closure propagate out of the scheduler flush.
    pub fn render<R, P>(&self, render: R, patch: P, before: Option<BeforeHook>) -> Result<Watcher>
    where
        R: Fn() -> Result<Value> + 'static,
        P: Fn(&Value) -> Result<()> + 'static,
    {
        let getter = move || {
            let tree = render()?;
            patch(&tree)?;
            Ok(Value::Null)
        };
        let options = WatcherOptions {
            before,
            expression: Some("render".to_string()),
            ..WatcherOptions::default()
        };
        Watcher::build(Box::new(getter), Box::new(|_: &Value, _: &Value| Ok(())), options, Some(self), true)
    }

    /// Tear down every owned watcher. Idempotent.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.get()
    }

    /// Watchers currently owned.
    pub fn watchers(&self) -> Vec<Watcher> {
        self.inner.watchers.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.watchers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("watchers", &self.len())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

/// Run an opaque lifecycle callback with dependency tracking suppressed.
///
/// Errors are reported as `"{name} hook"`.
pub fn call_hook(name: &str, hook: impl FnOnce() -> Result<()>) {
    let _ctx = EvalContext::enter(None);
    if let Err(err) = hook() {
        report(&err, &format!("{name} hook"));
    }
}
