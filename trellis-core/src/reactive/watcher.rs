//! Watchers
//!
//! A [`Watcher`] is one tracked computation: a getter, the value it last
//! produced, a callback fired when that value changes, and the set of
//! [`Dep`]s the getter read on its last pass.
//!
//! # Lifecycle
//!
//! 1. Created bound to a getter. Unless `lazy`, it evaluates immediately to
//!    collect its initial dependencies.
//!
//! 2. When any dependency fires, [`Watcher::update`] either marks it dirty
//!    (`lazy`), re-runs it on the spot (`sync`), or queues it on the
//!    scheduler (the default).
//!
//! 3. Each evaluation collects dependencies afresh into a second generation
//!    set; afterwards subscriptions that were not renewed are dropped, so a
//!    watcher is never notified for state it no longer reads.
//!
//! 4. [`Watcher::teardown`] unsubscribes it from everything. A torn-down
//!    watcher never runs again, even if it is already sitting in the queue.
//!
//! # Errors
//!
//! Getter errors of `user` watchers are reported and the pass counts as
//! failed (the value is left untouched). Other watchers, notably render
//! watchers, propagate getter errors to whoever called [`Watcher::run`].
//! Callback errors are always reported.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::{report, Result};
use crate::scheduler;

use super::context::EvalContext;
use super::dep::Dep;
use super::id::{DepId, WatcherId};
use super::scope::{Scope, ScopeInner};
use super::traverse::traverse;
use super::value::Value;

/// The computation a watcher tracks.
pub type Getter = Box<dyn Fn() -> Result<Value>>;

/// Called with `(new, old)` when a watcher's value changes.
pub type Callback = Box<dyn Fn(&Value, &Value) -> Result<()>>;

/// Hook run right before a queued watcher re-runs.
pub type BeforeHook = Rc<dyn Fn()>;

/// Configuration flags for a [`Watcher`].
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Touch everything reachable from the value and fire the callback on
    /// every run, even if the value is the same.
    pub deep: bool,
    /// The watcher runs user code: getter and callback errors are reported
    /// instead of propagated.
    pub user: bool,
    /// Only evaluate when read (cached derived values).
    pub lazy: bool,
    /// Run synchronously on notification instead of being queued.
    pub sync: bool,
    /// Invoked right before each queued re-run.
    pub before: Option<BeforeHook>,
    /// Label used in diagnostics.
    pub expression: Option<String>,
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("before", &self.before.is_some())
            .field("expression", &self.expression)
            .finish()
    }
}

pub(crate) struct WatcherInner {
    pub(crate) id: WatcherId,
    expression: String,
    getter: Getter,
    callback: Callback,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    render: bool,
    before: Option<BeforeHook>,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    active: Cell<bool>,
    /// Dependencies read on the last completed pass.
    deps: RefCell<IndexMap<DepId, Dep>>,
    /// Dependencies read so far on the pass in progress.
    new_deps: RefCell<IndexMap<DepId, Dep>>,
    scope: Option<Weak<ScopeInner>>,
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        for dep in self.deps.get_mut().values() {
            dep.unsubscribe(self.id);
        }
    }
}

/// A tracked computation.
///
/// Cloning a `Watcher` creates another handle to the same computation.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

impl Watcher {
    /// Create a watcher that is not owned by any [`Scope`].
    ///
    /// Unless `options.lazy` is set the getter runs immediately; an error
    /// from that first run is returned (for non-`user` watchers).
    pub fn new<G, C>(getter: G, callback: C, options: WatcherOptions) -> Result<Self>
    where
        G: Fn() -> Result<Value> + 'static,
        C: Fn(&Value, &Value) -> Result<()> + 'static,
    {
        Self::build(Box::new(getter), Box::new(callback), options, None, false)
    }

    pub(crate) fn build(
        getter: Getter,
        callback: Callback,
        options: WatcherOptions,
        scope: Option<&Scope>,
        render: bool,
    ) -> Result<Self> {
        let watcher = Self::create(getter, callback, options, scope, render);
        if !watcher.inner.lazy && watcher.is_active() {
            match watcher.get() {
                Ok(Some(value)) => *watcher.inner.value.borrow_mut() = value,
                Ok(None) => {}
                Err(err) => {
                    watcher.teardown();
                    return Err(err);
                }
            }
        }
        Ok(watcher)
    }

    /// Allocate and register without evaluating. On a torn-down scope the
    /// watcher starts out inactive.
    pub(crate) fn create(
        getter: Getter,
        callback: Callback,
        options: WatcherOptions,
        scope: Option<&Scope>,
        render: bool,
    ) -> Self {
        let id = WatcherId::next();
        let expression = options.expression.unwrap_or_else(|| id.to_string());
        let watcher = Self {
            inner: Rc::new(WatcherInner {
                id,
                expression,
                getter,
                callback,
                deep: options.deep,
                user: options.user,
                lazy: options.lazy,
                sync: options.sync,
                render,
                before: options.before,
                value: RefCell::new(Value::Null),
                dirty: Cell::new(options.lazy),
                active: Cell::new(true),
                deps: RefCell::new(IndexMap::new()),
                new_deps: RefCell::new(IndexMap::new()),
                scope: scope.map(Scope::downgrade),
            }),
        };
        match scope {
            // A torn-down scope would never tear this one down.
            Some(scope) if scope.is_torn_down() => watcher.inner.active.set(false),
            Some(scope) => scope.register(watcher.clone()),
            None => {}
        }
        watcher
    }

    pub(crate) fn downgrade(&self) -> Weak<WatcherInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<WatcherInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Evaluate the getter, collecting dependencies.
    ///
    /// `Ok(None)` means a `user` getter failed and the error was reported.
    fn get(&self) -> Result<Option<Value>> {
        let ctx = EvalContext::enter(Some(self.clone()));
        let outcome = match (self.inner.getter)() {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.inner.user => {
                report(
                    &err,
                    &format!("getter for watcher {:?}", self.inner.expression),
                );
                Ok(None)
            }
            Err(err) => Err(err),
        };
        if self.inner.deep {
            if let Ok(Some(value)) = &outcome {
                traverse(value);
            }
        }
        drop(ctx);
        self.cleanup_deps();
        outcome
    }

    /// Record `dep` for the pass in progress, subscribing at most once.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        if !self.inner.active.get() {
            return;
        }
        let id = dep.id();
        let fresh = {
            let mut new_deps = self.inner.new_deps.borrow_mut();
            if new_deps.contains_key(&id) {
                false
            } else {
                new_deps.insert(id, dep.clone());
                true
            }
        };
        if fresh && !self.inner.deps.borrow().contains_key(&id) {
            dep.subscribe(self);
        }
    }

    /// Drop subscriptions not renewed on the last pass and promote the new
    /// generation.
    fn cleanup_deps(&self) {
        let collected = std::mem::take(&mut *self.inner.new_deps.borrow_mut());
        let previous = std::mem::replace(&mut *self.inner.deps.borrow_mut(), collected);
        let stale: Vec<Dep> = {
            let current = self.inner.deps.borrow();
            previous
                .into_iter()
                .filter(|(id, _)| !current.contains_key(id))
                .map(|(_, dep)| dep)
                .collect()
        };
        for dep in stale {
            dep.unsubscribe(self.inner.id);
        }
    }

    /// Notification entry point, called by a [`Dep`] that fired.
    pub fn update(&self) {
        if self.inner.lazy {
            self.inner.dirty.set(true);
        } else if self.inner.sync {
            if let Err(err) = self.run() {
                report(&err, &format!("sync watcher {:?}", self.inner.expression));
            }
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and fire the callback if the value changed.
    ///
    /// Containers and `deep` watchers fire on every run: in-place mutation
    /// leaves the reference unchanged.
    pub fn run(&self) -> Result<()> {
        if !self.inner.active.get() {
            return Ok(());
        }
        let Some(value) = self.get()? else {
            return Ok(());
        };
        let old = self.inner.value.borrow().clone();
        if !value.same(&old) || value.is_container() || self.inner.deep {
            *self.inner.value.borrow_mut() = value.clone();
            if let Err(err) = (self.inner.callback)(&value, &old) {
                report(
                    &err,
                    &format!("callback for watcher {:?}", self.inner.expression),
                );
            }
        }
        Ok(())
    }

    /// Evaluate a lazy watcher and clear its dirty flag.
    pub fn evaluate(&self) -> Result<()> {
        if let Some(value) = self.get()? {
            *self.inner.value.borrow_mut() = value;
        }
        self.inner.dirty.set(false);
        Ok(())
    }

    /// Subscribe the currently evaluating watcher to every dependency of this
    /// one.
    pub fn depend(&self) {
        let deps: Vec<Dep> = self.inner.deps.borrow().values().cloned().collect();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from all dependencies and stop running. Idempotent.
    pub fn teardown(&self) {
        if !self.inner.active.get() {
            return;
        }
        if let Some(scope) = self.inner.scope.as_ref().and_then(Weak::upgrade) {
            Scope::from_inner(scope).unregister(self.inner.id);
        }
        let deps = std::mem::take(&mut *self.inner.deps.borrow_mut());
        for dep in deps.into_values() {
            dep.unsubscribe(self.inner.id);
        }
        self.inner.active.set(false);
    }

    pub(crate) fn call_before(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    /// Get the watcher's unique ID.
    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    /// Label used in diagnostics.
    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    /// The value produced by the last successful evaluation.
    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    /// Whether a lazy watcher must re-evaluate before its value is read.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Whether the watcher still runs. False once torn down.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Whether the watcher only evaluates on demand.
    pub fn is_lazy(&self) -> bool {
        self.inner.lazy
    }

    /// Whether the watcher traverses its value and always fires.
    pub fn is_deep(&self) -> bool {
        self.inner.deep
    }

    /// Whether getter and callback errors are reported instead of returned.
    pub fn is_user(&self) -> bool {
        self.inner.user
    }

    /// Whether notifications run the watcher on the spot.
    pub fn is_sync(&self) -> bool {
        self.inner.sync
    }

    /// Whether this watcher drives a render/patch cycle.
    pub fn is_render(&self) -> bool {
        self.inner.render
    }

    /// IDs of the dependencies read on the last pass.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.inner.deps.borrow().keys().copied().collect()
    }

    /// Number of dependencies read on the last pass.
    pub fn dependency_count(&self) -> usize {
        self.inner.deps.borrow().len()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("active", &self.is_active())
            .field("dirty", &self.is_dirty())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{set_error_handler, Error};
    use crate::reactive::{observe, Object};
    use serde_json::json;

    fn observed(json: serde_json::Value) -> Object {
        let value = Value::from(json);
        observe(&value, false);
        value.as_object().unwrap().clone()
    }

    fn sync_options() -> WatcherOptions {
        WatcherOptions {
            sync: true,
            ..WatcherOptions::default()
        }
    }

    #[test]
    fn watcher_evaluates_on_creation() {
        let obj = observed(json!({ "a": 1 }));
        let reader = obj.clone();
        let watcher = Watcher::new(move || Ok(reader.get("a")), |_, _| Ok(()), sync_options()).unwrap();

        assert_eq!(watcher.value(), Value::from(1));
        assert_eq!(watcher.dependency_count(), 1);
        assert!(obj.property_dep("a").unwrap().has_subscriber(watcher.id()));
    }

    #[test]
    fn lazy_watcher_waits_until_evaluated() {
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let options = WatcherOptions {
            lazy: true,
            ..WatcherOptions::default()
        };
        let watcher = Watcher::new(
            move || {
                counter.set(counter.get() + 1);
                Ok(Value::from(42))
            },
            |_, _| Ok(()),
            options,
        )
        .unwrap();

        assert_eq!(runs.get(), 0);
        assert!(watcher.is_dirty());

        watcher.evaluate().unwrap();
        assert_eq!(runs.get(), 1);
        assert!(!watcher.is_dirty());
        assert_eq!(watcher.value(), Value::from(42));
    }

    #[test]
    fn lazy_watcher_update_only_marks_dirty() {
        let obj = observed(json!({ "a": 1 }));
        let reader = obj.clone();
        let options = WatcherOptions {
            lazy: true,
            ..WatcherOptions::default()
        };
        let watcher = Watcher::new(move || Ok(reader.get("a")), |_, _| Ok(()), options).unwrap();
        watcher.evaluate().unwrap();

        obj.set("a", 2);
        assert!(watcher.is_dirty());
        assert_eq!(watcher.value(), Value::from(1));
    }

    #[test]
    fn stale_dependencies_are_dropped() {
        let obj = observed(json!({ "use_a": true, "a": 1, "b": 2 }));
        let reader = obj.clone();
        let watcher = Watcher::new(
            move || {
                if reader.get("use_a").as_bool() == Some(true) {
                    reader.get("a");
                }
                Ok(reader.get("b"))
            },
            |_, _| Ok(()),
            sync_options(),
        )
        .unwrap();
        let a = obj.property_dep("a").unwrap();
        let b = obj.property_dep("b").unwrap();
        assert!(a.has_subscriber(watcher.id()));

        obj.set("use_a", false);

        assert!(!a.has_subscriber(watcher.id()));
        assert!(b.has_subscriber(watcher.id()));
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn callback_receives_new_and_old() {
        let obj = observed(json!({ "a": 1 }));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let reader = obj.clone();
        let _watcher = Watcher::new(
            move || Ok(reader.get("a")),
            move |new, old| {
                sink.borrow_mut().push((new.clone(), old.clone()));
                Ok(())
            },
            sync_options(),
        )
        .unwrap();

        obj.set("a", 2);
        assert_eq!(*seen.borrow(), vec![(Value::from(2), Value::from(1))]);
    }

    #[test]
    fn unchanged_scalar_skips_callback() {
        let obj = observed(json!({ "a": 1, "b": 1 }));
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let reader = obj.clone();
        let _watcher = Watcher::new(
            // Reads b but always yields the same value.
            move || {
                reader.get("b");
                Ok(Value::from("const"))
            },
            move |_, _| {
                counter.set(counter.get() + 1);
                Ok(())
            },
            sync_options(),
        )
        .unwrap();

        obj.set("b", 2);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn user_getter_error_is_reported_and_value_kept() {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let sink = reported.clone();
        set_error_handler(Some(Rc::new(move |_: &Error, info: &str| sink.borrow_mut().push(info.to_string()))));

        let obj = observed(json!({ "a": 1 }));
        let reader = obj.clone();
        let options = WatcherOptions {
            user: true,
            sync: true,
            expression: Some("a-or-fail".into()),
            ..WatcherOptions::default()
        };
        let watcher = Watcher::new(
            move || {
                let a = reader.get("a");
                if a == Value::from(2) {
                    return Err(Error::msg("two is not allowed"));
                }
                Ok(a)
            },
            |_, _| Ok(()),
            options,
        )
        .unwrap();

        obj.set("a", 2);
        assert_eq!(watcher.value(), Value::from(1));
        assert_eq!(*reported.borrow(), vec!["getter for watcher \"a-or-fail\"".to_string()]);
        set_error_handler(None);
    }

    #[test]
    fn non_user_getter_error_propagates() {
        let fail = Rc::new(Cell::new(false));
        let flag = fail.clone();
        let watcher = Watcher::new(
            move || {
                if flag.get() {
                    Err(Error::msg("render failed"))
                } else {
                    Ok(Value::Null)
                }
            },
            |_, _| Ok(()),
            WatcherOptions::default(),
        )
        .unwrap();

        fail.set(true);
        assert!(watcher.run().is_err());
    }

    #[test]
    fn initial_error_is_returned() {
        let result = Watcher::new(
            || Err(Error::msg("nope")),
            |_, _| Ok(()),
            WatcherOptions::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn teardown_unsubscribes_and_stops_runs() {
        let obj = observed(json!({ "a": 1 }));
        let runs = Rc::new(Cell::new(0));
        let counter = runs.clone();
        let reader = obj.clone();
        let watcher = Watcher::new(
            move || {
                counter.set(counter.get() + 1);
                Ok(reader.get("a"))
            },
            |_, _| Ok(()),
            sync_options(),
        )
        .unwrap();

        watcher.teardown();
        watcher.teardown();
        assert!(!watcher.is_active());
        assert_eq!(obj.property_dep("a").unwrap().subscriber_count(), 0);

        obj.set("a", 5);
        watcher.run().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn depend_forwards_dependencies_to_reader() {
        let obj = observed(json!({ "a": 1 }));
        let reader = obj.clone();
        let options = WatcherOptions {
            lazy: true,
            ..WatcherOptions::default()
        };
        let inner = Watcher::new(move || Ok(reader.get("a")), |_, _| Ok(()), options).unwrap();
        inner.evaluate().unwrap();

        let forwarded = inner.clone();
        let outer = Watcher::new(
            move || {
                forwarded.depend();
                Ok(Value::Null)
            },
            |_, _| Ok(()),
            sync_options(),
        )
        .unwrap();

        assert!(obj.property_dep("a").unwrap().has_subscriber(outer.id()));
    }
}
