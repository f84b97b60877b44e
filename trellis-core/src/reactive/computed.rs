//! Computed Values
//!
//! A [`Computed`] is a cached derived value backed by a lazy [`Watcher`].
//!
//! # How Computed Values Work
//!
//! 1. Nothing runs at creation; the watcher starts dirty.
//!
//! 2. [`Computed::get`] evaluates only when dirty and caches the result.
//!
//! 3. When a dependency fires, the watcher is just marked dirty. No work is
//!    queued; the next read recomputes.
//!
//! 4. A read from inside another watcher also subscribes that watcher to
//!    everything the computed value depends on, so it re-runs when the
//!    inputs change, not when the cache happens to be refreshed.

use std::fmt;
use std::rc::Rc;

use crate::error::{warn, Result};

use super::context::EvalContext;
use super::scope::Scope;
use super::value::Value;
use super::watcher::{Getter, Watcher, WatcherOptions};

/// Write handler for a computed value.
pub type ComputedSetter = Rc<dyn Fn(Value) -> Result<()>>;

/// A cached derived value.
///
/// Cloning a `Computed` creates another handle to the same cache.
#[derive(Clone)]
pub struct Computed {
    watcher: Watcher,
    setter: Option<ComputedSetter>,
}

impl Computed {
    /// Create a computed value not owned by any scope.
    pub fn new<G>(getter: G) -> Self
    where
        G: Fn() -> Result<Value> + 'static,
    {
        Self::build(Box::new(getter), None, None)
    }

    /// Create a computed value whose writes go to `setter`.
    pub fn with_setter<G, S>(getter: G, setter: S) -> Self
    where
        G: Fn() -> Result<Value> + 'static,
        S: Fn(Value) -> Result<()> + 'static,
    {
        Self::build(Box::new(getter), Some(Rc::new(setter)), None)
    }

    pub(crate) fn build(getter: Getter, setter: Option<ComputedSetter>, scope: Option<&Scope>) -> Self {
        let options = WatcherOptions {
            lazy: true,
            ..WatcherOptions::default()
        };
        let watcher = Watcher::create(getter, Box::new(|_: &Value, _: &Value| Ok(())), options, scope, false);
        Self { watcher, setter }
    }

    /// Current value, recomputing if a dependency changed since last read.
    pub fn get(&self) -> Result<Value> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate()?;
        }
        if EvalContext::is_active() {
            self.watcher.depend();
        }
        Ok(self.watcher.value())
    }

    /// Write through the setter. Without one, the write is ignored with a
    /// warning.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        match &self.setter {
            Some(setter) => setter(value.into()),
            None => {
                warn(&format!(
                    "computed value {:?} was assigned to but it has no setter",
                    self.watcher.expression()
                ));
                Ok(())
            }
        }
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    /// The lazy watcher backing this value.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("watcher", &self.watcher.id())
            .field("dirty", &self.is_dirty())
            .field("has_setter", &self.setter.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{observe, Object, WatcherOptions};
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    fn observed(json: serde_json::Value) -> Object {
        let value = Value::from(json);
        observe(&value, false);
        value.as_object().unwrap().clone()
    }

    fn counting_double(obj: &Object, calls: Rc<Cell<usize>>) -> Computed {
        let reader = obj.clone();
        Computed::new(move || {
            calls.set(calls.get() + 1);
            let n = reader.get("n").as_f64().unwrap_or_default();
            Ok(Value::from(n * 2.0))
        })
    }

    #[test]
    fn computes_on_first_access_and_caches() {
        let obj = observed(json!({ "n": 2 }));
        let calls = Rc::new(Cell::new(0));
        let doubled = counting_double(&obj, calls.clone());

        assert_eq!(calls.get(), 0);
        assert_eq!(doubled.get().unwrap(), Value::from(4));
        assert_eq!(doubled.get().unwrap(), Value::from(4));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recomputes_after_dependency_change() {
        let obj = observed(json!({ "n": 2 }));
        let calls = Rc::new(Cell::new(0));
        let doubled = counting_double(&obj, calls.clone());
        doubled.get().unwrap();

        obj.set("n", 5);
        assert!(doubled.is_dirty());
        assert_eq!(calls.get(), 1);

        assert_eq!(doubled.get().unwrap(), Value::from(10));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn reader_inherits_dependencies() {
        let obj = observed(json!({ "n": 1 }));
        let doubled = counting_double(&obj, Rc::new(Cell::new(0)));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let source = doubled.clone();
        let options = WatcherOptions {
            sync: true,
            ..WatcherOptions::default()
        };
        let _watcher = Watcher::new(
            move || source.get(),
            move |new, _| {
                sink.borrow_mut().push(new.clone());
                Ok(())
            },
            options,
        )
        .unwrap();

        obj.set("n", 3);
        assert_eq!(*seen.borrow(), vec![Value::from(6)]);
    }

    #[test]
    fn setter_receives_writes() {
        let obj = observed(json!({ "n": 1 }));
        let reader = obj.clone();
        let writer = obj.clone();
        let computed = Computed::with_setter(
            move || Ok(reader.get("n")),
            move |v| {
                writer.set("n", v);
                Ok(())
            },
        );

        computed.set(7).unwrap();
        assert_eq!(computed.get().unwrap(), Value::from(7));
    }

    #[test]
    fn set_without_setter_is_ignored() {
        let computed = Computed::new(|| Ok(Value::from(1)));
        computed.set(2).unwrap();
        assert_eq!(computed.get().unwrap(), Value::from(1));
    }

    #[test]
    fn scoped_computed_is_torn_down_with_scope() {
        let scope = Scope::new();
        let computed = scope.computed(|| Ok(Value::Null));
        scope.teardown();
        assert!(!computed.watcher().is_active());
    }
}
