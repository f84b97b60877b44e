//! Observers
//!
//! An [`Observer`] is attached to a container the first time it is made
//! reactive. It owns the container's shape [`Dep`] (fired by array mutators
//! and by property addition/removal) and counts how many root states use the
//! container, so runtime shape changes to root data can be refused.
//!
//! Observation is idempotent: [`observe`] on an already observed container
//! returns the existing observer, which also makes it terminate on cyclic
//! data. Scalars, opaque values and frozen containers are never observed.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};

use super::array::{Array, ArrayInner, MAX_INDEX};
use super::dep::Dep;
use super::object::{Object, ObjectInner, Property, PropertyOptions};
use super::value::{Key, Value};

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Enable or disable observation of new containers on this thread.
///
/// While disabled, [`observe`] only returns observers that already exist.
pub fn toggle_observing(enabled: bool) {
    SHOULD_OBSERVE.with(|s| s.set(enabled));
}

/// Whether new containers are currently being observed.
pub fn is_observing() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

enum Target {
    Object(Weak<ObjectInner>),
    Array(Weak<ArrayInner>),
}

struct ObserverInner {
    dep: Dep,
    root_count: Cell<usize>,
    target: Target,
}

/// Reactive instrumentation attached to one container.
#[derive(Clone)]
pub struct Observer {
    inner: Rc<ObserverInner>,
}

impl Observer {
    fn new(target: Target) -> Self {
        Self {
            inner: Rc::new(ObserverInner {
                dep: Dep::new(),
                root_count: Cell::new(0),
                target,
            }),
        }
    }

    /// The container's shape dependency.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// How many root states use this container.
    pub fn root_count(&self) -> usize {
        self.inner.root_count.get()
    }

    /// The observed container, if it is still alive.
    pub fn value(&self) -> Option<Value> {
        match &self.inner.target {
            Target::Object(weak) => weak.upgrade().map(|o| Value::Object(Object::from_inner(o))),
            Target::Array(weak) => weak.upgrade().map(|a| Value::Array(Array::from_inner(a))),
        }
    }

    pub fn ptr_eq(&self, other: &Observer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.inner.dep.id())
            .field("root_count", &self.root_count())
            .finish()
    }
}

/// Make `value` reactive, returning its observer.
///
/// With `as_root`, the container is counted as root data: adding or removing
/// its properties at runtime is refused with a warning.
pub fn observe(value: &Value, as_root: bool) -> Option<Observer> {
    let ob = match value {
        Value::Object(obj) => match obj.observer() {
            Some(ob) => ob,
            None if is_observing() && !obj.is_frozen() => {
                let ob = Observer::new(Target::Object(obj.downgrade()));
                // Attach first so cycles back to `obj` find it.
                obj.attach_observer(ob.clone());
                for child in obj.make_reactive() {
                    observe(&child, false);
                }
                ob
            }
            None => return None,
        },
        Value::Array(array) => match array.observer() {
            Some(ob) => ob,
            None if is_observing() && !array.is_frozen() => {
                let ob = Observer::new(Target::Array(array.downgrade()));
                array.attach_observer(ob.clone());
                for item in array.raw_items() {
                    observe(&item, false);
                }
                ob
            }
            None => return None,
        },
        _ => return None,
    };

    if as_root {
        ob.inner.root_count.set(ob.inner.root_count.get() + 1);
    }
    Some(ob)
}

/// Define (or redefine) one reactive property on `obj`.
///
/// Works on unobserved objects too; only that property is tracked then.
pub fn define_reactive(
    obj: &Object,
    key: impl Into<String>,
    value: impl Into<Value>,
    options: PropertyOptions,
) {
    let value = value.into();
    if !options.shallow && (options.getter.is_none() || options.setter.is_some()) {
        observe(&value, false);
    }
    obj.install_property(key.into(), Property::reactive(value, options));
}

/// Set a property or array index, making new properties reactive and
/// notifying dependents. Returns the value that was set.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Result<Value> {
    let key = key.into();
    let value = value.into();
    match target {
        Value::Array(array) => array.set(array_index(&key)?, value.clone()),
        Value::Object(obj) => obj.set(key.into_name(), value.clone()),
        other => {
            return Err(Error::InvalidTarget {
                op: "set",
                found: other.type_name(),
            })
        }
    }
    Ok(value)
}

/// Delete a property or array index and notify dependents.
///
/// Returns the removed value, if there was one.
pub fn del(target: &Value, key: impl Into<Key>) -> Result<Option<Value>> {
    let key = key.into();
    match target {
        Value::Array(array) => Ok(array.remove(array_index(&key)?)),
        Value::Object(obj) => Ok(obj.remove(&key.into_name())),
        other => Err(Error::InvalidTarget {
            op: "delete",
            found: other.type_name(),
        }),
    }
}

/// A key usable as an index, no larger than [`MAX_INDEX`].
fn array_index(key: &Key) -> Result<usize> {
    key.as_index()
        .filter(|&index| index <= MAX_INDEX)
        .ok_or_else(|| Error::InvalidKey {
            key: key.to_string(),
            found: "array",
        })
}

/// Subscribe the evaluating watcher to a child value's shape dep.
pub(crate) fn depend_child(value: &Value) {
    if let Some(ob) = value.observer() {
        ob.dep().depend();
        if let Value::Array(array) = value {
            depend_array(array);
        }
    }
}

/// Subscribe the evaluating watcher to the shape dep of every container
/// nested in `array`. Array elements have no accessor of their own, so this
/// is how touching an element inside a nested array gets tracked.
pub fn depend_array(array: &Array) {
    let mut seen = vec![array.addr()];
    depend_items(array, &mut seen);
}

fn depend_items(array: &Array, seen: &mut Vec<usize>) {
    for item in array.raw_items() {
        if let Some(ob) = item.observer() {
            ob.dep().depend();
        }
        if let Value::Array(inner) = &item {
            if !seen.contains(&inner.addr()) {
                seen.push(inner.addr());
                depend_items(inner, seen);
            }
        }
    }
}
