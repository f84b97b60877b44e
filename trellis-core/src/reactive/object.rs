//! Reactive Objects
//!
//! An [`Object`] is a shared, insertion-ordered map of properties. Once the
//! object is observed (see [`observe`](super::observe)) every property owns a
//! private [`Dep`] and reads/writes go through the property accessor:
//!
//! - **read**: subscribes the evaluating watcher to the property's dep, and
//!   if the value is itself an observed container, to that container's shape
//!   dep as well (plus every nested array element, see
//!   [`depend_array`](super::observer::depend_array)).
//! - **write**: no-op when the new value is [`same`](Value::same) as the old
//!   one; otherwise stores it, observes it, and notifies the property's dep.
//!
//! Before observation the object is plain data: reads track nothing and
//! writes notify no one.
//!
//! Adding a key through [`Object::set`] goes through the `set` helper path,
//! so new properties of an observed object are reactive from the start and
//! fire the object's shape dep.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::warn;

use super::context::EvalContext;
use super::dep::Dep;
use super::observer::{self, Observer};
use super::value::Value;

/// Pass-through getter for a computed-style property.
pub type PropertyGetter = Rc<dyn Fn() -> Value>;

/// Pass-through setter for a computed-style property.
pub type PropertySetter = Rc<dyn Fn(Value)>;

/// Hook invoked with the incoming value before a changed write is applied.
pub type SetHook = Rc<dyn Fn(&Value)>;

/// Options for [`define_reactive`](super::define_reactive).
#[derive(Clone, Default)]
pub struct PropertyOptions {
    /// Read through this closure instead of the stored value.
    pub getter: Option<PropertyGetter>,
    /// Write through this closure instead of the stored value. A property
    /// with a getter and no setter is read-only.
    pub setter: Option<PropertySetter>,
    /// Called before every changed write (used for dev-time warnings).
    pub on_set: Option<SetHook>,
    /// Do not observe the property's value.
    pub shallow: bool,
}

pub(crate) struct Property {
    value: Value,
    /// Present once the property has been made reactive.
    dep: Option<Dep>,
    getter: Option<PropertyGetter>,
    setter: Option<PropertySetter>,
    on_set: Option<SetHook>,
    shallow: bool,
}

impl Property {
    fn plain(value: Value) -> Self {
        Self {
            value,
            dep: None,
            getter: None,
            setter: None,
            on_set: None,
            shallow: false,
        }
    }

    pub(crate) fn reactive(value: Value, options: PropertyOptions) -> Self {
        Self {
            value,
            dep: Some(Dep::new()),
            getter: options.getter,
            setter: options.setter,
            on_set: options.on_set,
            shallow: options.shallow,
        }
    }
}

pub(crate) struct ObjectInner {
    props: RefCell<IndexMap<String, Property>>,
    ob: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

/// A shared map of reactive properties.
///
/// Cloning an `Object` creates another handle to the **same** properties.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
}

impl Object {
    /// Create an empty, unobserved object.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                props: RefCell::new(IndexMap::new()),
                ob: RefCell::new(None),
                frozen: Cell::new(false),
            }),
        }
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> Weak<ObjectInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<ObjectInner>) -> Self {
        Self { inner }
    }

    /// The observer attached to this object, if it has been observed.
    pub fn observer(&self) -> Option<Observer> {
        self.inner.ob.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, ob: Observer) {
        *self.inner.ob.borrow_mut() = Some(ob);
    }

    /// Freeze the object: it will never be observed, and writes are ignored.
    pub fn freeze(&self) {
        self.inner.frozen.set(true);
    }

    /// Whether [`freeze`](Self::freeze) was called.
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    /// Read a property. Missing keys read as `Null`.
    pub fn get(&self, key: &str) -> Value {
        let found = {
            let props = self.inner.props.borrow();
            props
                .get(key)
                .map(|p| (p.value.clone(), p.dep.clone(), p.getter.clone(), p.shallow))
        };
        let Some((stored, dep, getter, shallow)) = found else {
            // A later `set` of this key fires the shape dep.
            self.depend_shape();
            return Value::Null;
        };

        let value = match getter {
            Some(getter) => getter(),
            None => stored,
        };

        if let Some(dep) = dep {
            if EvalContext::is_active() {
                dep.depend();
                if !shallow {
                    observer::depend_child(&value);
                }
            }
        }
        value
    }

    /// Whether the object has `key`.
    pub fn has(&self, key: &str) -> bool {
        self.depend_shape();
        self.inner.props.borrow().contains_key(key)
    }

    /// Property names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.depend_shape();
        self.inner.props.borrow().keys().cloned().collect()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.depend_shape();
        self.inner.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a property.
    ///
    /// Existing keys are assigned through the property accessor. New keys go
    /// through the [`set`](super::set) helper: on an observed object they
    /// become reactive and the object's shape dep fires.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let exists = self.inner.props.borrow().contains_key(&key);
        if exists {
            self.assign(&key, value);
        } else {
            self.add_property(key, value);
        }
    }

    /// Remove a property, notifying its dependents.
    ///
    /// Returns the removed value. Root data objects refuse removal.
    pub fn remove(&self, key: &str) -> Option<Value> {
        if self.is_frozen() {
            warn(&format!("cannot delete property {key:?} of a frozen object"));
            return None;
        }
        let ob = self.observer();
        if ob.as_ref().is_some_and(|ob| ob.root_count() > 0) {
            warn(&format!(
                "avoid deleting property {key:?} from root data at runtime; set it to null instead"
            ));
            return None;
        }

        let removed = self.inner.props.borrow_mut().shift_remove(key)?;
        if let Some(ob) = ob {
            ob.dep().notify();
        }
        if let Some(dep) = &removed.dep {
            dep.notify();
        }
        Some(removed.value)
    }

    /// The dependency backing `key`, once the property is reactive.
    pub fn property_dep(&self, key: &str) -> Option<Dep> {
        self.inner.props.borrow().get(key).and_then(|p| p.dep.clone())
    }

    /// Current entries, read without tracking.
    pub fn raw_entries(&self) -> Vec<(String, Value)> {
        let entries: Vec<(String, Value, Option<PropertyGetter>)> = self
            .inner
            .props
            .borrow()
            .iter()
            .map(|(k, p)| (k.clone(), p.value.clone(), p.getter.clone()))
            .collect();
        EvalContext::untracked(|| {
            entries
                .into_iter()
                .map(|(k, v, getter)| (k, getter.map_or(v, |g| g())))
                .collect()
        })
    }

    /// Values of plain (getter-less) properties that should be observed
    /// along with this object. Gives every property a dep on the way.
    pub(crate) fn make_reactive(&self) -> Vec<Value> {
        let mut props = self.inner.props.borrow_mut();
        for prop in props.values_mut() {
            if prop.dep.is_none() {
                prop.dep = Some(Dep::new());
            }
        }
        props
            .values()
            .filter(|p| !p.shallow && (p.getter.is_none() || p.setter.is_some()))
            .map(|p| p.value.clone())
            .collect()
    }

    /// Insert or replace a reactive property. Accessors of an existing
    /// property carry over unless new ones are given.
    pub(crate) fn install_property(&self, key: String, mut property: Property) {
        let mut props = self.inner.props.borrow_mut();
        if let Some(existing) = props.get(&key) {
            if property.getter.is_none() {
                property.getter = existing.getter.clone();
            }
            if property.setter.is_none() {
                property.setter = existing.setter.clone();
            }
        }
        props.insert(key, property);
    }

    /// The `set` helper path for a key the object does not have yet.
    pub(crate) fn add_property(&self, key: String, value: Value) {
        if self.is_frozen() {
            warn(&format!("cannot add property {key:?} to a frozen object"));
            return;
        }
        match self.observer() {
            None => {
                self.inner.props.borrow_mut().insert(key, Property::plain(value));
            }
            Some(ob) if ob.root_count() > 0 => {
                warn(&format!(
                    "avoid adding reactive property {key:?} to root data at runtime; declare it upfront"
                ));
            }
            Some(ob) => {
                observer::define_reactive(self, key, value, PropertyOptions::default());
                ob.dep().notify();
            }
        }
    }

    /// Property accessor write.
    fn assign(&self, key: &str, new: Value) {
        if self.is_frozen() {
            warn(&format!("cannot assign to property {key:?} of a frozen object"));
            return;
        }
        let found = {
            let props = self.inner.props.borrow();
            props.get(key).map(|p| {
                (
                    p.value.clone(),
                    p.dep.clone(),
                    p.getter.clone(),
                    p.setter.clone(),
                    p.on_set.clone(),
                    p.shallow,
                )
            })
        };
        let Some((stored, dep, getter, setter, on_set, shallow)) = found else {
            return;
        };

        let old = match &getter {
            Some(getter) => EvalContext::untracked(|| getter()),
            None => stored,
        };
        if new.same(&old) {
            return;
        }
        if let Some(on_set) = on_set {
            on_set(&new);
        }
        // Accessor without a setter: read-only.
        if getter.is_some() && setter.is_none() {
            return;
        }

        match setter {
            Some(setter) => setter(new.clone()),
            None => {
                if let Some(prop) = self.inner.props.borrow_mut().get_mut(key) {
                    prop.value = new.clone();
                }
            }
        }

        if let Some(dep) = dep {
            if !shallow {
                observer::observe(&new, false);
            }
            dep.notify();
        }
    }

    fn depend_shape(&self) {
        if EvalContext::is_active() {
            if let Some(ob) = self.observer() {
                ob.dep().depend();
            }
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Object
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        {
            let mut props = object.inner.props.borrow_mut();
            for (key, value) in iter {
                props.insert(key.into(), Property::plain(value.into()));
            }
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.raw_entries()).finish()
    }
}
