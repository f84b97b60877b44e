//! Reactive Arrays
//!
//! [`Array`] is an owning wrapper over a shared `Vec<Value>` that exposes only
//! instrumented mutators. Element positions have no dependency of their own;
//! an observed array has a single shape dep (on its [`Observer`]) that every
//! mutator fires after applying the change, and that every read subscribes
//! to. Items inserted by a mutator are observed on the way in.
//!
//! Mutators fire even when they end up changing nothing (popping an empty
//! array, sorting a sorted one); a watcher that reads an array is re-run
//! after any mutation call.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::warn;

use super::context::EvalContext;
use super::observer::{self, Observer};
use super::value::Value;

/// Largest index an array accepts. Writes past it are refused.
pub const MAX_INDEX: usize = (u32::MAX - 1) as usize;

pub(crate) struct ArrayInner {
    items: RefCell<Vec<Value>>,
    ob: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

/// A shared, observable list of values.
///
/// Cloning an `Array` creates another handle to the **same** items.
#[derive(Clone)]
pub struct Array {
    inner: Rc<ArrayInner>,
}

impl Array {
    /// Create an empty, unobserved array.
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> Weak<ArrayInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<ArrayInner>) -> Self {
        Self { inner }
    }

    /// The observer attached to this array, if it has been observed.
    pub fn observer(&self) -> Option<Observer> {
        self.inner.ob.borrow().clone()
    }

    pub(crate) fn attach_observer(&self, ob: Observer) {
        *self.inner.ob.borrow_mut() = Some(ob);
    }

    /// Freeze the array: it will never be observed and mutators do nothing.
    pub fn freeze(&self) {
        self.inner.frozen.set(true);
    }

    /// Whether [`freeze`](Self::freeze) was called.
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Item at `index`, or `Null` when out of bounds.
    pub fn get(&self, index: usize) -> Value {
        self.depend_shape();
        self.inner.items.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.depend_shape();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all items.
    pub fn to_vec(&self) -> Vec<Value> {
        self.depend_shape();
        self.raw_items()
    }

    /// Copy of all items, read without tracking.
    pub fn raw_items(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Append an item. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate(std::slice::from_ref(&value), |items| {
            items.push(value.clone());
            items.len()
        })
        .unwrap_or_else(|| self.raw_len())
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Option<Value> {
        self.mutate(&[], Vec::pop).flatten()
    }

    /// Remove and return the first item.
    pub fn shift(&self) -> Option<Value> {
        self.mutate(&[], |items| {
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        })
        .flatten()
    }

    /// Prepend items, keeping their order. Returns the new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(&values, |items| {
            let tail = std::mem::take(items);
            items.extend(values.iter().cloned());
            items.extend(tail);
            items.len()
        })
        .unwrap_or_else(|| self.raw_len())
    }

    /// Remove `delete_count` items at `start` and insert `values` there.
    ///
    /// `start` and `delete_count` are clamped to the array bounds. Returns
    /// the removed items.
    pub fn splice(
        &self,
        start: usize,
        delete_count: usize,
        values: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(&values, |items| {
            let start = start.min(items.len());
            let end = start + delete_count.min(items.len() - start);
            items.splice(start..end, values.iter().cloned()).collect()
        })
        .unwrap_or_default()
    }

    /// Sort in place with `compare`.
    ///
    /// The comparator runs on a copy, so it may read this array.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        if self.is_frozen() {
            warn("cannot sort a frozen array");
            return;
        }
        let mut sorted = self.raw_items();
        sorted.sort_by(&mut compare);
        self.mutate(&[], move |items| *items = sorted);
    }

    pub fn reverse(&self) {
        self.mutate(&[], |items| items.reverse());
    }

    /// Assign `index`. Past the end the array grows, padding with `Null`.
    ///
    /// Indices above [`MAX_INDEX`] are refused with a warning.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        if index > MAX_INDEX {
            warn(&format!("array index {index} is out of range"));
            return;
        }
        let value = value.into();
        self.mutate(std::slice::from_ref(&value), |items| {
            if index < items.len() {
                items[index] = value.clone();
            } else {
                items.resize(index, Value::Null);
                items.push(value.clone());
            }
        });
    }

    /// Remove the item at `index`, if any.
    pub fn remove(&self, index: usize) -> Option<Value> {
        self.splice(index, 1, []).into_iter().next()
    }

    /// Change the length, truncating or padding with `Null`.
    ///
    /// Lengths above `MAX_INDEX + 1` are refused with a warning.
    pub fn set_len(&self, len: usize) {
        if len > MAX_INDEX + 1 {
            warn(&format!("array length {len} is out of range"));
            return;
        }
        self.mutate(&[], |items| items.resize(len, Value::Null));
    }

    fn raw_len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// Apply `f`, observe `inserted`, fire the shape dep.
    fn mutate<R>(&self, inserted: &[Value], f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        if self.is_frozen() {
            warn("cannot mutate a frozen array");
            return None;
        }
        let result = {
            let mut items = self.inner.items.borrow_mut();
            f(&mut *items)
        };
        if let Some(ob) = self.observer() {
            for value in inserted {
                observer::observe(value, false);
            }
            ob.dep().notify();
        }
        Some(result)
    }

    fn depend_shape(&self) {
        if EvalContext::is_active() {
            if let Some(ob) = self.observer() {
                ob.dep().depend();
            }
        }
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                ob: RefCell::new(None),
                frozen: Cell::new(false),
            }),
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.raw_items()).finish()
    }
}
