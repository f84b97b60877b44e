//! Dependencies
//!
//! A [`Dep`] is the publisher side of dependency tracking. One exists per
//! reactive property and one per observed container (its "shape" dependency,
//! fired on array mutation and property addition/removal). Watchers subscribe
//! to it while they evaluate and are notified when it fires.
//!
//! Subscribers are held weakly so a dependency never keeps a watcher alive;
//! a watcher dropped without teardown removes itself, and dead entries are
//! pruned on subscribe.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::config;

use super::context::EvalContext;
use super::id::{DepId, WatcherId};
use super::watcher::{Watcher, WatcherInner};

struct DepInner {
    id: DepId,
    /// Subscribers in insertion order. A watcher appears at most once.
    subs: RefCell<SmallVec<[Weak<WatcherInner>; 4]>>,
}

/// A publisher of change notifications.
///
/// Cloning a `Dep` creates another handle to the same subscriber list.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<DepInner>,
}

impl Dep {
    /// Create a dependency with a fresh id and no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DepInner {
                id: DepId::next(),
                subs: RefCell::new(SmallVec::new()),
            }),
        }
    }

    /// Get the dependency's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Append `watcher` to the subscriber list.
    ///
    /// Callers guarantee the watcher is not already subscribed; watchers go
    /// through [`Watcher::add_dep`] which checks both of its dep generations.
    pub(crate) fn subscribe(&self, watcher: &Watcher) {
        debug_assert!(
            !self.has_subscriber(watcher.id()),
            "{} subscribed twice to {}",
            watcher.id(),
            self.id()
        );
        let mut subs = self.inner.subs.borrow_mut();
        subs.retain(|sub| sub.strong_count() > 0);
        subs.push(watcher.downgrade());
    }

    /// Remove the watcher with `id`. No-op if absent.
    pub(crate) fn unsubscribe(&self, id: WatcherId) {
        self.inner
            .subs
            .borrow_mut()
            .retain(|sub| sub.upgrade().is_some_and(|w| w.id != id));
    }

    /// Register this dependency with the watcher currently evaluating.
    pub fn depend(&self) {
        if let Some(watcher) = EvalContext::current() {
            watcher.add_dep(self);
        }
    }

    /// Notify every subscriber that the state behind this dependency changed.
    pub fn notify(&self) {
        // Snapshot first: updates may subscribe or unsubscribe watchers.
        let mut subs: Vec<Watcher> = self
            .inner
            .subs
            .borrow()
            .iter()
            .filter_map(Watcher::upgrade)
            .collect();

        // Without batching there is no scheduler sort, so order here.
        if !config::get().async_flush {
            subs.sort_by_key(Watcher::id);
        }

        tracing::trace!(dep = %self.id(), subscribers = subs.len(), "notify");
        for watcher in subs {
            watcher.update();
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .borrow()
            .iter()
            .filter(|sub| sub.strong_count() > 0)
            .count()
    }

    /// Whether the watcher with `id` is subscribed.
    pub fn has_subscriber(&self, id: WatcherId) -> bool {
        self.inner
            .subs
            .borrow()
            .iter()
            .any(|sub| sub.upgrade().is_some_and(|w| w.id == id))
    }

    /// Entries in the subscriber list, dead ones included.
    #[cfg(test)]
    pub(crate) fn raw_subscriber_len(&self) -> usize {
        self.inner.subs.borrow().len()
    }

    /// IDs of the live subscribers, in subscription order.
    pub fn subscriber_ids(&self) -> Vec<WatcherId> {
        self.inner
            .subs
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(|w| w.id)
            .collect()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id())
            .field("subscribers", &self.subscriber_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Value, WatcherOptions};
    use std::cell::Cell;

    fn reader(dep: &Dep, reads: usize, runs: Rc<Cell<usize>>) -> Watcher {
        let dep = dep.clone();
        let options = WatcherOptions {
            sync: true,
            ..WatcherOptions::default()
        };
        Watcher::new(
            move || {
                runs.set(runs.get() + 1);
                for _ in 0..reads {
                    dep.depend();
                }
                Ok(Value::Null)
            },
            |_, _| Ok(()),
            options,
        )
        .unwrap()
    }

    #[test]
    fn repeated_depend_subscribes_once() {
        let dep = Dep::new();
        let watcher = reader(&dep, 3, Rc::new(Cell::new(0)));

        assert_eq!(dep.subscriber_ids(), vec![watcher.id()]);
    }

    #[test]
    fn depend_without_target_is_noop() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn notify_updates_subscribers() {
        let dep = Dep::new();
        let runs = Rc::new(Cell::new(0));
        let _watcher = reader(&dep, 1, runs.clone());
        assert_eq!(runs.get(), 1);

        dep.notify();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn unsubscribe_removes_only_target() {
        let dep = Dep::new();
        let a = reader(&dep, 1, Rc::new(Cell::new(0)));
        let b = reader(&dep, 1, Rc::new(Cell::new(0)));

        dep.unsubscribe(a.id());
        assert_eq!(dep.subscriber_ids(), vec![b.id()]);

        // Absent id is a no-op.
        dep.unsubscribe(a.id());
        assert_eq!(dep.subscriber_count(), 1);
    }

    #[test]
    fn dropped_watchers_are_skipped() {
        let dep = Dep::new();
        let runs = Rc::new(Cell::new(0));
        drop(reader(&dep, 1, runs.clone()));

        dep.notify();
        assert_eq!(runs.get(), 1);
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn dropped_watchers_leave_no_entries() {
        let dep = Dep::new();
        for _ in 0..1000 {
            drop(reader(&dep, 1, Rc::new(Cell::new(0))));
        }
        assert_eq!(dep.raw_subscriber_len(), 0);

        let kept = reader(&dep, 1, Rc::new(Cell::new(0)));
        dep.notify();
        assert_eq!(dep.subscriber_ids(), vec![kept.id()]);
        assert_eq!(dep.raw_subscriber_len(), 1);
    }
}
