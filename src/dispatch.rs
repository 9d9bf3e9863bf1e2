// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed multicast events: `Dispatcher` and `Receiver`.
//!
//! A dispatcher keeps an ordered list of subscribed receivers and calls them
//! in subscription order, feeding every result into a [`Collector`]. A
//! receiver can belong to at most one dispatcher at a time and leaves it when
//! dropped, so a dispatcher never calls into a receiver that no longer
//! exists.
//!
//! ```
//! use lifecycle_ecs::{Dispatcher, Receiver};
//!
//! let dispatcher: Dispatcher<u32> = Dispatcher::new();
//! let mut receiver = Receiver::new();
//! receiver.bind(|value: u32| println!("got {value}"));
//! dispatcher.subscribe(&receiver);
//! dispatcher.dispatch(7);
//! ```
//!
//! Subscribers are kept in a slotmap arena threaded into a singly linked
//! list (`begin`/`end` plus a `next` key per entry). Appending is O(1),
//! removal walks the list to find the predecessor.
//!
//! Dispatch walks a snapshot of the list taken when the broadcast starts and
//! re-checks membership before every call:
//! - a receiver unsubscribed (or dropped) mid-broadcast is skipped;
//! - a receiver subscribed mid-broadcast waits for the next broadcast;
//! - a receiver that is already running further up the stack is skipped;
//! - a receiver rebound or unbound while it runs keeps its current target
//!   until the call returns.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::collector::{CollectDefault, Collector};

new_key_type! {
    /// Position of a receiver inside one dispatcher's subscriber arena.
    pub struct SubscriberKey;
}

/// Type-erased callable. `None` means the bound instance is gone.
type Target<A, R> = Box<dyn FnMut(A) -> Option<R>>;

type Snapshot<A, R> = SmallVec<[(SubscriberKey, Weak<ReceiverNode<A, R>>); 8]>;

struct SubscriberEntry<A, R> {
    receiver: Weak<ReceiverNode<A, R>>,
    next: Option<SubscriberKey>,
}

/// Intrusive singly linked list over a slotmap arena.
struct SubscriberList<A, R> {
    entries: SlotMap<SubscriberKey, SubscriberEntry<A, R>>,
    begin: Option<SubscriberKey>,
    end: Option<SubscriberKey>,
}

impl<A, R> SubscriberList<A, R> {
    fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            begin: None,
            end: None,
        }
    }

    fn push_back(&mut self, receiver: Weak<ReceiverNode<A, R>>) -> SubscriberKey {
        let key = self.entries.insert(SubscriberEntry {
            receiver,
            next: None,
        });

        match self.end {
            Some(end) => {
                debug_assert!(self.begin.is_some());
                if let Some(tail) = self.entries.get_mut(end) {
                    debug_assert!(tail.next.is_none());
                    tail.next = Some(key);
                }
            }
            None => {
                debug_assert!(self.begin.is_none());
                self.begin = Some(key);
            }
        }
        self.end = Some(key);
        key
    }

    fn previous(&self, key: SubscriberKey) -> Option<SubscriberKey> {
        let mut previous = None;
        let mut cursor = self.begin;
        while let Some(current) = cursor {
            if current == key {
                break;
            }
            previous = Some(current);
            cursor = self.entries[current].next;
        }
        previous
    }

    fn remove(&mut self, key: SubscriberKey) -> bool {
        let Some(next) = self.entries.get(key).map(|entry| entry.next) else {
            return false;
        };

        if self.begin == Some(key) {
            self.begin = next;
            if self.end == Some(key) {
                self.end = None;
            }
        } else {
            let previous = self.previous(key);
            debug_assert!(previous.is_some(), "subscriber missing from its list");
            if let Some(previous) = previous {
                self.entries[previous].next = next;
                if self.end == Some(key) {
                    self.end = Some(previous);
                }
            }
        }

        self.entries.remove(key);
        true
    }

    fn snapshot(&self) -> Snapshot<A, R> {
        let mut order = SmallVec::with_capacity(self.entries.len());
        let mut cursor = self.begin;
        while let Some(key) = cursor {
            let entry = &self.entries[key];
            order.push((key, entry.receiver.clone()));
            cursor = entry.next;
        }
        order
    }

    fn take_all(&mut self) -> Vec<Weak<ReceiverNode<A, R>>> {
        self.begin = None;
        self.end = None;
        self.entries.drain().map(|(_, entry)| entry.receiver).collect()
    }
}

type SharedList<A, R> = Rc<RefCell<SubscriberList<A, R>>>;

/// Membership of a receiver: which list and where in it.
struct Link<A, R> {
    list: Weak<RefCell<SubscriberList<A, R>>>,
    key: SubscriberKey,
}

struct ReceiverNode<A, R> {
    target: RefCell<Option<Target<A, R>>>,
    /// Target change requested while `target` was running.
    pending: RefCell<Option<Option<Target<A, R>>>>,
    link: RefCell<Option<Link<A, R>>>,
}

impl<A, R> ReceiverNode<A, R> {
    fn is_linked_to(&self, list: &SharedList<A, R>, key: SubscriberKey) -> bool {
        match &*self.link.borrow() {
            Some(link) => link.key == key && std::ptr::eq(link.list.as_ptr(), Rc::as_ptr(list)),
            None => false,
        }
    }

    fn invoke(&self, args: A) -> Option<R> {
        let result = {
            let Ok(mut target) = self.target.try_borrow_mut() else {
                tracing::trace!("receiver already running, skipped re-entrant call");
                return None;
            };
            let target = target.as_mut()?;
            target(args)
        };
        self.apply_pending();
        result
    }

    fn replace_target(&self, target: Option<Target<A, R>>) {
        match self.target.try_borrow_mut() {
            Ok(mut current) => {
                *current = target;
                self.pending.borrow_mut().take();
            }
            Err(_) => *self.pending.borrow_mut() = Some(target),
        }
    }

    fn apply_pending(&self) {
        let Some(next) = self.pending.borrow_mut().take() else {
            return;
        };
        *self.target.borrow_mut() = next;
    }

    fn is_bound(&self) -> bool {
        if let Some(pending) = &*self.pending.borrow() {
            return pending.is_some();
        }
        // Borrowed means the target is running right now.
        self.target
            .try_borrow()
            .map_or(true, |target| target.is_some())
    }
}

/// Subscribe-only view of a dispatcher.
///
/// Handed out to collaborators that may listen to an event but must not
/// broadcast it.
pub struct EventTap<'a, A, R = ()> {
    list: &'a SharedList<A, R>,
}

impl<'a, A, R> EventTap<'a, A, R> {
    /// Appends `receiver` to the end of the subscriber list.
    ///
    /// No-op if the receiver is already subscribed anywhere.
    pub fn subscribe(&self, receiver: &Receiver<A, R>) {
        let mut link = receiver.node.link.borrow_mut();
        if link.is_some() {
            return;
        }

        let key = self
            .list
            .borrow_mut()
            .push_back(Rc::downgrade(&receiver.node));
        *link = Some(Link {
            list: Rc::downgrade(self.list),
            key,
        });
    }

    /// Removes `receiver` from this list.
    ///
    /// No-op if it is not subscribed here.
    pub fn unsubscribe(&self, receiver: &Receiver<A, R>) {
        let mut link = receiver.node.link.borrow_mut();
        let key = match &*link {
            Some(current) if std::ptr::eq(current.list.as_ptr(), Rc::as_ptr(self.list)) => current.key,
            _ => return,
        };

        let removed = self.list.borrow_mut().remove(key);
        debug_assert!(removed, "linked receiver not found in its dispatcher");
        *link = None;
    }

    pub fn has_subscribers(&self) -> bool {
        self.list.borrow().begin.is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.list.borrow().entries.len()
    }
}

/// Multicast event source.
///
/// `A` is the argument passed to every receiver (use a tuple for several),
/// `R` the receiver return type, `C` the default [`Collector`].
pub struct Dispatcher<A, R = (), C = CollectDefault<R>> {
    list: SharedList<A, R>,
    _collector: PhantomData<fn() -> C>,
}

impl<A, R, C> Dispatcher<A, R, C> {
    pub fn new() -> Self {
        Self {
            list: Rc::new(RefCell::new(SubscriberList::new())),
            _collector: PhantomData,
        }
    }

    /// Subscribe-only view of this dispatcher.
    pub fn tap(&self) -> EventTap<'_, A, R> {
        EventTap { list: &self.list }
    }

    /// See [`EventTap::subscribe`].
    pub fn subscribe(&self, receiver: &Receiver<A, R>) {
        self.tap().subscribe(receiver);
    }

    /// See [`EventTap::unsubscribe`].
    pub fn unsubscribe(&self, receiver: &Receiver<A, R>) {
        self.tap().unsubscribe(receiver);
    }

    pub fn has_subscribers(&self) -> bool {
        self.tap().has_subscribers()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tap().subscriber_count()
    }

    /// Unsubscribes every receiver.
    pub fn cleanup(&self) {
        let receivers = self.list.borrow_mut().take_all();
        for receiver in receivers.iter().filter_map(Weak::upgrade) {
            *receiver.link.borrow_mut() = None;
        }
    }
}

impl<A: Clone, R, C> Dispatcher<A, R, C> {
    /// Broadcasts `args` to every receiver using the default collector.
    pub fn dispatch(&self, args: A) -> C::Output
    where
        C: Collector<R> + Default,
    {
        self.dispatch_with(C::default(), args)
    }

    /// Broadcasts `args` using an explicitly supplied collector.
    pub fn dispatch_with<K: Collector<R>>(&self, mut collector: K, args: A) -> K::Output {
        let snapshot = self.list.borrow().snapshot();

        #[cfg(feature = "profiling")]
        let _span = info_span!("dispatcher.dispatch", subscribers = snapshot.len()).entered();

        for (key, receiver) in snapshot {
            let Some(receiver) = receiver.upgrade() else {
                continue;
            };
            if !receiver.is_linked_to(&self.list, key) {
                continue;
            }
            let Some(result) = receiver.invoke(args.clone()) else {
                continue;
            };
            if !collector.collect(result) {
                break;
            }
        }

        collector.finish()
    }
}

impl<A, R, C> Default for Dispatcher<A, R, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R, C> Drop for Dispatcher<A, R, C> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl<A, R, C> fmt::Debug for Dispatcher<A, R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Callback slot that can join one dispatcher at a time.
///
/// Not `Clone`: the receiver is the identity the dispatcher links to.
/// Dropping it unsubscribes it.
pub struct Receiver<A, R = ()> {
    node: Rc<ReceiverNode<A, R>>,
}

impl<A, R> Receiver<A, R> {
    /// Creates an unbound, unsubscribed receiver.
    pub fn new() -> Self {
        Self {
            node: Rc::new(ReceiverNode {
                target: RefCell::new(None),
                pending: RefCell::new(None),
                link: RefCell::new(None),
            }),
        }
    }

    /// Leaves the current dispatcher, if any.
    pub fn unsubscribe(&self) {
        let Some(link) = self.node.link.borrow_mut().take() else {
            return;
        };
        if let Some(list) = link.list.upgrade() {
            let removed = list.borrow_mut().remove(link.key);
            debug_assert!(removed, "linked receiver not found in its dispatcher");
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.node.link.borrow().is_some()
    }

    pub fn is_bound(&self) -> bool {
        self.node.is_bound()
    }

    /// Drops the bound callable. The receiver stays subscribed but is
    /// skipped by dispatch until bound again.
    ///
    /// Called from inside the receiver's own callback, the callable is
    /// dropped once that call returns.
    pub fn unbind(&mut self) {
        self.node.replace_target(None);
    }

    /// Unsubscribes and unbinds.
    pub fn cleanup(&mut self) {
        self.unsubscribe();
        self.unbind();
    }
}

impl<A: 'static, R: 'static> Receiver<A, R> {
    /// Shorthand for `new` followed by `bind`.
    pub fn from_fn<F>(functor: F) -> Self
    where
        F: FnMut(A) -> R + 'static,
    {
        let mut receiver = Self::new();
        receiver.bind(functor);
        receiver
    }

    /// Binds a free function.
    pub fn bind_fn(&mut self, function: fn(A) -> R) {
        self.set_target(Box::new(move |args| Some(function(args))));
    }

    /// Binds a functor (any `FnMut`, closures included).
    pub fn bind<F>(&mut self, mut functor: F)
    where
        F: FnMut(A) -> R + 'static,
    {
        self.set_target(Box::new(move |args| Some(functor(args))));
    }

    /// Binds `method` on a shared instance.
    ///
    /// The instance is held weakly. Once it is dropped the receiver is
    /// skipped.
    ///
    /// # Panics
    /// Panics when the receiver runs while the instance is borrowed
    /// elsewhere.
    pub fn bind_method<T: 'static>(&mut self, instance: &Rc<RefCell<T>>, method: fn(&mut T, A) -> R) {
        let instance = Rc::downgrade(instance);
        self.set_target(Box::new(move |args| {
            let instance = instance.upgrade()?;
            let Ok(mut instance) = instance.try_borrow_mut() else {
                let name = std::any::type_name::<T>();
                tracing::error!(instance = name, "bound instance is borrowed during dispatch");
                panic!("receiver instance `{name}` is already borrowed");
            };
            Some(method(&mut instance, args))
        }));
    }

    fn set_target(&mut self, target: Target<A, R>) {
        self.node.replace_target(Some(target));
    }
}

impl<A, R> Default for Receiver<A, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, R> Drop for Receiver<A, R> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl<A, R> fmt::Debug for Receiver<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("bound", &self.is_bound())
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectLast, CollectWhileFalse, CollectWhileTrue};
    use std::cell::Cell;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    fn recorder(log: &Log, name: &'static str) -> Receiver<()> {
        let log = log.clone();
        Receiver::from_fn(move |()| log.borrow_mut().push(name))
    }

    #[test]
    fn test_dispatch_in_subscription_order() {
        let log = Log::default();
        let dispatcher: Dispatcher<()> = Dispatcher::new();
        let r1 = recorder(&log, "r1");
        let r2 = recorder(&log, "r2");
        let r3 = recorder(&log, "r3");

        dispatcher.subscribe(&r1);
        dispatcher.subscribe(&r2);
        dispatcher.subscribe(&r3);
        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["r1", "r2", "r3"]);

        log.borrow_mut().clear();
        drop(r2);
        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["r1", "r3"]);
        assert_eq!(dispatcher.subscriber_count(), 2);
    }

    #[test]
    fn test_unsubscribe_head_middle_tail() {
        let log = Log::default();
        let dispatcher: Dispatcher<()> = Dispatcher::new();
        let receivers: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|name| recorder(&log, name))
            .collect();
        for receiver in &receivers {
            dispatcher.subscribe(receiver);
        }

        dispatcher.unsubscribe(&receivers[0]);
        dispatcher.unsubscribe(&receivers[3]);
        dispatcher.unsubscribe(&receivers[2]);
        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["b"]);

        // Tail was fixed up: appending after removals still works.
        dispatcher.subscribe(&receivers[0]);
        log.borrow_mut().clear();
        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn test_subscribe_is_exclusive() {
        let calls = Rc::new(Cell::new(0));
        let first: Dispatcher<()> = Dispatcher::new();
        let second: Dispatcher<()> = Dispatcher::new();
        let receiver = {
            let calls = calls.clone();
            Receiver::from_fn(move |()| calls.set(calls.get() + 1))
        };

        first.subscribe(&receiver);
        first.subscribe(&receiver);
        second.subscribe(&receiver);
        assert_eq!(first.subscriber_count(), 1);
        assert!(!second.has_subscribers());

        // Unsubscribing from a dispatcher that does not own it is a no-op.
        second.unsubscribe(&receiver);
        assert!(receiver.is_subscribed());

        first.dispatch(());
        second.dispatch(());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_receiver_unsubscribe_and_resubscribe() {
        let dispatcher: Dispatcher<()> = Dispatcher::new();
        let other: Dispatcher<()> = Dispatcher::new();
        let receiver = Receiver::from_fn(|()| ());

        dispatcher.subscribe(&receiver);
        receiver.unsubscribe();
        assert!(!receiver.is_subscribed());
        assert!(!dispatcher.has_subscribers());

        other.subscribe(&receiver);
        assert!(other.has_subscribers());
    }

    #[test]
    fn test_veto_stops_broadcast() {
        let reached = Rc::new(Cell::new(false));
        let dispatcher: Dispatcher<u32, bool, CollectWhileTrue> = Dispatcher::new();
        let accept = Receiver::from_fn(|_: u32| true);
        let veto = Receiver::from_fn(|value: u32| value != 13);
        let after = {
            let reached = reached.clone();
            Receiver::from_fn(move |_: u32| {
                reached.set(true);
                true
            })
        };

        assert!(dispatcher.dispatch(13));

        dispatcher.subscribe(&accept);
        dispatcher.subscribe(&veto);
        dispatcher.subscribe(&after);

        assert!(dispatcher.dispatch(1));
        assert!(reached.get());

        reached.set(false);
        assert!(!dispatcher.dispatch(13));
        assert!(!reached.get());
    }

    #[test]
    fn test_injected_collector() {
        let dispatcher: Dispatcher<i32, bool> = Dispatcher::new();
        let negative = Receiver::from_fn(|value: i32| value < 0);
        let even = Receiver::from_fn(|value: i32| value % 2 == 0);
        dispatcher.subscribe(&negative);
        dispatcher.subscribe(&even);

        // Default collector keeps the last answer.
        assert!(dispatcher.dispatch(4));
        assert!(!dispatcher.dispatch(-3));

        assert!(dispatcher.dispatch_with(CollectWhileFalse::default(), -3));
        assert!(!dispatcher.dispatch_with(CollectWhileTrue::default(), 4));
    }

    #[test]
    fn test_collect_last_value() {
        let dispatcher: Dispatcher<i32, i32, CollectLast<i32>> = Dispatcher::new();
        assert_eq!(dispatcher.dispatch(5), 0);

        let double = Receiver::from_fn(|value: i32| value * 2);
        let square = Receiver::from_fn(|value: i32| value * value);
        dispatcher.subscribe(&double);
        dispatcher.subscribe(&square);
        assert_eq!(dispatcher.dispatch(5), 25);
    }

    fn triple(value: i32) -> i32 {
        value * 3
    }

    struct Counter {
        total: i32,
    }

    impl Counter {
        fn add(&mut self, value: i32) -> i32 {
            self.total += value;
            self.total
        }
    }

    #[test]
    fn test_bind_modes() {
        let dispatcher: Dispatcher<i32, i32> = Dispatcher::new();

        let mut free = Receiver::new();
        free.bind_fn(triple);
        dispatcher.subscribe(&free);
        assert_eq!(dispatcher.dispatch(2), 6);

        let counter = Rc::new(RefCell::new(Counter { total: 10 }));
        let mut method = Receiver::new();
        method.bind_method(&counter, Counter::add);
        dispatcher.subscribe(&method);
        assert_eq!(dispatcher.dispatch(2), 12);
        assert_eq!(counter.borrow().total, 12);

        // A dropped instance makes the method receiver drop out of the result.
        drop(counter);
        assert_eq!(dispatcher.dispatch(2), 6);
    }

    #[test]
    #[should_panic(expected = "already borrowed")]
    fn test_method_receiver_on_borrowed_instance_panics() {
        let dispatcher: Dispatcher<i32, i32> = Dispatcher::new();
        let counter = Rc::new(RefCell::new(Counter { total: 0 }));
        let mut method = Receiver::new();
        method.bind_method(&counter, Counter::add);
        dispatcher.subscribe(&method);

        let _held = counter.borrow();
        dispatcher.dispatch(1);
    }

    #[test]
    fn test_unbound_receiver_is_skipped() {
        let dispatcher: Dispatcher<i32, i32> = Dispatcher::new();
        let bound = Receiver::from_fn(|value: i32| value + 1);
        let mut unbound = Receiver::new();
        dispatcher.subscribe(&bound);
        dispatcher.subscribe(&unbound);
        assert!(!unbound.is_bound());
        assert_eq!(dispatcher.dispatch(1), 2);

        unbound.bind(|value: i32| value + 100);
        assert_eq!(dispatcher.dispatch(1), 101);

        unbound.cleanup();
        assert!(!unbound.is_subscribed());
        assert_eq!(dispatcher.subscriber_count(), 1);
    }

    #[test]
    fn test_dispatcher_drop_detaches_receivers() {
        let receiver = Receiver::from_fn(|()| ());
        {
            let dispatcher: Dispatcher<()> = Dispatcher::new();
            dispatcher.subscribe(&receiver);
            assert!(receiver.is_subscribed());
        }
        assert!(!receiver.is_subscribed());
        // Safe after the dispatcher is gone.
        receiver.unsubscribe();
    }

    #[test]
    fn test_cleanup_unsubscribes_all() {
        let dispatcher: Dispatcher<()> = Dispatcher::new();
        let a = Receiver::from_fn(|()| ());
        let b = Receiver::from_fn(|()| ());
        dispatcher.subscribe(&a);
        dispatcher.subscribe(&b);

        dispatcher.cleanup();
        assert!(!dispatcher.has_subscribers());
        assert!(!a.is_subscribed());
        assert!(!b.is_subscribed());

        dispatcher.subscribe(&b);
        assert_eq!(dispatcher.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_next_during_dispatch() {
        let log = Log::default();
        let dispatcher = Rc::new(Dispatcher::<()>::new());
        let second = Rc::new(RefCell::new(None::<Receiver<()>>));

        let first = {
            let log = log.clone();
            let second = second.clone();
            Receiver::from_fn(move |()| {
                log.borrow_mut().push("first");
                // Dropping the next receiver mid-broadcast.
                second.borrow_mut().take();
            })
        };
        dispatcher.subscribe(&first);

        let receiver = recorder(&log, "second");
        dispatcher.subscribe(&receiver);
        *second.borrow_mut() = Some(receiver);

        let third = recorder(&log, "third");
        dispatcher.subscribe(&third);

        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["first", "third"]);
        assert_eq!(dispatcher.subscriber_count(), 2);
    }

    #[test]
    fn test_self_unsubscribe_during_dispatch() {
        let log = Log::default();
        let dispatcher: Dispatcher<()> = Dispatcher::new();
        let slot: Rc<RefCell<Option<Receiver<()>>>> = Rc::default();

        let once = {
            let log = log.clone();
            let slot = slot.clone();
            Receiver::from_fn(move |()| {
                log.borrow_mut().push("once");
                if let Some(me) = slot.borrow().as_ref() {
                    me.unsubscribe();
                }
            })
        };
        dispatcher.subscribe(&once);
        *slot.borrow_mut() = Some(once);
        let after = recorder(&log, "after");
        dispatcher.subscribe(&after);

        dispatcher.dispatch(());
        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["once", "after", "after"]);
    }

    #[test]
    fn test_self_unbind_during_dispatch() {
        let log = Log::default();
        let dispatcher: Dispatcher<()> = Dispatcher::new();
        let slot: Rc<RefCell<Option<Receiver<()>>>> = Rc::default();

        let once = {
            let log = log.clone();
            let slot = slot.clone();
            Receiver::from_fn(move |()| {
                log.borrow_mut().push("once");
                if let Some(me) = slot.borrow_mut().as_mut() {
                    me.unbind();
                    assert!(!me.is_bound());
                }
            })
        };
        dispatcher.subscribe(&once);
        *slot.borrow_mut() = Some(once);

        dispatcher.dispatch(());
        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["once"]);

        let slot = slot.borrow();
        let me = slot.as_ref().unwrap();
        assert!(me.is_subscribed());
        assert!(!me.is_bound());
    }

    #[test]
    fn test_self_rebind_during_dispatch() {
        let log = Log::default();
        let dispatcher: Dispatcher<()> = Dispatcher::new();
        let slot: Rc<RefCell<Option<Receiver<()>>>> = Rc::default();

        let first = {
            let log = log.clone();
            let slot = slot.clone();
            Receiver::from_fn(move |()| {
                log.borrow_mut().push("first");
                if let Some(me) = slot.borrow_mut().as_mut() {
                    let log = log.clone();
                    me.bind(move |()| log.borrow_mut().push("second"));
                }
            })
        };
        dispatcher.subscribe(&first);
        *slot.borrow_mut() = Some(first);

        dispatcher.dispatch(());
        dispatcher.dispatch(());
        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["first", "second", "second"]);
    }

    #[test]
    fn test_subscribe_during_dispatch_waits_for_next() {
        let log = Log::default();
        let dispatcher = Rc::new(Dispatcher::<()>::new());
        let late = recorder(&log, "late");
        let late = Rc::new(late);

        let adder = {
            let log = log.clone();
            let dispatcher = Rc::downgrade(&dispatcher);
            let late = late.clone();
            Receiver::from_fn(move |()| {
                log.borrow_mut().push("adder");
                if let Some(dispatcher) = dispatcher.upgrade() {
                    dispatcher.subscribe(&late);
                }
            })
        };
        dispatcher.subscribe(&adder);

        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["adder"]);

        dispatcher.dispatch(());
        assert_eq!(*log.borrow(), vec!["adder", "adder", "late"]);
    }

    #[test]
    fn test_reentrant_dispatch_skips_running_receiver() {
        let depth = Rc::new(Cell::new(0));
        let calls = Rc::new(Cell::new(0));
        let dispatcher = Rc::new(Dispatcher::<()>::new());

        let recursive = {
            let dispatcher = Rc::downgrade(&dispatcher);
            let depth = depth.clone();
            Receiver::from_fn(move |()| {
                depth.set(depth.get() + 1);
                if let Some(dispatcher) = dispatcher.upgrade() {
                    dispatcher.dispatch(());
                }
            })
        };
        let counter = {
            let calls = calls.clone();
            Receiver::from_fn(move |()| calls.set(calls.get() + 1))
        };
        dispatcher.subscribe(&recursive);
        dispatcher.subscribe(&counter);

        dispatcher.dispatch(());
        assert_eq!(depth.get(), 1);
        // Once from the nested broadcast, once from the outer one.
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_tap_cannot_dispatch_but_can_subscribe() {
        let dispatcher: Dispatcher<u8> = Dispatcher::new();
        let receiver = Receiver::from_fn(|_: u8| ());
        let tap = dispatcher.tap();
        tap.subscribe(&receiver);
        assert!(tap.has_subscribers());
        tap.unsubscribe(&receiver);
        assert!(!dispatcher.has_subscribers());
    }
}
