//! Observable primitives.
//!
//! - `Property<T>`: a current value plus change notification (`watch` based)
//! - `Subject<T>`: lossless fan-out of events to any number of subscribers
//! - `Subscription` / `SubscriptionBag`: scoped listener lifetimes, released on drop

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::sync::lock;

/// A shared value that notifies subscribers when it changes.
///
/// Clones share the same underlying value.
#[derive(Debug)]
pub struct Property<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Default> Default for Property<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Property<T> {
    /// Create a property holding `initial`.
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the value, notifying subscribers even if it is equal.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutate in place. The closure returns whether anything changed;
    /// subscribers are only woken when it returns `true`.
    pub fn update(&self, modify: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(modify)
    }

    /// Read the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Subscribe to changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Property<T> {
    /// Current value.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: PartialEq> Property<T> {
    /// Replace the value only if it differs. Returns whether it changed.
    pub fn set_if_changed(&self, value: T) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Property<T> {
    /// Run `f` with every new value until the returned subscription is dropped.
    ///
    /// The current value is not replayed; only subsequent changes are delivered.
    pub fn for_each(&self, mut f: impl FnMut(T) + Send + 'static) -> Subscription {
        let mut rx = self.subscribe();
        rx.borrow_and_update();
        Subscription::spawn(async move {
            while rx.changed().await.is_ok() {
                let value = rx.borrow_and_update().clone();
                f(value);
            }
        })
    }
}

/// Multi-subscriber event fan-out.
///
/// Every subscriber gets its own unbounded queue, so no event is dropped for
/// a slow listener. Closed receivers are pruned on the next emit.
#[derive(Debug)]
pub struct Subject<T> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<T>>>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<T> Default for Subject<T> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Subject<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to future events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber. Returns how many received it.
    pub fn emit(&self, event: T) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        subscribers.len()
    }

    /// Number of subscribers still registered (closed ones may linger until the next emit).
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Drop every subscriber; their receivers observe the channel closing.
    pub fn close(&self) {
        lock(&self.subscribers).clear();
    }
}

/// Handle to a listener task. The task is aborted when the handle is dropped.
#[must_use = "dropping a Subscription immediately stops the listener"]
#[derive(Debug)]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawn `listener` on the current tokio runtime and own it.
    pub fn spawn<F>(listener: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: Some(tokio::spawn(listener)),
        }
    }

    /// Take ownership of an already spawned task.
    pub fn from_handle(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Whether the listener has stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Stop the listener now.
    pub fn release(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Collects the subscriptions of one owner so they can be released together.
#[derive(Debug, Default)]
pub struct SubscriptionBag {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release every held subscription.
    pub fn release_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.release();
        }
    }
}

impl Extend<Subscription> for SubscriptionBag {
    fn extend<I: IntoIterator<Item = Subscription>>(&mut self, iter: I) {
        self.subscriptions.extend(iter);
    }
}
