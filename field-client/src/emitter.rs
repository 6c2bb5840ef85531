//! Synchronous event dispatch.
//!
//! [`Emitter`] is owned by whatever needs to publish events (a binding, a
//! channel, a socket) and exposes `on`/`once`/`off`/`emit`. Listeners run
//! on the emitting thread, in registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned when registering a listener or watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A registered event handler.
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registration<E> {
    id: ListenerId,
    handler: Handler<E>,
    once: bool,
}

/// A list of listeners for events of type `E`.
pub struct Emitter<E> {
    listeners: Mutex<Vec<Registration<E>>>,
}

impl<E> Emitter<E> {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener for every future event.
    pub fn on(&self, handler: Handler<E>) -> ListenerId {
        self.register(handler, false)
    }

    /// Register a listener that is removed after its first event.
    pub fn once(&self, handler: Handler<E>) -> ListenerId {
        self.register(handler, true)
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|r| r.id != id);
        listeners.len() != before
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver an event to all listeners.
    ///
    /// Listeners are snapshotted first, so a listener may register or
    /// remove listeners (including itself) while being called.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = {
            let mut listeners = self.lock();
            let handlers = listeners.iter().map(|r| Arc::clone(&r.handler)).collect();
            listeners.retain(|r| !r.once);
            handlers
        };

        for handler in snapshot {
            handler(event);
        }
    }

    fn register(&self, handler: Handler<E>, once: bool) -> ListenerId {
        let id = ListenerId::next();
        self.lock().push(Registration { id, handler, once });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration<E>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<E: Clone + Send + 'static> Emitter<E> {
    /// Forward every future event into an unbounded channel.
    ///
    /// The listener stays registered until `off` is called with the
    /// returned id; events sent after the receiver is dropped are discarded.
    pub fn channel(&self) -> (ListenerId, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on(Arc::new(move |event: &E| {
            let _ = tx.send(event.clone());
        }));
        (id, rx)
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(emitter: &Emitter<u32>) -> (ListenerId, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = emitter.on(Arc::new(move |_: &u32| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        (id, count)
    }

    #[test]
    fn ids_are_unique() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert_ne!(a, b);
        assert!(b.value() > a.value());
    }

    #[test]
    fn emit_reaches_all_listeners() {
        let emitter = Emitter::new();
        let (_, first) = counter(&emitter);
        let (_, second) = counter(&emitter);

        emitter.emit(&1);
        emitter.emit(&2);

        assert_eq!(first.load(Ordering::SeqCst), 2);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn off_removes_listener() {
        let emitter = Emitter::new();
        let (id, count) = counter(&emitter);

        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        emitter.emit(&1);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn once_fires_a_single_time() {
        let emitter = Emitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = emitter.once(Arc::new(move |_: &u32| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        emitter.emit(&1);
        emitter.emit(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
        assert!(!emitter.off(id));
    }

    #[test]
    fn listener_may_reenter_emitter() {
        let emitter = Arc::new(Emitter::<u32>::new());
        let inner = Arc::clone(&emitter);
        emitter.on(Arc::new(move |_: &u32| {
            // Registering from inside a callback must not deadlock
            inner.once(Arc::new(|_: &u32| {}));
        }));

        emitter.emit(&1);
        assert_eq!(emitter.listener_count(), 2);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let emitter = Emitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            emitter.on(Arc::new(move |_: &u32| order.lock().unwrap().push(tag)));
        }

        emitter.emit(&0);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn channel_forwards_events() {
        let emitter = Emitter::new();
        let (id, mut rx) = emitter.channel();

        emitter.emit(&7);
        emitter.emit(&8);
        emitter.off(id);
        emitter.emit(&9);

        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, Some(8));
        assert!(rx.try_recv().is_err());
    }
}
