//! Receiver registry and change fan-out.
//!
//! Receivers register with an opaque [`CapabilityToken`]. On every dispatch
//! each receiver is asked whether its token is still valid; receivers that
//! answer `false` are evicted on the spot and receive nothing. There is no
//! separate sweep, so the registry only shrinks as a side effect of
//! dispatch or explicit removal.
//!
//! # Thread Safety
//!
//! The registry sits behind a [`RwLock`]. Dispatch copies the entries out
//! under a read lock and calls receivers with no lock held, so a receiver
//! may subscribe or unsubscribe from inside its own callbacks. A receiver
//! removed concurrently with a dispatch either gets that whole batch or
//! none of it.
//!
//! # Panic Safety
//!
//! Panics in [`EssentiaReceiver::post_change`] are caught and logged; the
//! remaining receivers still get the batch.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::types::{CapabilityToken, Category, ChangeBatch, EssentiaStack};

/// A subscriber to essentia changes on a grid.
pub trait EssentiaReceiver<A>: Send + Sync {
    /// Whether `token` still entitles this receiver to notifications.
    fn is_valid(&self, token: &CapabilityToken) -> bool;

    /// Called once per dispatched batch with every non-zero delta of one
    /// logical update.
    fn post_change(&self, changes: &ChangeBatch<A>);
}

/// Identity of a registered receiver (its allocation address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ReceiverId(usize);

impl ReceiverId {
    fn of<A>(receiver: &Arc<dyn EssentiaReceiver<A>>) -> Self {
        Self(Arc::as_ptr(receiver).cast::<()>() as usize)
    }
}

struct Listener<A> {
    receiver: Arc<dyn EssentiaReceiver<A>>,
    token: CapabilityToken,
}

impl<A> Clone for Listener<A> {
    fn clone(&self) -> Self {
        Self {
            receiver: Arc::clone(&self.receiver),
            token: self.token,
        }
    }
}

/// Result of one [`ChangeNotifier::dispatch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Receivers whose `post_change` returned normally
    pub delivered: usize,
    /// Receivers whose `post_change` panicked
    pub panicked: usize,
    /// Receivers removed because their token was no longer valid
    pub evicted: usize,
}

/// Registry of receivers keyed by identity, each holding a capability token.
pub struct ChangeNotifier<A: Category> {
    listeners: RwLock<FxHashMap<ReceiverId, Listener<A>>>,
}

impl<A: Category> ChangeNotifier<A> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register `receiver`, replacing the token if it is already registered.
    pub fn subscribe(&self, receiver: Arc<dyn EssentiaReceiver<A>>, token: CapabilityToken) {
        let id = ReceiverId::of(&receiver);
        self.listeners
            .write()
            .insert(id, Listener { receiver, token });
    }

    /// Remove `receiver`. Returns `true` if it was registered.
    pub fn unsubscribe(&self, receiver: &Arc<dyn EssentiaReceiver<A>>) -> bool {
        self.listeners
            .write()
            .remove(&ReceiverId::of(receiver))
            .is_some()
    }

    /// Number of registered receivers, including any not yet found stale
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether no receiver is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver `changes` to every receiver whose token is still valid.
    ///
    /// Zero deltas are dropped first; an empty batch is not dispatched at
    /// all. Receivers whose token fails validation are removed and skipped.
    pub fn dispatch(&self, changes: Vec<EssentiaStack<A>>) -> DispatchOutcome {
        let batch: ChangeBatch<A> = changes
            .into_iter()
            .filter(|change| change.amount != 0)
            .collect::<Vec<_>>()
            .into();
        if batch.is_empty() {
            return DispatchOutcome::default();
        }

        let listeners: Vec<(ReceiverId, Listener<A>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, listener.clone()))
            .collect();

        let mut outcome = DispatchOutcome::default();
        let mut stale = Vec::new();

        for (id, listener) in listeners {
            if !listener.receiver.is_valid(&listener.token) {
                stale.push((id, listener.token));
                continue;
            }

            let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| {
                listener.receiver.post_change(&batch);
            }));
            if delivered.is_ok() {
                outcome.delivered += 1;
            } else {
                tracing::error!(receiver = id.0, "essentia receiver panicked in post_change");
                outcome.panicked += 1;
            }
        }

        if !stale.is_empty() {
            let mut registry = self.listeners.write();
            for (id, token) in stale {
                // Only evict the registration that failed; a concurrent re-subscribe
                // with a fresh token stays.
                if registry.get(&id).is_some_and(|l| l.token == token) {
                    registry.remove(&id);
                    outcome.evicted += 1;
                }
            }
        }

        if outcome.evicted > 0 {
            tracing::debug!(
                evicted = outcome.evicted,
                remaining = self.len(),
                "evicted receivers with invalid tokens"
            );
        }

        outcome
    }
}

impl<A: Category> Default for ChangeNotifier<A> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Recorder {
        valid: AtomicBool,
        batches: Mutex<Vec<Vec<EssentiaStack<&'static str>>>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                valid: AtomicBool::new(true),
                batches: Mutex::new(Vec::new()),
            })
        }

        fn batch_count(&self) -> usize {
            self.batches.lock().len()
        }
    }

    impl EssentiaReceiver<&'static str> for Recorder {
        fn is_valid(&self, _token: &CapabilityToken) -> bool {
            self.valid.load(Ordering::SeqCst)
        }

        fn post_change(&self, changes: &ChangeBatch<&'static str>) {
            self.batches.lock().push(changes.to_vec());
        }
    }

    fn token() -> CapabilityToken {
        CapabilityToken::new(1)
    }

    #[test]
    fn test_subscribe_is_keyed_by_receiver() {
        let notifier: ChangeNotifier<&'static str> = ChangeNotifier::new();
        let recorder = Recorder::new();
        let receiver: Arc<dyn EssentiaReceiver<&'static str>> = recorder.clone();

        notifier.subscribe(receiver.clone(), token());
        notifier.subscribe(receiver.clone(), CapabilityToken::new(2));
        assert_eq!(notifier.len(), 1);

        assert!(notifier.unsubscribe(&receiver));
        assert!(!notifier.unsubscribe(&receiver));
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_dispatch_delivers_whole_batch_once() {
        let notifier: ChangeNotifier<&'static str> = ChangeNotifier::new();
        let a = Recorder::new();
        let b = Recorder::new();
        notifier.subscribe(a.clone(), token());
        notifier.subscribe(b.clone(), token());

        let outcome = notifier.dispatch(vec![
            EssentiaStack::new("ignis", 3),
            EssentiaStack::new("aqua", 0),
            EssentiaStack::new("terra", -2),
        ]);

        assert_eq!(outcome, DispatchOutcome { delivered: 2, panicked: 0, evicted: 0 });
        for recorder in [&a, &b] {
            let batches = recorder.batches.lock();
            assert_eq!(batches.len(), 1);
            assert_eq!(
                batches[0],
                vec![EssentiaStack::new("ignis", 3), EssentiaStack::new("terra", -2)]
            );
        }
    }

    #[test]
    fn test_empty_batch_not_dispatched() {
        let notifier: ChangeNotifier<&'static str> = ChangeNotifier::new();
        let a = Recorder::new();
        notifier.subscribe(a.clone(), token());

        let outcome = notifier.dispatch(vec![EssentiaStack::new("ignis", 0)]);
        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(a.batch_count(), 0);
    }

    #[test]
    fn test_invalid_token_evicted_after_one_dispatch() {
        let notifier: ChangeNotifier<&'static str> = ChangeNotifier::new();
        let stale = Recorder::new();
        let live = Recorder::new();
        notifier.subscribe(stale.clone(), token());
        notifier.subscribe(live.clone(), token());

        stale.valid.store(false, Ordering::SeqCst);
        // Eviction is dispatch-driven: nothing changes until the next batch
        assert_eq!(notifier.len(), 2);

        let outcome = notifier.dispatch(vec![EssentiaStack::new("ignis", 1)]);
        assert_eq!(outcome, DispatchOutcome { delivered: 1, panicked: 0, evicted: 1 });
        assert_eq!(notifier.len(), 1);

        // Becoming valid again does not resurrect the registration
        stale.valid.store(true, Ordering::SeqCst);
        notifier.dispatch(vec![EssentiaStack::new("ignis", 1)]);
        assert_eq!(stale.batch_count(), 0);
        assert_eq!(live.batch_count(), 2);
    }

    struct SelfRemoving {
        notifier: Arc<ChangeNotifier<&'static str>>,
        me: Mutex<Option<Arc<dyn EssentiaReceiver<&'static str>>>>,
        received: Mutex<Vec<usize>>,
    }

    impl EssentiaReceiver<&'static str> for SelfRemoving {
        fn is_valid(&self, _token: &CapabilityToken) -> bool {
            true
        }

        fn post_change(&self, changes: &ChangeBatch<&'static str>) {
            self.received.lock().push(changes.len());
            if let Some(me) = self.me.lock().take() {
                self.notifier.unsubscribe(&me);
            }
        }
    }

    #[test]
    fn test_unsubscribe_during_dispatch_keeps_batch_whole() {
        let notifier: Arc<ChangeNotifier<&'static str>> = Arc::new(ChangeNotifier::new());
        let receiver = Arc::new(SelfRemoving {
            notifier: Arc::clone(&notifier),
            me: Mutex::new(None),
            received: Mutex::new(Vec::new()),
        });
        let as_dyn: Arc<dyn EssentiaReceiver<&'static str>> = receiver.clone();
        *receiver.me.lock() = Some(as_dyn.clone());
        notifier.subscribe(as_dyn, token());

        notifier.dispatch(vec![
            EssentiaStack::new("ignis", 1),
            EssentiaStack::new("aqua", 2),
            EssentiaStack::new("ordo", 3),
        ]);
        notifier.dispatch(vec![EssentiaStack::new("ignis", 1)]);

        assert_eq!(*receiver.received.lock(), vec![3]);
        assert!(notifier.is_empty());
    }

    struct Panicking;

    impl EssentiaReceiver<&'static str> for Panicking {
        fn is_valid(&self, _token: &CapabilityToken) -> bool {
            true
        }

        fn post_change(&self, _changes: &ChangeBatch<&'static str>) {
            panic!("receiver failure");
        }
    }

    #[test]
    fn test_panicking_receiver_does_not_block_others() {
        let notifier: ChangeNotifier<&'static str> = ChangeNotifier::new();
        let good = Recorder::new();
        notifier.subscribe(Arc::new(Panicking), token());
        notifier.subscribe(good.clone(), token());

        let outcome = notifier.dispatch(vec![EssentiaStack::new("ignis", 1)]);
        assert_eq!(outcome, DispatchOutcome { delivered: 1, panicked: 1, evicted: 0 });
        assert_eq!(good.batch_count(), 1);

        // A panic is not a reason to evict
        assert_eq!(notifier.len(), 2);
    }

    // --- Thread safety tests ---

    #[test]
    fn test_concurrent_dispatch_and_churn() {
        let notifier: Arc<ChangeNotifier<&'static str>> = Arc::new(ChangeNotifier::new());
        let steady = Recorder::new();
        notifier.subscribe(steady.clone(), token());

        let mut handles = Vec::new();
        for _ in 0..4 {
            let notifier = Arc::clone(&notifier);
            handles.push(std::thread::spawn(move || {
                let transient: Arc<dyn EssentiaReceiver<&'static str>> = Recorder::new();
                for _ in 0..100 {
                    notifier.subscribe(Arc::clone(&transient), token());
                    notifier.dispatch(vec![EssentiaStack::new("ignis", 1)]);
                    assert!(notifier.unsubscribe(&transient));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(steady.batch_count(), 400);
        assert_eq!(notifier.len(), 1);
    }
}
