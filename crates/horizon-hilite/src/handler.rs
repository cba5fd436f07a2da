//! The fundamental publish/subscribe node of the hilite network.
//!
//! A [`HiliteHandler`] owns the set of currently hilit row keys and a list
//! of registered [`HiliteListener`]s. The fire methods are thread-safe entry
//! points: each call atomically computes the delta of keys that actually
//! changed, commits it, and posts one notification batch to the shared
//! [`dispatch`](crate::dispatch) thread. Callers never block on listener
//! execution, and listeners are never invoked re-entrantly.
//!
//! # Example
//!
//! ```
//! use horizon_hilite::{HiliteHandler, RowKey, dispatch};
//!
//! let handler = HiliteHandler::new();
//! handler.fire_hilite_event([RowKey::new("Row1"), RowKey::new("Row2")]);
//! dispatch::flush();
//!
//! assert!(handler.is_hilit([&RowKey::new("Row1")]));
//! assert_eq!(handler.hilit_keys().len(), 2);
//! ```

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::dispatch;
use crate::event::{EventOrigin, HiliteListener, KeyEvent};
use crate::key::RowKey;

new_key_type! {
    /// A unique identifier for a registered listener.
    ///
    /// Returned by [`HiliteHandler::add_hilite_listener`] and usable with
    /// [`HiliteHandler::remove_listener`]. Registering the same listener
    /// object twice returns the original id.
    pub struct ListenerId;
}

/// A shared, type-erased listener reference.
pub type SharedListener = Arc<dyn HiliteListener>;

/// Which callback a notification batch invokes.
#[derive(Clone, Copy, Debug)]
enum Notification {
    Hilite,
    Unhilite,
    UnhiliteAll,
}

impl Notification {
    fn name(self) -> &'static str {
        match self {
            Self::Hilite => "hilite",
            Self::Unhilite => "unhilite",
            Self::UnhiliteAll => "unhilite_all",
        }
    }
}

/// Listener storage: slot-keyed with a separate registration-order index,
/// since delivery order must follow registration order.
struct ListenerRegistry {
    slots: SlotMap<ListenerId, SharedListener>,
    order: Vec<ListenerId>,
}

impl ListenerRegistry {
    fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    fn find(&self, listener: &SharedListener) -> Option<ListenerId> {
        self.slots
            .iter()
            .find(|(_, l)| Arc::ptr_eq(l, listener))
            .map(|(id, _)| id)
    }

    fn snapshot(&self) -> Vec<SharedListener> {
        self.order
            .iter()
            .filter_map(|id| self.slots.get(*id).cloned())
            .collect()
    }
}

struct HandlerInner {
    origin: EventOrigin,
    hilit: Mutex<HashSet<RowKey>>,
    listeners: Mutex<ListenerRegistry>,
}

/// A publish/subscribe node holding the hilit-key set for one table/view
/// granularity.
///
/// Handlers are shared references: cloning the handle is cheap and every
/// clone addresses the same underlying state. Key state is mutated only
/// through the fire methods; external readers take snapshots via
/// [`hilit_keys`](Self::hilit_keys).
///
/// Two handles compare equal iff they address the same handler.
pub struct HiliteHandler {
    inner: Arc<HandlerInner>,
}

impl HiliteHandler {
    /// Create a new handler with no hilit keys and no listeners.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                origin: EventOrigin::next(),
                hilit: Mutex::new(HashSet::new()),
                listeners: Mutex::new(ListenerRegistry::new()),
            }),
        }
    }

    /// This handler's own event origin.
    ///
    /// Events fired through the plain `fire_*` methods carry this origin.
    pub fn origin(&self) -> EventOrigin {
        self.inner.origin
    }

    // ========================================================================
    // Listener registration
    // ========================================================================

    /// Register a listener; delivery follows registration order.
    ///
    /// Registration is idempotent: adding a listener object that is already
    /// registered returns the existing [`ListenerId`] without duplicating
    /// delivery.
    pub fn add_hilite_listener(&self, listener: SharedListener) -> ListenerId {
        let mut registry = self.inner.listeners.lock();
        if let Some(existing) = registry.find(&listener) {
            return existing;
        }
        let id = registry.slots.insert(listener);
        registry.order.push(id);
        id
    }

    /// Remove a listener by reference. Returns `false` if it was not
    /// registered.
    pub fn remove_hilite_listener(&self, listener: &SharedListener) -> bool {
        let mut registry = self.inner.listeners.lock();
        match registry.find(listener) {
            Some(id) => {
                registry.slots.remove(id);
                registry.order.retain(|other| *other != id);
                true
            }
            None => false,
        }
    }

    /// Remove a listener by its registration id. Returns `false` if the id
    /// is stale.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.inner.listeners.lock();
        if registry.slots.remove(id).is_some() {
            registry.order.retain(|other| *other != id);
            true
        } else {
            false
        }
    }

    /// Unregister every listener.
    pub fn remove_all_listeners(&self) {
        let mut registry = self.inner.listeners.lock();
        registry.slots.clear();
        registry.order.clear();
    }

    /// The number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().slots.len()
    }

    // ========================================================================
    // Key state
    // ========================================================================

    /// True iff every given key is currently hilit (vacuously true for an
    /// empty iterator).
    pub fn is_hilit<'a>(&self, keys: impl IntoIterator<Item = &'a RowKey>) -> bool {
        let hilit = self.inner.hilit.lock();
        keys.into_iter().all(|key| hilit.contains(key))
    }

    /// A snapshot copy of the currently hilit keys.
    ///
    /// Mutating the returned set has no effect on the handler.
    pub fn hilit_keys(&self) -> HashSet<RowKey> {
        self.inner.hilit.lock().clone()
    }

    // ========================================================================
    // Fire methods
    // ========================================================================

    /// Hilite the given keys, notifying listeners of the subset that was
    /// not already hilit. Firing already-hilit keys is a silent no-op.
    pub fn fire_hilite_event(&self, keys: impl IntoIterator<Item = RowKey>) {
        self.fire_hilite_event_from(self.inner.origin, keys);
    }

    /// Like [`fire_hilite_event`](Self::fire_hilite_event), with an explicit
    /// origin. Used by propagation bridges to tag re-fired events.
    pub fn fire_hilite_event_from(
        &self,
        origin: EventOrigin,
        keys: impl IntoIterator<Item = RowKey>,
    ) {
        let mut hilit = self.inner.hilit.lock();
        let mut changed = HashSet::new();
        for key in keys {
            if hilit.insert(key.clone()) {
                changed.insert(key);
            }
        }
        if changed.is_empty() {
            return;
        }
        tracing::trace!(
            target: "horizon_hilite::handler",
            changed = changed.len(),
            "hilite delta committed"
        );
        // Posted while the key-set lock is held so that enqueue order
        // matches commit order under concurrent fire calls.
        self.post_notification(Notification::Hilite, KeyEvent::new(origin, changed));
    }

    /// Unhilite the given keys, notifying listeners of the subset that was
    /// actually hilit. Firing already-unhilit keys is a silent no-op.
    pub fn fire_unhilite_event(&self, keys: impl IntoIterator<Item = RowKey>) {
        self.fire_unhilite_event_from(self.inner.origin, keys);
    }

    /// Like [`fire_unhilite_event`](Self::fire_unhilite_event), with an
    /// explicit origin.
    pub fn fire_unhilite_event_from(
        &self,
        origin: EventOrigin,
        keys: impl IntoIterator<Item = RowKey>,
    ) {
        let mut hilit = self.inner.hilit.lock();
        let mut changed = HashSet::new();
        for key in keys {
            if hilit.remove(&key) {
                changed.insert(key);
            }
        }
        if changed.is_empty() {
            return;
        }
        tracing::trace!(
            target: "horizon_hilite::handler",
            changed = changed.len(),
            "unhilite delta committed"
        );
        self.post_notification(Notification::Unhilite, KeyEvent::new(origin, changed));
    }

    /// Clear every hilit key, notifying listeners via `unhilite_all`.
    /// No-op if nothing is hilit.
    pub fn fire_clear_hilite_event(&self) {
        self.fire_clear_hilite_event_from(self.inner.origin);
    }

    /// Like [`fire_clear_hilite_event`](Self::fire_clear_hilite_event),
    /// with an explicit origin.
    pub fn fire_clear_hilite_event_from(&self, origin: EventOrigin) {
        let mut hilit = self.inner.hilit.lock();
        if hilit.is_empty() {
            return;
        }
        hilit.clear();
        tracing::trace!(target: "horizon_hilite::handler", "hilit set cleared");
        self.post_notification(Notification::UnhiliteAll, KeyEvent::new(origin, []));
    }

    // ========================================================================
    // Notification delivery
    // ========================================================================

    fn post_notification(&self, kind: Notification, event: KeyEvent) {
        let listeners = self.inner.listeners.lock().snapshot();
        if listeners.is_empty() {
            return;
        }
        dispatch::notification_queue().post(move || {
            deliver(&listeners, kind, &event);
        });
    }
}

/// Invoke one callback on each listener, isolating panics per listener so a
/// misbehaving view cannot break hilite sync for the others.
fn deliver(listeners: &[SharedListener], kind: Notification, event: &KeyEvent) {
    for listener in listeners {
        let result = panic::catch_unwind(AssertUnwindSafe(|| match kind {
            Notification::Hilite => listener.hilite(event),
            Notification::Unhilite => listener.unhilite(event),
            Notification::UnhiliteAll => listener.unhilite_all(event),
        }));
        if result.is_err() {
            tracing::error!(
                target: "horizon_hilite::handler",
                callback = kind.name(),
                keys = event.keys().len(),
                "hilite listener panicked; continuing with remaining listeners"
            );
        }
    }
}

impl Clone for HiliteHandler {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for HiliteHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for HiliteHandler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for HiliteHandler {}

impl std::fmt::Debug for HiliteHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiliteHandler")
            .field("origin", &self.inner.origin)
            .field("hilit", &self.inner.hilit.lock().len())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every delivered callback with a sorted key list.
    struct Recorder {
        calls: Mutex<Vec<(&'static str, Vec<String>)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn record(&self, name: &'static str, event: &KeyEvent) {
            let mut keys: Vec<String> =
                event.keys().iter().map(|k| k.to_string()).collect();
            keys.sort();
            self.calls.lock().push((name, keys));
        }

        fn calls(&self) -> Vec<(&'static str, Vec<String>)> {
            self.calls.lock().clone()
        }
    }

    impl HiliteListener for Recorder {
        fn hilite(&self, event: &KeyEvent) {
            self.record("hilite", event);
        }
        fn unhilite(&self, event: &KeyEvent) {
            self.record("unhilite", event);
        }
        fn unhilite_all(&self, event: &KeyEvent) {
            self.record("unhilite_all", event);
        }
    }

    fn keys(names: &[&str]) -> Vec<RowKey> {
        names.iter().map(|n| RowKey::new(*n)).collect()
    }

    #[test]
    fn test_fire_hilite_idempotent() {
        let handler = HiliteHandler::new();
        let recorder = Recorder::new();
        handler.add_hilite_listener(recorder.clone());

        handler.fire_hilite_event(keys(&["a", "b"]));
        handler.fire_hilite_event(keys(&["a", "b"]));
        dispatch::flush();

        // The second fire changed nothing and produced no batch.
        assert_eq!(
            recorder.calls(),
            vec![("hilite", vec!["a".to_string(), "b".to_string()])]
        );
    }

    #[test]
    fn test_monotonic_delta() {
        let handler = HiliteHandler::new();
        let recorder = Recorder::new();
        handler.add_hilite_listener(recorder.clone());

        handler.fire_hilite_event(keys(&["a", "b"]));
        handler.fire_hilite_event(keys(&["b", "c"]));
        dispatch::flush();

        assert!(handler.is_hilit(&keys(&["a", "b", "c"])));
        assert_eq!(
            recorder.calls(),
            vec![
                ("hilite", vec!["a".to_string(), "b".to_string()]),
                ("hilite", vec!["c".to_string()]),
            ]
        );
    }

    #[test]
    fn test_unhilite_only_hilit_subset() {
        let handler = HiliteHandler::new();
        let recorder = Recorder::new();
        handler.add_hilite_listener(recorder.clone());

        handler.fire_hilite_event(keys(&["a"]));
        handler.fire_unhilite_event(keys(&["a", "b"]));
        handler.fire_unhilite_event(keys(&["a"]));
        dispatch::flush();

        assert!(handler.hilit_keys().is_empty());
        assert_eq!(
            recorder.calls(),
            vec![
                ("hilite", vec!["a".to_string()]),
                ("unhilite", vec!["a".to_string()]),
            ]
        );
    }

    #[test]
    fn test_clear_completeness() {
        let handler = HiliteHandler::new();
        let recorder = Recorder::new();
        handler.add_hilite_listener(recorder.clone());

        handler.fire_hilite_event(keys(&["a", "b", "c"]));
        handler.fire_clear_hilite_event();
        // Clearing an empty handler is a no-op.
        handler.fire_clear_hilite_event();
        dispatch::flush();

        assert!(handler.hilit_keys().is_empty());
        assert!(!handler.is_hilit(&keys(&["a"])));
        assert_eq!(
            recorder.calls(),
            vec![
                ("hilite", vec!["a".to_string(), "b".to_string(), "c".to_string()]),
                ("unhilite_all", vec![]),
            ]
        );
    }

    #[test]
    fn test_empty_fire_is_noop() {
        let handler = HiliteHandler::new();
        let recorder = Recorder::new();
        handler.add_hilite_listener(recorder.clone());

        handler.fire_hilite_event([]);
        handler.fire_unhilite_event([]);
        dispatch::flush();

        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_is_hilit_vacuous_and_all() {
        let handler = HiliteHandler::new();
        handler.fire_hilite_event(keys(&["a", "b"]));

        assert!(handler.is_hilit([]));
        assert!(handler.is_hilit(&keys(&["a"])));
        assert!(handler.is_hilit(&keys(&["a", "b"])));
        assert!(!handler.is_hilit(&keys(&["a", "z"])));
    }

    #[test]
    fn test_snapshot_is_defensive() {
        let handler = HiliteHandler::new();
        handler.fire_hilite_event(keys(&["a"]));

        let mut snapshot = handler.hilit_keys();
        snapshot.insert(RowKey::new("b"));

        assert!(!handler.is_hilit(&keys(&["b"])));
        assert_eq!(handler.hilit_keys().len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let handler = HiliteHandler::new();
        let recorder = Recorder::new();

        let first = handler.add_hilite_listener(recorder.clone());
        let second = handler.add_hilite_listener(recorder.clone());
        assert_eq!(first, second);
        assert_eq!(handler.listener_count(), 1);

        handler.fire_hilite_event(keys(&["a"]));
        dispatch::flush();
        assert_eq!(recorder.calls().len(), 1);
    }

    #[test]
    fn test_remove_listener() {
        let handler = HiliteHandler::new();
        let recorder = Recorder::new();
        let shared: SharedListener = recorder.clone();

        handler.add_hilite_listener(shared.clone());
        assert!(handler.remove_hilite_listener(&shared));
        assert!(!handler.remove_hilite_listener(&shared));

        handler.fire_hilite_event(keys(&["a"]));
        dispatch::flush();
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_remove_listener_by_id() {
        let handler = HiliteHandler::new();
        let recorder = Recorder::new();

        let id = handler.add_hilite_listener(recorder.clone());
        assert!(handler.remove_listener(id));
        assert!(!handler.remove_listener(id));
        assert_eq!(handler.listener_count(), 0);
    }

    #[test]
    fn test_listener_fault_isolation() {
        struct Panicker;
        impl HiliteListener for Panicker {
            fn hilite(&self, _: &KeyEvent) {
                panic!("broken view");
            }
            fn unhilite(&self, _: &KeyEvent) {}
            fn unhilite_all(&self, _: &KeyEvent) {}
        }

        let handler = HiliteHandler::new();
        let recorder = Recorder::new();
        handler.add_hilite_listener(Arc::new(Panicker));
        handler.add_hilite_listener(recorder.clone());

        handler.fire_hilite_event(keys(&["a"]));
        dispatch::flush();

        // Delivery reached the second listener, and handler state is intact.
        assert_eq!(recorder.calls().len(), 1);
        assert!(handler.is_hilit(&keys(&["a"])));
    }

    #[test]
    fn test_delivery_follows_registration_order() {
        let handler = HiliteHandler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        struct Tagged {
            tag: usize,
            order: Arc<Mutex<Vec<usize>>>,
        }
        impl HiliteListener for Tagged {
            fn hilite(&self, _: &KeyEvent) {
                self.order.lock().push(self.tag);
            }
            fn unhilite(&self, _: &KeyEvent) {}
            fn unhilite_all(&self, _: &KeyEvent) {}
        }

        for tag in 0..5 {
            handler.add_hilite_listener(Arc::new(Tagged {
                tag,
                order: order.clone(),
            }));
        }

        handler.fire_hilite_event(keys(&["a"]));
        dispatch::flush();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_concurrent_fires_preserve_state() {
        let handler = HiliteHandler::new();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let handler = handler.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        handler.fire_hilite_event([RowKey::new(format!("{t}-{i}"))]);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        dispatch::flush();

        assert_eq!(handler.hilit_keys().len(), 8 * 50);
    }

    #[test]
    fn test_handles_compare_by_identity() {
        let a = HiliteHandler::new();
        let b = a.clone();
        let c = HiliteHandler::new();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
