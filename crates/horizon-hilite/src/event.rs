//! Event payloads and the listener capability.
//!
//! A [`KeyEvent`] is the immutable payload delivered to every
//! [`HiliteListener`]: the set of row keys whose hilite state just changed,
//! plus an [`EventOrigin`] identifying the component that fired it. The
//! origin exists purely for identity comparison: translators and managers
//! tag the events they re-fire with their own origin and drop incoming
//! events that carry it, which is what keeps propagation cycles from
//! echoing forever.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::key::RowKey;

/// Global origin counter. Zero is never handed out.
static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

/// An opaque identity token for the component that fired an event.
///
/// Origins are only ever compared for equality; they carry no data. Every
/// [`HiliteHandler`](crate::HiliteHandler),
/// [`HiliteTranslator`](crate::HiliteTranslator), and
/// [`HiliteManager`](crate::HiliteManager) allocates one at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventOrigin(u64);

impl EventOrigin {
    /// Allocate a fresh, process-unique origin.
    pub fn next() -> Self {
        Self(NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed))
    }
}

/// The immutable payload of one hilite state change.
///
/// Constructed fresh for every fire call and shared by reference with all
/// listeners of a notification batch. The key set is behind an `Arc`, so
/// cloning an event (to re-fire it on another handler) is cheap.
///
/// For `unhilite_all` notifications the key set is empty; the event means
/// "everything", not "nothing".
#[derive(Clone, Debug)]
pub struct KeyEvent {
    origin: EventOrigin,
    keys: Arc<HashSet<RowKey>>,
}

impl KeyEvent {
    /// Create an event for the given changed keys.
    pub fn new(origin: EventOrigin, keys: impl IntoIterator<Item = RowKey>) -> Self {
        Self {
            origin,
            keys: Arc::new(keys.into_iter().collect()),
        }
    }

    /// Create an event around an already-shared key set.
    pub fn from_shared(origin: EventOrigin, keys: Arc<HashSet<RowKey>>) -> Self {
        Self { origin, keys }
    }

    /// The identity of the component that fired this event.
    pub fn origin(&self) -> EventOrigin {
        self.origin
    }

    /// The keys whose state changed. Empty for `unhilite_all` events.
    pub fn keys(&self) -> &HashSet<RowKey> {
        &self.keys
    }

    /// The shared key set, for cheap re-firing on another handler.
    pub fn shared_keys(&self) -> Arc<HashSet<RowKey>> {
        Arc::clone(&self.keys)
    }

    /// Whether the event carries no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// The capability implemented by everything that consumes hilite changes.
///
/// Views implement this to repaint, and the propagation bridges
/// ([`HiliteTranslator`](crate::HiliteTranslator),
/// [`HiliteManager`](crate::HiliteManager)) implement it to forward events
/// across handlers. Callbacks run on the shared notification thread, never
/// on the thread that fired the event; a panicking callback is isolated and
/// logged without disturbing other listeners.
pub trait HiliteListener: Send + Sync {
    /// Keys in `event` were newly hilit.
    fn hilite(&self, event: &KeyEvent);

    /// Keys in `event` were newly unhilit.
    fn unhilite(&self, event: &KeyEvent);

    /// All keys were unhilit at once. The event carries no explicit keys.
    fn unhilite_all(&self, event: &KeyEvent);
}
