//! Verbatim mirroring between handlers of identical granularity.
//!
//! A [`HiliteManager`] is the trivial case of a
//! [`HiliteTranslator`](crate::HiliteTranslator) with an implicit identity
//! mapping: events on the (privately owned) source handler are re-fired
//! unchanged on every target, and events on any target are re-fired
//! unchanged on the source. Re-fired events carry the manager's own
//! [`EventOrigin`], and incoming events that already carry it are dropped,
//! so propagation is exactly one hop.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::event::{EventOrigin, HiliteListener, KeyEvent};
use crate::handler::{HiliteHandler, SharedListener};

struct ManagerInner {
    origin: EventOrigin,
    source: HiliteHandler,
    targets: Mutex<Vec<HiliteHandler>>,
}

/// Mirrors hilite state verbatim between one private source handler and N
/// external target handlers.
///
/// Unlike the translator, the manager creates and owns its source handler;
/// retrieve it via [`from_hilite_handler`](Self::from_hilite_handler) and
/// hand it to the component that should see the merged view. The listener
/// lifecycle matches the translator: lazy activation on the first target,
/// deactivation when the last target is removed, full detach on drop.
pub struct HiliteManager {
    inner: Arc<ManagerInner>,
    source_listener: SharedListener,
    target_listener: SharedListener,
}

impl HiliteManager {
    /// Create a manager with a fresh, empty source handler and no targets.
    pub fn new() -> Self {
        let inner = Arc::new(ManagerInner {
            origin: EventOrigin::next(),
            source: HiliteHandler::new(),
            targets: Mutex::new(Vec::new()),
        });
        let source_listener: SharedListener = Arc::new(SourceSideListener {
            inner: Arc::downgrade(&inner),
        });
        let target_listener: SharedListener = Arc::new(TargetSideListener {
            inner: Arc::downgrade(&inner),
        });
        Self {
            inner,
            source_listener,
            target_listener,
        }
    }

    /// The privately owned source handler presenting the merged view.
    pub fn from_hilite_handler(&self) -> &HiliteHandler {
        &self.inner.source
    }

    /// The identity carried by events this manager re-fires.
    pub fn origin(&self) -> EventOrigin {
        self.inner.origin
    }

    /// Attach a target handler. The first target activates the manager.
    /// Attaching a handler that is already a target is a no-op.
    pub fn add_to_hilite_handler(&self, target: &HiliteHandler) {
        let mut targets = self.inner.targets.lock();
        if targets.contains(target) {
            return;
        }
        if targets.is_empty() {
            self.inner
                .source
                .add_hilite_listener(self.source_listener.clone());
        }
        target.add_hilite_listener(self.target_listener.clone());
        targets.push(target.clone());
        tracing::debug!(
            target: "horizon_hilite::manager",
            targets = targets.len(),
            "target handler attached"
        );
    }

    /// Detach a target handler; removing the last one deactivates the
    /// manager.
    pub fn remove_to_hilite_handler(&self, target: &HiliteHandler) {
        let mut targets = self.inner.targets.lock();
        let Some(position) = targets.iter().position(|t| t == target) else {
            return;
        };
        targets.remove(position);
        target.remove_hilite_listener(&self.target_listener);
        if targets.is_empty() {
            self.inner
                .source
                .remove_hilite_listener(&self.source_listener);
        }
    }

    /// Detach every target handler and deactivate the manager.
    pub fn remove_all_to_hilite_handlers(&self) {
        let mut targets = self.inner.targets.lock();
        for target in targets.drain(..) {
            target.remove_hilite_listener(&self.target_listener);
        }
        self.inner
            .source
            .remove_hilite_listener(&self.source_listener);
    }

    /// The number of attached targets.
    pub fn target_count(&self) -> usize {
        self.inner.targets.lock().len()
    }
}

impl Default for HiliteManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HiliteManager {
    fn drop(&mut self) {
        self.remove_all_to_hilite_handlers();
    }
}

impl std::fmt::Debug for HiliteManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiliteManager")
            .field("origin", &self.inner.origin)
            .field("targets", &self.target_count())
            .finish()
    }
}

/// Which way a mirrored event travels.
enum Mirror {
    Hilite,
    Unhilite,
    Clear,
}

impl ManagerInner {
    /// Re-fire `event` on every target, tagged with the manager's origin.
    fn mirror_to_targets(&self, event: &KeyEvent, mirror: Mirror) {
        if event.origin() == self.origin {
            return;
        }
        for target in self.targets.lock().iter() {
            match mirror {
                Mirror::Hilite => {
                    target.fire_hilite_event_from(self.origin, event.keys().iter().cloned());
                }
                Mirror::Unhilite => {
                    target.fire_unhilite_event_from(self.origin, event.keys().iter().cloned());
                }
                Mirror::Clear => target.fire_clear_hilite_event_from(self.origin),
            }
        }
    }

    /// Re-fire `event` on the source, tagged with the manager's origin.
    fn mirror_to_source(&self, event: &KeyEvent, mirror: Mirror) {
        if event.origin() == self.origin {
            return;
        }
        match mirror {
            Mirror::Hilite => {
                self.source
                    .fire_hilite_event_from(self.origin, event.keys().iter().cloned());
            }
            Mirror::Unhilite => {
                self.source
                    .fire_unhilite_event_from(self.origin, event.keys().iter().cloned());
            }
            Mirror::Clear => self.source.fire_clear_hilite_event_from(self.origin),
        }
    }
}

struct SourceSideListener {
    inner: Weak<ManagerInner>,
}

impl HiliteListener for SourceSideListener {
    fn hilite(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mirror_to_targets(event, Mirror::Hilite);
        }
    }

    fn unhilite(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mirror_to_targets(event, Mirror::Unhilite);
        }
    }

    fn unhilite_all(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mirror_to_targets(event, Mirror::Clear);
        }
    }
}

struct TargetSideListener {
    inner: Weak<ManagerInner>,
}

impl HiliteListener for TargetSideListener {
    fn hilite(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mirror_to_source(event, Mirror::Hilite);
        }
    }

    fn unhilite(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mirror_to_source(event, Mirror::Unhilite);
        }
    }

    fn unhilite_all(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.mirror_to_source(event, Mirror::Clear);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use crate::key::RowKey;

    fn settle() {
        for _ in 0..5 {
            dispatch::flush();
        }
    }

    fn keys(names: &[&str]) -> Vec<RowKey> {
        names.iter().map(|n| RowKey::new(*n)).collect()
    }

    #[test]
    fn test_source_mirrors_to_all_targets() {
        let manager = HiliteManager::new();
        let target_a = HiliteHandler::new();
        let target_b = HiliteHandler::new();
        manager.add_to_hilite_handler(&target_a);
        manager.add_to_hilite_handler(&target_b);

        manager.from_hilite_handler().fire_hilite_event(keys(&["r1"]));
        settle();

        assert!(target_a.is_hilit(&keys(&["r1"])));
        assert!(target_b.is_hilit(&keys(&["r1"])));
    }

    #[test]
    fn test_target_mirrors_to_source() {
        let manager = HiliteManager::new();
        let target = HiliteHandler::new();
        manager.add_to_hilite_handler(&target);

        target.fire_hilite_event(keys(&["r1", "r2"]));
        settle();

        assert!(manager.from_hilite_handler().is_hilit(&keys(&["r1", "r2"])));
    }

    #[test]
    fn test_loop_suppression_single_hop() {
        // A target re-firing the mirrored event must not ping-pong.
        let manager = HiliteManager::new();
        let target = HiliteHandler::new();
        manager.add_to_hilite_handler(&target);

        manager.from_hilite_handler().fire_hilite_event(keys(&["r1"]));
        settle();
        assert!(target.is_hilit(&keys(&["r1"])));

        // Re-firing the same keys on the target changes nothing anywhere
        // and, crucially, terminates.
        target.fire_hilite_event(keys(&["r1"]));
        settle();
        assert_eq!(manager.from_hilite_handler().hilit_keys().len(), 1);
        assert_eq!(target.hilit_keys().len(), 1);
    }

    #[test]
    fn test_target_event_stops_at_source() {
        // Mirroring from a target reaches the source handler only; the
        // source-side listener drops the manager-tagged event instead of
        // fanning it back out to sibling targets.
        let manager = HiliteManager::new();
        let target_a = HiliteHandler::new();
        let target_b = HiliteHandler::new();
        manager.add_to_hilite_handler(&target_a);
        manager.add_to_hilite_handler(&target_b);

        target_a.fire_hilite_event(keys(&["r9"]));
        settle();

        assert!(manager.from_hilite_handler().is_hilit(&keys(&["r9"])));
        assert!(!target_b.is_hilit(&keys(&["r9"])));
    }

    #[test]
    fn test_unhilite_mirroring() {
        let manager = HiliteManager::new();
        let target = HiliteHandler::new();
        manager.add_to_hilite_handler(&target);

        manager
            .from_hilite_handler()
            .fire_hilite_event(keys(&["r1", "r2"]));
        settle();
        manager.from_hilite_handler().fire_unhilite_event(keys(&["r1"]));
        settle();

        assert!(!target.is_hilit(&keys(&["r1"])));
        assert!(target.is_hilit(&keys(&["r2"])));
    }

    #[test]
    fn test_clear_mirroring_both_directions() {
        let manager = HiliteManager::new();
        let target = HiliteHandler::new();
        manager.add_to_hilite_handler(&target);

        manager.from_hilite_handler().fire_hilite_event(keys(&["r1"]));
        settle();
        manager.from_hilite_handler().fire_clear_hilite_event();
        settle();
        assert!(target.hilit_keys().is_empty());

        target.fire_hilite_event(keys(&["r2"]));
        settle();
        target.fire_clear_hilite_event();
        settle();
        assert!(manager.from_hilite_handler().hilit_keys().is_empty());
    }

    #[test]
    fn test_lazy_attachment_lifecycle() {
        let manager = HiliteManager::new();
        let source = manager.from_hilite_handler().clone();
        assert_eq!(source.listener_count(), 0);

        let target = HiliteHandler::new();
        manager.add_to_hilite_handler(&target);
        manager.add_to_hilite_handler(&target);
        assert_eq!(source.listener_count(), 1);
        assert_eq!(manager.target_count(), 1);

        manager.remove_to_hilite_handler(&target);
        assert_eq!(source.listener_count(), 0);
        assert_eq!(target.listener_count(), 0);
    }

    #[test]
    fn test_drop_detaches_listeners() {
        let target = HiliteHandler::new();
        {
            let manager = HiliteManager::new();
            manager.add_to_hilite_handler(&target);
            assert_eq!(target.listener_count(), 1);
        }
        assert_eq!(target.listener_count(), 0);
    }
}
