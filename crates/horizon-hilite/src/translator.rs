//! Mapping-based bridging between handlers of different granularity.
//!
//! A [`HiliteTranslator`] connects one *source* handler (aggregate keys,
//! e.g. cluster rows) to any number of *target* handlers (member keys, e.g.
//! the clustered rows themselves) through a [`HiliteMapper`]:
//!
//! - **Expansion** (source → targets): a hilite of aggregate keys is mapped
//!   to the union of their member sets and re-fired on every target.
//! - **Contraction** (targets → source): an aggregate becomes hilit only
//!   once *all* of its members are hilit somewhere across the targets
//!   (all-or-nothing), and becomes unhilit as soon as *any* member loses
//!   hilite status (any-defection).
//!
//! Events the translator re-fires carry its own [`EventOrigin`]; the
//! source-side listener drops incoming events with that origin. This is the
//! feedback-loop breaker for the contraction direction and is exception-safe
//! by construction; there is no listener detach/reattach window.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::event::{EventOrigin, HiliteListener, KeyEvent};
use crate::handler::{HiliteHandler, SharedListener};
use crate::key::RowKey;
use crate::mapper::HiliteMapper;

/// A shared, type-erased mapper reference.
pub type SharedMapper = Arc<dyn HiliteMapper>;

struct TranslatorInner {
    origin: EventOrigin,
    source: HiliteHandler,
    targets: Mutex<Vec<HiliteHandler>>,
    mapper: Mutex<Option<SharedMapper>>,
}

/// Bridges one source handler to N target handlers via a [`HiliteMapper`].
///
/// The source handler is fixed at construction; targets are attached and
/// detached dynamically. The translator installs its source-side listener
/// lazily when the first target is attached and removes it when the last
/// target goes away, so an unused translator costs nothing on the source's
/// notification path.
///
/// Dropping the translator detaches all of its listeners.
pub struct HiliteTranslator {
    inner: Arc<TranslatorInner>,
    source_listener: SharedListener,
    target_listener: SharedListener,
}

impl HiliteTranslator {
    /// Create a translator for `source` with no mapper installed.
    ///
    /// Without a mapper, source events are swallowed and contraction is
    /// inactive until [`set_mapper`](Self::set_mapper) installs one.
    pub fn new(source: HiliteHandler) -> Self {
        Self::build(source, None)
    }

    /// Create a translator for `source` with a mapper already installed.
    pub fn with_mapper(source: HiliteHandler, mapper: SharedMapper) -> Self {
        Self::build(source, Some(mapper))
    }

    fn build(source: HiliteHandler, mapper: Option<SharedMapper>) -> Self {
        let inner = Arc::new(TranslatorInner {
            origin: EventOrigin::next(),
            source,
            targets: Mutex::new(Vec::new()),
            mapper: Mutex::new(mapper),
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

    /// The aggregate-side handler this translator was built around.
    pub fn source_handler(&self) -> &HiliteHandler {
        &self.inner.source
    }

    /// The identity carried by events this translator re-fires.
    pub fn origin(&self) -> EventOrigin {
        self.inner.origin
    }

    /// The currently installed mapper, if any.
    pub fn mapper(&self) -> Option<SharedMapper> {
        self.inner.mapper.lock().clone()
    }

    /// Replace the mapper.
    ///
    /// The old mapping's semantics no longer apply, so every downstream
    /// consumer is forced to unhilite first: a clear event is fired on the
    /// source handler (propagating to all targets) before the swap.
    pub fn set_mapper(&self, mapper: Option<SharedMapper>) {
        self.inner.source.fire_clear_hilite_event();
        *self.inner.mapper.lock() = mapper;
    }

    /// Attach a member-side target handler.
    ///
    /// Attaching the first target activates the translator by registering
    /// its listener on the source handler. Attaching a handler that is
    /// already a target is a no-op.
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
            target: "horizon_hilite::translator",
            targets = targets.len(),
            "target handler attached"
        );
    }

    /// Detach a target handler.
    ///
    /// Detaching the last target deactivates the translator by removing its
    /// listener from the source handler.
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
        tracing::debug!(
            target: "horizon_hilite::translator",
            targets = targets.len(),
            "target handler detached"
        );
    }

    /// Detach every target handler and deactivate the translator.
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

impl Drop for HiliteTranslator {
    fn drop(&mut self) {
        self.remove_all_to_hilite_handlers();
    }
}

impl std::fmt::Debug for HiliteTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HiliteTranslator")
            .field("origin", &self.inner.origin)
            .field("targets", &self.target_count())
            .field("has_mapper", &self.inner.mapper.lock().is_some())
            .finish()
    }
}

impl TranslatorInner {
    /// Expansion: map aggregate keys to the union of their member sets and
    /// re-fire on every target. With no mapper the event is swallowed.
    fn expand(&self, event: &KeyEvent, unhilite: bool) {
        if event.origin() == self.origin {
            // Contraction echo; the loop terminates here.
            return;
        }
        let Some(mapper) = self.mapper.lock().clone() else {
            return;
        };

        let mut members: HashSet<RowKey> = HashSet::new();
        for key in event.keys() {
            if let Some(mapped) = mapper.get_keys(key) {
                members.extend(mapped.iter().cloned());
            }
        }
        if members.is_empty() {
            return;
        }
        tracing::trace!(
            target: "horizon_hilite::translator",
            aggregates = event.keys().len(),
            members = members.len(),
            unhilite,
            "expanding aggregate event"
        );

        for target in self.targets.lock().iter() {
            if unhilite {
                target.fire_unhilite_event_from(self.origin, members.iter().cloned());
            } else {
                target.fire_hilite_event_from(self.origin, members.iter().cloned());
            }
        }
    }

    /// The source was cleared entirely: reset every target.
    fn clear_targets(&self, event: &KeyEvent) {
        if event.origin() == self.origin {
            return;
        }
        for target in self.targets.lock().iter() {
            target.fire_clear_hilite_event_from(self.origin);
        }
    }

    /// Contraction, hilite direction: an aggregate fires upstream only once
    /// its full member set is covered by the union of the just-hilit keys
    /// and every target's current hilit snapshot (all-or-nothing).
    fn contract_hilite(&self, event: &KeyEvent) {
        let Some(mapper) = self.mapper.lock().clone() else {
            return;
        };

        let mut covered: HashSet<RowKey> = event.keys().clone();
        for target in self.targets.lock().iter() {
            covered.extend(target.hilit_keys());
        }

        let mut aggregates = HashSet::new();
        for aggregate in mapper.key_set() {
            if let Some(members) = mapper.get_keys(aggregate) {
                if members.iter().all(|member| covered.contains(member)) {
                    aggregates.insert(aggregate.clone());
                }
            }
        }
        if aggregates.is_empty() {
            return;
        }
        tracing::trace!(
            target: "horizon_hilite::translator",
            aggregates = aggregates.len(),
            "contracting member hilite upstream"
        );
        self.source.fire_hilite_event_from(self.origin, aggregates);
    }

    /// Contraction, unhilite direction: any aggregate whose member set
    /// intersects the just-unhilit keys loses its hilite (any-defection).
    fn contract_unhilite(&self, event: &KeyEvent) {
        let Some(mapper) = self.mapper.lock().clone() else {
            return;
        };

        let mut aggregates = HashSet::new();
        for aggregate in mapper.key_set() {
            if let Some(members) = mapper.get_keys(aggregate) {
                if members.iter().any(|member| event.keys().contains(member)) {
                    aggregates.insert(aggregate.clone());
                }
            }
        }
        if aggregates.is_empty() {
            return;
        }
        self.source.fire_unhilite_event_from(self.origin, aggregates);
    }

    /// A target was cleared entirely: reset the source unconditionally.
    fn clear_source(&self) {
        self.source.fire_clear_hilite_event_from(self.origin);
    }
}

/// Installed on the source handler while at least one target is attached.
struct SourceSideListener {
    inner: Weak<TranslatorInner>,
}

impl HiliteListener for SourceSideListener {
    fn hilite(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.expand(event, false);
        }
    }

    fn unhilite(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.expand(event, true);
        }
    }

    fn unhilite_all(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.clear_targets(event);
        }
    }
}

/// Shared by every attached target handler.
///
/// Contraction deliberately has no origin guard: the echo of an expansion
/// re-enters it, which lets overlapping aggregates (two aggregates sharing
/// members) become hilit together. The cycle is broken one hop later by the
/// origin check on the source side.
struct TargetSideListener {
    inner: Weak<TranslatorInner>,
}

impl HiliteListener for TargetSideListener {
    fn hilite(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.contract_hilite(event);
        }
    }

    fn unhilite(&self, event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.contract_unhilite(event);
        }
    }

    fn unhilite_all(&self, _event: &KeyEvent) {
        if let Some(inner) = self.inner.upgrade() {
            inner.clear_source();
        }
    }
}
