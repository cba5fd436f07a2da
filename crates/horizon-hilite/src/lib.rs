//! Cross-view hilite propagation for Horizon applications.
//!
//! "Hilite" is the domain term for cross-view selection highlighting:
//! marking rows as of-interest in one table or plot and having every other
//! view of the same data light up the matching rows. This crate provides
//! the event network that keeps those selections consistent:
//!
//! - **Handlers**: [`HiliteHandler`] is the publish/subscribe node. It owns
//!   the set of currently hilit [`RowKey`]s for one data granularity and
//!   notifies registered [`HiliteListener`]s of changes.
//! - **Mappers**: [`HiliteMapper`] / [`DefaultHiliteMapper`] relate an
//!   aggregate key (a cluster row) to its member keys (the clustered rows),
//!   with JSON persistence for configured mappings.
//! - **Translators**: [`HiliteTranslator`] bridges handlers of *different*
//!   granularity through a mapper, expanding aggregate hilites downstream
//!   and contracting member hilites upstream (all-or-nothing hilite,
//!   any-defection unhilite).
//! - **Managers**: [`HiliteManager`] bridges handlers of the *same*
//!   granularity by verbatim mirroring with single-hop loop suppression.
//! - **Dispatch**: all listener callbacks run serialized on one shared
//!   notification thread ([`dispatch`]); fire calls never block on
//!   listener execution.
//!
//! # Example
//!
//! ```
//! use std::collections::{HashMap, HashSet};
//! use horizon_hilite::{
//!     DefaultHiliteMapper, HiliteHandler, HiliteTranslator, RowKey, dispatch,
//! };
//! use std::sync::Arc;
//!
//! // A cluster view (aggregate rows) feeding two member-row views.
//! let clusters = HiliteHandler::new();
//! let mapper = DefaultHiliteMapper::new(HashMap::from([(
//!     RowKey::new("cluster_1"),
//!     HashSet::from([RowKey::new("row_a"), RowKey::new("row_b")]),
//! )]));
//! let translator = HiliteTranslator::with_mapper(clusters.clone(), Arc::new(mapper));
//!
//! let table = HiliteHandler::new();
//! translator.add_to_hilite_handler(&table);
//!
//! // Selecting the cluster hilites its member rows everywhere.
//! clusters.fire_hilite_event([RowKey::new("cluster_1")]);
//! dispatch::flush();
//! assert!(table.is_hilit([&RowKey::new("row_a"), &RowKey::new("row_b")]));
//! ```
//!
//! # Threading
//!
//! Fire methods are thread-safe entry points: the changed-key delta is
//! committed atomically under the handler's lock, then the notification is
//! queued. Listener callbacks execute one batch at a time, in FIFO order,
//! on the shared dispatch thread, so a listener is never re-entered while a
//! prior batch is still running. A panicking listener is isolated and
//! logged; delivery continues with the remaining listeners.

pub mod dispatch;
mod error;
mod event;
mod handler;
mod key;
mod manager;
mod mapper;
mod translator;

pub use error::{HiliteError, Result};
pub use event::{EventOrigin, HiliteListener, KeyEvent};
pub use handler::{HiliteHandler, ListenerId, SharedListener};
pub use key::RowKey;
pub use manager::HiliteManager;
pub use mapper::{CFG_MAPPED_KEYS, DefaultHiliteMapper, HiliteMapper};
pub use translator::{HiliteTranslator, SharedMapper};

// The whole point of these types is to be shared across threads.
static_assertions::assert_impl_all!(HiliteHandler: Send, Sync, Clone);
static_assertions::assert_impl_all!(HiliteTranslator: Send, Sync);
static_assertions::assert_impl_all!(HiliteManager: Send, Sync);
static_assertions::assert_impl_all!(KeyEvent: Send, Sync, Clone);
static_assertions::assert_impl_all!(DefaultHiliteMapper: Send, Sync);
