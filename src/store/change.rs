use super::cache::DerivedViewStore;
use crate::core::{Entity, EntityKind};
use crate::view::FilterSpec;
use log::debug;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Why a kind's visible entities changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// A fresh fetch replaced the collection.
    Applied,
    /// A failed fetch emptied the collection (clear-on-failure policy).
    Cleared,
    /// A record was kept locally after a failed create.
    LocalInsert,
    LocalCleared,
}

/// Published on the store's broadcast channel whenever a kind's revision
/// moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreChange {
    pub kind: EntityKind,
    pub revision: u64,
    pub reason: ChangeReason,
}

/// A filtered, sorted view of one kind that re-derives itself whenever the
/// kind changes.
pub struct LiveView {
    store: Arc<DerivedViewStore>,
    kind: EntityKind,
    spec: FilterSpec,
    receiver: broadcast::Receiver<StoreChange>,
}

impl LiveView {
    pub fn new(store: Arc<DerivedViewStore>, kind: EntityKind, spec: FilterSpec) -> Self {
        let receiver = store.subscribe();
        Self {
            store,
            kind,
            spec,
            receiver,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    pub fn set_spec(&mut self, spec: FilterSpec) {
        self.spec = spec;
    }

    /// Derive the view from the store's current entities.
    pub async fn current(&self) -> Vec<Entity> {
        let entities = self.store.entities(self.kind).await;
        self.spec.apply(&entities, self.kind.schema())
    }

    /// Wait for the next change to this view's kind and return the
    /// re-derived view. `None` if the channel closes.
    pub async fn changed(&mut self) -> Option<Vec<Entity>> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.kind == self.kind => return Some(self.current().await),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    debug!("live view for {} lagged by {} changes", self.kind, missed);
                    return Some(self.current().await);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
