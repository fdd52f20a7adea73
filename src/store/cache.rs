// ============================================================================
// DerivedViewStore: per-kind cache, fetch-replace-diff, sequencing
// ============================================================================

use super::change::{ChangeReason, LiveView, StoreChange};
use super::collection::Collection;
use super::diff::{TransitionEvent, diff};
use crate::config::{FailurePolicy, StoreConfig};
use crate::core::{Entity, EntityId, EntityKind, FetchError, Result};
use crate::notify::{LogNotifier, Notification, Notifier};
use crate::source::{EntitySource, FetchQuery};
use crate::view::FilterSpec;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, broadcast};
use tracing::{Instrument, Level, event, info_span};

/// Why a completed refresh left the cache untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiscardReason {
    /// A refresh issued later for the same kind was already applied.
    Superseded,
    /// The store generation moved (scheduler cancelled) while in flight.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Applied {
        collection: Collection,
        transitions: Vec<TransitionEvent>,
    },
    Discarded(DiscardReason),
}

impl RefreshOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn transitions(&self) -> &[TransitionEvent] {
        match self {
            Self::Applied { transitions, .. } => transitions,
            Self::Discarded(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub refreshes: u64,
    pub applied: u64,
    pub discarded: u64,
    pub failures: u64,
    pub transitions: u64,
}

#[derive(Default)]
struct Counters {
    refreshes: AtomicU64,
    applied: AtomicU64,
    discarded: AtomicU64,
    failures: AtomicU64,
    transitions: AtomicU64,
}

struct KindSlot {
    collection: Collection,
    snapshot: Collection,
    local: Vec<Entity>,
    next_seq: u64,
    last_applied_seq: u64,
    last_error: Option<FetchError>,
    revision: u64,
}

impl KindSlot {
    fn new(kind: EntityKind) -> Self {
        Self {
            collection: Collection::empty(kind),
            snapshot: Collection::empty(kind),
            local: Vec::new(),
            next_seq: 0,
            last_applied_seq: 0,
            last_error: None,
            revision: 0,
        }
    }
}

/// Normalised cache of every entity kind the pages display.
///
/// Each kind has its own slot behind its own lock, so a slow or failing
/// fetch of one kind never blocks or corrupts another. Locks are only held
/// between awaits, never across a fetch.
pub struct DerivedViewStore {
    slots: Vec<RwLock<KindSlot>>,
    generation: AtomicU64,
    config: StoreConfig,
    notifier: Arc<dyn Notifier>,
    changes: broadcast::Sender<StoreChange>,
    counters: Counters,
}

impl DerivedViewStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let (changes, _) = broadcast::channel(config.change_capacity);
        // Slots are indexed by the kind's discriminant, in declaration order
        let slots = EntityKind::ALL
            .into_iter()
            .map(|kind| RwLock::new(KindSlot::new(kind)))
            .collect();

        Ok(Self {
            slots,
            generation: AtomicU64::new(0),
            config,
            notifier: Arc::new(LogNotifier),
            changes,
            counters: Counters::default(),
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.config.failure_policy
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    fn slot(&self, kind: EntityKind) -> &RwLock<KindSlot> {
        &self.slots[kind as usize]
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Fetch `kind` with no server-side filters and apply the result.
    pub async fn refresh<S>(
        &self,
        kind: EntityKind,
        source: &S,
    ) -> std::result::Result<RefreshOutcome, FetchError>
    where
        S: EntitySource + ?Sized,
    {
        self.refresh_with_query(kind, source, &FetchQuery::default())
            .await
    }

    /// Fetch, normalise, diff against the snapshot and publish.
    ///
    /// The call is tagged with the next sequence number for `kind` and the
    /// current generation. On completion a result older than one already
    /// applied is `Superseded`, and one issued before a cancel is
    /// `Cancelled`; neither touches the cache. Failures that are still
    /// current apply the failure policy and come back as `Err`.
    pub async fn refresh_with_query<S>(
        &self,
        kind: EntityKind,
        source: &S,
        query: &FetchQuery,
    ) -> std::result::Result<RefreshOutcome, FetchError>
    where
        S: EntitySource + ?Sized,
    {
        let seq = {
            let mut slot = self.slot(kind).write().await;
            slot.next_seq += 1;
            slot.next_seq
        };
        let generation = self.generation.load(Ordering::SeqCst);
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);

        let span = info_span!(
            "store.refresh",
            kind = %kind,
            seq = seq,
            generation = generation
        );

        async move {
            let fetched = match source.fetch(kind, query).await {
                Ok(payload) => Collection::decode(kind, &payload),
                Err(err) => Err(err),
            };
            self.complete(kind, seq, generation, fetched).await
        }
        .instrument(span)
        .await
    }

    async fn complete(
        &self,
        kind: EntityKind,
        seq: u64,
        generation: u64,
        fetched: std::result::Result<Collection, FetchError>,
    ) -> std::result::Result<RefreshOutcome, FetchError> {
        let mut slot = self.slot(kind).write().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            event!(Level::TRACE, "refresh result discarded after cancellation");
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return Ok(RefreshOutcome::Discarded(DiscardReason::Cancelled));
        }

        if seq < slot.last_applied_seq {
            debug!(
                "{} refresh #{} superseded by #{}",
                kind, seq, slot.last_applied_seq
            );
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return Ok(RefreshOutcome::Discarded(DiscardReason::Superseded));
        }
        slot.last_applied_seq = seq;

        match fetched {
            Ok(collection) => {
                let tracked = self.config.tracked_fields(kind);
                let transitions = diff(&slot.snapshot, &collection, tracked.as_slice());

                slot.collection = collection.clone();
                slot.snapshot = collection.clone();
                slot.last_error = None;
                slot.revision += 1;
                let revision = slot.revision;
                drop(slot);

                self.counters.applied.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .transitions
                    .fetch_add(transitions.len() as u64, Ordering::Relaxed);
                event!(
                    Level::DEBUG,
                    entities = collection.len(),
                    transitions = transitions.len(),
                    "refresh applied"
                );

                for transition in &transitions {
                    info!("transition: {}", transition);
                    self.notifier.notify(transition_notification(transition));
                }
                self.publish(kind, revision, ChangeReason::Applied);

                Ok(RefreshOutcome::Applied {
                    collection,
                    transitions,
                })
            }
            Err(err) => {
                slot.last_error = Some(err.clone());
                let cleared = self.config.failure_policy == FailurePolicy::ClearOnFailure
                    && !slot.collection.is_empty();
                if cleared {
                    slot.collection = Collection::empty(kind);
                    slot.revision += 1;
                }
                let revision = slot.revision;
                drop(slot);

                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to fetch {}: {}", kind, err);
                self.notifier.notify(Notification::warning(format!(
                    "Failed to fetch {}: {}",
                    kind, err.message
                )));
                if cleared {
                    self.publish(kind, revision, ChangeReason::Cleared);
                }

                Err(err)
            }
        }
    }

    /// Bump the generation so every refresh already in flight is discarded
    /// when it completes.
    pub fn cancel_in_flight(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("store generation advanced to {}", generation);
        generation
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Local fallback records
    // ------------------------------------------------------------------

    pub(crate) async fn insert_local(&self, kind: EntityKind, entity: Entity) {
        let revision = {
            let mut slot = self.slot(kind).write().await;
            slot.local.push(entity);
            slot.revision += 1;
            slot.revision
        };
        self.publish(kind, revision, ChangeReason::LocalInsert);
    }

    /// Drop every local-only record of `kind`; returns how many were held.
    pub async fn clear_local(&self, kind: EntityKind) -> usize {
        let (removed, revision) = {
            let mut slot = self.slot(kind).write().await;
            let removed = slot.local.len();
            if removed > 0 {
                slot.local.clear();
                slot.revision += 1;
            }
            (removed, slot.revision)
        };
        if removed > 0 {
            self.publish(kind, revision, ChangeReason::LocalCleared);
        }
        removed
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The last applied collection (without local records).
    pub async fn collection(&self, kind: EntityKind) -> Collection {
        self.slot(kind).read().await.collection.clone()
    }

    /// Fetched entities followed by local-only records.
    pub async fn entities(&self, kind: EntityKind) -> Vec<Entity> {
        let slot = self.slot(kind).read().await;
        slot.collection
            .iter()
            .chain(slot.local.iter())
            .cloned()
            .collect()
    }

    pub async fn entity(&self, kind: EntityKind, id: &EntityId) -> Option<Entity> {
        let slot = self.slot(kind).read().await;
        slot.collection
            .get(id)
            .or_else(|| slot.local.iter().find(|entity| entity.id() == id))
            .cloned()
    }

    pub async fn snapshot(&self, kind: EntityKind) -> Collection {
        self.slot(kind).read().await.snapshot.clone()
    }

    pub async fn last_error(&self, kind: EntityKind) -> Option<FetchError> {
        self.slot(kind).read().await.last_error.clone()
    }

    pub async fn revision(&self, kind: EntityKind) -> u64 {
        self.slot(kind).read().await.revision
    }

    /// Kinds that have applied at least one fetch or hold local records.
    pub async fn kinds(&self) -> Vec<EntityKind> {
        let mut kinds = Vec::new();
        for kind in EntityKind::ALL {
            if self.revision(kind).await > 0 {
                kinds.push(kind);
            }
        }
        kinds
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            applied: self.counters.applied.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            transitions: self.counters.transitions.load(Ordering::Relaxed),
        }
    }

    // ------------------------------------------------------------------
    // Change stream
    // ------------------------------------------------------------------

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub fn live_view(self: &Arc<Self>, kind: EntityKind, spec: FilterSpec) -> LiveView {
        LiveView::new(Arc::clone(self), kind, spec)
    }

    fn publish(&self, kind: EntityKind, revision: u64, reason: ChangeReason) {
        // No receivers is fine
        let _ = self.changes.send(StoreChange {
            kind,
            revision,
            reason,
        });
    }
}

fn transition_notification(transition: &TransitionEvent) -> Notification {
    let message = format!(
        "{} {}: {} changed from {} to {}",
        transition.kind, transition.entity_id, transition.field, transition.from, transition.to
    );
    if transition.is_transition_to("status", "approved")
        || transition.is_transition_to("approved", true)
    {
        Notification::success(message)
    } else {
        Notification::info(message)
    }
}
