// ============================================================================
// Polling scheduler
// ============================================================================
//
// Idle -> Scheduled -> Running -> Scheduled -> ... -> Cancelled
//
// A tick starts one refresh per kind unless that kind's previous refresh is
// still in flight. Cancelling stops the timer and advances the store
// generation, so whatever is still in flight is discarded on completion.
//
// ============================================================================

use crate::core::{EntityKind, Result, StoreError};
use crate::source::EntitySource;
use crate::store::{DerivedViewStore, RefreshOutcome};
use log::{debug, info};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Scheduled,
    Running,
    Cancelled,
}

/// What one tick did per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub started: Vec<EntityKind>,
    /// Kinds whose previous refresh was still running.
    pub skipped: Vec<EntityKind>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub started: u64,
    pub skipped: u64,
}

struct Control {
    kinds: Vec<EntityKind>,
    periodic: bool,
    in_flight: HashSet<EntityKind>,
}

struct Shared {
    store: Arc<DerivedViewStore>,
    source: Arc<dyn EntitySource>,
    control: Mutex<Control>,
    state: watch::Sender<SchedulerState>,
    ticks: AtomicU64,
    started: AtomicU64,
    skipped: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!("scheduler {:?} -> {:?}", current, state);
                *current = state;
                true
            }
        });
    }

    fn tick(self: &Arc<Self>) -> TickReport {
        let mut report = TickReport::default();
        let mut control = self.lock();
        if self.state() == SchedulerState::Cancelled {
            return report;
        }
        self.ticks.fetch_add(1, Ordering::Relaxed);

        for kind in control.kinds.clone() {
            if !control.in_flight.insert(kind) {
                report.skipped.push(kind);
                continue;
            }
            self.set_state(SchedulerState::Running);
            report.started.push(kind);

            let shared = Arc::clone(self);
            tokio::spawn(async move {
                match shared.store.refresh(kind, shared.source.as_ref()).await {
                    Ok(RefreshOutcome::Applied { transitions, .. }) => {
                        event!(Level::DEBUG, kind = %kind, transitions = transitions.len(), "scheduled refresh applied");
                    }
                    Ok(RefreshOutcome::Discarded(reason)) => {
                        event!(Level::TRACE, kind = %kind, reason = ?reason, "scheduled refresh discarded");
                    }
                    // Reported to the notifier by the store
                    Err(_) => {}
                }
                shared.finish(kind);
            });
        }

        self.started
            .fetch_add(report.started.len() as u64, Ordering::Relaxed);
        self.skipped
            .fetch_add(report.skipped.len() as u64, Ordering::Relaxed);
        if !report.skipped.is_empty() {
            debug!("tick skipped {:?}: previous refresh still running", report.skipped);
        }
        drop(control);
        report
    }

    fn finish(&self, kind: EntityKind) {
        let mut control = self.lock();
        control.in_flight.remove(&kind);
        if control.in_flight.is_empty() && self.state() == SchedulerState::Running {
            self.set_state(if control.periodic {
                SchedulerState::Scheduled
            } else {
                SchedulerState::Idle
            });
        }
    }
}

/// Periodically refreshes a fixed set of kinds into a store.
pub struct PollingScheduler {
    shared: Arc<Shared>,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl PollingScheduler {
    pub fn new(store: Arc<DerivedViewStore>, source: Arc<dyn EntitySource>) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            shared: Arc::new(Shared {
                store,
                source,
                control: Mutex::new(Control {
                    kinds: Vec::new(),
                    periodic: false,
                    in_flight: HashSet::new(),
                }),
                state,
                ticks: AtomicU64::new(0),
                started: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            stop_tx: None,
            join_handle: None,
        }
    }

    /// Tick immediately, then every `interval`.
    ///
    /// A zero interval is the initial load: one tick, then back to `Idle`.
    /// Must be called inside a tokio runtime.
    pub fn start(&mut self, interval: Duration, kinds: &[EntityKind]) -> Result<()> {
        {
            let mut control = self.shared.lock();
            match self.shared.state() {
                SchedulerState::Idle => {}
                SchedulerState::Cancelled => {
                    return Err(StoreError::Scheduler(
                        "cannot start a cancelled scheduler".to_string(),
                    ));
                }
                SchedulerState::Scheduled | SchedulerState::Running => {
                    return Err(StoreError::Scheduler("scheduler already started".to_string()));
                }
            }
            control.kinds = kinds.to_vec();
            control.periodic = !interval.is_zero();
            self.shared.set_state(SchedulerState::Scheduled);
        }

        info!("polling {:?} every {:?}", kinds, interval);
        self.shared.tick();

        if interval.is_zero() {
            let control = self.shared.lock();
            if control.in_flight.is_empty() && self.shared.state() == SchedulerState::Scheduled {
                self.shared.set_state(SchedulerState::Idle);
            }
            return Ok(());
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let join_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    _ = sleep(interval) => {
                        shared.tick();
                    }
                }
            }
        });

        self.stop_tx = Some(stop_tx);
        self.join_handle = Some(join_handle);
        Ok(())
    }

    /// Run one tick now, without the timer.
    pub fn tick(&self) -> TickReport {
        self.shared.tick()
    }

    /// Stop the timer and discard every refresh still in flight.
    pub fn cancel(&mut self) {
        if self.shared.state() == SchedulerState::Cancelled {
            return;
        }
        {
            let _control = self.shared.lock();
            self.shared.set_state(SchedulerState::Cancelled);
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
        let generation = self.shared.store.cancel_in_flight();
        info!("scheduler cancelled (store generation {})", generation);
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    pub fn in_flight(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<_> = self.shared.lock().in_flight.iter().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.shared.ticks.load(Ordering::Relaxed),
            started: self.shared.started.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
        }
    }

    /// Wait until no refresh started by this scheduler is running.
    pub async fn settled(&self) {
        let mut state = self.shared.state.subscribe();
        let _ = state
            .wait_for(|state| *state != SchedulerState::Running)
            .await;
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
