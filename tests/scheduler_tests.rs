mod common;

use agroview::{
    DerivedViewStore, EntityKind, PollingScheduler, SchedulerState, StoreConfig, TickReport,
};
use common::{GatedSource, warehouse};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_tick_skips_kind_still_running() {
    let store = Arc::new(DerivedViewStore::new(StoreConfig::default()).unwrap());
    let source = Arc::new(GatedSource::default());
    let warehouses_gate = source.gate(EntityKind::Warehouses);
    let mut changes = store.subscribe();

    let mut scheduler = PollingScheduler::new(store.clone(), source.clone());
    assert_ok!(scheduler.start(
        Duration::from_secs(3600),
        &[EntityKind::Warehouses, EntityKind::Regions]
    ));
    assert_eq!(scheduler.stats().started, 2);

    // Regions answers at once; warehouses is held at its gate
    let change = assert_ok!(changes.recv().await);
    assert_eq!(change.kind, EntityKind::Regions);
    while scheduler.in_flight() != vec![EntityKind::Warehouses] {
        tokio::task::yield_now().await;
    }
    assert_eq!(scheduler.state(), SchedulerState::Running);

    let report = scheduler.tick();
    assert_eq!(
        report,
        TickReport {
            started: vec![EntityKind::Regions],
            skipped: vec![EntityKind::Warehouses],
        }
    );

    warehouses_gate
        .send(Ok(json!([warehouse(1, "Eldoret Store")])))
        .unwrap();
    scheduler.settled().await;

    assert_eq!(scheduler.state(), SchedulerState::Scheduled);
    assert_eq!(store.collection(EntityKind::Warehouses).await.len(), 1);
    assert_eq!(scheduler.stats().skipped, 1);
    assert_eq!(scheduler.stats().ticks, 2);
}

#[tokio::test]
async fn test_cancel_discards_in_flight_refresh() {
    let store = Arc::new(DerivedViewStore::new(StoreConfig::default()).unwrap());
    let source = Arc::new(GatedSource::default());
    let gate = source.gate(EntityKind::Warehouses);

    let mut scheduler = PollingScheduler::new(store.clone(), source.clone());
    assert_ok!(scheduler.start(Duration::from_secs(3600), &[EntityKind::Warehouses]));
    // Wait until the refresh is parked inside the fetch
    while source.queued(EntityKind::Warehouses) > 0 {
        tokio::task::yield_now().await;
    }

    scheduler.cancel();
    assert_eq!(scheduler.state(), SchedulerState::Cancelled);

    gate.send(Ok(json!([warehouse(1, "Eldoret Store")]))).unwrap();
    while !scheduler.in_flight().is_empty() {
        tokio::task::yield_now().await;
    }

    assert!(store.collection(EntityKind::Warehouses).await.is_empty());
    assert_eq!(store.stats().discarded, 1);
    assert_eq!(scheduler.state(), SchedulerState::Cancelled);
}

#[tokio::test]
async fn test_initial_load_returns_to_idle() {
    let store = Arc::new(DerivedViewStore::new(StoreConfig::default()).unwrap());
    let source = Arc::new(GatedSource::default());
    let gate = source.gate(EntityKind::Saccos);

    let mut scheduler = PollingScheduler::new(store.clone(), source.clone());
    assert_ok!(scheduler.start(Duration::ZERO, &[EntityKind::Saccos, EntityKind::Memberships]));
    assert_eq!(scheduler.state(), SchedulerState::Running);

    gate.send(Ok(json!({"saccos": [{"id": 1, "name": "Rift Growers"}]})))
        .unwrap();
    scheduler.settled().await;

    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(store.collection(EntityKind::Saccos).await.len(), 1);
    assert_eq!(scheduler.stats().ticks, 1);

    // Idle again, so a new start is allowed
    assert_ok!(scheduler.start(Duration::ZERO, &[EntityKind::Saccos]));
}

#[tokio::test]
async fn test_dropping_scheduler_cancels() {
    let store = Arc::new(DerivedViewStore::new(StoreConfig::default()).unwrap());
    let source = Arc::new(GatedSource::default());
    let before = store.generation();

    {
        let mut scheduler = PollingScheduler::new(store.clone(), source.clone());
        assert_ok!(scheduler.start(Duration::from_secs(3600), &[EntityKind::Regions]));
    }

    assert_eq!(store.generation(), before + 1);
}
