mod common;

use agroview::{
    ChangeReason, DerivedViewStore, DiscardReason, EntityId, EntityKind, FailurePolicy,
    FetchError, FilterSpec, RecordingNotifier, RefreshOutcome, StaticSource, StoreConfig,
};
use common::{GatedSource, warehouse};
use serde_json::json;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn recording_store(config: StoreConfig) -> (DerivedViewStore, RecordingNotifier) {
    let notifier = RecordingNotifier::new();
    let store = DerivedViewStore::new(config)
        .unwrap()
        .with_notifier(Arc::new(notifier.clone()));
    (store, notifier)
}

#[tokio::test]
async fn test_later_issued_refresh_wins_when_earlier_completes_last() {
    let (store, _) = recording_store(StoreConfig::default());
    let source = GatedSource::default();
    let first_gate = source.gate(EntityKind::Warehouses);
    let second_gate = source.gate(EntityKind::Warehouses);

    let first = store.refresh(EntityKind::Warehouses, &source);
    tokio::pin!(first);
    assert!(futures::poll!(first.as_mut()).is_pending());

    second_gate
        .send(Ok(json!({"warehouses": [warehouse(2, "Second")]})))
        .unwrap();
    let second = assert_ok!(store.refresh(EntityKind::Warehouses, &source).await);
    assert!(second.is_applied());

    first_gate
        .send(Ok(json!({"warehouses": [warehouse(1, "First")]})))
        .unwrap();
    let first = assert_ok!(first.await);
    assert_eq!(first, RefreshOutcome::Discarded(DiscardReason::Superseded));

    let collection = store.collection(EntityKind::Warehouses).await;
    assert_eq!(collection.len(), 1);
    assert!(collection.get(&EntityId::from(2)).is_some());
    assert_eq!(store.stats().discarded, 1);
}

#[tokio::test]
async fn test_stale_failure_is_discarded_silently() {
    let (store, notifier) = recording_store(StoreConfig::default());
    let source = GatedSource::default();
    let first_gate = source.gate(EntityKind::Warehouses);
    let second_gate = source.gate(EntityKind::Warehouses);

    let first = store.refresh(EntityKind::Warehouses, &source);
    tokio::pin!(first);
    assert!(futures::poll!(first.as_mut()).is_pending());

    second_gate
        .send(Ok(json!([warehouse(2, "Second")])))
        .unwrap();
    assert_ok!(store.refresh(EntityKind::Warehouses, &source).await);

    first_gate
        .send(Err(FetchError::network("timed out")))
        .unwrap();
    let outcome = assert_ok!(first.await);
    assert_eq!(outcome, RefreshOutcome::Discarded(DiscardReason::Superseded));
    assert_eq!(store.last_error(EntityKind::Warehouses).await, None);
    assert!(notifier.notifications().is_empty());
}

#[tokio::test]
async fn test_cancelled_refresh_is_not_applied() {
    let (store, notifier) = recording_store(StoreConfig::default());
    let source = GatedSource::default();
    let gate = source.gate(EntityKind::Regions);

    let pending = store.refresh(EntityKind::Regions, &source);
    tokio::pin!(pending);
    assert!(futures::poll!(pending.as_mut()).is_pending());

    store.cancel_in_flight();
    gate.send(Ok(json!([{"id": 1, "name": "Coast"}]))).unwrap();

    let outcome = assert_ok!(pending.await);
    assert_eq!(outcome, RefreshOutcome::Discarded(DiscardReason::Cancelled));
    assert!(store.collection(EntityKind::Regions).await.is_empty());
    assert_eq!(store.revision(EntityKind::Regions).await, 0);
    assert!(notifier.notifications().is_empty());

    // A refresh issued after the cancel applies normally
    let source = StaticSource::new()
        .with_records(EntityKind::Regions, vec![json!({"id": 1, "name": "Coast"})]);
    assert!(assert_ok!(store.refresh(EntityKind::Regions, &source).await).is_applied());
}

#[tokio::test]
async fn test_failure_of_one_kind_leaves_others_alone() {
    let (store, notifier) = recording_store(StoreConfig::default());
    let source = GatedSource::default();
    let regions_gate = source.gate(EntityKind::Regions);
    let warehouses_gate = source.gate(EntityKind::Warehouses);

    regions_gate
        .send(Err(FetchError::server("Failed to fetch regions")))
        .unwrap();
    warehouses_gate
        .send(Ok(json!([warehouse(1, "Eldoret Store")])))
        .unwrap();

    let (regions, warehouses) = tokio::join!(
        store.refresh(EntityKind::Regions, &source),
        store.refresh(EntityKind::Warehouses, &source),
    );

    let err = assert_err!(regions);
    assert_eq!(err.message, "Failed to fetch regions");
    assert!(assert_ok!(warehouses).is_applied());
    assert_eq!(store.collection(EntityKind::Warehouses).await.len(), 1);
    assert_eq!(store.last_error(EntityKind::Warehouses).await, None);
    assert_eq!(notifier.messages().len(), 1);
}

#[tokio::test]
async fn test_failure_policies() {
    for policy in [FailurePolicy::RetainStale, FailurePolicy::ClearOnFailure] {
        let (store, _) = recording_store(StoreConfig::new().failure_policy(policy));
        let source = StaticSource::new()
            .with_records(EntityKind::Warehouses, vec![warehouse(1, "Eldoret Store")]);
        assert_ok!(store.refresh(EntityKind::Warehouses, &source).await);

        let mut changes = store.subscribe();
        source.fail(EntityKind::Warehouses, FetchError::network("offline"));
        assert_err!(store.refresh(EntityKind::Warehouses, &source).await);

        let remaining = store.collection(EntityKind::Warehouses).await.len();
        match policy {
            FailurePolicy::RetainStale => {
                assert_eq!(remaining, 1);
                assert!(changes.try_recv().is_err());
            }
            FailurePolicy::ClearOnFailure => {
                assert_eq!(remaining, 0);
                let change = assert_ok!(changes.try_recv());
                assert_eq!(change.kind, EntityKind::Warehouses);
                assert_eq!(change.reason, ChangeReason::Cleared);
                assert_eq!(change.revision, 2);
            }
        }
        // Snapshot is never touched by a failure
        assert_eq!(store.snapshot(EntityKind::Warehouses).await.len(), 1);
    }
}

#[tokio::test]
async fn test_transition_after_recovery_diffs_against_last_success() {
    let config = StoreConfig::new().failure_policy(FailurePolicy::ClearOnFailure);
    let (store, notifier) = recording_store(config);
    let source = StaticSource::new()
        .with_records(EntityKind::Warehouses, vec![warehouse(1, "Eldoret Store")]);
    assert_ok!(store.refresh(EntityKind::Warehouses, &source).await);

    source.fail(EntityKind::Warehouses, FetchError::network("offline"));
    assert_err!(store.refresh(EntityKind::Warehouses, &source).await);

    source.recover(EntityKind::Warehouses);
    source.set_records(
        EntityKind::Warehouses,
        vec![json!({"id": 1, "name": "Eldoret Store", "location": "Eldoret", "is_active": false})],
    );
    notifier.clear();

    let outcome = assert_ok!(store.refresh(EntityKind::Warehouses, &source).await);
    assert_eq!(outcome.transitions().len(), 1);
    assert_eq!(outcome.transitions()[0].field, "is_active");
    assert_eq!(
        notifier.messages(),
        vec!["warehouses 1: is_active changed from true to false"]
    );
}

#[tokio::test]
async fn test_tracked_overrides_apply() {
    let config = StoreConfig::new().track(EntityKind::Warehouses, &["available_capacity"]);
    let (store, _) = recording_store(config);
    let source = StaticSource::new().with_records(
        EntityKind::Warehouses,
        vec![json!({"id": 1, "name": "A", "location": "B", "available_capacity": 100})],
    );
    assert_ok!(store.refresh(EntityKind::Warehouses, &source).await);

    source.set_records(
        EntityKind::Warehouses,
        vec![json!({"id": 1, "name": "A", "location": "B", "available_capacity": 40, "is_active": false})],
    );
    let outcome = assert_ok!(store.refresh(EntityKind::Warehouses, &source).await);
    let fields: Vec<_> = outcome
        .transitions()
        .iter()
        .map(|event| event.field.as_str())
        .collect();
    assert_eq!(fields, vec!["available_capacity"]);
}

#[tokio::test]
async fn test_change_stream_and_live_view() {
    let (store, _) = recording_store(StoreConfig::default());
    let store = Arc::new(store);
    let mut changes = store.subscribe();
    let mut view = store.live_view(
        EntityKind::Posts,
        FilterSpec::new().search("maize").filter("category", "All"),
    );

    let source = StaticSource::new().with_records(
        EntityKind::Posts,
        vec![
            json!({"id": 1, "user_id": 3, "title": "Maize Seeds", "category": "seeds"}),
            json!({"id": 2, "user_id": 3, "title": "Bean Seeds", "category": "seeds"}),
            json!({"id": 3, "user_id": 4, "title": "Maize Fertilizer", "category": "inputs"}),
        ],
    );
    assert_ok!(store.refresh(EntityKind::Posts, &source).await);

    let change = assert_ok!(changes.recv().await);
    assert_eq!(change.kind, EntityKind::Posts);
    assert_eq!(change.revision, 1);
    assert_eq!(change.reason, ChangeReason::Applied);

    let derived = view.changed().await.unwrap();
    let ids: Vec<_> = derived.iter().map(|entity| entity.id().clone()).collect();
    assert_eq!(ids, vec![EntityId::from(1), EntityId::from(3)]);
    assert_eq!(view.current().await, derived);
}

#[tokio::test]
async fn test_lagging_live_view_rederives_latest() {
    let (store, _) = recording_store(StoreConfig::new().change_capacity(1));
    let store = Arc::new(store);
    let mut view = store.live_view(EntityKind::Regions, FilterSpec::new());

    let source = StaticSource::new();
    for count in 1..=3 {
        let regions = (1..=count)
            .map(|id| json!({"id": id, "name": format!("Region {}", id)}))
            .collect();
        source.set_records(EntityKind::Regions, regions);
        assert_ok!(store.refresh(EntityKind::Regions, &source).await);
    }

    // Two of the three changes were overwritten before the view read them
    let derived = view.changed().await.unwrap();
    assert_eq!(derived.len(), 3);
}
