//! Lifecycle scenarios against the in-memory backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use wastetrack_core::storage::{BarangayRecord, MemoryStorage, WasteStatus};
use wastetrack_core::{
    Actor, AdvanceRequest, Clock, CoordinateIssue, ErrorKind, FixedClock, NewWasteItem,
    RawCoordinates, TrackingConfig, TrackingError, TrackingService,
};

/// 09:30 local time in the municipality (UTC+8).
const NOW: OffsetDateTime = datetime!(2025-01-15 01:30:00 UTC);

const ADMIN: Actor = Actor {
    id: 1,
    role: wastetrack_core::Role::Admin,
    barangay_id: None,
};

fn rep() -> Actor {
    Actor::barangay(2, 1)
}

fn other_rep() -> Actor {
    Actor::barangay(3, 1)
}

fn crew() -> Actor {
    Actor::collector(10)
}

fn barangay(id: i64, name: &str) -> BarangayRecord {
    BarangayRecord {
        id,
        name: name.to_string(),
        code: format!("NAB-{id}"),
        municipality: "Nabua".to_string(),
        province: Some("Camarines Sur".to_string()),
        is_active: true,
    }
}

async fn setup_with(config: TrackingConfig) -> (TrackingService<MemoryStorage>, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(NOW));
    let service = TrackingService::with_clock(MemoryStorage::new(), config, clock.clone());
    service.seed_reference_data().await.unwrap();
    (service, clock)
}

async fn setup() -> (TrackingService<MemoryStorage>, Arc<FixedClock>) {
    setup_with(TrackingConfig {
        barangays: vec![barangay(1, "San Roque"), barangay(2, "Angustia")],
        ..TrackingConfig::default()
    })
    .await
}

fn new_item(is_sorted: bool) -> NewWasteItem {
    NewWasteItem {
        waste_type: Some("recyclable".to_string()),
        barangay_id: Some(1),
        is_sorted,
        address: Some("Zone 4, near chapel".to_string()),
        contact_person: Some("Juan".to_string()),
        weight: Some(3.5),
        ..NewWasteItem::default()
    }
}

async fn register(service: &TrackingService<MemoryStorage>, is_sorted: bool) -> String {
    service
        .register(new_item(is_sorted), &rep())
        .await
        .unwrap()
        .item
        .item_id
}

/// The three item/ledger invariants every committed state must satisfy.
async fn assert_invariants(service: &TrackingService<MemoryStorage>, item_id: &str) {
    let item = service.get_item(item_id, &ADMIN).await.unwrap();
    let latest = service.latest(item_id).await.unwrap().unwrap();
    assert_eq!(item.status, latest.status, "item diverged from ledger head");
    if item.client_confirmed {
        assert_eq!(item.status, WasteStatus::Collected);
    }
    if !item.is_sorted {
        assert_eq!(item.status, WasteStatus::NotCollected);
    }
    service.verify_consistency(item_id).await.unwrap();
}

fn coords(lat: &str, lon: &str) -> RawCoordinates {
    RawCoordinates {
        latitude: Some(lat.to_string()),
        longitude: Some(lon.to_string()),
        ..RawCoordinates::default()
    }
}

fn advance(status: &str) -> AdvanceRequest {
    AdvanceRequest {
        status: status.to_string(),
        ..AdvanceRequest::default()
    }
}

#[tokio::test]
async fn register_sort_collect_confirm() {
    let (service, _clock) = setup().await;

    let registered = service.register(new_item(false), &rep()).await.unwrap();
    let id = registered.item.item_id.clone();
    assert_eq!(registered.item.status, WasteStatus::NotCollected);
    assert_eq!(registered.item.item_name, "Recyclable Waste");
    assert_eq!(registered.item.created_by, Some(2));
    assert_eq!(
        registered.record.notes.as_deref(),
        Some("Waste item registered for collection")
    );
    assert_eq!(registered.record.location.as_deref(), Some("Zone 4, near chapel"));
    assert_invariants(&service, &id).await;

    let sorted = service.mark_sorted(&id, &rep()).await.unwrap();
    assert_eq!(sorted.item.status, WasteStatus::PendingCollection);
    assert!(sorted.item.is_sorted);
    assert_eq!(sorted.item.sorted_by, Some(2));
    assert_eq!(sorted.item.sorted_at, Some(NOW));
    assert_invariants(&service, &id).await;

    let collected = service
        .mark_collected(&id, &coords("13.4295", "123.2532"), &crew())
        .await
        .unwrap();
    assert_eq!(collected.item.status, WasteStatus::Collected);
    assert!(!collected.item.client_confirmed);
    assert!(collected.warning.is_none());
    assert_eq!(collected.record.coordinates(), Some((13.4295, 123.2532)));
    assert_eq!(
        collected.record.notes.as_deref(),
        Some("Collected by collection team at 2025-01-15 09:30")
    );
    assert_eq!(collected.record.updated_by, Some(10));
    assert_invariants(&service, &id).await;

    let confirmed = service.confirm_collection(&id, &rep()).await.unwrap();
    assert!(confirmed.item.client_confirmed);
    assert_eq!(confirmed.item.confirmed_at, Some(NOW));
    assert_eq!(confirmed.item.status, WasteStatus::Collected);
    assert_invariants(&service, &id).await;

    let history = service.history(&id, &rep()).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].id, confirmed.record.id);
    assert_eq!(confirmed.item.version, 3);
}

#[tokio::test]
async fn sorted_registration_starts_pending() {
    let (service, _clock) = setup().await;
    let outcome = service.register(new_item(true), &rep()).await.unwrap();
    assert_eq!(outcome.item.status, WasteStatus::PendingCollection);
    assert_eq!(outcome.item.sorted_by, Some(2));
    assert_invariants(&service, &outcome.item.item_id).await;
}

#[tokio::test]
async fn collecting_unsorted_item_is_rejected() {
    let (service, _clock) = setup().await;
    let id = register(&service, false).await;

    let err = service
        .mark_collected(&id, &coords("13.4", "123.3"), &crew())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackingError::State(_)), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::State);

    let item = service.get_item(&id, &ADMIN).await.unwrap();
    assert_eq!(item.status, WasteStatus::NotCollected);
    assert_eq!(item.version, 0);
    assert_eq!(service.history(&id, &ADMIN).await.unwrap().len(), 1);
}

#[tokio::test]
async fn collecting_twice_is_rejected() {
    let (service, _clock) = setup().await;
    let id = register(&service, true).await;
    service
        .mark_collected(&id, &RawCoordinates::default(), &crew())
        .await
        .unwrap();
    let err = service
        .mark_collected(&id, &RawCoordinates::default(), &crew())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("current status: collected"), "{err}");
}

#[tokio::test]
async fn representatives_cannot_collect() {
    let (service, _clock) = setup().await;
    let id = register(&service, true).await;
    let err = service
        .mark_collected(&id, &RawCoordinates::default(), &rep())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
}

#[tokio::test]
async fn swapped_coordinates_are_corrected_and_tagged() {
    let (service, _clock) = setup().await;
    let id = register(&service, true).await;

    let outcome = service
        .mark_collected(&id, &coords("123.1", "13.1"), &crew())
        .await
        .unwrap();
    assert_eq!(outcome.record.latitude, Some(13.1));
    assert_eq!(outcome.record.longitude, Some(123.1));
    let warning = outcome.warning.unwrap();
    assert_eq!(warning.issue, CoordinateIssue::Swapped);
    assert!(warning.message.starts_with("Device coordinates looked swapped"));
    assert!(outcome
        .record
        .notes
        .unwrap()
        .ends_with("[COORD_ISSUE: swapped]"));
}

#[tokio::test]
async fn invalid_coordinates_are_dropped_and_tagged() {
    let (service, _clock) = setup().await;
    let id = register(&service, true).await;

    let outcome = service
        .mark_collected(&id, &coords("999", "999"), &crew())
        .await
        .unwrap();
    assert_eq!(outcome.item.status, WasteStatus::Collected);
    assert_eq!(outcome.record.coordinates(), None);
    assert_eq!(outcome.record.latitude, None);
    assert_eq!(outcome.warning.unwrap().issue, CoordinateIssue::Dropped);
    assert!(outcome
        .record
        .notes
        .unwrap()
        .contains("[COORD_ISSUE: dropped]"));
}

#[tokio::test]
async fn registration_validates_required_fields() {
    let (service, _clock) = setup().await;

    let missing_type = NewWasteItem {
        waste_type: None,
        ..new_item(false)
    };
    let err = service.register(missing_type, &rep()).await.unwrap_err();
    assert_eq!(err.to_string(), "Waste type is required");

    let unknown_type = NewWasteItem {
        waste_type: Some("plutonium".into()),
        ..new_item(false)
    };
    let err = service.register(unknown_type, &rep()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let missing_barangay = NewWasteItem {
        barangay_id: None,
        ..new_item(false)
    };
    let err = service.register(missing_barangay, &ADMIN).await.unwrap_err();
    assert_eq!(err.to_string(), "Barangay is required");

    let unknown_barangay = NewWasteItem {
        barangay_id: Some(77),
        ..new_item(false)
    };
    let err = service.register(unknown_barangay, &ADMIN).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let negative_weight = NewWasteItem {
        weight: Some(-1.0),
        ..new_item(false)
    };
    assert!(service.register(negative_weight, &rep()).await.is_err());

    let list = service.list_items(&Default::default(), &ADMIN).await.unwrap();
    assert!(list.is_empty());
}

#[tokio::test]
async fn representatives_register_only_in_their_barangay() {
    let (service, _clock) = setup().await;
    let elsewhere = NewWasteItem {
        barangay_id: Some(2),
        ..new_item(false)
    };
    let err = service.register(elsewhere, &rep()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
}

#[tokio::test]
async fn same_second_registrations_get_suffixes() {
    let (service, clock) = setup().await;
    let first = register(&service, false).await;
    let second = register(&service, false).await;
    assert_eq!(first, "WM20250115093000");
    assert_eq!(second, "WM20250115093000-2");

    clock.advance(Duration::seconds(1));
    assert_eq!(register(&service, false).await, "WM20250115093001");
}

#[tokio::test]
async fn id_allocation_gives_up_after_configured_attempts() {
    let (service, _clock) = setup_with(TrackingConfig {
        barangays: vec![barangay(1, "San Roque")],
        max_id_attempts: 2,
        ..TrackingConfig::default()
    })
    .await;
    register(&service, false).await;
    register(&service, false).await;
    let err = service.register(new_item(false), &rep()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn confirmation_guards() {
    let (service, _clock) = setup().await;
    let id = register(&service, true).await;

    let err = service.confirm_collection(&id, &rep()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State, "not yet collected");

    service
        .mark_collected(&id, &RawCoordinates::default(), &crew())
        .await
        .unwrap();

    let err = service.confirm_collection(&id, &other_rep()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
    let err = service.confirm_collection(&id, &crew()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    service.confirm_collection(&id, &ADMIN).await.unwrap();
    let err = service.confirm_collection(&id, &rep()).await.unwrap_err();
    assert!(err.to_string().contains("already confirmed"), "{err}");
    assert_eq!(service.history(&id, &ADMIN).await.unwrap().len(), 3);
}

#[tokio::test]
async fn unsorting_a_collected_item_reverts_to_not_collected() {
    let (service, _clock) = setup().await;
    let id = register(&service, true).await;
    service
        .mark_collected(&id, &RawCoordinates::default(), &crew())
        .await
        .unwrap();
    service.confirm_collection(&id, &rep()).await.unwrap();

    let outcome = service.mark_unsorted(&id, &rep()).await.unwrap();
    assert_eq!(outcome.item.status, WasteStatus::NotCollected);
    assert!(!outcome.item.is_sorted);
    assert!(!outcome.item.client_confirmed);
    assert_eq!(outcome.item.confirmed_at, None);
    assert_eq!(outcome.item.sorted_at, None);
    assert_eq!(outcome.item.sorted_by, None);
    assert_eq!(
        outcome.record.notes.as_deref(),
        Some("Waste item marked as unsorted (was collected)")
    );
    assert_invariants(&service, &id).await;

    let err = service
        .mark_collected(&id, &RawCoordinates::default(), &crew())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[tokio::test]
async fn sorting_guards() {
    let (service, _clock) = setup().await;
    let id = register(&service, false).await;

    let err = service.mark_unsorted(&id, &rep()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let err = service.mark_sorted(&id, &other_rep()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    service.mark_sorted(&id, &crew()).await.unwrap();
    let err = service.mark_sorted(&id, &rep()).await.unwrap_err();
    assert_eq!(err.to_string(), "Waste item is already marked as sorted");
    assert_eq!(service.history(&id, &ADMIN).await.unwrap().len(), 2);
}

#[tokio::test]
async fn advance_status_through_downstream_states() {
    let (service, clock) = setup().await;
    let id = register(&service, true).await;
    service
        .mark_collected(&id, &RawCoordinates::default(), &crew())
        .await
        .unwrap();
    service.confirm_collection(&id, &rep()).await.unwrap();

    clock.advance(Duration::minutes(30));
    let request = AdvanceRequest {
        status: "in_transit".into(),
        location: Some("Nabua MRF".into()),
        notes: Some("Loaded on truck 2".into()),
        coordinates: RawCoordinates {
            device_latitude: Some("13.77".into()),
            device_longitude: Some("123.88".into()),
            ..coords("13.2", "123.2")
        },
    };
    let outcome = service.advance_status(&id, &request, &crew()).await.unwrap();
    assert_eq!(outcome.item.status, WasteStatus::InTransit);
    assert!(!outcome.item.client_confirmed, "confirmation only holds while collected");
    assert_eq!(outcome.item.address.as_deref(), Some("Nabua MRF"));
    assert_eq!(outcome.record.location.as_deref(), Some("Nabua MRF"));
    assert_eq!(outcome.record.coordinates(), Some((13.77, 123.88)));
    assert_eq!(outcome.record.notes.as_deref(), Some("Loaded on truck 2"));
    assert!(outcome.warning.is_none());
    assert_invariants(&service, &id).await;

    for status in ["processed", "disposed"] {
        let outcome = service.advance_status(&id, &advance(status), &ADMIN).await.unwrap();
        assert_eq!(outcome.item.status.as_str(), status);
        assert_eq!(
            outcome.record.notes.as_deref(),
            Some(format!("Status updated to {status}").as_str())
        );
        assert_invariants(&service, &id).await;
    }
}

#[tokio::test]
async fn advance_status_guards() {
    let (service, _clock) = setup().await;
    let unsorted = register(&service, false).await;
    let err = service
        .advance_status(&unsorted, &advance("in_transit"), &crew())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);

    let sorted = register(&service, true).await;
    let err = service
        .advance_status(&sorted, &advance("in_transit"), &rep())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    let err = service
        .advance_status(&sorted, &advance("lost"), &crew())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Unknown status 'lost'");

    let err = service
        .advance_status(&sorted, &advance("not_collected"), &crew())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = service
        .advance_status("WM404", &advance("processed"), &crew())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn advance_to_collected_awaits_confirmation() {
    let (service, _clock) = setup().await;
    let id = register(&service, true).await;
    let outcome = service
        .advance_status(&id, &advance("collected"), &crew())
        .await
        .unwrap();
    assert_eq!(outcome.item.status, WasteStatus::Collected);
    assert!(!outcome.item.client_confirmed);
    service.confirm_collection(&id, &rep()).await.unwrap();
}

#[tokio::test]
async fn concurrent_collection_has_one_winner() {
    let (service, _clock) = setup().await;
    let id = register(&service, true).await;
    let service = Arc::new(service);

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = service.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            service
                .mark_collected(&id, &RawCoordinates::default(), &Actor::collector(10 + i))
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(
                matches!(e.kind(), ErrorKind::Conflict | ErrorKind::State),
                "unexpected error: {e:?}"
            ),
        }
    }
    assert_eq!(winners, 1);

    let history = service.history(&id, &ADMIN).await.unwrap();
    let collected = history
        .iter()
        .filter(|r| r.status == WasteStatus::Collected)
        .count();
    assert_eq!(collected, 1);
    assert_invariants(&service, &id).await;
}

#[tokio::test]
async fn invariants_hold_across_mixed_operations() {
    let (service, clock) = setup().await;
    let id = register(&service, false).await;

    // Mix of legal and illegal operations; failures must leave no trace.
    let mut expected_entries = 1;
    for step in 0..12 {
        clock.advance(Duration::seconds(30));
        let result = match step % 6 {
            0 => service.mark_sorted(&id, &rep()).await,
            1 => service.confirm_collection(&id, &rep()).await,
            2 => {
                service
                    .mark_collected(&id, &coords("13.3", "123.3"), &crew())
                    .await
            }
            3 => service.confirm_collection(&id, &rep()).await,
            4 => service.advance_status(&id, &advance("in_transit"), &crew()).await,
            _ => service.mark_unsorted(&id, &rep()).await,
        };
        if result.is_ok() {
            expected_entries += 1;
        }
        assert_invariants(&service, &id).await;
    }
    let history = service.history(&id, &ADMIN).await.unwrap();
    assert_eq!(history.len(), expected_entries);
    assert!(history.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

/// Returns `NOW + 1h`, except that an armed call blocks its thread and then
/// reports the older `NOW`, like a request that read the time and stalled.
struct StallingClock {
    stall_next: AtomicBool,
}

impl Clock for StallingClock {
    fn now(&self) -> OffsetDateTime {
        if self.stall_next.swap(false, Ordering::SeqCst) {
            std::thread::sleep(std::time::Duration::from_millis(300));
            NOW
        } else {
            NOW + Duration::hours(1)
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_transition_cannot_overtake_newer_commit() {
    let clock = Arc::new(StallingClock {
        stall_next: AtomicBool::new(false),
    });
    let service = TrackingService::with_clock(
        MemoryStorage::new(),
        TrackingConfig {
            barangays: vec![barangay(1, "San Roque")],
            ..TrackingConfig::default()
        },
        clock.clone(),
    );
    service.seed_reference_data().await.unwrap();
    let id = register(&service, true).await;
    let service = Arc::new(service);

    clock.stall_next.store(true, Ordering::SeqCst);
    let slow = {
        let service = service.clone();
        let id = id.clone();
        tokio::spawn(async move {
            service
                .advance_status(&id, &advance("in_transit"), &crew())
                .await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let fast = service
        .advance_status(&id, &advance("processed"), &crew())
        .await;
    assert!(fast.is_ok(), "{fast:?}");

    match slow.await.unwrap() {
        Ok(outcome) => assert!(outcome.record.timestamp >= NOW + Duration::hours(1)),
        Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "unexpected error: {e:?}"),
    }
    assert_invariants(&service, &id).await;
}

#[tokio::test]
async fn backward_clock_step_keeps_ledger_head_current() {
    let (service, clock) = setup().await;
    let id = register(&service, true).await;

    clock.advance(Duration::minutes(10));
    service
        .advance_status(&id, &advance("in_transit"), &crew())
        .await
        .unwrap();
    clock.set(NOW);
    let outcome = service
        .advance_status(&id, &advance("processed"), &crew())
        .await
        .unwrap();

    assert_eq!(outcome.record.timestamp, NOW + Duration::minutes(10));
    let latest = service.latest(&id).await.unwrap().unwrap();
    assert_eq!(latest.status, WasteStatus::Processed);
    assert_invariants(&service, &id).await;
}
