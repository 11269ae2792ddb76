//! Integration tests for the merge facade: cache lifecycle, merge
//! precedence, degradation when the device side fails, and the mirror
//! round trip from local store to device calendar and back.

mod common;

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use common::{at, local_event, native_event, FakeGateway};
use datebook::{
    CalendarSyncService, DeviceCalendarAdapter, EventStore, PermissionStatus, StoreConfig,
    SyncWindow,
};

async fn service_over(gateway: &Arc<FakeGateway>) -> CalendarSyncService {
    let store = EventStore::in_memory().await.unwrap();
    let adapter = DeviceCalendarAdapter::new(gateway.clone(), None);
    CalendarSyncService::new(Arc::new(store), Arc::new(adapter))
}

#[tokio::test]
async fn test_local_only_by_default() {
    let gateway = FakeGateway::authorized();
    gateway.seed_event(native_event("cal-main", "Device thing", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0)));
    let service = service_over(&gateway).await;
    service
        .save_local_event(&local_event("l1", "Local thing", at(2025, 6, 10, 11, 0), at(2025, 6, 10, 12, 0)))
        .await
        .unwrap();

    let merged = service
        .load_events(Some((at(2025, 6, 1, 0, 0), at(2025, 6, 30, 0, 0))))
        .await;

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].title, "Local thing");
    // Device sync off: the gateway was never asked.
    assert_eq!(gateway.events_between_calls(), 0);
    assert!(service.cached_range().await.is_none());
}

#[tokio::test]
async fn test_merge_device_wins_per_id() {
    let gateway = FakeGateway::authorized();
    let native_id = gateway.seed_event(native_event(
        "cal-main",
        "Fresh from device",
        at(2025, 6, 10, 9, 30),
        at(2025, 6, 10, 10, 30),
    ));
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;

    // The local store holds a stale copy under the same id, plus one
    // event of its own.
    let mut stale = local_event("x", "Stale copy", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0));
    stale.id = native_id.clone();
    stale.is_from_device_calendar = true;
    stale.device_event_id = Some(native_id.clone());
    service.save_local_event(&stale).await.unwrap();
    service
        .save_local_event(&local_event("l1", "Local only", at(2025, 6, 10, 8, 0), at(2025, 6, 10, 8, 30)))
        .await
        .unwrap();

    let merged = service
        .load_events(Some((at(2025, 6, 1, 0, 0), at(2025, 6, 30, 0, 0))))
        .await;

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].title, "Local only");
    let device_copy = &merged[1];
    assert_eq!(device_copy.id, native_id);
    assert_eq!(device_copy.title, "Fresh from device");
    assert_eq!(device_copy.start_time, at(2025, 6, 10, 9, 30));
}

#[tokio::test]
async fn test_local_events_ignore_the_range() {
    let gateway = FakeGateway::authorized();
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;
    service
        .save_local_event(&local_event("far", "Far future", at(2030, 1, 1, 9, 0), at(2030, 1, 1, 10, 0)))
        .await
        .unwrap();

    let merged = service
        .load_events(Some((at(2025, 6, 1, 0, 0), at(2025, 6, 30, 0, 0))))
        .await;

    // The range scopes the device fetch, never the local read.
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, "far");
}

#[tokio::test]
async fn test_local_range_read_skips_the_merge() {
    let gateway = FakeGateway::authorized();
    gateway.seed_event(native_event("cal-main", "Device thing", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0)));
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;
    service
        .save_local_event(&local_event("in-a", "Morning", at(2025, 6, 10, 8, 0), at(2025, 6, 10, 9, 0)))
        .await
        .unwrap();
    service
        .save_local_event(&local_event("in-b", "Evening", at(2025, 6, 10, 18, 0), at(2025, 6, 10, 19, 0)))
        .await
        .unwrap();
    service
        .save_local_event(&local_event("out", "Next month", at(2025, 7, 5, 9, 0), at(2025, 7, 5, 10, 0)))
        .await
        .unwrap();

    let local = service
        .local_events_in_range(at(2025, 6, 10, 0, 0), at(2025, 6, 11, 0, 0))
        .await;

    let ids: Vec<&str> = local.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["in-a", "in-b"]);
    // Even with device sync on, the local read never asks the gateway.
    assert_eq!(gateway.events_between_calls(), 0);
}

#[tokio::test]
async fn test_cache_lifecycle() {
    let gateway = FakeGateway::authorized();
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;
    service
        .save_local_event(&local_event("l1", "One", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0)))
        .await
        .unwrap();

    let range = (at(2025, 6, 1, 0, 0), at(2025, 6, 30, 0, 0));
    service.load_events(Some(range)).await;
    assert_eq!(service.cached_events().await.len(), 1);
    assert_eq!(service.cached_range().await, Some(range));

    // Any local write clears the cache.
    service
        .save_local_event(&local_event("l2", "Two", at(2025, 6, 11, 9, 0), at(2025, 6, 11, 10, 0)))
        .await
        .unwrap();
    assert!(service.cached_events().await.is_empty());
    assert!(service.cached_range().await.is_none());

    // The next load rebuilds it.
    let merged = service.refresh(Some(range)).await;
    assert_eq!(merged.len(), 2);
    assert_eq!(service.cached_events().await.len(), 2);
}

#[tokio::test]
async fn test_delete_invalidates_cache() {
    let gateway = FakeGateway::authorized();
    let service = service_over(&gateway).await;
    service
        .save_local_event(&local_event("l1", "One", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0)))
        .await
        .unwrap();
    service.load_events(None).await;
    assert!(!service.cached_events().await.is_empty());

    service.delete_local_event("l1").await.unwrap();
    assert!(service.cached_events().await.is_empty());
    assert!(service.local_event("l1").await.is_none());
}

#[tokio::test]
async fn test_device_failure_degrades_to_local() {
    let gateway = FakeGateway::authorized();
    gateway.fail_fetches(true);
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;
    service
        .save_local_event(&local_event("l1", "Still here", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0)))
        .await
        .unwrap();

    let merged = service
        .load_events(Some((at(2025, 6, 1, 0, 0), at(2025, 6, 30, 0, 0))))
        .await;

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, "l1");
    // The fetch was attempted and failed; the load still answered.
    assert_eq!(gateway.events_between_calls(), 1);
}

#[tokio::test]
async fn test_unauthorized_device_is_silent() {
    let gateway = FakeGateway::new();
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;
    service
        .save_local_event(&local_event("l1", "Mine", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0)))
        .await
        .unwrap();

    let merged = service.load_events(None).await;
    assert_eq!(merged.len(), 1);
    // Without authorization the adapter answers empty without asking the
    // device at all.
    assert_eq!(gateway.events_between_calls(), 0);
}

#[tokio::test]
async fn test_default_window_spans_120_days() {
    let gateway = FakeGateway::authorized();
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;

    service.load_events(None).await;

    let ranges = gateway.recorded_ranges();
    assert_eq!(ranges.len(), 1);
    let (start, end) = ranges[0];
    assert_eq!(end - start, Duration::days(120));
    assert_eq!(service.cached_range().await, Some((start, end)));
}

#[tokio::test]
async fn test_events_on_does_not_touch_cache() {
    let gateway = FakeGateway::authorized();
    gateway.seed_event(native_event("cal-main", "Device lunch", at(2025, 6, 10, 12, 0), at(2025, 6, 10, 13, 0)));
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;
    service
        .save_local_event(&local_event("l1", "Local run", at(2025, 6, 10, 7, 0), at(2025, 6, 10, 8, 0)))
        .await
        .unwrap();
    let range = (at(2025, 6, 1, 0, 0), at(2025, 6, 30, 0, 0));
    let cached = service.load_events(Some(range)).await;

    let day = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
    let on_day = service.events_on(day).await;
    assert_eq!(on_day.len(), 2);
    assert_eq!(on_day[0].title, "Local run");
    assert_eq!(on_day[1].title, "Device lunch");

    // The day view answered fresh; the cache still holds the earlier load.
    assert_eq!(service.cached_events().await, cached);
    assert_eq!(service.cached_range().await, Some(range));
}

#[tokio::test]
async fn test_disabling_device_sync_clears_cache() {
    let gateway = FakeGateway::authorized();
    gateway.seed_event(native_event("cal-main", "Device thing", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0)));
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;
    service
        .load_events(Some((at(2025, 6, 1, 0, 0), at(2025, 6, 30, 0, 0))))
        .await;
    assert!(!service.cached_events().await.is_empty());

    service.configure_device_sync(false).await;
    assert!(service.cached_events().await.is_empty());
    assert!(!service.device_sync_enabled().await);

    // Next load is local-only, and this store has nothing local.
    assert!(service.load_events(None).await.is_empty());
}

#[tokio::test]
async fn test_mirror_round_trip() {
    let gateway = FakeGateway::authorized();
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;

    let draft = local_event("l1", "Book club", at(2025, 6, 12, 19, 0), at(2025, 6, 12, 21, 0));
    service.save_local_event(&draft).await.unwrap();

    let linked = service.sync_to_device_calendar(&draft).await.unwrap();
    assert!(linked.is_from_device_calendar);
    let native_id = linked.device_event_id.clone().unwrap();
    assert_eq!(gateway.stored_event(&native_id).unwrap().title, "Book club");

    // Persist the linkage, then push an edit through the update path.
    service.save_local_event(&linked).await.unwrap();
    let mut edited = linked.clone();
    edited.title = "Book club (moved)".to_string();
    let relinked = service.sync_to_device_calendar(&edited).await.unwrap();
    assert_eq!(relinked.device_event_id.as_deref(), Some(native_id.as_str()));
    assert_eq!(gateway.stored_event_count(), 1);
    assert_eq!(
        gateway.stored_event(&native_id).unwrap().title,
        "Book club (moved)"
    );
}

#[tokio::test]
async fn test_mirror_requires_permission() {
    let gateway = FakeGateway::new();
    let service = service_over(&gateway).await;

    let draft = local_event("l1", "Private", at(2025, 6, 12, 19, 0), at(2025, 6, 12, 21, 0));
    let err = service.sync_to_device_calendar(&draft).await.unwrap_err();
    assert!(err.is_permission_denied());
}

#[tokio::test]
async fn test_remove_from_device_is_best_effort() {
    let gateway = FakeGateway::authorized();
    let service = service_over(&gateway).await;
    service.configure_device_sync(true).await;

    let draft = local_event("l1", "Short lived", at(2025, 6, 12, 19, 0), at(2025, 6, 12, 21, 0));
    let linked = service.sync_to_device_calendar(&draft).await.unwrap();
    let native_id = linked.device_event_id.clone().unwrap();

    service.remove_from_device_calendar(&linked).await;
    assert!(gateway.stored_event(&native_id).is_none());

    // Removing again, and removing under an injected failure, both stay
    // quiet.
    service.remove_from_device_calendar(&linked).await;
    gateway.fail_removals(true);
    service.remove_from_device_calendar(&linked).await;
}

#[tokio::test]
async fn test_remove_without_linkage_is_a_no_op() {
    let gateway = FakeGateway::authorized();
    let service = service_over(&gateway).await;
    service
        .save_local_event(&local_event("l1", "Unmirrored", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0)))
        .await
        .unwrap();
    service.load_events(None).await;
    let cached = service.cached_events().await;
    assert!(!cached.is_empty());

    let unmirrored = service.local_event("l1").await.unwrap();
    service.remove_from_device_calendar(&unmirrored).await;

    // Nothing to remove: the cache was not even invalidated.
    assert_eq!(service.cached_events().await, cached);
}

#[tokio::test]
async fn test_permission_passthroughs() {
    let gateway = FakeGateway::new();
    gateway.set_grant_on_request(true);
    let service = service_over(&gateway).await;

    assert_eq!(
        service.device_permission_status(),
        PermissionStatus::NotDetermined
    );
    assert!(service.request_device_access().await.unwrap());
    assert_eq!(
        service.device_permission_status(),
        PermissionStatus::Authorized
    );
}

#[tokio::test]
async fn test_open_wires_config_through() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        database_url: format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("datebook.db").display()
        ),
        adapter_state_path: Some(dir.path().join("device_calendar.json")),
        sync_window: SyncWindow::new(7, 7),
    };
    let gateway = FakeGateway::authorized();

    let service = CalendarSyncService::open(&config, gateway.clone()).await.unwrap();
    service.configure_device_sync(true).await;
    service
        .save_local_event(&local_event("l1", "Configured", at(2025, 6, 10, 9, 0), at(2025, 6, 10, 10, 0)))
        .await
        .unwrap();
    let merged = service.load_events(None).await;
    assert_eq!(merged.len(), 1);

    // The configured window, not the default, drove the device fetch.
    let (start, end) = gateway.recorded_ranges()[0];
    assert_eq!(end - start, Duration::days(14));
}
