//! The read/write facade the rest of the application talks to.
//!
//! [`CalendarSyncService`] merges the local store with the device calendar
//! and keeps a cache of the last merged load. Reads prefer the device copy
//! when both sides know an event; every local write invalidates the cache,
//! so the next read rebuilds it from both sources.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::{StoreConfig, SyncWindow};
use crate::error::DataResult;
use crate::models::{day_window, Event};
use crate::provider::{DeviceCalendarAdapter, DeviceCalendarGateway, PermissionStatus};
use crate::store::EventStore;

struct ServiceState {
    cached_events: Vec<Event>,
    cached_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    include_device_events: bool,
}

pub struct CalendarSyncService {
    store: Arc<EventStore>,
    adapter: Arc<DeviceCalendarAdapter>,
    window: SyncWindow,
    // Cache and toggle share one guard so a load-merge-cache sequence can
    // never interleave with another load.
    state: Mutex<ServiceState>,
}

impl CalendarSyncService {
    /// Builds the facade from its two halves. Device events stay out of
    /// reads until [`configure_device_sync`](Self::configure_device_sync)
    /// turns them on.
    pub fn new(store: Arc<EventStore>, adapter: Arc<DeviceCalendarAdapter>) -> Self {
        Self {
            store,
            adapter,
            window: SyncWindow::default(),
            state: Mutex::new(ServiceState {
                cached_events: Vec::new(),
                cached_range: None,
                include_device_events: false,
            }),
        }
    }

    pub fn with_sync_window(mut self, window: SyncWindow) -> Self {
        self.window = window;
        self
    }

    /// Opens the store named by `config` and wires the whole facade up.
    pub async fn open(
        config: &StoreConfig,
        gateway: Arc<dyn DeviceCalendarGateway>,
    ) -> DataResult<Self> {
        let store = EventStore::open(config).await?;
        let adapter = DeviceCalendarAdapter::new(gateway, config.adapter_state_path.clone());
        Ok(Self::new(Arc::new(store), Arc::new(adapter)).with_sync_window(config.sync_window))
    }

    /// Loads the merged event list and caches it.
    ///
    /// Local events are always all loaded; device events only for `range`
    /// (the configured window around now when `None`) and only while device
    /// sync is on. When the device side fails the result quietly degrades
    /// to local-only.
    pub async fn load_events(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Vec<Event> {
        let mut state = self.state.lock().await;
        let local = self.store.all_events().await;
        let (merged, fetched_range) = if state.include_device_events {
            let (start, end) = range.unwrap_or_else(|| self.window.around_now());
            let device = match self.adapter.fetch_events(start, end, None).await {
                Ok(events) => events,
                Err(err) => {
                    warn!("Device calendar fetch failed, serving local events only: {}", err);
                    Vec::new()
                }
            };
            (merge_events(local, device), Some((start, end)))
        } else {
            (merge_events(local, Vec::new()), None)
        };
        state.cached_events = merged.clone();
        state.cached_range = fetched_range;
        debug!("Cached {} merged events", merged.len());
        merged
    }

    /// Merged events for one day, fetched fresh. Does not touch the cache.
    pub async fn events_on(&self, day: NaiveDate) -> Vec<Event> {
        let state = self.state.lock().await;
        let (start, end) = day_window(day);
        let local = self.store.events_for_day(day).await;
        let device = if state.include_device_events {
            match self.adapter.fetch_events(start, end, None).await {
                Ok(events) => events,
                Err(err) => {
                    warn!("Device calendar fetch failed for {}: {}", day, err);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        merge_events(local, device)
    }

    /// Rebuilds the cache; same contract as [`load_events`](Self::load_events).
    pub async fn refresh(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Vec<Event> {
        self.load_events(range).await
    }

    /// The last merged load. Empty after any write until the next load.
    pub async fn cached_events(&self) -> Vec<Event> {
        self.state.lock().await.cached_events.clone()
    }

    /// The device-fetch range behind the current cache, when the cache was
    /// built with device sync on.
    pub async fn cached_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.state.lock().await.cached_range
    }

    pub async fn save_local_event(&self, event: &Event) -> DataResult<()> {
        self.store.save_event(event).await?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Same upsert as [`save_local_event`](Self::save_local_event); kept as
    /// its own entry point so call sites read as edits.
    pub async fn update_local_event(&self, event: &Event) -> DataResult<()> {
        self.save_local_event(event).await
    }

    pub async fn delete_local_event(&self, id: &str) -> DataResult<()> {
        self.store.delete_event(id).await?;
        self.invalidate_cache().await;
        Ok(())
    }

    /// Local reads that skip the merge entirely.
    pub async fn local_event(&self, id: &str) -> Option<Event> {
        self.store.event(id).await
    }

    pub async fn local_events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Event> {
        self.store.events_in_range(start, end).await
    }

    /// Mirrors `event` to the device calendar, creating or updating the
    /// device copy as appropriate. Returns the event relabeled with its
    /// device linkage; persisting that copy is the caller's decision.
    pub async fn sync_to_device_calendar(&self, event: &Event) -> DataResult<Event> {
        let mirrored = if event.device_event_id.is_some() {
            self.adapter.update_event(event).await?
        } else {
            self.adapter.create_event(event).await?
        };
        self.invalidate_cache().await;

        let mut linked = event.clone();
        linked.is_from_device_calendar = true;
        linked.device_event_id = mirrored.device_event_id;
        Ok(linked)
    }

    /// Removes the device copy of `event`, if it has one. Best effort: a
    /// device-side failure is logged, not returned, since the local copy is
    /// already gone or going.
    pub async fn remove_from_device_calendar(&self, event: &Event) {
        let native_id = match &event.device_event_id {
            Some(id) => id.clone(),
            None => {
                debug!("Event {} has no device copy, nothing to remove", event.id);
                return;
            }
        };
        if let Err(err) = self.adapter.delete_event(&native_id).await {
            warn!("Could not remove device copy {}: {}", native_id, err);
        }
        self.invalidate_cache().await;
    }

    /// Turns merging of device events on or off. Either change clears the
    /// cache so stale device copies cannot linger after a disable.
    pub async fn configure_device_sync(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        if state.include_device_events != enabled {
            debug!("Device sync {}", if enabled { "enabled" } else { "disabled" });
        }
        state.include_device_events = enabled;
        state.cached_events.clear();
        state.cached_range = None;
    }

    pub async fn device_sync_enabled(&self) -> bool {
        self.state.lock().await.include_device_events
    }

    pub fn device_permission_status(&self) -> PermissionStatus {
        self.adapter.permission_status()
    }

    pub async fn request_device_access(&self) -> DataResult<bool> {
        self.adapter.request_permission().await
    }

    async fn invalidate_cache(&self) {
        let mut state = self.state.lock().await;
        state.cached_events.clear();
        state.cached_range = None;
    }
}

/// Merges the two sides by event id. Device copies win because the device
/// calendar is where cross-device edits land first; the local copy of a
/// mirrored event is a cache of it. Result is ordered by start then end.
fn merge_events(local: Vec<Event>, device: Vec<Event>) -> Vec<Event> {
    let mut by_id: HashMap<String, Event> = HashMap::with_capacity(local.len() + device.len());
    for event in local {
        by_id.insert(event.id.clone(), event);
    }
    for event in device {
        by_id.insert(event.id.clone(), event);
    }
    let mut merged: Vec<Event> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.end_time.cmp(&b.end_time))
    });
    merged
}
