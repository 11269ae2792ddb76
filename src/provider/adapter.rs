//! Permission-gated access to the device calendar.
//!
//! [`DeviceCalendarAdapter`] owns the permission flow, the discovered
//! calendar list, and the identity of the app's own calendar on the device.
//! It speaks [`Event`] outward and [`NativeEvent`] toward the gateway.
//! Reads while unauthorized yield nothing; writes while unauthorized fail.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use chrono::{DateTime, Utc};

use super::gateway::{
    DeviceCalendarGateway, NativeCalendar, NativeEvent, PermissionStatus, SourceKind,
};
use crate::error::{DataError, DataResult};
use crate::models::Event;

/// Title of the calendar this application creates for its own events.
pub const APP_CALENDAR_TITLE: &str = "Datebook";

/// Adapter state carried across runs. Losing it is harmless; the app
/// calendar is found again by title on the next write.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    app_calendar_id: Option<String>,
}

struct AdapterInner {
    calendars: Vec<NativeCalendar>,
    app_calendar_id: Option<String>,
}

pub struct DeviceCalendarAdapter {
    gateway: Arc<dyn DeviceCalendarGateway>,
    state_path: Option<PathBuf>,
    // One guard for every operation, held across the whole call, so gateway
    // conversations never interleave.
    inner: Mutex<AdapterInner>,
}

impl DeviceCalendarAdapter {
    /// Wraps a gateway. `state_path` is where the adapter remembers its app
    /// calendar between runs; `None` keeps that in memory only.
    pub fn new(gateway: Arc<dyn DeviceCalendarGateway>, state_path: Option<PathBuf>) -> Self {
        let persisted = state_path
            .as_deref()
            .map(load_state)
            .unwrap_or_default();
        Self {
            gateway,
            state_path,
            inner: Mutex::new(AdapterInner {
                calendars: Vec::new(),
                app_calendar_id: persisted.app_calendar_id,
            }),
        }
    }

    /// Current consent state, straight from the platform.
    pub fn permission_status(&self) -> PermissionStatus {
        self.gateway.authorization_status()
    }

    /// Ensures the user has been asked for calendar access, prompting only
    /// from the `NotDetermined` state. Returns whether access is granted.
    /// Calendar discovery after a grant is attempted but not required; a
    /// discovery failure is logged and the grant still reported.
    pub async fn request_permission(&self) -> DataResult<bool> {
        let mut inner = self.inner.lock().await;
        match self.gateway.authorization_status() {
            PermissionStatus::Authorized => {
                if let Err(err) = self.refresh_calendars_locked(&mut inner).await {
                    warn!("Calendar discovery failed after grant: {}", err);
                }
                Ok(true)
            }
            PermissionStatus::Denied => {
                debug!("Calendar access already denied, not prompting again");
                Ok(false)
            }
            PermissionStatus::NotDetermined => {
                let granted = self.gateway.request_access().await?;
                info!(
                    "Calendar access request {}",
                    if granted { "granted" } else { "denied" }
                );
                if granted {
                    if let Err(err) = self.refresh_calendars_locked(&mut inner).await {
                        warn!("Calendar discovery failed after grant: {}", err);
                    }
                }
                Ok(granted)
            }
        }
    }

    /// Re-reads the calendar list from the device.
    pub async fn refresh_calendars(&self) -> DataResult<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_authorized()?;
        self.refresh_calendars_locked(&mut inner).await
    }

    async fn refresh_calendars_locked(&self, inner: &mut AdapterInner) -> DataResult<()> {
        inner.calendars = self.gateway.calendars().await?;
        debug!("Discovered {} device calendars", inner.calendars.len());
        Ok(())
    }

    /// The most recently discovered calendar list.
    pub async fn calendars(&self) -> Vec<NativeCalendar> {
        self.inner.lock().await.calendars.clone()
    }

    /// Device events overlapping `[start, end]`, translated to [`Event`]s.
    /// `calendars` narrows the search: `None` means every discovered
    /// calendar, discovering them first if needed, while an explicitly
    /// empty subset selects nothing. Without authorization this returns an
    /// empty list rather than an error.
    pub async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendars: Option<&[String]>,
    ) -> DataResult<Vec<Event>> {
        let mut inner = self.inner.lock().await;
        if !self.gateway.authorization_status().is_authorized() {
            debug!("Device calendar fetch skipped, access not authorized");
            return Ok(Vec::new());
        }
        let scope: Vec<String> = match calendars {
            // The gateway reads an empty slice as "every calendar", so an
            // empty subset must short-circuit before reaching it.
            Some(subset) if subset.is_empty() => return Ok(Vec::new()),
            Some(subset) => subset.to_vec(),
            None => {
                if inner.calendars.is_empty() {
                    self.refresh_calendars_locked(&mut inner).await?;
                }
                inner.calendars.iter().map(|c| c.id.clone()).collect()
            }
        };
        let natives = self.gateway.events_between(start, end, &scope).await?;
        let events = natives
            .into_iter()
            .filter_map(|native| event_from_native(native, &inner.calendars))
            .collect();
        Ok(events)
    }

    /// Looks up one device event by its native id.
    pub async fn find_event(&self, native_id: &str) -> DataResult<Option<Event>> {
        let inner = self.inner.lock().await;
        self.ensure_authorized()?;
        let found = self.gateway.find_event(native_id).await?;
        Ok(found.and_then(|native| event_from_native(native, &inner.calendars)))
    }

    /// Writes a new copy of `event` into the app's calendar on the device.
    /// Returns the mirrored event carrying the provider-assigned id.
    pub async fn create_event(&self, event: &Event) -> DataResult<Event> {
        let mut inner = self.inner.lock().await;
        self.ensure_authorized()?;
        self.create_event_locked(&mut inner, event).await
    }

    async fn create_event_locked(
        &self,
        inner: &mut AdapterInner,
        event: &Event,
    ) -> DataResult<Event> {
        let calendar = self.get_or_create_app_calendar_locked(inner).await?;
        let mut draft = native_from_event(event, &calendar.id);
        draft.id = None;
        let created = self.gateway.insert_event(&draft, &calendar.id).await?;
        info!("Mirrored '{}' into device calendar '{}'", event.title, calendar.title);
        event_from_native(created, &inner.calendars)
            .ok_or_else(|| DataError::provider("insert returned an event without an id"))
    }

    /// Pushes changed fields of `event` to its device copy. When the device
    /// copy has disappeared, falls back to creating a fresh one.
    pub async fn update_event(&self, event: &Event) -> DataResult<Event> {
        let mut inner = self.inner.lock().await;
        self.ensure_authorized()?;
        let native_id = event.device_event_id.as_deref().unwrap_or(&event.id);
        match self.gateway.find_event(native_id).await? {
            None => {
                debug!("Device copy of {} is gone, recreating", native_id);
                self.create_event_locked(&mut inner, event).await
            }
            Some(existing) => {
                let mut changed = native_from_event(event, &existing.calendar_id);
                changed.id = existing.id.clone();
                let saved = self.gateway.update_event(&changed).await?;
                event_from_native(saved, &inner.calendars)
                    .ok_or_else(|| DataError::provider("update returned an event without an id"))
            }
        }
    }

    /// Removes the device event with this native id. Removing an id the
    /// device no longer knows succeeds quietly.
    pub async fn delete_event(&self, native_id: &str) -> DataResult<()> {
        let _inner = self.inner.lock().await;
        self.ensure_authorized()?;
        let removed = self.gateway.remove_event(native_id).await?;
        if !removed {
            debug!("Device event {} was already gone", native_id);
        }
        Ok(())
    }

    /// The app's own calendar on the device, created on first use.
    ///
    /// Resolution order: the remembered calendar if it still exists and is
    /// writable, then any writable calendar titled [`APP_CALENDAR_TITLE`],
    /// then a new calendar on the best available source.
    pub async fn get_or_create_app_calendar(&self) -> DataResult<NativeCalendar> {
        let mut inner = self.inner.lock().await;
        self.ensure_authorized()?;
        self.get_or_create_app_calendar_locked(&mut inner).await
    }

    async fn get_or_create_app_calendar_locked(
        &self,
        inner: &mut AdapterInner,
    ) -> DataResult<NativeCalendar> {
        self.refresh_calendars_locked(inner).await?;

        if let Some(id) = inner.app_calendar_id.clone() {
            match inner.calendars.iter().find(|c| c.id == id) {
                Some(calendar) if calendar.allows_modifications => return Ok(calendar.clone()),
                Some(_) => warn!("Remembered app calendar {} is read-only, picking another", id),
                None => warn!("Remembered app calendar {} no longer exists", id),
            }
        }

        if let Some(calendar) = inner
            .calendars
            .iter()
            .find(|c| c.title == APP_CALENDAR_TITLE && c.allows_modifications)
        {
            let calendar = calendar.clone();
            self.remember_app_calendar(inner, calendar.id.clone());
            return Ok(calendar);
        }

        let source_id = self.pick_source().await?;
        let created = self.gateway.insert_calendar(APP_CALENDAR_TITLE, &source_id).await?;
        info!(
            "Created calendar '{}' ({}) on source {}",
            APP_CALENDAR_TITLE, created.id, source_id
        );
        self.remember_app_calendar(inner, created.id.clone());
        inner.calendars.push(created.clone());
        Ok(created)
    }

    /// Source preference for a new app calendar: a remote-syncing source,
    /// then a local one, then whatever the platform calls its default,
    /// then anything at all.
    async fn pick_source(&self) -> DataResult<String> {
        let sources = self.gateway.sources().await?;
        if let Some(source) = sources.iter().find(|s| s.kind.is_remote_syncable()) {
            return Ok(source.id.clone());
        }
        if let Some(source) = sources.iter().find(|s| s.kind == SourceKind::Local) {
            return Ok(source.id.clone());
        }
        if let Some(id) = self.gateway.default_source_id().await? {
            return Ok(id);
        }
        sources
            .first()
            .map(|s| s.id.clone())
            .ok_or_else(|| DataError::provider("device has no calendar source to create on"))
    }

    fn remember_app_calendar(&self, inner: &mut AdapterInner, id: String) {
        inner.app_calendar_id = Some(id);
        if let Some(path) = &self.state_path {
            save_state(
                path,
                &PersistedState {
                    app_calendar_id: inner.app_calendar_id.clone(),
                },
            );
        }
    }

    fn ensure_authorized(&self) -> DataResult<()> {
        if self.gateway.authorization_status().is_authorized() {
            Ok(())
        } else {
            Err(DataError::permission_denied("calendar access is not authorized"))
        }
    }
}

fn load_state(path: &Path) -> PersistedState {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        // Absent on first run.
        Err(_) => return PersistedState::default(),
    };
    match serde_json::from_reader(file) {
        Ok(state) => state,
        Err(err) => {
            warn!("Ignoring unreadable adapter state at {}: {}", path.display(), err);
            PersistedState::default()
        }
    }
}

/// Best-effort: a failed save costs one calendar lookup on the next run,
/// so it is logged rather than surfaced.
fn save_state(path: &Path, state: &PersistedState) {
    if let Some(dir) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(dir) {
            warn!("Could not create state directory {}: {}", dir.display(), err);
            return;
        }
    }
    let file = match std::fs::File::create(path) {
        Ok(file) => file,
        Err(err) => {
            warn!("Could not save adapter state to {}: {}", path.display(), err);
            return;
        }
    };
    if let Err(err) = serde_json::to_writer_pretty(file, state) {
        warn!("Could not serialize adapter state: {}", err);
    }
}

/// Translates a provider event into the crate's model. Calendar color and
/// name come from the discovered list when the calendar is known. Events
/// the provider reports without an id are dropped with a warning.
fn event_from_native(native: NativeEvent, calendars: &[NativeCalendar]) -> Option<Event> {
    let native_id = match native.id {
        Some(id) => id,
        None => {
            warn!("Dropping device event '{}' that has no id", native.title);
            return None;
        }
    };
    let calendar = calendars.iter().find(|c| c.id == native.calendar_id);
    let mut reminders = native.alarms;
    reminders.sort();
    Some(Event {
        id: native_id.clone(),
        title: native.title,
        start_time: native.start_time,
        end_time: native.end_time,
        is_all_day: native.is_all_day,
        location: native.location.unwrap_or_default(),
        calendar_id: native.calendar_id,
        description: native.notes,
        custom_color_hex: calendar.and_then(|c| c.color_hex.clone()),
        recurrence_rule: None,
        reminders,
        url: native.url,
        calendar_name: calendar.map(|c| c.title.clone()),
        is_from_device_calendar: true,
        device_event_id: Some(native_id),
    })
}

fn native_from_event(event: &Event, calendar_id: &str) -> NativeEvent {
    NativeEvent {
        id: event.device_event_id.clone(),
        calendar_id: calendar_id.to_string(),
        title: event.title.clone(),
        start_time: event.start_time,
        end_time: event.end_time,
        is_all_day: event.is_all_day,
        location: if event.location.is_empty() {
            None
        } else {
            Some(event.location.clone())
        },
        notes: event.description.clone(),
        url: event.url.clone(),
        alarms: event.reminders.clone(),
    }
}
