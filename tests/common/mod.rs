//! Shared fixtures: an in-memory stateful device-calendar fake and a few
//! builders. The fake behaves like a tiny calendar service, including
//! failure injection, so tests can walk whole permission and mirror flows.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use datebook::{
    DataError, DataResult, DeviceCalendarGateway, Event, NativeCalendar, NativeEvent,
    NativeSource, PermissionStatus, SourceKind,
};

#[derive(Default)]
struct FakeState {
    permission: PermissionStatus,
    grant_on_request: bool,
    calendars: Vec<NativeCalendar>,
    sources: Vec<NativeSource>,
    default_source_id: Option<String>,
    events: HashMap<String, NativeEvent>,
    next_id: u32,
    fail_inserts: bool,
    fail_fetches: bool,
    fail_removals: bool,
    request_access_calls: u32,
    events_between_calls: u32,
    recorded_ranges: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

/// In-memory device calendar. State is plain data behind a mutex; tests
/// mutate it directly through the helper methods.
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState::default()),
        })
    }

    /// A gateway that is already authorized and has one writable calendar
    /// ("cal-main") on one local source ("src-local").
    pub fn authorized() -> Arc<Self> {
        let fake = Self::new();
        fake.set_permission(PermissionStatus::Authorized);
        fake.add_source(source("src-local", "On My Device", SourceKind::Local));
        fake.add_calendar(calendar("cal-main", "Personal", true));
        fake
    }

    pub fn set_permission(&self, permission: PermissionStatus) {
        self.state.lock().unwrap().permission = permission;
    }

    pub fn set_grant_on_request(&self, grant: bool) {
        self.state.lock().unwrap().grant_on_request = grant;
    }

    pub fn add_calendar(&self, calendar: NativeCalendar) {
        self.state.lock().unwrap().calendars.push(calendar);
    }

    pub fn add_source(&self, source: NativeSource) {
        self.state.lock().unwrap().sources.push(source);
    }

    pub fn remove_calendar(&self, id: &str) {
        self.state.lock().unwrap().calendars.retain(|c| c.id != id);
    }

    pub fn set_default_source(&self, id: &str) {
        self.state.lock().unwrap().default_source_id = Some(id.to_string());
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.state.lock().unwrap().fail_inserts = fail;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.state.lock().unwrap().fail_fetches = fail;
    }

    pub fn fail_removals(&self, fail: bool) {
        self.state.lock().unwrap().fail_removals = fail;
    }

    /// Seeds a device event directly, as though another app created it.
    /// Returns the assigned native id.
    pub fn seed_event(&self, mut event: NativeEvent) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("native-{}", state.next_id);
        event.id = Some(id.clone());
        state.events.insert(id.clone(), event);
        id
    }

    pub fn stored_event(&self, native_id: &str) -> Option<NativeEvent> {
        self.state.lock().unwrap().events.get(native_id).cloned()
    }

    pub fn stored_event_count(&self) -> usize {
        self.state.lock().unwrap().events.len()
    }

    pub fn calendar_titled(&self, title: &str) -> Option<NativeCalendar> {
        self.state
            .lock()
            .unwrap()
            .calendars
            .iter()
            .find(|c| c.title == title)
            .cloned()
    }

    pub fn calendar_count(&self) -> usize {
        self.state.lock().unwrap().calendars.len()
    }

    pub fn request_access_calls(&self) -> u32 {
        self.state.lock().unwrap().request_access_calls
    }

    pub fn events_between_calls(&self) -> u32 {
        self.state.lock().unwrap().events_between_calls
    }

    pub fn recorded_ranges(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.state.lock().unwrap().recorded_ranges.clone()
    }
}

#[async_trait]
impl DeviceCalendarGateway for FakeGateway {
    fn authorization_status(&self) -> PermissionStatus {
        self.state.lock().unwrap().permission
    }

    async fn request_access(&self) -> DataResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.request_access_calls += 1;
        if state.permission == PermissionStatus::NotDetermined {
            state.permission = if state.grant_on_request {
                PermissionStatus::Authorized
            } else {
                PermissionStatus::Denied
            };
        }
        Ok(state.permission == PermissionStatus::Authorized)
    }

    async fn calendars(&self) -> DataResult<Vec<NativeCalendar>> {
        Ok(self.state.lock().unwrap().calendars.clone())
    }

    async fn sources(&self) -> DataResult<Vec<NativeSource>> {
        Ok(self.state.lock().unwrap().sources.clone())
    }

    async fn default_source_id(&self) -> DataResult<Option<String>> {
        Ok(self.state.lock().unwrap().default_source_id.clone())
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_ids: &[String],
    ) -> DataResult<Vec<NativeEvent>> {
        let mut state = self.state.lock().unwrap();
        state.events_between_calls += 1;
        state.recorded_ranges.push((start, end));
        if state.fail_fetches {
            return Err(DataError::provider("injected fetch failure"));
        }
        let events = state
            .events
            .values()
            .filter(|e| e.start_time <= end && e.end_time >= start)
            .filter(|e| calendar_ids.is_empty() || calendar_ids.contains(&e.calendar_id))
            .cloned()
            .collect();
        Ok(events)
    }

    async fn find_event(&self, native_id: &str) -> DataResult<Option<NativeEvent>> {
        Ok(self.state.lock().unwrap().events.get(native_id).cloned())
    }

    async fn insert_event(
        &self,
        event: &NativeEvent,
        calendar_id: &str,
    ) -> DataResult<NativeEvent> {
        let mut state = self.state.lock().unwrap();
        if state.fail_inserts {
            return Err(DataError::provider("injected insert failure"));
        }
        state.next_id += 1;
        let id = format!("native-{}", state.next_id);
        let mut stored = event.clone();
        stored.id = Some(id.clone());
        stored.calendar_id = calendar_id.to_string();
        state.events.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_event(&self, event: &NativeEvent) -> DataResult<NativeEvent> {
        let mut state = self.state.lock().unwrap();
        let id = event
            .id
            .clone()
            .ok_or_else(|| DataError::invalid_data("update requires a native id"))?;
        if !state.events.contains_key(&id) {
            return Err(DataError::not_found(format!("device event {}", id)));
        }
        state.events.insert(id, event.clone());
        Ok(event.clone())
    }

    async fn remove_event(&self, native_id: &str) -> DataResult<bool> {
        let mut state = self.state.lock().unwrap();
        if state.fail_removals {
            return Err(DataError::provider("injected removal failure"));
        }
        Ok(state.events.remove(native_id).is_some())
    }

    async fn insert_calendar(&self, title: &str, source_id: &str) -> DataResult<NativeCalendar> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let created = NativeCalendar {
            id: format!("cal-{}", state.next_id),
            title: title.to_string(),
            allows_modifications: true,
            color_hex: None,
            source_id: Some(source_id.to_string()),
        };
        state.calendars.push(created.clone());
        Ok(created)
    }
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn local_event(id: &str, title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
    let mut event = Event::new(id.to_string(), title.to_string(), start, end);
    event.calendar_id = "local".to_string();
    event
}

pub fn native_event(
    calendar_id: &str,
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> NativeEvent {
    NativeEvent {
        id: None,
        calendar_id: calendar_id.to_string(),
        title: title.to_string(),
        start_time: start,
        end_time: end,
        is_all_day: false,
        location: None,
        notes: None,
        url: None,
        alarms: Vec::new(),
    }
}

pub fn calendar(id: &str, title: &str, writable: bool) -> NativeCalendar {
    NativeCalendar {
        id: id.to_string(),
        title: title.to_string(),
        allows_modifications: writable,
        color_hex: None,
        source_id: None,
    }
}

pub fn source(id: &str, title: &str, kind: SourceKind) -> NativeSource {
    NativeSource {
        id: id.to_string(),
        title: title.to_string(),
        kind,
    }
}
