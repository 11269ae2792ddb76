//! The seam between this crate and the device's native calendar service.
//!
//! Everything platform-specific lives behind [`DeviceCalendarGateway`]. The
//! adapter drives the trait and never sees an SDK handle; tests drive it
//! with mocks and fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::DataResult;

/// Consent state for the device calendar. Fresh installs start at
/// `NotDetermined`; the user moves it to `Denied` or `Authorized` exactly
/// once, after which only system settings change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    NotDetermined,
    Denied,
    Authorized,
}

impl Default for PermissionStatus {
    fn default() -> Self {
        Self::NotDetermined
    }
}

impl PermissionStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized)
    }
}

/// Where a native calendar's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Local,
    CalDav,
    Exchange,
    Subscribed,
    Birthdays,
    Other,
}

impl SourceKind {
    /// True for sources whose calendars sync to other devices.
    pub fn is_remote_syncable(&self) -> bool {
        matches!(self, Self::CalDav | Self::Exchange)
    }
}

/// An account or backing store that calendars belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeSource {
    pub id: String,
    pub title: String,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeCalendar {
    pub id: String,
    pub title: String,
    /// False for read-only calendars such as subscriptions and holidays.
    pub allows_modifications: bool,
    /// Display color as `#AARRGGBB`, when the provider reports one.
    pub color_hex: Option<String>,
    pub source_id: Option<String>,
}

/// An event as the provider speaks it. `id` is `None` until the provider
/// assigns one on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeEvent {
    pub id: Option<String>,
    pub calendar_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub url: Option<String>,
    /// Absolute alarm instants.
    pub alarms: Vec<DateTime<Utc>>,
}

/// Narrow surface over the native calendar SDK.
///
/// Implementations wrap the platform client and translate its failures into
/// [`DataError`](crate::error::DataError). Calls other than
/// `authorization_status` and `request_access` assume access has already
/// been granted; the adapter enforces that before calling.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeviceCalendarGateway: Send + Sync {
    /// Current consent state, read fresh from the platform on every call.
    fn authorization_status(&self) -> PermissionStatus;

    /// Shows the system consent prompt. Returns whether access was granted.
    /// On platforms that only prompt once, later calls report the settled
    /// answer without prompting.
    async fn request_access(&self) -> DataResult<bool>;

    async fn calendars(&self) -> DataResult<Vec<NativeCalendar>>;

    async fn sources(&self) -> DataResult<Vec<NativeSource>>;

    /// The source new calendars land on by default, when the platform has
    /// a notion of one.
    async fn default_source_id(&self) -> DataResult<Option<String>>;

    /// Events whose interval overlaps `[start, end]`. An empty
    /// `calendar_ids` slice means every visible calendar.
    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_ids: &[String],
    ) -> DataResult<Vec<NativeEvent>>;

    async fn find_event(&self, native_id: &str) -> DataResult<Option<NativeEvent>>;

    /// Inserts into the given calendar. The returned event carries the
    /// provider-assigned id.
    async fn insert_event(
        &self,
        event: &NativeEvent,
        calendar_id: &str,
    ) -> DataResult<NativeEvent>;

    /// Replaces the stored event carrying `event.id`.
    async fn update_event(&self, event: &NativeEvent) -> DataResult<NativeEvent>;

    /// Removes by native id. Returns false when no such event existed.
    async fn remove_event(&self, native_id: &str) -> DataResult<bool>;

    async fn insert_calendar(&self, title: &str, source_id: &str) -> DataResult<NativeCalendar>;
}
