//! datebook is the event data layer of a personal calendar: a durable
//! local store, a permission-gated bridge to the device's native calendar,
//! and a facade that merges the two into one event list.
//!
//! The three pieces compose bottom-up:
//!
//! * [`store::EventStore`] persists [`models::Event`]s in SQLite and
//!   answers range and day queries.
//! * [`provider::DeviceCalendarAdapter`] drives a platform
//!   [`provider::DeviceCalendarGateway`] behind the user's consent,
//!   discovers calendars, and mirrors events into the app's own calendar.
//! * [`sync::CalendarSyncService`] merges both sides, caches the last
//!   load, and invalidates that cache on every write.
//!
//! Events carry their repeat rule as an opaque string; decode it with
//! [`models::RecurrenceRule`] to expand occurrences or render it for
//! humans.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod provider;
pub mod store;
pub mod sync;

pub use config::{StoreConfig, SyncWindow};
pub use error::{DataError, DataResult};
pub use models::{
    Event, Frequency, MonthlySelector, Occurrences, RecurrenceEnd, RecurrenceRule, YearlySelector,
};
pub use provider::{
    DeviceCalendarAdapter, DeviceCalendarGateway, NativeCalendar, NativeEvent, NativeSource,
    PermissionStatus, SourceKind, APP_CALENDAR_TITLE,
};
pub use store::EventStore;
pub use sync::CalendarSyncService;
