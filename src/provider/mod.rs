//! Integration with the device's native calendar.

pub mod adapter;
pub mod gateway;

pub use adapter::{DeviceCalendarAdapter, APP_CALENDAR_TITLE};
pub use gateway::{
    DeviceCalendarGateway, NativeCalendar, NativeEvent, NativeSource, PermissionStatus,
    SourceKind,
};
