use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use crate::error::DataResult;
use crate::models::recurrence::RecurrenceRule;

/// A calendar event, whether created locally or read from the device calendar.
///
/// Identity for comparisons is `(id, start_time, end_time)`; hashing uses the
/// id alone, so every copy of an event lands in the same hash bucket even when
/// one side has been rescheduled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: String,
    pub calendar_id: String,
    pub description: Option<String>,
    /// Display color as `#AARRGGBB`. Carried verbatim; decoding it is the
    /// presentation layer's business.
    pub custom_color_hex: Option<String>,
    /// Opaque encoding of a [`RecurrenceRule`]; `None` for one-off events.
    pub recurrence_rule: Option<String>,
    /// Absolute alarm instants, kept in ascending order.
    pub reminders: Vec<DateTime<Utc>>,
    pub url: Option<String>,
    pub calendar_name: Option<String>,
    /// True when this copy came from (or was mirrored to) the device calendar.
    pub is_from_device_calendar: bool,
    /// Identifier the device calendar knows this event by, once mirrored.
    pub device_event_id: Option<String>,
}

impl Event {
    pub fn new(
        id: String,
        title: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            start_time,
            end_time,
            is_all_day: false,
            location: String::new(),
            calendar_id: String::new(),
            description: None,
            custom_color_hex: None,
            recurrence_rule: None,
            reminders: Vec::new(),
            url: None,
            calendar_name: None,
            is_from_device_calendar: false,
            device_event_id: None,
        }
    }

    /// New locally-owned event with a generated identifier.
    pub fn with_local_id(title: String, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self::new(Uuid::new_v4().to_string(), title, start_time, end_time)
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// The range an event occupies for display purposes. All-day events
    /// stretch over whole days regardless of the stored instants.
    pub fn display_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        if self.is_all_day {
            let start = day_floor(self.start_time);
            let end = day_floor(self.end_time) + Duration::days(1);
            (start, end)
        } else {
            (self.start_time, self.end_time)
        }
    }

    /// Replaces the reminder list, restoring ascending order.
    pub fn set_reminders(&mut self, mut reminders: Vec<DateTime<Utc>>) {
        reminders.sort();
        self.reminders = reminders;
    }

    /// Decoded repeat rule, or `None` when the event does not repeat or the
    /// stored encoding is unreadable. Unreadable rules are logged and treated
    /// as absent rather than failing the whole read.
    pub fn recurrence(&self) -> Option<RecurrenceRule> {
        let raw = self.recurrence_rule.as_deref()?;
        match RecurrenceRule::decode(raw) {
            Ok(rule) => Some(rule),
            Err(err) => {
                log::warn!("Event {} has an unreadable repeat rule: {}", self.id, err);
                None
            }
        }
    }

    pub fn set_recurrence(&mut self, rule: Option<&RecurrenceRule>) -> DataResult<()> {
        self.recurrence_rule = match rule {
            Some(rule) if !rule.is_none() => Some(rule.encode()?),
            _ => None,
        };
        Ok(())
    }

    /// Start instants of this event inside `[start, end]`, expanding the
    /// repeat rule if there is one. A one-off event contributes its own start
    /// when it falls inside the window.
    pub fn occurrences_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        match self.recurrence() {
            Some(rule) => rule.occurrences_between(self.start_time, start, end),
            None => {
                if self.start_time >= start && self.start_time <= end {
                    vec![self.start_time]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.start_time == other.start_time
            && self.end_time == other.end_time
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Midnight UTC of the day containing `t`.
pub(crate) fn day_floor(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// The one-day window starting at midnight UTC of `day`.
pub(crate) fn day_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}
