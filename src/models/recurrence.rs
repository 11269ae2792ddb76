//! Repeat rules and their human-readable rendering.
//!
//! A rule describes how an event repeats starting from its own start time
//! (the seed). Rules travel inside [`Event`](crate::models::Event) as an
//! opaque JSON string so the storage schema never learns their shape;
//! [`RecurrenceRule::encode`] and [`RecurrenceRule::decode`] are the only
//! two places that know the encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{DataError, DataResult};

/// How often an event repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    None,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// When a repeating event stops producing occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceEnd {
    /// Repeats forever.
    Never,
    /// A fixed number of occurrences, counting the seed itself.
    Count(u32),
    /// Repeats through this instant inclusive.
    Until(DateTime<Utc>),
}

impl Default for RecurrenceEnd {
    fn default() -> Self {
        Self::Never
    }
}

/// Which days a monthly rule lands on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonthlySelector {
    /// Fixed days of the month, 1 through 31. Days a month does not have
    /// are skipped, never shifted.
    ByDate { days: BTreeSet<u32> },
    /// The `ordinal`-th `weekday` of the month. Ordinal runs 1 through 5,
    /// where 5 means "last"; weekday runs 1 (Sunday) through 7 (Saturday).
    ByWeekday { ordinal: u8, weekday: u8 },
}

/// Which days a yearly rule lands on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum YearlySelector {
    /// The seed's day-of-month in each listed month (1 through 12).
    ByDate { months: BTreeSet<u32> },
    /// The `ordinal`-th `weekday` of each listed month, same numbering as
    /// [`MonthlySelector::ByWeekday`].
    ByWeekday {
        months: BTreeSet<u32>,
        ordinal: u8,
        weekday: u8,
    },
}

/// A repeat rule. Selectors only apply to their own frequency; anything
/// irrelevant to the chosen frequency is ignored during expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Step between periods in units of the frequency. 1 means every
    /// day/week/month/year, 2 every other, and so on. Zero is treated
    /// as 1.
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub end: RecurrenceEnd,
    /// Weekly only: days of the week, 0 (Sunday) through 6 (Saturday).
    /// Empty means the seed's own weekday.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub weekdays: BTreeSet<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<MonthlySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yearly: Option<YearlySelector>,
}

fn default_interval() -> u32 {
    1
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self::none()
    }
}

impl RecurrenceRule {
    fn with_frequency(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            end: RecurrenceEnd::Never,
            weekdays: BTreeSet::new(),
            monthly: None,
            yearly: None,
        }
    }

    /// A rule that never repeats.
    pub fn none() -> Self {
        Self::with_frequency(Frequency::None)
    }

    pub fn daily() -> Self {
        Self::with_frequency(Frequency::Daily)
    }

    pub fn weekly() -> Self {
        Self::with_frequency(Frequency::Weekly)
    }

    /// Weekly on the given days, 0 (Sunday) through 6 (Saturday).
    pub fn weekly_on<I: IntoIterator<Item = u8>>(weekdays: I) -> Self {
        let mut rule = Self::with_frequency(Frequency::Weekly);
        rule.weekdays = weekdays.into_iter().collect();
        rule
    }

    pub fn monthly() -> Self {
        Self::with_frequency(Frequency::Monthly)
    }

    /// Monthly on fixed days of the month.
    pub fn monthly_on_days<I: IntoIterator<Item = u32>>(days: I) -> Self {
        let mut rule = Self::with_frequency(Frequency::Monthly);
        rule.monthly = Some(MonthlySelector::ByDate {
            days: days.into_iter().collect(),
        });
        rule
    }

    /// Monthly on the `ordinal`-th `weekday` (ordinal 5 means "last").
    pub fn monthly_on_weekday(ordinal: u8, weekday: u8) -> Self {
        let mut rule = Self::with_frequency(Frequency::Monthly);
        rule.monthly = Some(MonthlySelector::ByWeekday { ordinal, weekday });
        rule
    }

    pub fn yearly() -> Self {
        Self::with_frequency(Frequency::Yearly)
    }

    /// Yearly on the seed's day-of-month in the given months.
    pub fn yearly_in_months<I: IntoIterator<Item = u32>>(months: I) -> Self {
        let mut rule = Self::with_frequency(Frequency::Yearly);
        rule.yearly = Some(YearlySelector::ByDate {
            months: months.into_iter().collect(),
        });
        rule
    }

    pub fn yearly_on_weekday<I: IntoIterator<Item = u32>>(
        months: I,
        ordinal: u8,
        weekday: u8,
    ) -> Self {
        let mut rule = Self::with_frequency(Frequency::Yearly);
        rule.yearly = Some(YearlySelector::ByWeekday {
            months: months.into_iter().collect(),
            ordinal,
            weekday,
        });
        rule
    }

    /// Sets the period step: every `interval` days/weeks/months/years.
    /// Zero is treated as 1.
    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Stops after `count` occurrences, the seed included.
    pub fn ending_after(mut self, count: u32) -> Self {
        self.end = RecurrenceEnd::Count(count);
        self
    }

    /// Stops at `date` inclusive.
    pub fn until(mut self, date: DateTime<Utc>) -> Self {
        self.end = RecurrenceEnd::Until(date);
        self
    }

    pub fn is_none(&self) -> bool {
        self.frequency == Frequency::None
    }

    /// Checks field ranges. Called by [`encode`](Self::encode) and
    /// [`decode`](Self::decode) so malformed rules never cross the
    /// persistence boundary in either direction.
    pub fn validate(&self) -> DataResult<()> {
        if let RecurrenceEnd::Count(0) = self.end {
            return Err(DataError::invalid_data(
                "repeat count must be at least one occurrence",
            ));
        }
        if let Some(day) = self.weekdays.iter().find(|d| **d > 6) {
            return Err(DataError::invalid_data(format!(
                "weekday index {} is out of range 0..=6",
                day
            )));
        }
        match &self.monthly {
            Some(MonthlySelector::ByDate { days }) => {
                if let Some(day) = days.iter().find(|d| **d == 0 || **d > 31) {
                    return Err(DataError::invalid_data(format!(
                        "day of month {} is out of range 1..=31",
                        day
                    )));
                }
            }
            Some(MonthlySelector::ByWeekday { ordinal, weekday }) => {
                validate_ordinal_weekday(*ordinal, *weekday)?;
            }
            None => {}
        }
        match &self.yearly {
            Some(YearlySelector::ByDate { months }) => validate_months(months)?,
            Some(YearlySelector::ByWeekday {
                months,
                ordinal,
                weekday,
            }) => {
                validate_months(months)?;
                validate_ordinal_weekday(*ordinal, *weekday)?;
            }
            None => {}
        }
        Ok(())
    }

    /// Encodes the rule for storage inside an event.
    pub fn encode(&self) -> DataResult<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a rule previously produced by [`encode`](Self::encode).
    pub fn decode(raw: &str) -> DataResult<Self> {
        let mut rule: Self = serde_json::from_str(raw)?;
        rule.interval = rule.interval.max(1);
        rule.validate()?;
        Ok(rule)
    }

    /// Human-readable summary, e.g. "Every 2 weeks on Monday and Friday,
    /// 10 times".
    pub fn describe(&self) -> String {
        let mut text = match self.frequency {
            Frequency::None => return "Does not repeat".to_string(),
            Frequency::Daily => every_phrase(self.interval, "day", "days"),
            Frequency::Weekly => {
                let mut text = every_phrase(self.interval, "week", "weeks");
                if !self.weekdays.is_empty() {
                    let names: Vec<&str> = self
                        .weekdays
                        .iter()
                        .filter(|d| **d <= 6)
                        .map(|d| WEEKDAY_NAMES[*d as usize])
                        .collect();
                    text.push_str(" on ");
                    text.push_str(&join_names(&names));
                }
                text
            }
            Frequency::Monthly => {
                let mut text = every_phrase(self.interval, "month", "months");
                match &self.monthly {
                    Some(MonthlySelector::ByDate { days }) => {
                        let names: Vec<String> = days.iter().map(|d| ordinal_name(*d)).collect();
                        let names: Vec<&str> = names.iter().map(String::as_str).collect();
                        text.push_str(" on the ");
                        text.push_str(&join_names(&names));
                    }
                    Some(MonthlySelector::ByWeekday { ordinal, weekday }) => {
                        text.push_str(" on the ");
                        text.push_str(&nth_weekday_phrase(*ordinal, *weekday));
                    }
                    None => {}
                }
                text
            }
            Frequency::Yearly => {
                let mut text = every_phrase(self.interval, "year", "years");
                match &self.yearly {
                    Some(YearlySelector::ByDate { months }) => {
                        text.push_str(" in ");
                        text.push_str(&join_names(&month_names(months)));
                    }
                    Some(YearlySelector::ByWeekday {
                        months,
                        ordinal,
                        weekday,
                    }) => {
                        text.push_str(" on the ");
                        text.push_str(&nth_weekday_phrase(*ordinal, *weekday));
                        if !months.is_empty() {
                            text.push_str(" of ");
                            text.push_str(&join_names(&month_names(months)));
                        }
                    }
                    None => {}
                }
                text
            }
        };
        match self.end {
            RecurrenceEnd::Never => text.push_str(", forever"),
            RecurrenceEnd::Count(1) => text.push_str(", once"),
            RecurrenceEnd::Count(n) => text.push_str(&format!(", {} times", n)),
            RecurrenceEnd::Until(date) => {
                text.push_str(&format!(", until {}", date.format("%B %-d, %Y")))
            }
        }
        text
    }
}

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn validate_ordinal_weekday(ordinal: u8, weekday: u8) -> DataResult<()> {
    if ordinal == 0 || ordinal > 5 {
        return Err(DataError::invalid_data(format!(
            "week ordinal {} is out of range 1..=5",
            ordinal
        )));
    }
    if weekday == 0 || weekday > 7 {
        return Err(DataError::invalid_data(format!(
            "weekday {} is out of range 1..=7",
            weekday
        )));
    }
    Ok(())
}

fn validate_months(months: &BTreeSet<u32>) -> DataResult<()> {
    if let Some(month) = months.iter().find(|m| **m == 0 || **m > 12) {
        return Err(DataError::invalid_data(format!(
            "month {} is out of range 1..=12",
            month
        )));
    }
    Ok(())
}

fn every_phrase(interval: u32, singular: &str, plural: &str) -> String {
    if interval <= 1 {
        format!("Every {}", singular)
    } else {
        format!("Every {} {}", interval, plural)
    }
}

/// "Monday", "Monday and Friday", "Monday, Wednesday and Friday".
fn join_names(names: &[&str]) -> String {
    match names.len() {
        0 => String::new(),
        1 => names[0].to_string(),
        _ => format!(
            "{} and {}",
            names[..names.len() - 1].join(", "),
            names[names.len() - 1]
        ),
    }
}

fn month_names(months: &BTreeSet<u32>) -> Vec<&'static str> {
    months
        .iter()
        .filter(|m| (1..=12).contains(*m))
        .map(|m| MONTH_NAMES[(*m - 1) as usize])
        .collect()
}

/// "2nd Tuesday", "last Friday". Weekday numbering is 1 (Sunday) through 7.
fn nth_weekday_phrase(ordinal: u8, weekday: u8) -> String {
    let day = if (1..=7).contains(&weekday) {
        WEEKDAY_NAMES[(weekday - 1) as usize]
    } else {
        "day"
    };
    if ordinal >= 5 {
        format!("last {}", day)
    } else {
        format!("{} {}", ordinal_name(ordinal as u32), day)
    }
}

fn ordinal_name(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (1, 11) | (2, 12) | (3, 13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}
