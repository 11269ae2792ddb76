//! Expansion of repeat rules into concrete start instants.
//!
//! Expansion is seed-driven: the event's own start time is always the first
//! occurrence, and later occurrences keep its time of day. All date math is
//! UTC; weeks start on Sunday to match the weekday numbering in
//! [`RecurrenceRule`].

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc, Weekday};
use std::collections::VecDeque;

use crate::models::recurrence::{
    Frequency, MonthlySelector, RecurrenceEnd, RecurrenceRule, YearlySelector,
};

/// A selector can name days that simply never exist (a February 30th, say).
/// Expansion stops after this many consecutive empty periods.
const EMPTY_PERIOD_LIMIT: u32 = 64;

impl RecurrenceRule {
    /// Iterator over the start instants this rule produces from `seed`,
    /// in ascending order, seed first. Unbounded for rules that never end;
    /// pair with a window or a `take`.
    pub fn occurrences(&self, seed: DateTime<Utc>) -> Occurrences {
        Occurrences {
            rule: self.clone(),
            seed,
            time_of_day: seed.time(),
            period: 0,
            buffer: VecDeque::new(),
            emitted: 0,
            seed_yielded: false,
            done: false,
        }
    }

    /// Occurrences that fall inside `[start, end]`, both ends inclusive.
    /// The seed itself is filtered like any other occurrence.
    pub fn occurrences_between(
        &self,
        seed: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        if end < start {
            return Vec::new();
        }
        self.occurrences(seed)
            .take_while(|instant| *instant <= end)
            .filter(|instant| *instant >= start)
            .collect()
    }
}

/// Iterator produced by [`RecurrenceRule::occurrences`].
pub struct Occurrences {
    rule: RecurrenceRule,
    seed: DateTime<Utc>,
    time_of_day: NaiveTime,
    period: u64,
    buffer: VecDeque<NaiveDate>,
    emitted: u32,
    seed_yielded: bool,
    done: bool,
}

impl Occurrences {
    fn count_reached(&self) -> bool {
        matches!(self.rule.end, RecurrenceEnd::Count(n) if self.emitted >= n)
    }

    /// Candidate dates inside one period, ascending. `None` means the
    /// calendar ran out, an empty vec that the period has no matching days.
    fn period_candidates(&self, period: u64) -> Option<Vec<NaiveDate>> {
        let interval = i64::from(self.rule.interval.max(1));
        let step = period as i64 * interval;
        let seed_date = self.seed.date_naive();

        match self.rule.frequency {
            Frequency::None => None,
            Frequency::Daily => {
                let date = seed_date.checked_add_signed(Duration::days(step))?;
                Some(vec![date])
            }
            Frequency::Weekly => {
                let week_start = sunday_on_or_before(seed_date)
                    .checked_add_signed(Duration::days(step * 7))?;
                let days: Vec<u8> = if self.rule.weekdays.is_empty() {
                    vec![seed_date.weekday().num_days_from_sunday() as u8]
                } else {
                    self.rule
                        .weekdays
                        .iter()
                        .copied()
                        .filter(|day| *day <= 6)
                        .collect()
                };
                Some(
                    days.into_iter()
                        .filter_map(|day| {
                            week_start.checked_add_signed(Duration::days(i64::from(day)))
                        })
                        .collect(),
                )
            }
            Frequency::Monthly => {
                let months_ahead = u32::try_from(step).ok()?;
                let month_start = first_of_month(seed_date)?
                    .checked_add_months(Months::new(months_ahead))?;
                let (year, month) = (month_start.year(), month_start.month());
                let dates = match &self.rule.monthly {
                    Some(MonthlySelector::ByDate { days }) => days
                        .iter()
                        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, *day))
                        .collect(),
                    Some(MonthlySelector::ByWeekday { ordinal, weekday }) => {
                        nth_weekday_of_month(year, month, *ordinal, *weekday)
                            .into_iter()
                            .collect()
                    }
                    None => NaiveDate::from_ymd_opt(year, month, seed_date.day())
                        .into_iter()
                        .collect(),
                };
                Some(dates)
            }
            Frequency::Yearly => {
                let year = i32::try_from(i64::from(seed_date.year()) + step).ok()?;
                if year > NaiveDate::MAX.year() {
                    return None;
                }
                let dates = match &self.rule.yearly {
                    Some(YearlySelector::ByDate { months }) => {
                        selector_months(months, seed_date.month())
                            .into_iter()
                            .filter_map(|month| {
                                NaiveDate::from_ymd_opt(year, month, seed_date.day())
                            })
                            .collect()
                    }
                    Some(YearlySelector::ByWeekday {
                        months,
                        ordinal,
                        weekday,
                    }) => selector_months(months, seed_date.month())
                        .into_iter()
                        .filter_map(|month| nth_weekday_of_month(year, month, *ordinal, *weekday))
                        .collect(),
                    None => NaiveDate::from_ymd_opt(year, seed_date.month(), seed_date.day())
                        .into_iter()
                        .collect(),
                };
                Some(dates)
            }
        }
    }
}

impl Iterator for Occurrences {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<DateTime<Utc>> {
        if self.done {
            return None;
        }

        if !self.seed_yielded {
            self.seed_yielded = true;
            self.emitted = 1;
            if self.rule.is_none() || self.count_reached() {
                self.done = true;
            }
            return Some(self.seed);
        }

        let mut empty_periods = 0u32;
        loop {
            if let Some(date) = self.buffer.pop_front() {
                let instant = date.and_time(self.time_of_day).and_utc();
                // Period zero can contain days at or before the seed.
                if instant <= self.seed {
                    continue;
                }
                if let RecurrenceEnd::Until(limit) = self.rule.end {
                    if instant > limit {
                        self.done = true;
                        return None;
                    }
                }
                self.emitted += 1;
                if self.count_reached() {
                    self.done = true;
                }
                return Some(instant);
            }

            match self.period_candidates(self.period) {
                None => {
                    self.done = true;
                    return None;
                }
                Some(dates) => {
                    self.period += 1;
                    if dates.is_empty() {
                        empty_periods += 1;
                        if empty_periods > EMPTY_PERIOD_LIMIT {
                            self.done = true;
                            return None;
                        }
                    } else {
                        empty_periods = 0;
                        self.buffer.extend(dates);
                    }
                }
            }
        }
    }
}

fn sunday_on_or_before(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

fn first_of_month(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

fn last_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

fn selector_months(months: &std::collections::BTreeSet<u32>, seed_month: u32) -> Vec<u32> {
    if months.is_empty() {
        vec![seed_month]
    } else {
        months.iter().copied().filter(|m| (1..=12).contains(m)).collect()
    }
}

/// The `ordinal`-th `weekday` of a month, where ordinal 5 means the last
/// one and weekday runs 1 (Sunday) through 7 (Saturday). `None` when the
/// month has no such day.
fn nth_weekday_of_month(year: i32, month: u32, ordinal: u8, weekday: u8) -> Option<NaiveDate> {
    if !(1..=7).contains(&weekday) || ordinal == 0 {
        return None;
    }
    let target = WEEKDAYS[(weekday - 1) as usize];

    if ordinal >= 5 {
        let last = last_of_month(year, month)?;
        let back = (7 + last.weekday().num_days_from_sunday() - target.num_days_from_sunday()) % 7;
        return last.checked_sub_signed(Duration::days(i64::from(back)));
    }

    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let forward = (7 + target.num_days_from_sunday() - first.weekday().num_days_from_sunday()) % 7;
    let candidate = first.checked_add_signed(Duration::days(
        i64::from(forward) + (i64::from(ordinal) - 1) * 7,
    ))?;
    if candidate.month() == month {
        Some(candidate)
    } else {
        None
    }
}
