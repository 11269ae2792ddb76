pub mod event;
pub mod occurrence;
pub mod recurrence;

pub use event::Event;
pub use occurrence::Occurrences;
pub use recurrence::{Frequency, MonthlySelector, RecurrenceEnd, RecurrenceRule, YearlySelector};

pub(crate) use event::day_window;
