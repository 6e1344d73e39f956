//! Recurrence rules and their expansion into occurrence dates.

mod expand;
mod rule;

pub use expand::{Occurrences, expand};
pub use rule::{Frequency, RecurrenceRule, RecurrenceSpec, RuleBuilder, weekday_from_ordinal};
