//! Recurrence engine
//!
//! Pure date arithmetic for repeating tasks: rule validity and
//! next-occurrence computation. No dependency on the store or the
//! persistence layer, so everything here is trivially testable.

use chrono::{Datelike, Days, NaiveDate};

use crate::model::{Frequency, RecurrenceRule};

impl RecurrenceRule {
    /// A rule is valid iff it is daily, or weekly/monthly with a
    /// non-empty, in-range day selection. An invalid rule is equivalent
    /// to "recurrence disabled" and must never drive scheduling; see
    /// [`crate::draft::DraftLifecycle::settle_recurrence`] for the
    /// normalization policy.
    pub fn is_valid(&self) -> bool {
        match self.frequency {
            Frequency::Daily => true,
            Frequency::Weekly => {
                !self.selected_days.is_empty() && self.selected_days.iter().all(|d| *d < 7)
            },
            Frequency::Monthly => {
                !self.selected_days.is_empty()
                    && self.selected_days.iter().all(|d| (1..=31).contains(d))
            },
        }
    }
}

/// Earliest date `d >= max(rule.start_date, reference)` satisfying the
/// rule, ignoring `end_date`.
///
/// The rule must be valid per [`RecurrenceRule::is_valid`]; callers are
/// expected to have checked. Monthly selections that do not exist in a
/// given month (e.g. the 31st in June) roll forward to the next month
/// that has them.
pub fn next_occurrence(rule: &RecurrenceRule, reference: NaiveDate) -> NaiveDate {
    debug_assert!(rule.is_valid(), "next_occurrence called with invalid rule");

    let base = rule.start_date.max(reference);

    match rule.frequency {
        Frequency::Daily => base,
        Frequency::Weekly => {
            // 0 = Monday .. 6 = Sunday, matching selected_days.
            let weekday = base.weekday().num_days_from_monday();
            let offset = rule
                .selected_days
                .iter()
                .map(|day| (day + 7 - weekday) % 7)
                .min()
                .unwrap_or(0);
            base + Days::new(u64::from(offset))
        },
        Frequency::Monthly => {
            let mut year = base.year();
            let mut month = base.month();
            loop {
                for day in &rule.selected_days {
                    if year == base.year() && month == base.month() && *day < base.day() {
                        continue;
                    }
                    // Skip days the month does not have (31st in June).
                    if let Some(date) = NaiveDate::from_ymd_opt(year, month, *day) {
                        if date >= base {
                            return date;
                        }
                    }
                }
                month += 1;
                if month > 12 {
                    month = 1;
                    year += 1;
                }
            }
        },
    }
}

/// Next occurrence strictly after `reference`; used when advancing past
/// an occurrence that was just closed (its `completed_at` date).
pub fn next_occurrence_after(rule: &RecurrenceRule, reference: NaiveDate) -> NaiveDate {
    next_occurrence(rule, reference + Days::new(1))
}

/// The occurrence a view should display for `today`, or `None` when the
/// series is exhausted (`end_date` lies before the next occurrence).
/// An exhausted series is "nothing to display", not an error.
pub fn current_occurrence(rule: &RecurrenceRule, today: NaiveDate) -> Option<NaiveDate> {
    let next = next_occurrence(rule, today);
    match rule.end_date {
        Some(end) if end < next => None,
        _ => Some(next),
    }
}
