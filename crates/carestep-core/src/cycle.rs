//! Monthly submission calendar.
//!
//! Submissions for month M are written from the 26th of M-1 through the
//! 10th of M, evaluated from the 11th to the 17th, and fed back from the
//! 18th to the 25th. The cycle is recomputed from the reference time on
//! every query.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

/// A cycle in the input phase with this many days left or fewer is urgent.
pub const URGENT_DAYS: u32 = 3;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Day-of-month boundaries of the monthly cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleCalendar {
    /// First input day, in the month before the cycle month.
    pub input_start: u32,
    /// Last input day; the deadline is 00:00 on this day.
    pub input_end: u32,
    pub evaluation_start: u32,
    pub evaluation_end: u32,
}

impl Default for CycleCalendar {
    fn default() -> Self {
        Self {
            input_start: 26,
            input_end: 10,
            evaluation_start: 11,
            evaluation_end: 17,
        }
    }
}

/// Where in the monthly cycle a day falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Input,
    Evaluation,
    Feedback,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Input => write!(f, "input"),
            Phase::Evaluation => write!(f, "evaluation"),
            Phase::Feedback => write!(f, "feedback"),
        }
    }
}

/// The cycle a reference time belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCycle {
    /// Cycle month as "YYYY-MM".
    pub year_month: String,
    pub year: i32,
    pub month: u32,
    pub phase: Phase,
    /// Input deadline, 00:00 on the last input day of the cycle month.
    pub deadline: NaiveDateTime,
    /// Whole days until the deadline, rounded up, never negative.
    pub days_left: u32,
}

impl MonthlyCycle {
    pub fn is_urgent(&self) -> bool {
        self.phase == Phase::Input && self.days_left <= URGENT_DAYS
    }

    /// Deadline as written on screen, e.g. "3月10日".
    pub fn deadline_label(&self) -> String {
        format!("{}月{}日", self.deadline.month(), self.deadline.day())
    }
}

impl CycleCalendar {
    /// Check every day is a day of the month and the phases follow each other.
    pub fn validate(&self) -> Result<(), CalendarError> {
        for (field, day) in [
            ("input_start", self.input_start),
            ("input_end", self.input_end),
            ("evaluation_start", self.evaluation_start),
            ("evaluation_end", self.evaluation_end),
        ] {
            if !(1..=31).contains(&day) {
                return Err(CalendarError::DayOutOfRange { field, day });
            }
        }
        if self.input_end < self.evaluation_start
            && self.evaluation_start <= self.evaluation_end
            && self.evaluation_end < self.input_start
        {
            Ok(())
        } else {
            Err(CalendarError::OutOfOrder)
        }
    }

    /// The cycle `reference` falls in.
    pub fn current_cycle(&self, reference: NaiveDateTime) -> MonthlyCycle {
        let date = reference.date();
        let day = date.day();

        let (year, month) = if day >= self.input_start {
            if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            }
        } else {
            (date.year(), date.month())
        };

        let phase = if day >= self.input_start || day <= self.input_end {
            Phase::Input
        } else if (self.evaluation_start..=self.evaluation_end).contains(&day) {
            Phase::Evaluation
        } else {
            Phase::Feedback
        };

        // Short months take their last day when the configured day is absent.
        let deadline_date = (1..=self.input_end)
            .rev()
            .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
            .unwrap_or(date);
        let deadline = deadline_date.and_time(NaiveTime::MIN);

        let remaining_ms = (deadline - reference).num_milliseconds();
        let days_left = if remaining_ms <= 0 {
            0
        } else {
            ((remaining_ms + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY) as u32
        };

        MonthlyCycle {
            year_month: format!("{year:04}-{month:02}"),
            year,
            month,
            phase,
            deadline,
            days_left,
        }
    }

    /// The cycle a calendar day falls in, taken at 00:00.
    pub fn cycle_for_date(&self, date: NaiveDate) -> MonthlyCycle {
        self.current_cycle(date.and_time(NaiveTime::MIN))
    }
}

/// The cycle `reference` falls in under the standard calendar.
pub fn current_cycle(reference: NaiveDateTime) -> MonthlyCycle {
    CycleCalendar::default().current_cycle(reference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn late_month_belongs_to_next_cycle() {
        let cycle = current_cycle(at(2025, 3, 27, 9, 0));
        assert_eq!(cycle.year_month, "2025-04");
        assert_eq!(cycle.phase, Phase::Input);
        assert_eq!(cycle.deadline, at(2025, 4, 10, 0, 0));
        assert_eq!(cycle.deadline_label(), "4月10日");
    }

    #[test]
    fn december_wraps_to_next_year() {
        let cycle = current_cycle(at(2025, 12, 27, 12, 0));
        assert_eq!(cycle.year_month, "2026-01");
        assert_eq!((cycle.year, cycle.month), (2026, 1));
        assert_eq!(cycle.phase, Phase::Input);
    }

    #[test]
    fn phases_by_day() {
        let calendar = CycleCalendar::default();
        let phase = |d| calendar.cycle_for_date(NaiveDate::from_ymd_opt(2025, 5, d).unwrap()).phase;
        assert_eq!(phase(1), Phase::Input);
        assert_eq!(phase(10), Phase::Input);
        assert_eq!(phase(11), Phase::Evaluation);
        assert_eq!(phase(15), Phase::Evaluation);
        assert_eq!(phase(17), Phase::Evaluation);
        assert_eq!(phase(18), Phase::Feedback);
        assert_eq!(phase(20), Phase::Feedback);
        assert_eq!(phase(25), Phase::Feedback);
        assert_eq!(phase(26), Phase::Input);
    }

    #[test]
    fn mid_month_stays_in_current_cycle() {
        let cycle = current_cycle(at(2025, 5, 15, 10, 0));
        assert_eq!(cycle.year_month, "2025-05");
        assert_eq!(cycle.phase, Phase::Evaluation);
        assert_eq!(cycle.days_left, 0);
        assert!(!cycle.is_urgent());
    }

    #[test]
    fn days_left_rounds_up_partial_days() {
        // 8 days and 15 hours before the deadline.
        let cycle = current_cycle(at(2025, 5, 1, 9, 0));
        assert_eq!(cycle.days_left, 9);
        // Exactly on a day boundary.
        let cycle = current_cycle(at(2025, 5, 7, 0, 0));
        assert_eq!(cycle.days_left, 3);
        assert!(cycle.is_urgent());
    }

    #[test]
    fn deadline_day_itself_has_no_days_left() {
        let cycle = current_cycle(at(2025, 5, 10, 8, 30));
        assert_eq!(cycle.phase, Phase::Input);
        assert_eq!(cycle.days_left, 0);
        assert!(cycle.is_urgent());
    }

    #[test]
    fn start_of_input_window() {
        let cycle = current_cycle(at(2025, 1, 26, 0, 0));
        assert_eq!(cycle.year_month, "2025-02");
        assert_eq!(cycle.days_left, 15);
        assert!(!cycle.is_urgent());
    }

    #[test]
    fn recomputation_is_idempotent() {
        let reference = at(2025, 8, 3, 14, 45);
        assert_eq!(current_cycle(reference), current_cycle(reference));
    }

    #[test]
    fn custom_deadline_past_month_end_uses_last_day() {
        let calendar = CycleCalendar {
            input_start: 31,
            input_end: 30,
            evaluation_start: 31,
            evaluation_end: 31,
        };
        let cycle = calendar.current_cycle(at(2025, 2, 1, 0, 0));
        assert_eq!(cycle.deadline, at(2025, 2, 28, 0, 0));
    }

    #[test]
    fn calendar_from_partial_toml() {
        let calendar: CycleCalendar = toml::from_str("input_end = 12").unwrap();
        assert_eq!(calendar.input_end, 12);
        assert_eq!(calendar.input_start, 26);
    }

    #[test]
    fn standard_calendar_is_valid() {
        assert_eq!(CycleCalendar::default().validate(), Ok(()));
        let shifted = CycleCalendar {
            input_start: 28,
            input_end: 12,
            evaluation_start: 13,
            evaluation_end: 20,
        };
        assert_eq!(shifted.validate(), Ok(()));
    }

    #[test]
    fn calendar_days_must_exist() {
        let zero_deadline = CycleCalendar {
            input_end: 0,
            ..CycleCalendar::default()
        };
        assert_eq!(
            zero_deadline.validate(),
            Err(CalendarError::DayOutOfRange {
                field: "input_end",
                day: 0
            })
        );

        let past_month_end = CycleCalendar {
            input_start: 32,
            ..CycleCalendar::default()
        };
        assert!(matches!(
            past_month_end.validate(),
            Err(CalendarError::DayOutOfRange { field: "input_start", day: 32 })
        ));
    }

    #[test]
    fn overlapping_phases_are_rejected() {
        let input_into_evaluation = CycleCalendar {
            input_end: 12,
            ..CycleCalendar::default()
        };
        assert_eq!(input_into_evaluation.validate(), Err(CalendarError::OutOfOrder));

        let evaluation_reversed = CycleCalendar {
            evaluation_start: 17,
            evaluation_end: 11,
            ..CycleCalendar::default()
        };
        assert_eq!(evaluation_reversed.validate(), Err(CalendarError::OutOfOrder));

        let feedback_into_input = CycleCalendar {
            input_start: 15,
            ..CycleCalendar::default()
        };
        assert_eq!(feedback_into_input.validate(), Err(CalendarError::OutOfOrder));
    }
}
