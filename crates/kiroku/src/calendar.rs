//! Month grid layout and month-to-month navigation.
//!
//! A month is always laid out as 6 week rows of 7 cells, Sunday first, so the
//! rendered table keeps the same height whatever month is shown.

use chrono::{Datelike, Local, NaiveDate};
use serde::Serialize;

/// Number of week rows in every grid
pub const WEEKS: usize = 6;

/// Number of days in a week row
pub const DAYS_PER_WEEK: usize = 7;

/// Column headers, Sunday first
pub const WEEKDAY_LABELS: [&str; DAYS_PER_WEEK] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// A single grid cell: a blank pad or a day of the month
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cell {
    Empty,
    Day {
        /// Day of month, 1-based
        day: u32,
        /// The day as YYYY-MM-DD
        iso_date: String,
    },
}

impl Cell {
    #[cfg(test)]
    pub fn iso_date(&self) -> Option<&str> {
        match self {
            Cell::Empty => None,
            Cell::Day { iso_date, .. } => Some(iso_date),
        }
    }
}

/// Layout of one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarGrid {
    pub year: i32,
    /// Month, 0-based (0 = January)
    pub month: u32,
    /// Weekday of the 1st, 0 = Sunday .. 6 = Saturday
    pub start_weekday: u32,
    pub total_days: u32,
    pub rows: [[Cell; DAYS_PER_WEEK]; WEEKS],
}

impl CalendarGrid {
    /// All cells in row-major order
    #[cfg(test)]
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flatten()
    }

    /// Day numbers of the non-empty cells in row-major order
    #[cfg(test)]
    pub fn day_numbers(&self) -> Vec<u32> {
        self.cells()
            .filter_map(|cell| match cell {
                Cell::Day { day, .. } => Some(*day),
                Cell::Empty => None,
            })
            .collect()
    }

    pub fn title(&self) -> String {
        month_title(self.year, self.month)
    }
}

/// Carry a possibly out-of-range 0-based month into the year
fn normalize(year: i32, month: u32) -> (i32, u32) {
    (year + (month / 12) as i32, month % 12)
}

/// First day and day count of a month, or `None` outside chrono's range
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, u32)> {
    let first = NaiveDate::from_ymd_opt(year, month + 1, 1)?;
    let (next_year, next_month) = navigate(year, month, 1);
    // Day 0 of the next month is the last day of this one
    let last = NaiveDate::from_ymd_opt(next_year, next_month + 1, 1)?.pred_opt()?;
    Some((first, last.day()))
}

/// Format a day as zero-padded YYYY-MM-DD
pub fn iso_date(year: i32, month: u32, day: u32) -> String {
    format!("{:04}-{:02}-{:02}", year, month + 1, day)
}

/// Compute the 6x7 grid for `(year, month)`, month 0-based.
///
/// A month above 11 is carried into the year. Years chrono cannot represent
/// yield a grid of empty cells.
pub fn compute_grid(year: i32, month: u32) -> CalendarGrid {
    let (year, month) = normalize(year, month);

    let (start_weekday, total_days) = match month_bounds(year, month) {
        Some((first, total)) => (first.weekday().num_days_from_sunday(), total),
        None => (0, 0),
    };

    let mut next_day = 1;
    let rows: [[Cell; DAYS_PER_WEEK]; WEEKS] = std::array::from_fn(|row| {
        std::array::from_fn(|col| {
            if (row == 0 && (col as u32) < start_weekday) || next_day > total_days {
                Cell::Empty
            } else {
                let cell = Cell::Day {
                    day: next_day,
                    iso_date: iso_date(year, month, next_day),
                };
                next_day += 1;
                cell
            }
        })
    });

    CalendarGrid {
        year,
        month,
        start_weekday,
        total_days,
        rows,
    }
}

/// Step one month back (`delta < 0`) or forward, wrapping across years.
///
/// Larger deltas move that many months.
pub fn navigate(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year as i64 * 12 + (month % 12) as i64 + delta as i64;
    (index.div_euclid(12) as i32, index.rem_euclid(12) as u32)
}

/// "March 2024" style heading for a 0-based month
pub fn month_title(year: i32, month: u32) -> String {
    let (year, month) = normalize(year, month);
    match NaiveDate::from_ymd_opt(year, month + 1, 1) {
        Some(first) => first.format("%B %Y").to_string(),
        None => format!("{}-{:02}", year, month + 1),
    }
}

/// Month currently shown by a presentation layer.
///
/// Owned by the caller and threaded through navigation rather than held as
/// process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthCursor {
    pub year: i32,
    /// 0-based month
    pub month: u32,
}

impl MonthCursor {
    pub fn new(year: i32, month: u32) -> Self {
        let (year, month) = normalize(year, month);
        Self { year, month }
    }

    /// The month containing `date`
    pub fn containing(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month0())
    }

    /// The current local month
    pub fn today() -> Self {
        Self::containing(Local::now().date_naive())
    }

    pub fn prev(self) -> Self {
        self.offset(-1)
    }

    pub fn next(self) -> Self {
        self.offset(1)
    }

    pub fn offset(self, delta: i32) -> Self {
        let (year, month) = navigate(self.year, self.month, delta);
        Self { year, month }
    }

    pub fn grid(&self) -> CalendarGrid {
        compute_grid(self.year, self.month)
    }
}
