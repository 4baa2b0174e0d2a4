//! Command handlers a presentation layer drives the calendar through.
//!
//! The handlers own no UI: they take the user's action, call into the
//! calendar layout and the record store, and return what should be shown.

use chrono::Local;
use tracing::debug;

use crate::backend::Backend;
use crate::calendar::{CalendarGrid, MonthCursor};
use crate::store::{NewRecord, RecordStore, StoreError, StoreResult};
use crate::types::{calendar_day, now_timestamp, Record, RecordForm};

/// Which date a new record will be filed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryTarget {
    /// A day picked from the grid, YYYY-MM-DD
    Day(String),
    /// Quick entry, stamped with the moment it is saved
    Now,
}

impl EntryTarget {
    fn resolve(&self) -> String {
        match self {
            Self::Day(date) => date.clone(),
            Self::Now => now_timestamp(),
        }
    }
}

/// State of the record entry dialog
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EntryModal {
    #[default]
    Closed,
    Open {
        target: EntryTarget,
        /// Message from the last failed save
        error: Option<String>,
    },
}

impl EntryModal {
    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    #[cfg(test)]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Open { error, .. } => error.as_deref(),
            Self::Closed => None,
        }
    }
}

/// Records of the day the user selected
#[derive(Debug, Clone, PartialEq)]
pub struct DayView {
    pub date: String,
    pub records: Vec<Record>,
}

impl DayView {
    /// Lines for the day list, or the placeholder when it is empty
    pub fn lines(&self) -> Vec<String> {
        if self.records.is_empty() {
            vec![NO_RECORDS.to_string()]
        } else {
            self.records.iter().map(Record::day_line).collect()
        }
    }
}

pub const NO_RECORDS: &str = "No learning records for this day.";

/// Calendar session: visible month, entry dialog and the record store
pub struct Planner<B: Backend> {
    cursor: MonthCursor,
    modal: EntryModal,
    store: RecordStore<B>,
}

impl<B: Backend> Planner<B> {
    pub fn starting_at(store: RecordStore<B>, cursor: MonthCursor) -> Self {
        Self {
            cursor,
            modal: EntryModal::Closed,
            store,
        }
    }

    pub fn cursor(&self) -> MonthCursor {
        self.cursor
    }

    #[cfg(test)]
    pub fn modal(&self) -> &EntryModal {
        &self.modal
    }

    pub fn store(&self) -> &RecordStore<B> {
        &self.store
    }

    pub fn grid(&self) -> CalendarGrid {
        self.cursor.grid()
    }

    pub fn on_prev_month(&mut self) -> CalendarGrid {
        self.cursor = self.cursor.prev();
        self.grid()
    }

    pub fn on_next_month(&mut self) -> CalendarGrid {
        self.cursor = self.cursor.next();
        self.grid()
    }

    /// A grid cell was picked: open the dialog for that day and list its records
    pub fn on_cell_selected(&mut self, date: &str) -> StoreResult<DayView> {
        self.modal = EntryModal::Open {
            target: EntryTarget::Day(date.to_string()),
            error: None,
        };
        if let Some(day) = calendar_day(date, &Local) {
            self.cursor = MonthCursor::containing(day);
        }

        let records = self.store.query_by_day(date)?;
        debug!(date = %date, count = records.len(), "Cell selected");
        Ok(DayView {
            date: date.to_string(),
            records,
        })
    }

    /// Open the dialog for a record stamped with the current time
    pub fn on_open_quick_entry(&mut self) {
        self.modal = EntryModal::Open {
            target: EntryTarget::Now,
            error: None,
        };
    }

    /// Save the form against the open dialog's target.
    ///
    /// Success closes the dialog. A failure keeps it open with the message.
    pub fn on_save(&mut self, form: RecordForm) -> StoreResult<Record> {
        let EntryModal::Open { target, .. } = &self.modal else {
            return Err(StoreError::NoOpenEntry);
        };
        let target = target.clone();

        match self.store.append(NewRecord {
            form,
            date: target.resolve(),
        }) {
            Ok(record) => {
                self.modal = EntryModal::Closed;
                Ok(record)
            }
            Err(e) => {
                self.modal = EntryModal::Open {
                    target,
                    error: Some(e.to_string()),
                };
                Err(e)
            }
        }
    }

    /// Close the dialog, discarding the input
    pub fn on_cancel(&mut self) {
        self.modal = EntryModal::Closed;
    }
}
