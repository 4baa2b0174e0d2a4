//! Record store: validation, persistence and day queries.
//!
//! The whole collection is kept as one JSON array under a single backend key.
//! Every write reads the current blob, appends and writes the full array back,
//! so callers sharing a store must serialize `append` (see `server::AppState`).
//!
//! A blob that fails to parse is reported as `CorruptStore` and is never
//! overwritten; fixing or removing it is left to the user.

use chrono::{Local, NaiveDate, TimeZone};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::types::{calendar_day, Record, RecordForm};

/// Backend key holding the record collection
pub const RECORDS_KEY: &str = "learningRecords";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("content must not be empty")]
    EmptyContent,

    #[error("duration must be a positive number of minutes, got {0:?}")]
    InvalidDuration(String),

    #[error("no entry dialog is open")]
    NoOpenEntry,

    #[error("stored records are corrupt: {0}")]
    CorruptStore(#[source] serde_json::Error),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// Errors the user can fix by changing the form input
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyContent | Self::InvalidDuration(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Raw input of an append: the form fields plus the target date
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub form: RecordForm,
    /// Selected calendar day or the current timestamp
    pub date: String,
}

pub struct RecordStore<B: Backend> {
    backend: B,
}

impl<B: Backend> RecordStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Validate and append a record, persisting the updated collection.
    ///
    /// Nothing is written when validation fails or the stored blob is corrupt.
    pub fn append(&mut self, input: NewRecord) -> StoreResult<Record> {
        let record = input.form.into_record(input.date)?;

        let mut records = self.load_all()?;
        records.push(record.clone());
        self.save(&records)?;

        info!(
            date = %record.date,
            content = %record.content,
            time = record.time,
            total = records.len(),
            "Record appended"
        );
        Ok(record)
    }

    /// Every record in insertion order; empty when nothing was persisted yet
    pub fn load_all(&self) -> StoreResult<Vec<Record>> {
        let Some(blob) = self.backend.get(RECORDS_KEY)? else {
            debug!("No stored records");
            return Ok(Vec::new());
        };

        let records: Vec<Record> = serde_json::from_str(&blob).map_err(|e| {
            warn!(error = %e, "Stored records could not be parsed");
            StoreError::CorruptStore(e)
        })?;

        debug!(count = records.len(), "Loaded records");
        Ok(records)
    }

    /// Records whose calendar day in the local time zone equals `date`'s
    pub fn query_by_day(&self, date: &str) -> StoreResult<Vec<Record>> {
        self.query_by_day_in(date, &Local)
    }

    /// Like `query_by_day`, resolving timestamps into `tz`
    pub fn query_by_day_in<Tz: TimeZone>(&self, date: &str, tz: &Tz) -> StoreResult<Vec<Record>> {
        let Some(day) = calendar_day(date, tz) else {
            warn!(date = %date, "Unrecognised query date");
            return Ok(Vec::new());
        };

        let records: Vec<Record> = self
            .load_all()?
            .into_iter()
            .filter(|record| calendar_day(&record.date, tz) == Some(day))
            .collect();

        debug!(day = %day, count = records.len(), "Queried records by day");
        Ok(records)
    }

    /// Number of records on each local calendar day
    pub fn counts_by_day(&self) -> StoreResult<BTreeMap<NaiveDate, usize>> {
        let mut counts = BTreeMap::new();
        for record in self.load_all()? {
            if let Some(day) = record.day() {
                *counts.entry(day).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn save(&mut self, records: &[Record]) -> StoreResult<()> {
        let json = serde_json::to_string(records).map_err(anyhow::Error::from)?;
        self.backend.set(RECORDS_KEY, &json)?;
        Ok(())
    }
}
