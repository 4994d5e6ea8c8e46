use bank::{StoreError, Table, TableCounts};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to hydrate identity cache: {0}")]
    CacheLoad(#[source] StoreError),

    #[error("Failed to write {table}: {source}")]
    Write {
        table: Table,
        /// Rows per table that were committed before the failure.
        committed: TableCounts,
        #[source]
        source: StoreError,
    },

    #[error("Invalid date window: {start} is after {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("Date window of -{days_before}/+{days_after} days around {anchor} is out of range")]
    WindowOutOfRange {
        anchor: NaiveDate,
        days_before: u32,
        days_after: u32,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing {0}")]
    Missing(String),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },
}
