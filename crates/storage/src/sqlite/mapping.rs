use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{CacheEntry, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

pub(crate) fn map_entry_row<T: DeserializeOwned>(
    row: &SqliteRow,
) -> Result<CacheEntry<T>, StorageError> {
    let payload: String = row.try_get("payload").map_err(ser)?;
    let stale: i64 = row.try_get("stale").map_err(ser)?;
    let fetched_at: DateTime<Utc> = row.try_get("fetched_at").map_err(ser)?;
    let value = serde_json::from_str(&payload).map_err(ser)?;
    Ok(CacheEntry {
        value,
        stale: stale != 0,
        fetched_at,
    })
}
