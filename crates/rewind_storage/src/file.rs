//! JSON file loaders.
//!
//! Logs are JSON lines, one [`LogRecord`] per line. Checkpoint files are a
//! JSON array of [`CheckpointRecord`]s.

use crate::checkpoint::{InitialCheckpoint, MemoryCheckpointStore};
use chrono::{DateTime, Utc};
use rewind_core::{CoreError, CoreResult, LogOffset, Seq, StreamId};
use rewind_log::{Event, EventMetadata, MemoryLog};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One line of a log file
///
/// When `seq` and `offset` are both omitted the record is appended and gets
/// the next position; otherwise both must be present and follow the head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Stream the event belongs to
    pub stream: StreamId,
    /// Explicit sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<Seq>,
    /// Explicit log offset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<LogOffset>,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Payload kind
    pub kind: String,
    /// JSON payload; `null` when absent
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// One entry of a checkpoint file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord<S> {
    /// Stream the checkpoint belongs to
    pub stream: StreamId,
    /// Last sequence number folded into `state`
    pub index: Seq,
    /// View state after `index`
    pub state: S,
}

/// Load a JSON-lines log file into memory
///
/// Blank lines are skipped.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read, `Encoding` for malformed lines,
/// and `OutOfRange` for records that break stream ordering
pub async fn load_log(path: impl AsRef<Path>) -> CoreResult<MemoryLog> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let log = MemoryLog::new();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: LogRecord = serde_json::from_str(line).map_err(|e| CoreError::Encoding {
            reason: format!("{}:{}: {}", path.display(), line_no + 1, e),
        })?;
        apply_record(&log, record)?;
    }

    tracing::debug!(path = %path.display(), streams = log.streams().len(), "log loaded");
    Ok(log)
}

fn apply_record(log: &MemoryLog, record: LogRecord) -> CoreResult<()> {
    let payload = serde_json::to_vec(&record.payload)?;
    match (record.seq, record.offset) {
        (None, None) => {
            log.append(&record.stream, record.kind, payload, record.timestamp)?;
        }
        (Some(seq), Some(offset)) => {
            let metadata = EventMetadata::new(record.stream, seq, offset, record.timestamp);
            log.insert(Event::new(metadata, record.kind).with_payload(payload))?;
        }
        _ => {
            return Err(CoreError::out_of_range(format!(
                "record in {} sets only one of seq/offset",
                record.stream
            )));
        }
    }
    Ok(())
}

/// Load a checkpoint file into an in-memory store
///
/// # Errors
///
/// Returns `Io` if the file cannot be read and `Encoding` if it is malformed
pub async fn load_checkpoints<S>(path: impl AsRef<Path>) -> CoreResult<MemoryCheckpointStore<S>>
where
    S: Clone + Serialize + DeserializeOwned,
{
    let bytes = tokio::fs::read(path.as_ref()).await?;
    let records: Vec<CheckpointRecord<S>> = serde_json::from_slice(&bytes)?;

    let store = MemoryCheckpointStore::new();
    for record in records {
        store.save(&record.stream, InitialCheckpoint::new(record.state, record.index))?;
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointSource;
    use rewind_log::{EventSource, IndexSource};
    use serde_json::{Value, json};
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_log_appends_and_inserts() {
        let file = write_temp(concat!(
            r#"{"stream":"s","timestamp":"2024-01-01T00:00:00Z","kind":"put","payload":{"path":"a","value":1}}"#,
            "\n\n",
            r#"{"stream":"s","seq":2,"offset":500,"timestamp":"2024-01-01T00:00:01Z","kind":"put"}"#,
            "\n",
        ));
        let log = load_log(file.path()).await.unwrap();
        let stream = StreamId::new("s");
        assert_eq!(log.head(&stream), Some(Seq::from_raw(2)));

        let index = log.lookup_index(&stream).await.unwrap();
        assert_eq!(index.entry(Seq::from_raw(2)).map(|e| e.offset), Some(LogOffset::from_raw(500)));

        let events = log
            .events_in_range(&stream, Seq::genesis(), Seq::from_raw(1))
            .await
            .unwrap();
        let payload: Value = events[0].decode_payload().unwrap();
        assert_eq!(payload, json!({"path": "a", "value": 1}));
    }

    #[tokio::test]
    async fn test_load_log_reports_line() {
        let file = write_temp("{\"stream\":\"s\"}\n");
        let err = load_log(file.path()).await.unwrap_err();
        match err {
            CoreError::Encoding { reason } => assert!(reason.contains(":1:")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_load_log_half_positioned_record() {
        let file = write_temp(
            r#"{"stream":"s","seq":1,"timestamp":"2024-01-01T00:00:00Z","kind":"put"}"#,
        );
        let err = load_log(file.path()).await.unwrap_err();
        assert!(matches!(err, CoreError::OutOfRange { .. }));
    }

    #[tokio::test]
    async fn test_load_log_missing_file() {
        let err = load_log("/definitely/not/here.jsonl").await.unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }

    #[tokio::test]
    async fn test_load_checkpoints() {
        let file = write_temp(r#"[{"stream":"s","index":3,"state":{"a":1}}]"#);
        let store: MemoryCheckpointStore<Value> = load_checkpoints(file.path()).await.unwrap();
        let found = store
            .nearest_checkpoint(&StreamId::new("s"), Seq::from_raw(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.index, Seq::from_raw(3));
        assert_eq!(found.state, json!({"a": 1}));
    }
}
