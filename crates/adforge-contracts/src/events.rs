use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEvent {
    RunStarted,
    BrandResolved,
    UnitStarted,
    JobSubmitted,
    JobPolled,
    EndpointFailed,
    UnitCompleted,
    UnitFailed,
    ArchiveWritten,
    RunFailed,
    RunFinished,
}

impl RunEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::BrandResolved => "brand_resolved",
            Self::UnitStarted => "unit_started",
            Self::JobSubmitted => "job_submitted",
            Self::JobPolled => "job_polled",
            Self::EndpointFailed => "endpoint_failed",
            Self::UnitCompleted => "unit_completed",
            Self::UnitFailed => "unit_failed",
            Self::ArchiveWritten => "archive_written",
            Self::RunFailed => "run_failed",
            Self::RunFinished => "run_finished",
        }
    }
}

/// Append-only writer for a run's `events.jsonl`.
///
/// Each line is one compact JSON object holding `type`, `run_id` and `ts`,
/// followed by the caller payload. Clones share the file and the lock, so
/// worker threads can emit concurrently without interleaving lines.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    run_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, run_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                run_id: run_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn emit(&self, event: RunEvent, payload: EventPayload) -> anyhow::Result<Value> {
        let mut row = Map::new();
        row.insert("type".to_string(), Value::String(event.as_str().to_string()));
        row.insert(
            "run_id".to_string(),
            Value::String(self.inner.run_id.clone()),
        );
        row.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in payload {
            if matches!(key.as_str(), "type" | "run_id" | "ts") {
                continue;
            }
            row.insert(key, value);
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&row)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(row))
    }
}

/// Emits through an optional writer; write failures only reach the log.
pub fn emit_best_effort(events: Option<&EventWriter>, event: RunEvent, payload: EventPayload) {
    let Some(writer) = events else {
        return;
    };
    if let Err(err) = writer.emit(event, payload) {
        log::warn!("dropping {} event: {err:#}", event.as_str());
    }
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "run-123");

        let mut payload = EventPayload::new();
        payload.insert("units".to_string(), Value::from(4));
        let emitted = writer.emit(RunEvent::RunStarted, payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], Value::String("run_started".to_string()));
        assert_eq!(parsed["run_id"], Value::String("run-123".to_string()));
        assert_eq!(parsed["units"], Value::from(4));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_cannot_override_envelope_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "run-123");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::String("override".to_string()));
        payload.insert("run_id".to_string(), Value::String("other".to_string()));
        let emitted = writer.emit(RunEvent::UnitFailed, payload)?;

        assert_eq!(emitted["type"], Value::String("unit_failed".to_string()));
        assert_eq!(emitted["run_id"], Value::String("run-123".to_string()));
        Ok(())
    }

    #[test]
    fn clones_append_to_the_same_file_from_threads() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "run-123");

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let local = writer.clone();
                scope.spawn(move || {
                    for _ in 0..5 {
                        emit_best_effort(Some(&local), RunEvent::JobPolled, EventPayload::new());
                    }
                });
            }
        });

        let content = fs::read_to_string(&path)?;
        assert_eq!(content.lines().count(), 20);
        for line in content.lines() {
            let row: Value = serde_json::from_str(line)?;
            assert_eq!(row["type"], Value::String("job_polled".to_string()));
        }
        Ok(())
    }
}
