//! File sink
//!
//! Appends one JSON line per event to a log file. The file is opened at
//! construction so a bad path fails startup, not the first event.

use std::fs::{File, OpenOptions};
use std::io::Write;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use crate::sinks::{serialize_event, Sink};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    pub path: String,

    #[serde(default)]
    pub layout: Option<Value>,
}

pub struct FileSink {
    cfg: FileConfig,
    file: Mutex<File>,
}

impl FileSink {
    pub fn new(cfg: FileConfig) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.path)
            .map_err(|e| SinkError::Init(format!("cannot open '{}': {e}", cfg.path)))?;

        Ok(Self {
            cfg,
            file: Mutex::new(file),
        })
    }
}

#[async_trait::async_trait]
impl Sink for FileSink {
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
        let mut line = serialize_event(self.cfg.layout.as_ref(), event)?;
        line.push(b'\n');

        let mut file = self.file.lock();
        file.write_all(&line)?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.file.lock().flush() {
            error!(path = %self.cfg.path, error = %e, "failed to flush file sink");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn event(reason: &str) -> EnhancedEvent {
        let mut ev = EnhancedEvent::default();
        ev.reason = reason.into();
        ev
    }

    #[tokio::test]
    async fn test_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let sink = FileSink::new(FileConfig {
            path: path.to_string_lossy().into_owned(),
            layout: None,
        })
        .unwrap();

        sink.send(&event("BackOff")).await.unwrap();
        sink.send(&event("Killing")).await.unwrap();
        sink.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["reason"], "BackOff");
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["reason"], "Killing");
    }

    #[test]
    fn test_unwritable_path_fails_at_construction() {
        let result = FileSink::new(FileConfig {
            path: "/nonexistent-dir/events.log".into(),
            layout: None,
        });
        assert!(matches!(result, Err(SinkError::Init(_))));
    }

    #[tokio::test]
    async fn test_layout_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let sink = FileSink::new(FileConfig {
            path: path.to_string_lossy().into_owned(),
            layout: Some(serde_json::json!({"r": "{{ .reason }}"})),
        })
        .unwrap();

        sink.send(&event("BackOff")).await.unwrap();
        sink.close().await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(value, serde_json::json!({"r": "BackOff"}));
    }
}
