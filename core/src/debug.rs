use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

#[derive(Serialize)]
struct DebugRecord<'a> {
    timestamp: u64,
    phase: &'a str,
    event: &'a str,
    detail: &'a str,
}

/// User-facing diagnostic sink. When enabled, every pipeline step appends a
/// JSON record to the configured path. Writes are best-effort; a failing
/// debug sink must never fail a download.
#[derive(Debug, Clone, Default)]
pub struct DebugLog {
    path: Option<PathBuf>,
}

impl DebugLog {
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn record(&self, phase: &str, event: &str, detail: &str) {
        let Some(path) = &self.path else {
            return;
        };
        let record = DebugRecord {
            timestamp: now_epoch(),
            phase,
            event,
            detail,
        };
        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{line}");
        }
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn disabled_sink_writes_nothing() {
        let log = DebugLog::disabled();
        assert!(!log.is_enabled());
        log.record("verify", "noop", "nothing happens");
    }

    #[test]
    fn records_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.log");
        let log = DebugLog::to_path(&path);
        log.record("download", "segment-done", "index 0");
        log.record("build", "merged", "index 0");

        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["phase"], "download");
        assert_eq!(first["event"], "segment-done");
        assert_eq!(first["detail"], "index 0");
        assert!(first["timestamp"].as_u64().is_some());
    }
}
