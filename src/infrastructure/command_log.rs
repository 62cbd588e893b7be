use crate::domain::models::{LogEntry, LogQuery};
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const COMMANDS_LOG: &str = "commands.log";
const DEFAULT_LIMIT: usize = 200;

/// JSON-lines audit log of UI commands, one `{timestamp, level, command,
/// message}` object per line.
#[derive(Debug, Clone)]
pub struct CommandLog {
    path: PathBuf,
    guard: Arc<Mutex<()>>,
}

impl CommandLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: logs_dir.join(COMMANDS_LOG),
            guard: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, level: &str, command: &str, message: &str) -> Result<(), InfraError> {
        let _guard = self
            .guard
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("command log lock poisoned: {error}")))?;
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{payload}")?;
        Ok(())
    }

    /// Newest entries first. Lines that fail to parse are skipped.
    pub fn read(&self, query: &LogQuery) -> Result<Vec<LogEntry>, InfraError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        let level = query
            .level
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_ascii_lowercase);
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT);

        Ok(raw
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str::<LogEntry>(line).ok())
            .filter(|entry| {
                level
                    .as_deref()
                    .is_none_or(|level| entry.level.eq_ignore_ascii_case(level))
            })
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

    struct TempLogsDir {
        path: PathBuf,
    }

    impl TempLogsDir {
        fn new() -> Self {
            let sequence = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
            let path = std::env::temp_dir().join(format!(
                "sonicflow-command-log-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp logs dir");
            Self { path }
        }
    }

    impl Drop for TempLogsDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn read_returns_newest_first_filtered_by_level() {
        let dir = TempLogsDir::new();
        let log = CommandLog::new(&dir.path);
        log.append("info", "add_node", "created task-1").expect("append");
        log.append("error", "sync_tree", "backend unreachable").expect("append");
        log.append("info", "add_node", "created task-2").expect("append");

        let all = log.read(&LogQuery::default()).expect("read");
        let messages: Vec<&str> = all.iter().map(|entry| entry.message.as_str()).collect();
        assert_eq!(messages, vec!["created task-2", "backend unreachable", "created task-1"]);

        let errors = log
            .read(&LogQuery {
                level: Some("ERROR".to_string()),
                limit: None,
            })
            .expect("read errors");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].command, "sync_tree");

        let limited = log
            .read(&LogQuery {
                level: None,
                limit: Some(1),
            })
            .expect("read limited");
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn read_skips_corrupt_lines_and_missing_file() {
        let dir = TempLogsDir::new();
        let log = CommandLog::new(&dir.path);
        assert!(log.read(&LogQuery::default()).expect("missing file").is_empty());

        fs::write(log.path(), "not json\n").expect("write corrupt line");
        log.append("info", "load", "ok").expect("append");
        let entries = log.read(&LogQuery::default()).expect("read");
        assert_eq!(entries.len(), 1);
    }
}
