use crate::domain::models::TaskNode;
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

const TASK_TREE_JSON: &str = "task-tree.json";
const MIGRATION_MARKER: &str = "task-tree.migrated";

/// Local JSON copy of the last node set the store persisted.
#[derive(Debug, Clone)]
pub struct TaskCache {
    path: PathBuf,
    marker_path: PathBuf,
}

impl TaskCache {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(TASK_TREE_JSON),
            marker_path: state_dir.join(MIGRATION_MARKER),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as an empty tree; unparsable content is an error.
    pub fn load(&self) -> Result<Vec<TaskNode>, InfraError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, nodes: &[TaskNode]) -> Result<(), InfraError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec(nodes)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }

    pub fn is_migrated(&self) -> bool {
        self.marker_path.exists()
    }

    pub fn mark_migrated(&self) -> Result<(), InfraError> {
        fs::write(&self.marker_path, chrono::Utc::now().to_rfc3339())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NodeType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempStateDir {
        path: PathBuf,
    }

    impl TempStateDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "sonicflow-task-cache-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp state dir");
            Self { path }
        }
    }

    impl Drop for TempStateDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn save_then_load_returns_same_nodes() {
        let dir = TempStateDir::new();
        let cache = TaskCache::new(&dir.path);
        assert!(cache.load().expect("missing cache").is_empty());

        let nodes = vec![TaskNode::new("task-1", NodeType::Task, "Draft", None, 0, chrono::Utc::now())];
        cache.save(&nodes).expect("save");
        assert_eq!(cache.load().expect("load"), nodes);
    }

    #[test]
    fn corrupt_cache_is_reported() {
        let dir = TempStateDir::new();
        let cache = TaskCache::new(&dir.path);
        fs::write(cache.path(), "{not json").expect("write corrupt cache");
        assert!(matches!(cache.load(), Err(InfraError::Json(_))));
    }

    #[test]
    fn migration_marker_is_persistent() {
        let dir = TempStateDir::new();
        let cache = TaskCache::new(&dir.path);
        assert!(!cache.is_migrated());
        cache.mark_migrated().expect("mark");
        assert!(TaskCache::new(&dir.path).is_migrated());
    }
}
