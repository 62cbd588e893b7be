use crate::application::data_service::DataService;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_cache::TaskCache;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    AlreadyMigrated,
    NothingCached,
    BackendNotEmpty,
    Migrated { count: usize },
}

/// Pushes a task tree that only exists in the local cache to a backend that
/// has never seen it. Runs at most once per workspace: the marker is written
/// as soon as the backend is known to hold the tree.
pub async fn migrate_legacy_tasks<D>(data_service: &D, cache: &TaskCache) -> Result<MigrationOutcome, InfraError>
where
    D: DataService + ?Sized,
{
    if cache.is_migrated() {
        return Ok(MigrationOutcome::AlreadyMigrated);
    }

    let cached = match cache.load() {
        Ok(nodes) => nodes,
        Err(error) => {
            warn!(%error, "legacy task cache unreadable; skipping migration");
            Vec::new()
        }
    };
    if cached.is_empty() {
        return Ok(MigrationOutcome::NothingCached);
    }

    if !data_service.fetch_task_tree().await?.is_empty() {
        cache.mark_migrated()?;
        return Ok(MigrationOutcome::BackendNotEmpty);
    }

    data_service.migrate_tasks(&cached).await?;
    cache.mark_migrated()?;
    info!(count = cached.len(), "migrated legacy task cache");
    Ok(MigrationOutcome::Migrated {
        count: cached.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NodeType, TaskNode};
    use crate::infrastructure::memory_data_service::{InMemoryDataService, OP_MIGRATE_TASKS};
    use chrono::Utc;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempStateDir {
        path: PathBuf,
    }

    impl TempStateDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "sonicflow-migration-{}-{}",
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

    fn task(id: &str) -> TaskNode {
        TaskNode::new(id, NodeType::Task, id, None, 0, Utc::now())
    }

    #[tokio::test]
    async fn cached_tree_is_pushed_once_to_empty_backend() {
        let dir = TempStateDir::new();
        let cache = TaskCache::new(&dir.path);
        cache.save(&[task("legacy-1"), task("legacy-2")]).expect("seed cache");
        let service = InMemoryDataService::new();

        let outcome = migrate_legacy_tasks(&service, &cache).await.expect("migrate");
        assert_eq!(outcome, MigrationOutcome::Migrated { count: 2 });
        assert_eq!(service.tasks().len(), 2);

        let again = migrate_legacy_tasks(&service, &cache).await.expect("rerun");
        assert_eq!(again, MigrationOutcome::AlreadyMigrated);
        assert_eq!(service.calls(OP_MIGRATE_TASKS), 1);
    }

    #[tokio::test]
    async fn populated_backend_is_left_alone() {
        let dir = TempStateDir::new();
        let cache = TaskCache::new(&dir.path);
        cache.save(&[task("legacy")]).expect("seed cache");
        let service = InMemoryDataService::with_tasks(vec![task("remote")]);

        let outcome = migrate_legacy_tasks(&service, &cache).await.expect("migrate");
        assert_eq!(outcome, MigrationOutcome::BackendNotEmpty);
        assert!(cache.is_migrated());
        assert_eq!(service.calls(OP_MIGRATE_TASKS), 0);
    }

    #[tokio::test]
    async fn empty_or_corrupt_cache_needs_no_migration() {
        let dir = TempStateDir::new();
        let cache = TaskCache::new(&dir.path);
        let service = InMemoryDataService::new();
        assert_eq!(
            migrate_legacy_tasks(&service, &cache).await.expect("empty"),
            MigrationOutcome::NothingCached
        );

        fs::write(cache.path(), "[{broken").expect("corrupt cache");
        assert_eq!(
            migrate_legacy_tasks(&service, &cache).await.expect("corrupt"),
            MigrationOutcome::NothingCached
        );
        assert!(!cache.is_migrated());
    }
}
