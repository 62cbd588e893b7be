use crate::domain::models::{
    LogEntry, LogQuery, SessionKind, TaskNode, TaskNodePatch, TimerSession, TimerSettings,
    TimerSettingsPatch,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;

/// Backend boundary shared by the task tree store and the timer controller.
/// Implementations hold no client-side cache; every call reaches the backing
/// store.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn fetch_task_tree(&self) -> Result<Vec<TaskNode>, InfraError>;

    async fn fetch_deleted_tasks(&self) -> Result<Vec<TaskNode>, InfraError>;

    async fn create_task(&self, node: &TaskNode) -> Result<TaskNode, InfraError>;

    async fn update_task(&self, id: &str, patch: &TaskNodePatch) -> Result<TaskNode, InfraError>;

    /// Replaces the stored tree with `nodes`, removing anything not present.
    async fn sync_task_tree(&self, nodes: &[TaskNode]) -> Result<(), InfraError>;

    async fn soft_delete_task(&self, id: &str) -> Result<(), InfraError>;

    async fn restore_task(&self, id: &str) -> Result<(), InfraError>;

    async fn permanent_delete_task(&self, id: &str) -> Result<(), InfraError>;

    /// Inserts nodes whose ids are not stored yet, leaving existing rows alone.
    async fn migrate_tasks(&self, nodes: &[TaskNode]) -> Result<(), InfraError>;

    async fn start_timer_session(
        &self,
        kind: SessionKind,
        task_id: Option<&str>,
    ) -> Result<TimerSession, InfraError>;

    async fn end_timer_session(
        &self,
        id: i64,
        duration_seconds: u32,
        completed: bool,
    ) -> Result<TimerSession, InfraError>;

    async fn fetch_timer_sessions(&self) -> Result<Vec<TimerSession>, InfraError>;

    async fn fetch_sessions_by_task(&self, task_id: &str) -> Result<Vec<TimerSession>, InfraError>;

    async fn fetch_timer_settings(&self) -> Result<TimerSettings, InfraError>;

    async fn update_timer_settings(
        &self,
        patch: &TimerSettingsPatch,
    ) -> Result<TimerSettings, InfraError>;

    async fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, InfraError>;
}
