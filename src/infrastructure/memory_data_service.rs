use crate::application::data_service::DataService;
use crate::domain::models::{
    LogEntry, LogQuery, SessionKind, TaskNode, TaskNodePatch, TimerSession, TimerSettings,
    TimerSettingsPatch,
};
use crate::domain::task_tree::subtree_ids;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const OP_FETCH_TASK_TREE: &str = "fetch_task_tree";
pub const OP_FETCH_DELETED_TASKS: &str = "fetch_deleted_tasks";
pub const OP_CREATE_TASK: &str = "create_task";
pub const OP_UPDATE_TASK: &str = "update_task";
pub const OP_SYNC_TASK_TREE: &str = "sync_task_tree";
pub const OP_SOFT_DELETE_TASK: &str = "soft_delete_task";
pub const OP_RESTORE_TASK: &str = "restore_task";
pub const OP_PERMANENT_DELETE_TASK: &str = "permanent_delete_task";
pub const OP_MIGRATE_TASKS: &str = "migrate_tasks";
pub const OP_START_TIMER_SESSION: &str = "start_timer_session";
pub const OP_END_TIMER_SESSION: &str = "end_timer_session";
pub const OP_FETCH_TIMER_SESSIONS: &str = "fetch_timer_sessions";
pub const OP_FETCH_SESSIONS_BY_TASK: &str = "fetch_sessions_by_task";
pub const OP_FETCH_TIMER_SETTINGS: &str = "fetch_timer_settings";
pub const OP_UPDATE_TIMER_SETTINGS: &str = "update_timer_settings";
pub const OP_FETCH_LOGS: &str = "fetch_logs";

#[derive(Debug)]
struct MemoryState {
    tasks: Vec<TaskNode>,
    sessions: Vec<TimerSession>,
    settings: TimerSettings,
    logs: Vec<LogEntry>,
    next_session_id: i64,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            sessions: Vec::new(),
            settings: TimerSettings {
                id: 1,
                work_duration: 25,
                break_duration: 5,
                long_break_duration: 15,
                sessions_before_long_break: 4,
                auto_start_breaks: false,
                updated_at: Utc::now(),
            },
            logs: Vec::new(),
            next_session_id: 1,
        }
    }
}

/// In-process backend used by tests and as a drop-in fake. Operations can be
/// made to fail by name, and `sync_task_tree` can be delayed to reorder
/// completions.
#[derive(Debug, Default)]
pub struct InMemoryDataService {
    state: Mutex<MemoryState>,
    failing: Mutex<HashSet<&'static str>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    sync_delays: Mutex<VecDeque<Duration>>,
    synced_snapshots: Mutex<Vec<Vec<TaskNode>>>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>, InfraError> {
    mutex
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("{name} lock poisoned: {error}")))
}

impl InMemoryDataService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(nodes: Vec<TaskNode>) -> Self {
        let service = Self::default();
        if let Ok(mut state) = service.state.lock() {
            state.tasks = nodes;
        }
        service
    }

    pub fn fail(&self, operation: &'static str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(operation);
        }
    }

    pub fn recover(&self, operation: &'static str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(operation);
        }
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Delays the next `sync_task_tree` call by `delay`. Failure injection is
    /// evaluated when the delay ends, not when the call starts.
    pub fn delay_next_sync(&self, delay: Duration) {
        if let Ok(mut delays) = self.sync_delays.lock() {
            delays.push_back(delay);
        }
    }

    pub fn tasks(&self) -> Vec<TaskNode> {
        self.state
            .lock()
            .map(|state| state.tasks.clone())
            .unwrap_or_default()
    }

    pub fn sessions(&self) -> Vec<TimerSession> {
        self.state
            .lock()
            .map(|state| state.sessions.clone())
            .unwrap_or_default()
    }

    /// Every snapshot received by `sync_task_tree`, in arrival order.
    pub fn synced_snapshots(&self) -> Vec<Vec<TaskNode>> {
        self.synced_snapshots
            .lock()
            .map(|snapshots| snapshots.clone())
            .unwrap_or_default()
    }

    pub fn push_log(&self, entry: LogEntry) {
        if let Ok(mut state) = self.state.lock() {
            state.logs.push(entry);
        }
    }

    fn enter(&self, operation: &'static str) -> Result<(), InfraError> {
        *lock(&self.calls, "call counter")?.entry(operation).or_insert(0) += 1;
        if lock(&self.failing, "failure set")?.contains(operation) {
            return Err(InfraError::Http(format!("{operation} failed: backend unavailable")));
        }
        Ok(())
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, InfraError> {
        lock(&self.state, "in-memory data service")
    }
}

#[async_trait]
impl DataService for InMemoryDataService {
    async fn fetch_task_tree(&self) -> Result<Vec<TaskNode>, InfraError> {
        self.enter(OP_FETCH_TASK_TREE)?;
        Ok(self
            .state()?
            .tasks
            .iter()
            .filter(|node| !node.is_deleted)
            .cloned()
            .collect())
    }

    async fn fetch_deleted_tasks(&self) -> Result<Vec<TaskNode>, InfraError> {
        self.enter(OP_FETCH_DELETED_TASKS)?;
        Ok(self
            .state()?
            .tasks
            .iter()
            .filter(|node| node.is_deleted)
            .cloned()
            .collect())
    }

    async fn create_task(&self, node: &TaskNode) -> Result<TaskNode, InfraError> {
        self.enter(OP_CREATE_TASK)?;
        let mut state = self.state()?;
        state.tasks.retain(|existing| existing.id != node.id);
        state.tasks.push(node.clone());
        Ok(node.clone())
    }

    async fn update_task(&self, id: &str, patch: &TaskNodePatch) -> Result<TaskNode, InfraError> {
        self.enter(OP_UPDATE_TASK)?;
        let mut state = self.state()?;
        let node = state
            .tasks
            .iter_mut()
            .find(|node| node.id == id)
            .ok_or_else(|| InfraError::NotFound(format!("task {id}")))?;
        patch.apply(node, Utc::now());
        Ok(node.clone())
    }

    async fn sync_task_tree(&self, nodes: &[TaskNode]) -> Result<(), InfraError> {
        let delay = lock(&self.sync_delays, "sync delays")?.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.enter(OP_SYNC_TASK_TREE)?;
        lock(&self.synced_snapshots, "synced snapshots")?.push(nodes.to_vec());
        self.state()?.tasks = nodes.to_vec();
        Ok(())
    }

    async fn soft_delete_task(&self, id: &str) -> Result<(), InfraError> {
        self.enter(OP_SOFT_DELETE_TASK)?;
        let mut state = self.state()?;
        if !state.tasks.iter().any(|node| node.id == id) {
            return Err(InfraError::NotFound(format!("task {id}")));
        }
        let ids: HashSet<String> = subtree_ids(&state.tasks, id).into_iter().collect();
        let now = Utc::now();
        for node in state.tasks.iter_mut().filter(|node| ids.contains(&node.id)) {
            node.is_deleted = true;
            node.deleted_at = Some(now);
        }
        Ok(())
    }

    async fn restore_task(&self, id: &str) -> Result<(), InfraError> {
        self.enter(OP_RESTORE_TASK)?;
        let mut state = self.state()?;
        if !state.tasks.iter().any(|node| node.id == id) {
            return Err(InfraError::NotFound(format!("task {id}")));
        }
        let ids: HashSet<String> = subtree_ids(&state.tasks, id).into_iter().collect();
        for node in state.tasks.iter_mut().filter(|node| ids.contains(&node.id)) {
            node.is_deleted = false;
            node.deleted_at = None;
        }
        Ok(())
    }

    async fn permanent_delete_task(&self, id: &str) -> Result<(), InfraError> {
        self.enter(OP_PERMANENT_DELETE_TASK)?;
        let mut state = self.state()?;
        let ids: HashSet<String> = subtree_ids(&state.tasks, id).into_iter().collect();
        state.tasks.retain(|node| !ids.contains(&node.id));
        Ok(())
    }

    async fn migrate_tasks(&self, nodes: &[TaskNode]) -> Result<(), InfraError> {
        self.enter(OP_MIGRATE_TASKS)?;
        let mut state = self.state()?;
        let existing: HashSet<String> = state.tasks.iter().map(|node| node.id.clone()).collect();
        let fresh: Vec<TaskNode> = nodes
            .iter()
            .filter(|node| !existing.contains(&node.id))
            .cloned()
            .collect();
        state.tasks.extend(fresh);
        Ok(())
    }

    async fn start_timer_session(
        &self,
        kind: SessionKind,
        task_id: Option<&str>,
    ) -> Result<TimerSession, InfraError> {
        self.enter(OP_START_TIMER_SESSION)?;
        let mut state = self.state()?;
        let session = TimerSession {
            id: state.next_session_id,
            task_id: task_id.map(ToOwned::to_owned),
            session_type: kind,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            completed: false,
        };
        state.next_session_id += 1;
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn end_timer_session(
        &self,
        id: i64,
        duration_seconds: u32,
        completed: bool,
    ) -> Result<TimerSession, InfraError> {
        self.enter(OP_END_TIMER_SESSION)?;
        let mut state = self.state()?;
        let session = state
            .sessions
            .iter_mut()
            .find(|session| session.id == id)
            .ok_or_else(|| InfraError::NotFound(format!("timer session {id}")))?;
        session.completed_at = Some(Utc::now());
        session.duration = Some(duration_seconds);
        session.completed = completed;
        Ok(session.clone())
    }

    async fn fetch_timer_sessions(&self) -> Result<Vec<TimerSession>, InfraError> {
        self.enter(OP_FETCH_TIMER_SESSIONS)?;
        let mut sessions = self.state()?.sessions.clone();
        sessions.sort_by(|left, right| right.started_at.cmp(&left.started_at));
        Ok(sessions)
    }

    async fn fetch_sessions_by_task(&self, task_id: &str) -> Result<Vec<TimerSession>, InfraError> {
        self.enter(OP_FETCH_SESSIONS_BY_TASK)?;
        let mut sessions: Vec<TimerSession> = self
            .state()?
            .sessions
            .iter()
            .filter(|session| session.task_id.as_deref() == Some(task_id))
            .cloned()
            .collect();
        sessions.sort_by(|left, right| right.started_at.cmp(&left.started_at));
        Ok(sessions)
    }

    async fn fetch_timer_settings(&self) -> Result<TimerSettings, InfraError> {
        self.enter(OP_FETCH_TIMER_SETTINGS)?;
        Ok(self.state()?.settings.clone())
    }

    async fn update_timer_settings(
        &self,
        patch: &TimerSettingsPatch,
    ) -> Result<TimerSettings, InfraError> {
        self.enter(OP_UPDATE_TIMER_SETTINGS)?;
        let mut state = self.state()?;
        let mut next = state.settings.clone();
        patch.apply(&mut next);
        next.validate().map_err(InfraError::InvalidConfig)?;
        next.updated_at = Utc::now();
        state.settings = next.clone();
        Ok(next)
    }

    async fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, InfraError> {
        self.enter(OP_FETCH_LOGS)?;
        let state = self.state()?;
        Ok(state
            .logs
            .iter()
            .rev()
            .filter(|entry| {
                query
                    .level
                    .as_deref()
                    .is_none_or(|level| entry.level.eq_ignore_ascii_case(level))
            })
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
