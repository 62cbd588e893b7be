use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::data_service::DataService;
use crate::application::migration::{migrate_legacy_tasks, MigrationOutcome};
use crate::application::task_tree::TaskTreeStore;
use crate::application::timer_controller::TimerController;
use crate::domain::analytics::{
    aggregate_by_day, aggregate_by_month, aggregate_by_task, aggregate_by_week, focus_summary,
    FocusSummary, PeriodBucket, TaskBucket,
};
use crate::domain::models::{
    ActiveTask, LogEntry, LogQuery, NodeType, TaskNode, TaskNodePatch, TimerSession,
};
use crate::domain::task_tree::{FlatFolder, FolderProgress, SortMode};
use crate::domain::timer::{TimerConfig, TimerState};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::config::{
    load_env_overrides, read_work_duration_minutes, save_notifications_enabled,
    write_work_duration_minutes, EnvOverrides,
};
use crate::infrastructure::data_service_factory::{build_data_service, DataServiceKind};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notifier::{DesktopNotifier, Notifier};
use crate::infrastructure::task_cache::TaskCache;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

const DEFAULT_DAY_BUCKETS: u32 = 7;
const DEFAULT_WEEK_BUCKETS: u32 = 8;
const DEFAULT_MONTH_BUCKETS: u32 = 6;

pub type AppTaskTree = TaskTreeStore<dyn DataService>;
pub type AppTimer = TimerController<dyn DataService, dyn Notifier>;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    data_service_kind: DataServiceKind,
    data_service: Arc<dyn DataService>,
    task_cache: TaskCache,
    task_tree: AppTaskTree,
    timer: AppTimer,
    command_log: CommandLog,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::with_overrides(workspace_root, load_env_overrides()?, Arc::new(DesktopNotifier))
    }

    /// Bootstraps the workspace and selects the data service once, from
    /// `app.json` plus `overrides`.
    pub fn with_overrides(
        workspace_root: PathBuf,
        overrides: EnvOverrides,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let command_log = CommandLog::new(&bootstrap.logs_dir);
        let kind = DataServiceKind::detect(
            &bootstrap.app_config.data_service,
            &overrides,
            &bootstrap.database_path,
        )?;
        let data_service = build_data_service(&kind, &command_log)?;
        Ok(Self::from_parts(bootstrap, kind, data_service, notifier, command_log))
    }

    /// Wires an already-built data service into the store and the timer.
    pub fn from_parts(
        bootstrap: BootstrapResult,
        data_service_kind: DataServiceKind,
        data_service: Arc<dyn DataService>,
        notifier: Arc<dyn Notifier>,
        command_log: CommandLog,
    ) -> Self {
        let task_cache = TaskCache::new(&bootstrap.state_dir);
        let task_tree = TaskTreeStore::with_cache(Arc::clone(&data_service), task_cache.clone());
        let timer = TimerController::new(Arc::clone(&data_service), notifier, TimerConfig::default())
            .with_notifications(bootstrap.app_config.notifications_enabled);

        Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            data_service_kind,
            data_service,
            task_cache,
            task_tree,
            timer,
            command_log,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn data_service_kind(&self) -> &DataServiceKind {
        &self.data_service_kind
    }

    pub fn data_service(&self) -> &Arc<dyn DataService> {
        &self.data_service
    }

    pub fn task_tree(&self) -> &AppTaskTree {
        &self.task_tree
    }

    pub fn timer(&self) -> &AppTimer {
        &self.timer
    }

    pub fn command_log(&self) -> &CommandLog {
        &self.command_log
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        if let Err(error) = self.command_log.append(level, command, message) {
            warn!(%error, command, "failed to append command log");
        }
    }

    /// Waits for every background sync issued by the store and the timer.
    pub async fn settle(&self) {
        self.task_tree.settle().await;
        self.timer.settle().await;
    }

    pub fn shutdown(&self) {
        self.timer.shutdown();
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StartupSummary {
    pub data_service: String,
    pub migration: Option<String>,
    pub tasks_loaded: Option<usize>,
    pub settings_loaded: bool,
    pub work_duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskTreeResponse {
    pub nodes: Vec<TaskNode>,
    pub deleted: Vec<TaskNode>,
    pub is_loaded: bool,
    pub persist_error: Option<String>,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerStateResponse {
    pub state: TimerState,
    pub progress: f64,
    pub total_duration: u32,
    pub formatted_remaining: String,
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusStatsResponse {
    pub period: String,
    pub buckets: Vec<PeriodBucket>,
    pub by_task: Vec<TaskBucket>,
    pub summary: FocusSummary,
}

/// Startup sequence: legacy migration, tree load, timer settings, then the
/// locally persisted work duration. Only a failed tree load is reported as
/// missing data; everything else degrades with a log entry.
pub async fn initialize_impl(state: &AppState) -> Result<StartupSummary, InfraError> {
    let migration = match migrate_legacy_tasks(state.data_service.as_ref(), &state.task_cache).await {
        Ok(MigrationOutcome::Migrated { count }) => {
            state.log_info("initialize", &format!("migrated {count} cached tasks"));
            Some(format!("migrated {count}"))
        }
        Ok(_) => None,
        Err(error) => {
            state.log_error("initialize", &format!("task migration failed: {error}"));
            None
        }
    };

    let tasks_loaded = match state.task_tree.load().await {
        Ok(count) => Some(count),
        Err(error) => {
            state.log_error("initialize", &format!("failed to load tasks: {error}"));
            None
        }
    };

    let settings_loaded = match state.timer.load_settings().await {
        Ok(_) => true,
        Err(error) => {
            state.log_error("initialize", &format!("failed to load timer settings: {error}"));
            false
        }
    };
    if let Some(minutes) = read_work_duration_minutes(&state.config_dir)? {
        state.timer.apply_local_work_duration(minutes);
    }

    let summary = StartupSummary {
        data_service: state.data_service_kind.label().to_string(),
        migration,
        tasks_loaded,
        settings_loaded,
        work_duration_minutes: state.timer.state().config.work_seconds / 60,
    };
    state.log_info(
        "initialize",
        &format!(
            "data_service={} tasks={:?} settings_loaded={}",
            summary.data_service, summary.tasks_loaded, summary.settings_loaded
        ),
    );
    Ok(summary)
}

/// Fetches the tree again after a failed startup load, which leaves the
/// store read-only, or to pick up backend changes. Pending syncs are drained
/// first so local edits reach the backend before being read back.
pub async fn reload_task_tree_impl(state: &AppState) -> Result<usize, InfraError> {
    state.task_tree.settle().await;
    let count = state.task_tree.load().await?;
    state.log_info("reload_task_tree", &format!("loaded {count} nodes"));
    Ok(count)
}

pub fn get_task_tree_impl(state: &AppState) -> Result<TaskTreeResponse, InfraError> {
    let snapshot = state.task_tree.snapshot();
    let (deleted, nodes): (Vec<TaskNode>, Vec<TaskNode>) =
        snapshot.nodes.into_iter().partition(|node| node.is_deleted);
    Ok(TaskTreeResponse {
        nodes,
        deleted,
        is_loaded: snapshot.is_loaded,
        persist_error: snapshot.persist_error,
        can_undo: snapshot.can_undo,
        can_redo: snapshot.can_redo,
    })
}

pub fn list_children_impl(
    state: &AppState,
    parent_id: Option<String>,
    sort: Option<String>,
) -> Result<Vec<TaskNode>, InfraError> {
    let mode = match sort.as_deref().map(str::trim) {
        None | Some("") => SortMode::Manual,
        Some(raw) => parse_sort_mode(raw)?,
    };
    Ok(state
        .task_tree
        .sorted_children(normalize_id(parent_id.as_deref()), mode))
}

pub fn add_node_impl(
    state: &AppState,
    node_type: String,
    parent_id: Option<String>,
    title: String,
) -> Result<TaskNode, InfraError> {
    let node_type = NodeType::parse(&node_type)
        .ok_or_else(|| InfraError::InvalidConfig(format!("unsupported node type: {node_type}")))?;
    let node = state
        .task_tree
        .add_node(node_type, normalize_id(parent_id.as_deref()), &title)?;
    state.log_info("add_node", &format!("created node_id={}", node.id));
    Ok(node)
}

pub fn update_node_impl(
    state: &AppState,
    node_id: String,
    patch: TaskNodePatch,
) -> Result<TaskNode, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    let node = state.task_tree.update_node(node_id, &patch)?;
    if patch.title.is_some() && active_task_id(state).as_deref() == Some(node_id) {
        state.timer.update_active_task_title(node.title.clone());
    }
    state.log_info("update_node", &format!("updated node_id={node_id}"));
    Ok(node)
}

pub fn toggle_task_status_impl(state: &AppState, node_id: String) -> Result<TaskNode, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    let node = state.task_tree.toggle_task_status(node_id)?;
    state.log_info(
        "toggle_task_status",
        &format!("node_id={node_id} status={:?}", node.status),
    );
    Ok(node)
}

pub fn toggle_expanded_impl(state: &AppState, node_id: String) -> Result<bool, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    Ok(state.task_tree.toggle_expanded(node_id)?)
}

pub fn complete_folder_impl(state: &AppState, folder_id: String) -> Result<usize, InfraError> {
    let folder_id = required_id(&folder_id, "folder_id")?;
    let completed = state.task_tree.complete_folder(folder_id)?;
    state.log_info(
        "complete_folder",
        &format!("folder_id={folder_id} completed={completed}"),
    );
    Ok(completed)
}

pub fn soft_delete_node_impl(state: &AppState, node_id: String) -> Result<bool, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    state.task_tree.soft_delete(node_id)?;
    clear_timer_task_if_gone(state);
    state.log_info("soft_delete_node", &format!("deleted node_id={node_id}"));
    Ok(true)
}

pub fn restore_node_impl(state: &AppState, node_id: String) -> Result<bool, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    state.task_tree.restore(node_id)?;
    state.log_info("restore_node", &format!("restored node_id={node_id}"));
    Ok(true)
}

pub fn permanent_delete_node_impl(state: &AppState, node_id: String) -> Result<bool, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    state.task_tree.permanent_delete(node_id)?;
    clear_timer_task_if_gone(state);
    state.log_info("permanent_delete_node", &format!("purged node_id={node_id}"));
    Ok(true)
}

pub fn move_node_impl(
    state: &AppState,
    node_id: String,
    parent_id: Option<String>,
    index: usize,
) -> Result<TaskNode, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    state
        .task_tree
        .move_node(node_id, normalize_id(parent_id.as_deref()), index)?;
    moved_node(state, "move_node", node_id)
}

pub fn move_node_into_impl(
    state: &AppState,
    node_id: String,
    folder_id: String,
) -> Result<TaskNode, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    let folder_id = required_id(&folder_id, "folder_id")?;
    state.task_tree.move_node_into(node_id, folder_id)?;
    moved_node(state, "move_node_into", node_id)
}

pub fn move_to_root_impl(state: &AppState, node_id: String) -> Result<TaskNode, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    state.task_tree.move_to_root(node_id)?;
    moved_node(state, "move_to_root", node_id)
}

pub fn undo_impl(state: &AppState) -> Result<bool, InfraError> {
    let changed = state.task_tree.undo()?;
    if changed {
        clear_timer_task_if_gone(state);
    }
    Ok(changed)
}

pub fn redo_impl(state: &AppState) -> Result<bool, InfraError> {
    let changed = state.task_tree.redo()?;
    if changed {
        clear_timer_task_if_gone(state);
    }
    Ok(changed)
}

pub fn dismiss_persist_error_impl(state: &AppState) -> Result<(), InfraError> {
    state.task_tree.clear_persist_error();
    Ok(())
}

pub fn get_breadcrumb_impl(state: &AppState, node_id: String) -> Result<Vec<TaskNode>, InfraError> {
    let node_id = required_id(&node_id, "node_id")?;
    Ok(state.task_tree.ancestors(node_id))
}

pub fn list_folders_impl(state: &AppState) -> Result<Vec<FlatFolder>, InfraError> {
    Ok(state.task_tree.flatten_folders())
}

pub fn get_folder_progress_impl(state: &AppState, folder_id: String) -> Result<FolderProgress, InfraError> {
    let folder_id = required_id(&folder_id, "folder_id")?;
    Ok(state.task_tree.folder_progress(folder_id))
}

pub fn get_timer_state_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    let timer_state = state.timer.state();
    Ok(TimerStateResponse {
        progress: timer_state.progress() * 100.0,
        total_duration: timer_state.session_seconds,
        formatted_remaining: AppTimer::format_time(timer_state.remaining_seconds),
        notifications_enabled: state.timer.notifications_enabled(),
        state: timer_state,
    })
}

pub fn start_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state.timer.start();
    get_timer_state_impl(state)
}

pub fn pause_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state.timer.pause();
    get_timer_state_impl(state)
}

pub fn reset_timer_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state.timer.reset();
    get_timer_state_impl(state)
}

pub fn start_rest_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state.timer.start_rest();
    get_timer_state_impl(state)
}

pub fn extend_work_impl(state: &AppState, minutes: u32) -> Result<TimerStateResponse, InfraError> {
    if minutes == 0 {
        return Err(InfraError::InvalidConfig("minutes must be > 0".to_string()));
    }
    state.timer.extend_work(minutes);
    get_timer_state_impl(state)
}

pub fn dismiss_completion_prompt_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state.timer.dismiss_completion_prompt();
    get_timer_state_impl(state)
}

/// Binds the timer to a task and starts a work segment of the task's own
/// duration, or the configured one.
pub fn start_timer_for_task_impl(state: &AppState, task_id: String) -> Result<TimerStateResponse, InfraError> {
    let task = timer_task(state, &task_id)?;
    state
        .timer
        .start_for_task(ActiveTask::new(task.id.clone(), task.title.clone()), task.work_duration_minutes);
    state.log_info("start_timer_for_task", &format!("task_id={}", task.id));
    get_timer_state_impl(state)
}

pub fn open_timer_for_task_impl(state: &AppState, task_id: String) -> Result<TimerStateResponse, InfraError> {
    let task = timer_task(state, &task_id)?;
    state
        .timer
        .open_for_task(ActiveTask::new(task.id.clone(), task.title.clone()), task.work_duration_minutes);
    get_timer_state_impl(state)
}

pub fn clear_timer_task_impl(state: &AppState) -> Result<TimerStateResponse, InfraError> {
    state.timer.clear_task();
    get_timer_state_impl(state)
}

/// Applies the clamped work duration and keeps it in `timer.json` so it
/// survives restarts.
pub fn set_work_duration_impl(state: &AppState, minutes: u32) -> Result<u32, InfraError> {
    let applied = state.timer.set_work_duration_minutes(minutes);
    write_work_duration_minutes(&state.config_dir, applied)?;
    state.log_info("set_work_duration", &format!("work_duration_minutes={applied}"));
    Ok(applied)
}

pub fn set_break_duration_impl(state: &AppState, minutes: u32) -> Result<u32, InfraError> {
    Ok(state.timer.set_break_duration_minutes(minutes))
}

pub fn set_long_break_duration_impl(state: &AppState, minutes: u32) -> Result<u32, InfraError> {
    Ok(state.timer.set_long_break_duration_minutes(minutes))
}

pub fn set_sessions_before_long_break_impl(state: &AppState, count: u32) -> Result<u32, InfraError> {
    Ok(state.timer.set_sessions_before_long_break(count))
}

pub fn set_notifications_enabled_impl(state: &AppState, enabled: bool) -> Result<bool, InfraError> {
    save_notifications_enabled(&state.config_dir, enabled)?;
    state.timer.set_notifications_enabled(enabled);
    Ok(enabled)
}

pub async fn list_timer_sessions_impl(state: &AppState) -> Result<Vec<TimerSession>, InfraError> {
    state.data_service.fetch_timer_sessions().await
}

pub async fn list_task_sessions_impl(state: &AppState, task_id: String) -> Result<Vec<TimerSession>, InfraError> {
    let task_id = required_id(&task_id, "task_id")?;
    state.data_service.fetch_sessions_by_task(task_id).await
}

/// Focus minutes bucketed by `period` (`day`, `week` or `month`), per task,
/// and overall.
pub async fn get_focus_stats_impl(
    state: &AppState,
    period: String,
    count: Option<u32>,
) -> Result<FocusStatsResponse, InfraError> {
    let sessions = state.data_service.fetch_timer_sessions().await?;
    let today = Utc::now().date_naive();
    let period = period.trim().to_ascii_lowercase();
    let buckets = match period.as_str() {
        "day" => aggregate_by_day(&sessions, count.unwrap_or(DEFAULT_DAY_BUCKETS), today),
        "week" => aggregate_by_week(&sessions, count.unwrap_or(DEFAULT_WEEK_BUCKETS), today),
        "month" => aggregate_by_month(&sessions, count.unwrap_or(DEFAULT_MONTH_BUCKETS), today),
        other => {
            return Err(InfraError::InvalidConfig(format!(
                "unsupported period: {other} (expected day, week or month)"
            )));
        }
    };
    let task_names: HashMap<String, String> = state
        .task_tree
        .nodes()
        .into_iter()
        .filter(TaskNode::is_task)
        .map(|node| (node.id, node.title))
        .collect();

    Ok(FocusStatsResponse {
        period,
        buckets,
        by_task: aggregate_by_task(&sessions, &task_names),
        summary: focus_summary(&sessions),
    })
}

pub async fn fetch_logs_impl(
    state: &AppState,
    level: Option<String>,
    limit: Option<usize>,
) -> Result<Vec<LogEntry>, InfraError> {
    state
        .data_service
        .fetch_logs(&LogQuery {
            level: level.filter(|value| !value.trim().is_empty()),
            limit,
        })
        .await
}

fn required_id<'a>(value: &'a str, field_name: &str) -> Result<&'a str, InfraError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(InfraError::InvalidConfig(format!("{field_name} must not be empty")));
    }
    Ok(value)
}

fn normalize_id(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_sort_mode(value: &str) -> Result<SortMode, InfraError> {
    match value {
        "manual" => Ok(SortMode::Manual),
        "status" => Ok(SortMode::Status),
        "scheduledAt" | "scheduled_at" => Ok(SortMode::ScheduledAt),
        other => Err(InfraError::InvalidConfig(format!("unsupported sort mode: {other}"))),
    }
}

fn moved_node(state: &AppState, command: &str, node_id: &str) -> Result<TaskNode, InfraError> {
    let node = state
        .task_tree
        .get_node(node_id)
        .ok_or_else(|| InfraError::NotFound(format!("node {node_id}")))?;
    state.log_info(
        command,
        &format!("node_id={node_id} parent_id={:?} order={}", node.parent_id, node.order),
    );
    Ok(node)
}

fn timer_task(state: &AppState, task_id: &str) -> Result<TaskNode, InfraError> {
    let task_id = required_id(task_id, "task_id")?;
    let node = state
        .task_tree
        .get_node(task_id)
        .filter(|node| !node.is_deleted)
        .ok_or_else(|| InfraError::NotFound(format!("task {task_id}")))?;
    if !node.is_task() {
        return Err(InfraError::InvalidConfig(format!("node is not a task: {task_id}")));
    }
    Ok(node)
}

fn active_task_id(state: &AppState) -> Option<String> {
    state.timer.state().active_task.map(|task| task.id)
}

fn clear_timer_task_if_gone(state: &AppState) {
    let Some(task_id) = active_task_id(state) else {
        return;
    };
    let still_active = state
        .task_tree
        .get_node(&task_id)
        .is_some_and(|node| !node.is_deleted);
    if !still_active {
        state.timer.clear_task();
    }
}
