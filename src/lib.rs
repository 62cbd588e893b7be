pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::AppState;
pub use application::data_service::DataService;
pub use application::task_tree::{TaskTreeStore, TreeSnapshot};
pub use application::timer_controller::TimerController;
pub use domain::models::{NodeType, SessionKind, TaskNode, TaskNodePatch, TaskStatus};
pub use domain::timer::{reduce, TimerAction, TimerConfig, TimerState};
pub use infrastructure::error::InfraError;

use application::commands::{get_task_tree_impl, get_timer_state_impl, initialize_impl};
use infrastructure::logging::init_tracing;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Serialize)]
struct StatusResponse {
    workspace_root: String,
    database_path: String,
    startup: application::commands::StartupSummary,
    active_nodes: usize,
    deleted_nodes: usize,
    remaining: String,
}

/// Bootstraps the workspace in the current directory, runs the startup
/// sequence and prints a status report as JSON. Command failures are recorded
/// in the workspace command log before being returned.
pub fn run() -> Result<(), String> {
    init_tracing("info");
    let workspace_root = std::env::current_dir().map_err(|error| error.to_string())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| error.to_string())?;

    runtime.block_on(report_status(workspace_root))
}

async fn report_status(workspace_root: PathBuf) -> Result<(), String> {
    let state = AppState::new(workspace_root.clone()).map_err(|error| error.to_string())?;
    let result = status_response(&state, workspace_root).await;
    state.settle().await;
    state.shutdown();

    let status = result?;
    let rendered = serde_json::to_string_pretty(&status)
        .map_err(|error| state.command_error("status", &InfraError::from(error)))?;
    println!("{rendered}");
    Ok(())
}

async fn status_response(state: &AppState, workspace_root: PathBuf) -> Result<StatusResponse, String> {
    let startup = initialize_impl(state)
        .await
        .map_err(|error| state.command_error("initialize", &error))?;
    let tree = get_task_tree_impl(state).map_err(|error| state.command_error("get_task_tree", &error))?;
    let timer = get_timer_state_impl(state).map_err(|error| state.command_error("get_timer_state", &error))?;
    info!(
        data_service = %startup.data_service,
        nodes = tree.nodes.len(),
        "sonicflow ready"
    );

    Ok(StatusResponse {
        workspace_root: workspace_root.display().to_string(),
        database_path: state.database_path().display().to_string(),
        startup,
        active_nodes: tree.nodes.len(),
        deleted_nodes: tree.deleted.len(),
        remaining: timer.formatted_remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::LogQuery;
    use crate::infrastructure::config::{DataServiceMode, EnvOverrides};
    use crate::infrastructure::notifier::SilentNotifier;
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "sonicflow-status-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self) -> AppState {
            AppState::with_overrides(
                self.path.clone(),
                EnvOverrides {
                    mode: Some(DataServiceMode::Desktop),
                    base_url: None,
                },
                Arc::new(SilentNotifier),
            )
            .expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[tokio::test]
    async fn status_reports_fresh_workspace() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let status = status_response(&state, workspace.path.clone()).await.expect("status");
        assert_eq!(status.startup.data_service, "desktop");
        assert_eq!(status.active_nodes, 0);
        assert_eq!(status.remaining, "25:00");
        state.settle().await;
    }

    #[tokio::test]
    async fn failed_startup_is_recorded_in_command_log() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        fs::write(state.config_dir().join("timer.json"), "{not json").expect("corrupt timer config");

        assert!(status_response(&state, workspace.path.clone()).await.is_err());
        state.settle().await;
        let errors = state
            .command_log()
            .read(&LogQuery {
                level: Some("error".to_string()),
                limit: None,
            })
            .expect("read log");
        assert!(errors.iter().any(|entry| entry.command == "initialize"));
    }
}
