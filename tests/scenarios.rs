use sonicflow::application::task_tree::TaskTreeStore;
use sonicflow::application::timer_controller::TimerController;
use sonicflow::domain::error::TreeError;
use sonicflow::domain::models::{NodeType, SessionKind, TaskNode};
use sonicflow::domain::timer::{reduce, TimerAction, TimerConfig, TimerState};
use sonicflow::infrastructure::command_log::CommandLog;
use sonicflow::infrastructure::memory_data_service::{InMemoryDataService, OP_SYNC_TASK_TREE};
use sonicflow::infrastructure::notifier::SilentNotifier;
use sonicflow::infrastructure::sqlite_data_service::SqliteDataService;
use sonicflow::infrastructure::storage::initialize_database;
use sonicflow::DataService;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_TEMP_ROOT: AtomicUsize = AtomicUsize::new(0);

struct TempRoot {
    path: PathBuf,
}

impl TempRoot {
    fn new() -> Self {
        let sequence = NEXT_TEMP_ROOT.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "sonicflow-scenarios-{}-{}",
            std::process::id(),
            sequence
        ));
        fs::create_dir_all(&path).expect("create temp root");
        Self { path }
    }

    fn sqlite(&self) -> Arc<SqliteDataService> {
        let db_path = self.path.join("sonicflow.sqlite");
        initialize_database(&db_path).expect("initialize database");
        Arc::new(SqliteDataService::new(&db_path, CommandLog::new(&self.path)))
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn node(id: &str, node_type: NodeType, parent: Option<&str>, order: i64) -> TaskNode {
    TaskNode::new(id, node_type, id, parent.map(ToOwned::to_owned), order, chrono::Utc::now())
}

fn child_ids<D: DataService + ?Sized + 'static>(store: &TaskTreeStore<D>, parent: Option<&str>) -> Vec<String> {
    store.children(parent).into_iter().map(|node| node.id).collect()
}

#[test]
fn fourth_work_session_leads_into_long_break() {
    let config = TimerConfig {
        work_seconds: 1500,
        break_seconds: 300,
        long_break_seconds: 900,
        sessions_before_long_break: 4,
    };
    let mut state = TimerState::new(config);
    state.completed_work_sessions = 3;
    state.remaining_seconds = 0;

    let state = reduce(&state, TimerAction::AdvanceSession);
    assert!(state.show_completion_prompt);
    let state = reduce(&state, TimerAction::StartRest);
    assert_eq!(state.session_kind, SessionKind::LongBreak);
    assert_eq!(state.remaining_seconds, 900);
    assert_eq!(state.completed_work_sessions, 4);
}

#[tokio::test]
async fn consecutive_adds_keep_insertion_order() {
    let service = Arc::new(InMemoryDataService::new());
    let store = TaskTreeStore::new(Arc::clone(&service));
    store.load().await.expect("load");

    let milk = store.add_node(NodeType::Task, None, "Buy milk").expect("milk");
    let mom = store.add_node(NodeType::Task, None, "Call mom").expect("mom");
    let roots = store.children(None);
    assert_eq!(roots.iter().map(|node| node.order).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(child_ids(&store, None), vec![milk.id, mom.id]);

    store.settle().await;
    assert_eq!(service.calls(OP_SYNC_TASK_TREE), 2);
}

#[tokio::test]
async fn move_between_folders_against_sqlite() {
    let root = TempRoot::new();
    let service = root.sqlite();
    service
        .sync_task_tree(&[
            node("A", NodeType::Folder, None, 0),
            node("B", NodeType::Folder, None, 1),
            node("a1", NodeType::Task, Some("A"), 0),
            node("a2", NodeType::Task, Some("A"), 1),
            node("b1", NodeType::Task, Some("B"), 0),
        ])
        .await
        .expect("seed");

    let store = TaskTreeStore::new(Arc::clone(&service));
    store.load().await.expect("load");
    store.move_node("a1", Some("B"), 0).expect("move");
    store.settle().await;

    let reloaded = TaskTreeStore::new(Arc::clone(&service));
    reloaded.load().await.expect("reload");
    let moved = reloaded.get_node("a1").expect("moved node");
    assert_eq!(moved.parent_id.as_deref(), Some("B"));
    assert_eq!(moved.order, 0);
    assert_eq!(reloaded.get_node("a2").map(|node| node.order), Some(0));
    assert_eq!(reloaded.get_node("b1").map(|node| node.order), Some(1));
    assert_eq!(child_ids(&reloaded, Some("B")), vec!["a1", "b1"]);
}

#[tokio::test]
async fn cycle_is_rejected_and_tree_is_unchanged() {
    let service = Arc::new(InMemoryDataService::with_tasks(vec![
        node("outer", NodeType::Folder, None, 0),
        node("inner", NodeType::Folder, Some("outer"), 0),
    ]));
    let store = TaskTreeStore::new(Arc::clone(&service));
    store.load().await.expect("load");
    let before = store.nodes();

    assert_eq!(store.move_node("outer", Some("inner"), 0), Err(TreeError::CycleDetected));
    assert_eq!(store.move_node("outer", Some("outer"), 0), Err(TreeError::CycleDetected));
    assert_eq!(store.nodes(), before);
}

#[tokio::test]
async fn trash_lifecycle_against_sqlite() {
    let root = TempRoot::new();
    let service = root.sqlite();
    service
        .sync_task_tree(&[
            node("folder", NodeType::Folder, None, 0),
            node("child", NodeType::Task, Some("folder"), 0),
        ])
        .await
        .expect("seed");

    let store = TaskTreeStore::new(Arc::clone(&service));
    store.load().await.expect("load");
    store.soft_delete("folder").expect("soft delete");
    assert!(store.children(None).is_empty());
    store.restore("folder").expect("restore");
    assert_eq!(child_ids(&store, Some("folder")), vec!["child"]);

    store.soft_delete("folder").expect("soft delete again");
    store.settle().await;
    assert_eq!(service.fetch_deleted_tasks().await.expect("deleted").len(), 2);

    store.permanent_delete("folder").expect("permanent delete");
    store.settle().await;
    assert!(service.fetch_task_tree().await.expect("tree").is_empty());
    assert!(service.fetch_deleted_tasks().await.expect("deleted").is_empty());
}

#[tokio::test]
async fn timer_sessions_reach_sqlite() {
    let root = TempRoot::new();
    let service = root.sqlite();
    let timer = TimerController::new(Arc::clone(&service), Arc::new(SilentNotifier), TimerConfig::default());

    timer.start();
    timer.settle().await;
    for _ in 0..30 {
        timer.tick();
    }
    timer.pause();
    timer.settle().await;

    let sessions = service.fetch_timer_sessions().await.expect("sessions");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_type, SessionKind::Work);
    assert_eq!(sessions[0].duration, Some(timer.state().elapsed_seconds()));
    assert!(!sessions[0].completed);
}
