use crate::application::data_service::DataService;
use crate::domain::models::{
    LogEntry, LogQuery, NodeType, SessionKind, TaskNode, TaskNodePatch, TaskStatus, TimerSession,
    TimerSettings, TimerSettingsPatch,
};
use crate::domain::task_tree::subtree_ids;
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_connection;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const TASK_COLUMNS: &str = "id, type, title, parent_id, \"order\", status, is_expanded, is_deleted, \
     deleted_at, created_at, completed_at, scheduled_at, content, work_duration_minutes, color";
const SESSION_COLUMNS: &str = "id, task_id, session_type, started_at, completed_at, duration, completed";
const UPSERT_TASK_SQL: &str = "INSERT OR REPLACE INTO tasks (id, type, title, parent_id, \"order\", status, \
     is_expanded, is_deleted, deleted_at, created_at, completed_at, scheduled_at, content, \
     work_duration_minutes, color) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)";

/// Desktop backend: the workspace SQLite database, accessed in-process.
#[derive(Debug, Clone)]
pub struct SqliteDataService {
    db_path: PathBuf,
    command_log: CommandLog,
}

impl SqliteDataService {
    pub fn new(db_path: impl AsRef<Path>, command_log: CommandLog) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            command_log,
        }
    }

    async fn run<T, F>(&self, operation: F) -> Result<T, InfraError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, InfraError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = open_connection(&db_path)?;
            operation(&mut connection)
        })
        .await
        .map_err(|error| InfraError::Io(std::io::Error::other(format!("sqlite worker failed: {error}"))))?
    }
}

struct TaskRow {
    id: String,
    node_type: String,
    title: String,
    parent_id: Option<String>,
    order: i64,
    status: Option<String>,
    is_expanded: bool,
    is_deleted: bool,
    deleted_at: Option<String>,
    created_at: String,
    completed_at: Option<String>,
    scheduled_at: Option<String>,
    content: Option<String>,
    work_duration_minutes: Option<i64>,
    color: Option<String>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            node_type: row.get(1)?,
            title: row.get(2)?,
            parent_id: row.get(3)?,
            order: row.get(4)?,
            status: row.get(5)?,
            is_expanded: row.get::<_, Option<i64>>(6)?.unwrap_or(0) != 0,
            is_deleted: row.get::<_, Option<i64>>(7)?.unwrap_or(0) != 0,
            deleted_at: row.get(8)?,
            created_at: row.get(9)?,
            completed_at: row.get(10)?,
            scheduled_at: row.get(11)?,
            content: row.get(12)?,
            work_duration_minutes: row.get(13)?,
            color: row.get(14)?,
        })
    }

    fn into_node(self) -> Result<TaskNode, InfraError> {
        let node_type = NodeType::parse(&self.node_type).ok_or_else(|| {
            InfraError::InvalidConfig(format!("invalid tasks.type '{}' for {}", self.node_type, self.id))
        })?;
        let status = match self.status.as_deref() {
            None => None,
            Some(raw) => Some(TaskStatus::parse(raw).ok_or_else(|| {
                InfraError::InvalidConfig(format!("invalid tasks.status '{raw}' for {}", self.id))
            })?),
        };
        Ok(TaskNode {
            node_type,
            title: self.title,
            parent_id: self.parent_id,
            order: self.order,
            status: if node_type == NodeType::Task { status } else { None },
            is_expanded: self.is_expanded,
            is_deleted: self.is_deleted,
            deleted_at: parse_optional_time(self.deleted_at, "tasks.deleted_at")?,
            created_at: parse_time(&self.created_at, "tasks.created_at")?,
            completed_at: parse_optional_time(self.completed_at, "tasks.completed_at")?,
            scheduled_at: parse_optional_time(self.scheduled_at, "tasks.scheduled_at")?,
            content: self.content,
            work_duration_minutes: self
                .work_duration_minutes
                .and_then(|minutes| u32::try_from(minutes).ok()),
            color: self.color,
            id: self.id,
        })
    }
}

fn parse_time(raw: &str, field: &str) -> Result<DateTime<Utc>, InfraError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {field} '{raw}': {error}")))
}

fn parse_optional_time(raw: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>, InfraError> {
    raw.map(|value| parse_time(&value, field)).transpose()
}

fn upsert_node(connection: &Connection, node: &TaskNode) -> Result<(), InfraError> {
    connection.execute(
        UPSERT_TASK_SQL,
        params![
            node.id,
            node.node_type.as_str(),
            node.title,
            node.parent_id,
            node.order,
            node.status.map(TaskStatus::as_str),
            i64::from(node.is_expanded),
            i64::from(node.is_deleted),
            node.deleted_at.map(|value| value.to_rfc3339()),
            node.created_at.to_rfc3339(),
            node.completed_at.map(|value| value.to_rfc3339()),
            node.scheduled_at.map(|value| value.to_rfc3339()),
            node.content,
            node.work_duration_minutes,
            node.color,
        ],
    )?;
    Ok(())
}

fn query_nodes(connection: &Connection, filter: &str) -> Result<Vec<TaskNode>, InfraError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks {filter}");
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map([], TaskRow::from_row)?;
    let mut nodes = Vec::new();
    for row in rows {
        nodes.push(row?.into_node()?);
    }
    Ok(nodes)
}

fn load_node(connection: &Connection, id: &str) -> Result<TaskNode, InfraError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    connection
        .query_row(&sql, params![id], TaskRow::from_row)
        .optional()?
        .ok_or_else(|| InfraError::NotFound(format!("task {id}")))?
        .into_node()
}

fn all_nodes(connection: &Connection) -> Result<Vec<TaskNode>, InfraError> {
    query_nodes(connection, "")
}

struct SessionRow {
    id: i64,
    task_id: Option<String>,
    session_type: String,
    started_at: String,
    completed_at: Option<String>,
    duration: Option<i64>,
    completed: i64,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            session_type: row.get(2)?,
            started_at: row.get(3)?,
            completed_at: row.get(4)?,
            duration: row.get(5)?,
            completed: row.get(6)?,
        })
    }

    fn into_session(self) -> Result<TimerSession, InfraError> {
        let session_type = SessionKind::parse(&self.session_type).ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "invalid timer_sessions.session_type '{}'",
                self.session_type
            ))
        })?;
        Ok(TimerSession {
            id: self.id,
            task_id: self.task_id,
            session_type,
            started_at: parse_time(&self.started_at, "timer_sessions.started_at")?,
            completed_at: parse_optional_time(self.completed_at, "timer_sessions.completed_at")?,
            duration: self.duration.and_then(|value| u32::try_from(value).ok()),
            completed: self.completed != 0,
        })
    }
}

fn query_sessions(
    connection: &Connection,
    task_id: Option<&str>,
) -> Result<Vec<TimerSession>, InfraError> {
    let mut sessions = Vec::new();
    match task_id {
        Some(task_id) => {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM timer_sessions WHERE task_id = ?1 ORDER BY started_at DESC, id DESC"
            );
            let mut statement = connection.prepare(&sql)?;
            for row in statement.query_map(params![task_id], SessionRow::from_row)? {
                sessions.push(row?.into_session()?);
            }
        }
        None => {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM timer_sessions ORDER BY started_at DESC, id DESC");
            let mut statement = connection.prepare(&sql)?;
            for row in statement.query_map([], SessionRow::from_row)? {
                sessions.push(row?.into_session()?);
            }
        }
    }
    Ok(sessions)
}

fn load_session(connection: &Connection, id: i64) -> Result<TimerSession, InfraError> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM timer_sessions WHERE id = ?1");
    connection
        .query_row(&sql, params![id], SessionRow::from_row)
        .optional()?
        .ok_or_else(|| InfraError::NotFound(format!("timer session {id}")))?
        .into_session()
}

fn load_settings(connection: &Connection) -> Result<TimerSettings, InfraError> {
    let row: Option<(i64, i64, i64, i64, i64, i64, String)> = connection
        .query_row(
            "SELECT id, work_duration, break_duration, long_break_duration,
                    sessions_before_long_break, auto_start_breaks, updated_at
             FROM timer_settings WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            },
        )
        .optional()?;
    let Some((id, work, short_break, long_break, cycle, auto_start, updated_at)) = row else {
        return Err(InfraError::NotFound("timer settings".to_string()));
    };
    let minutes = |value: i64, field: &str| {
        u32::try_from(value)
            .map_err(|_| InfraError::InvalidConfig(format!("invalid timer_settings.{field}: {value}")))
    };
    Ok(TimerSettings {
        id,
        work_duration: minutes(work, "work_duration")?,
        break_duration: minutes(short_break, "break_duration")?,
        long_break_duration: minutes(long_break, "long_break_duration")?,
        sessions_before_long_break: minutes(cycle, "sessions_before_long_break")?,
        auto_start_breaks: auto_start != 0,
        updated_at: parse_time(&updated_at, "timer_settings.updated_at")?,
    })
}

fn set_deleted(connection: &mut Connection, id: &str, deleted: bool) -> Result<(), InfraError> {
    let nodes = all_nodes(connection)?;
    if !nodes.iter().any(|node| node.id == id) {
        return Err(InfraError::NotFound(format!("task {id}")));
    }
    let deleted_at = deleted.then(|| Utc::now().to_rfc3339());
    let transaction = connection.transaction()?;
    for node_id in subtree_ids(&nodes, id) {
        transaction.execute(
            "UPDATE tasks SET is_deleted = ?1, deleted_at = ?2 WHERE id = ?3",
            params![i64::from(deleted), deleted_at, node_id],
        )?;
    }
    transaction.commit()?;
    Ok(())
}

#[async_trait]
impl DataService for SqliteDataService {
    async fn fetch_task_tree(&self) -> Result<Vec<TaskNode>, InfraError> {
        self.run(|connection| query_nodes(connection, "WHERE is_deleted = 0 ORDER BY \"order\" ASC"))
            .await
    }

    async fn fetch_deleted_tasks(&self) -> Result<Vec<TaskNode>, InfraError> {
        self.run(|connection| query_nodes(connection, "WHERE is_deleted = 1 ORDER BY deleted_at DESC"))
            .await
    }

    async fn create_task(&self, node: &TaskNode) -> Result<TaskNode, InfraError> {
        node.validate().map_err(InfraError::InvalidConfig)?;
        let node = node.clone();
        self.run(move |connection| {
            upsert_node(connection, &node)?;
            load_node(connection, &node.id)
        })
        .await
    }

    async fn update_task(&self, id: &str, patch: &TaskNodePatch) -> Result<TaskNode, InfraError> {
        let id = id.to_string();
        let patch = patch.clone();
        self.run(move |connection| {
            let mut node = load_node(connection, &id)?;
            patch.apply(&mut node, Utc::now());
            upsert_node(connection, &node)?;
            Ok(node)
        })
        .await
    }

    async fn sync_task_tree(&self, nodes: &[TaskNode]) -> Result<(), InfraError> {
        let nodes = nodes.to_vec();
        self.run(move |connection| {
            let incoming: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
            let transaction = connection.transaction()?;
            let existing: Vec<String> = {
                let mut statement = transaction.prepare("SELECT id FROM tasks")?;
                let ids = statement.query_map([], |row| row.get::<_, String>(0))?;
                ids.collect::<Result<_, _>>()?
            };
            for id in existing.iter().filter(|id| !incoming.contains(id.as_str())) {
                transaction.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            }
            for node in &nodes {
                upsert_node(&transaction, node)?;
            }
            transaction.commit()?;
            Ok(())
        })
        .await
    }

    async fn soft_delete_task(&self, id: &str) -> Result<(), InfraError> {
        let id = id.to_string();
        self.run(move |connection| set_deleted(connection, &id, true)).await
    }

    async fn restore_task(&self, id: &str) -> Result<(), InfraError> {
        let id = id.to_string();
        self.run(move |connection| set_deleted(connection, &id, false)).await
    }

    async fn permanent_delete_task(&self, id: &str) -> Result<(), InfraError> {
        let id = id.to_string();
        self.run(move |connection| {
            let nodes = all_nodes(connection)?;
            let transaction = connection.transaction()?;
            for node_id in subtree_ids(&nodes, &id) {
                transaction.execute("DELETE FROM tasks WHERE id = ?1", params![node_id])?;
            }
            transaction.commit()?;
            Ok(())
        })
        .await
    }

    async fn migrate_tasks(&self, nodes: &[TaskNode]) -> Result<(), InfraError> {
        let nodes = nodes.to_vec();
        self.run(move |connection| {
            let existing: HashSet<String> = all_nodes(connection)?.into_iter().map(|node| node.id).collect();
            let transaction = connection.transaction()?;
            for node in nodes.iter().filter(|node| !existing.contains(&node.id)) {
                upsert_node(&transaction, node)?;
            }
            transaction.commit()?;
            Ok(())
        })
        .await
    }

    async fn start_timer_session(
        &self,
        kind: SessionKind,
        task_id: Option<&str>,
    ) -> Result<TimerSession, InfraError> {
        let task_id = task_id.map(ToOwned::to_owned);
        self.run(move |connection| {
            connection.execute(
                "INSERT INTO timer_sessions (task_id, session_type, started_at, completed) VALUES (?1, ?2, ?3, 0)",
                params![task_id, kind.as_str(), Utc::now().to_rfc3339()],
            )?;
            load_session(connection, connection.last_insert_rowid())
        })
        .await
    }

    async fn end_timer_session(
        &self,
        id: i64,
        duration_seconds: u32,
        completed: bool,
    ) -> Result<TimerSession, InfraError> {
        self.run(move |connection| {
            let changed = connection.execute(
                "UPDATE timer_sessions SET completed_at = ?1, duration = ?2, completed = ?3 WHERE id = ?4",
                params![Utc::now().to_rfc3339(), duration_seconds, i64::from(completed), id],
            )?;
            if changed == 0 {
                return Err(InfraError::NotFound(format!("timer session {id}")));
            }
            load_session(connection, id)
        })
        .await
    }

    async fn fetch_timer_sessions(&self) -> Result<Vec<TimerSession>, InfraError> {
        self.run(|connection| query_sessions(connection, None)).await
    }

    async fn fetch_sessions_by_task(&self, task_id: &str) -> Result<Vec<TimerSession>, InfraError> {
        let task_id = task_id.to_string();
        self.run(move |connection| query_sessions(connection, Some(&task_id)))
            .await
    }

    async fn fetch_timer_settings(&self) -> Result<TimerSettings, InfraError> {
        self.run(|connection| load_settings(connection)).await
    }

    async fn update_timer_settings(
        &self,
        patch: &TimerSettingsPatch,
    ) -> Result<TimerSettings, InfraError> {
        let patch = patch.clone();
        self.run(move |connection| {
            let mut settings = load_settings(connection)?;
            patch.apply(&mut settings);
            settings.validate().map_err(InfraError::InvalidConfig)?;
            settings.updated_at = Utc::now();
            connection.execute(
                "UPDATE timer_settings SET
                   work_duration = ?1,
                   break_duration = ?2,
                   long_break_duration = ?3,
                   sessions_before_long_break = ?4,
                   auto_start_breaks = ?5,
                   updated_at = ?6
                 WHERE id = 1",
                params![
                    settings.work_duration,
                    settings.break_duration,
                    settings.long_break_duration,
                    settings.sessions_before_long_break,
                    i64::from(settings.auto_start_breaks),
                    settings.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(settings)
        })
        .await
    }

    async fn fetch_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, InfraError> {
        let log = self.command_log.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || log.read(&query))
            .await
            .map_err(|error| InfraError::Io(std::io::Error::other(format!("log reader failed: {error}"))))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

    struct TempDatabase {
        root: PathBuf,
        service: SqliteDataService,
    }

    impl TempDatabase {
        fn new() -> Self {
            let sequence = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
            let root = std::env::temp_dir().join(format!(
                "sonicflow-sqlite-service-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&root).expect("create temp root");
            let db_path = root.join("sonicflow.sqlite");
            initialize_database(&db_path).expect("initialize database");
            let service = SqliteDataService::new(&db_path, CommandLog::new(&root));
            Self { root, service }
        }
    }

    impl Drop for TempDatabase {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn node(id: &str, node_type: NodeType, parent: Option<&str>, order: i64) -> TaskNode {
        TaskNode::new(id, node_type, format!("title {id}"), parent.map(ToOwned::to_owned), order, Utc::now())
    }

    #[tokio::test]
    async fn sync_replaces_rows_and_preserves_fields() {
        let db = TempDatabase::new();
        let mut task = node("task-1", NodeType::Task, Some("folder-1"), 0);
        task.content = Some("<p>notes</p>".to_string());
        task.work_duration_minutes = Some(45);
        let stale = node("stale", NodeType::Task, None, 3);
        db.service
            .sync_task_tree(&[node("folder-1", NodeType::Folder, None, 0), stale])
            .await
            .expect("first sync");

        db.service
            .sync_task_tree(&[node("folder-1", NodeType::Folder, None, 0), task.clone()])
            .await
            .expect("second sync");

        let tree = db.service.fetch_task_tree().await.expect("fetch tree");
        let mut ids: Vec<&str> = tree.iter().map(|node| node.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["folder-1", "task-1"]);
        let stored = tree.iter().find(|node| node.id == "task-1").expect("task stored");
        assert_eq!(stored.content, task.content);
        assert_eq!(stored.work_duration_minutes, Some(45));
        assert_eq!(stored.status, Some(TaskStatus::Todo));
        let folder = tree.iter().find(|node| node.id == "folder-1").expect("folder stored");
        assert!(folder.is_expanded);
        assert_eq!(folder.status, None);
    }

    #[tokio::test]
    async fn soft_delete_restore_and_permanent_delete() {
        let db = TempDatabase::new();
        db.service
            .sync_task_tree(&[
                node("folder-1", NodeType::Folder, None, 0),
                node("task-1", NodeType::Task, Some("folder-1"), 0),
            ])
            .await
            .expect("sync");

        db.service.soft_delete_task("folder-1").await.expect("soft delete");
        assert!(db.service.fetch_task_tree().await.expect("tree").is_empty());
        let deleted = db.service.fetch_deleted_tasks().await.expect("deleted");
        assert_eq!(deleted.len(), 2);
        assert!(deleted.iter().all(|node| node.deleted_at.is_some()));

        db.service.restore_task("folder-1").await.expect("restore");
        assert_eq!(db.service.fetch_task_tree().await.expect("tree").len(), 2);

        db.service.permanent_delete_task("folder-1").await.expect("permanent delete");
        assert!(db.service.fetch_task_tree().await.expect("tree").is_empty());
        assert!(db.service.soft_delete_task("folder-1").await.is_err());
    }

    #[tokio::test]
    async fn update_task_applies_patch() {
        let db = TempDatabase::new();
        db.service
            .create_task(&node("task-1", NodeType::Task, None, 0))
            .await
            .expect("create");
        let updated = db
            .service
            .update_task(
                "task-1",
                &TaskNodePatch {
                    status: Some(TaskStatus::Done),
                    ..TaskNodePatch::title("Renamed")
                },
            )
            .await
            .expect("update");
        assert_eq!(updated.title, "Renamed");
        assert!(updated.completed_at.is_some());
        assert!(matches!(
            db.service.update_task("missing", &TaskNodePatch::title("x")).await,
            Err(InfraError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn migrate_keeps_existing_rows() {
        let db = TempDatabase::new();
        let mut original = node("task-1", NodeType::Task, None, 0);
        original.title = "backend copy".to_string();
        db.service.create_task(&original).await.expect("create");

        let mut legacy = node("task-1", NodeType::Task, None, 0);
        legacy.title = "legacy copy".to_string();
        db.service
            .migrate_tasks(&[legacy, node("task-2", NodeType::Task, None, 1)])
            .await
            .expect("migrate");

        let tree = db.service.fetch_task_tree().await.expect("tree");
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].title, "backend copy");
    }

    #[tokio::test]
    async fn timer_sessions_and_settings_round_trip() {
        let db = TempDatabase::new();
        let started = db
            .service
            .start_timer_session(SessionKind::Work, Some("task-1"))
            .await
            .expect("start");
        assert!(!started.completed);
        let ended = db
            .service
            .end_timer_session(started.id, 1500, true)
            .await
            .expect("end");
        assert_eq!(ended.duration, Some(1500));
        assert!(ended.completed_at.is_some());
        db.service
            .start_timer_session(SessionKind::Break, None)
            .await
            .expect("start break");

        assert_eq!(db.service.fetch_timer_sessions().await.expect("sessions").len(), 2);
        assert_eq!(
            db.service
                .fetch_sessions_by_task("task-1")
                .await
                .expect("by task")
                .len(),
            1
        );
        assert!(db.service.end_timer_session(999, 1, false).await.is_err());

        let settings = db
            .service
            .update_timer_settings(&TimerSettingsPatch {
                work_duration: Some(50),
                ..TimerSettingsPatch::default()
            })
            .await
            .expect("update settings");
        assert_eq!(settings.work_duration, 50);
        assert_eq!(db.service.fetch_timer_settings().await.expect("settings").work_duration, 50);
        assert!(db
            .service
            .update_timer_settings(&TimerSettingsPatch {
                break_duration: Some(0),
                ..TimerSettingsPatch::default()
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn fetch_logs_reads_command_log() {
        let db = TempDatabase::new();
        db.service.command_log.append("error", "sync_tree", "offline").expect("append");
        let logs = db.service.fetch_logs(&LogQuery::default()).await.expect("logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "offline");
    }
}
