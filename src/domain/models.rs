use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    #[serde(alias = "subfolder")]
    Folder,
    Task,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Task => "task",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "folder" | "subfolder" => Some(Self::Folder),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "TODO",
            Self::Done => "DONE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TODO" => Some(Self::Todo),
            "DONE" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Todo => Self::Done,
            Self::Done => Self::Todo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub title: String,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "false_if_null")]
    pub is_expanded: bool,
    #[serde(default, deserialize_with = "false_if_null")]
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl TaskNode {
    pub fn new(
        id: impl Into<String>,
        node_type: NodeType,
        title: impl Into<String>,
        parent_id: Option<String>,
        order: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type,
            title: title.into(),
            parent_id,
            order,
            status: (node_type == NodeType::Task).then_some(TaskStatus::Todo),
            is_expanded: node_type == NodeType::Folder,
            is_deleted: false,
            deleted_at: None,
            created_at,
            completed_at: None,
            scheduled_at: None,
            content: None,
            work_duration_minutes: None,
            color: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.node_type == NodeType::Folder
    }

    pub fn is_task(&self) -> bool {
        self.node_type == NodeType::Task
    }

    pub fn is_done(&self) -> bool {
        self.status == Some(TaskStatus::Done)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "task_node.id")?;
        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err("task_node.parent_id must not reference the node itself".to_string());
        }
        if self.order < 0 {
            return Err("task_node.order must be >= 0".to_string());
        }
        if self.is_folder() && self.status.is_some() {
            return Err("task_node.status is only valid for tasks".to_string());
        }
        if self.is_deleted != self.deleted_at.is_some() {
            return Err("task_node.deleted_at must be set exactly when is_deleted".to_string());
        }
        if let Some(minutes) = self.work_duration_minutes {
            if minutes == 0 {
                return Err("task_node.work_duration_minutes must be > 0".to_string());
            }
        }
        Ok(())
    }
}

/// Field-level update for a node. Structural fields (`parent_id`, `order`,
/// deletion flags) are only changed through the movement and deletion
/// operations of the tree store.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskNodePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expanded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_duration_minutes: Option<Option<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Option<String>>,
}

impl TaskNodePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, node: &mut TaskNode, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            node.title = title.trim().to_string();
        }
        if let Some(status) = self.status {
            if node.is_task() && node.status != Some(status) {
                node.status = Some(status);
                node.completed_at = (status == TaskStatus::Done).then_some(now);
            }
        }
        if let Some(expanded) = self.is_expanded {
            node.is_expanded = expanded;
        }
        if let Some(scheduled_at) = self.scheduled_at {
            node.scheduled_at = scheduled_at;
        }
        if let Some(content) = &self.content {
            node.content = content.clone();
        }
        if let Some(minutes) = self.work_duration_minutes {
            node.work_duration_minutes = minutes;
        }
        if let Some(color) = &self.color {
            node.color = color.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionKind {
    Work,
    Break,
    LongBreak,
}

impl SessionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "WORK",
            Self::Break => "BREAK",
            Self::LongBreak => "LONG_BREAK",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "WORK" => Some(Self::Work),
            "BREAK" => Some(Self::Break),
            "LONG_BREAK" => Some(Self::LongBreak),
            _ => None,
        }
    }

    pub fn is_rest(self) -> bool {
        matches!(self, Self::Break | Self::LongBreak)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveTask {
    pub id: String,
    pub title: String,
}

impl ActiveTask {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSession {
    pub id: i64,
    pub task_id: Option<String>,
    pub session_type: SessionKind,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default, deserialize_with = "false_if_null")]
    pub completed: bool,
}

impl TimerSession {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(task_id) = &self.task_id {
            validate_non_empty(task_id, "timer_session.task_id")?;
        }
        if let Some(completed_at) = self.completed_at {
            if completed_at < self.started_at {
                return Err("timer_session.completed_at must be >= timer_session.started_at".to_string());
            }
        }
        Ok(())
    }
}

/// Backend-held timer settings. Durations are expressed in minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    pub id: i64,
    pub work_duration: u32,
    pub break_duration: u32,
    pub long_break_duration: u32,
    pub sessions_before_long_break: u32,
    #[serde(default, deserialize_with = "false_if_null")]
    pub auto_start_breaks: bool,
    pub updated_at: DateTime<Utc>,
}

impl TimerSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.work_duration == 0 {
            return Err("timer_settings.work_duration must be > 0".to_string());
        }
        if self.break_duration == 0 {
            return Err("timer_settings.break_duration must be > 0".to_string());
        }
        if self.long_break_duration == 0 {
            return Err("timer_settings.long_break_duration must be > 0".to_string());
        }
        if self.sessions_before_long_break == 0 {
            return Err("timer_settings.sessions_before_long_break must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_break_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_before_long_break: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_breaks: Option<bool>,
}

impl TimerSettingsPatch {
    pub fn apply(&self, settings: &mut TimerSettings) {
        if let Some(value) = self.work_duration {
            settings.work_duration = value;
        }
        if let Some(value) = self.break_duration {
            settings.break_duration = value;
        }
        if let Some(value) = self.long_break_duration {
            settings.long_break_duration = value;
        }
        if let Some(value) = self.sessions_before_long_break {
            settings.sessions_before_long_break = value;
        }
        if let Some(value) = self.auto_start_breaks {
            settings.auto_start_breaks = value;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub command: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub level: Option<String>,
    pub limit: Option<usize>,
}

fn false_if_null<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_task() -> TaskNode {
        TaskNode::new(
            "task-1",
            NodeType::Task,
            "Write tests",
            Some("folder-1".to_string()),
            0,
            fixed_time("2026-02-16T08:00:00Z"),
        )
    }

    #[test]
    fn new_task_starts_todo_and_folder_starts_expanded() {
        let task = sample_task();
        assert_eq!(task.status, Some(TaskStatus::Todo));
        assert!(!task.is_expanded);

        let folder = TaskNode::new("folder-1", NodeType::Folder, "Work", None, 0, Utc::now());
        assert_eq!(folder.status, None);
        assert!(folder.is_expanded);
        assert!(folder.validate().is_ok());
    }

    #[test]
    fn task_validate_rejects_self_parent_and_inconsistent_deletion() {
        let mut task = sample_task();
        task.parent_id = Some(task.id.clone());
        assert!(task.validate().is_err());

        let mut task = sample_task();
        task.is_deleted = true;
        assert!(task.validate().is_err());
        task.deleted_at = Some(fixed_time("2026-02-16T09:00:00Z"));
        assert!(task.validate().is_ok());
    }

    #[test]
    fn patch_sets_and_clears_completion_time() {
        let now = fixed_time("2026-02-16T10:00:00Z");
        let mut task = sample_task();
        TaskNodePatch {
            status: Some(TaskStatus::Done),
            ..TaskNodePatch::default()
        }
        .apply(&mut task, now);
        assert_eq!(task.completed_at, Some(now));

        TaskNodePatch {
            status: Some(TaskStatus::Todo),
            scheduled_at: Some(Some(now)),
            ..TaskNodePatch::default()
        }
        .apply(&mut task, now);
        assert_eq!(task.completed_at, None);
        assert_eq!(task.scheduled_at, Some(now));
    }

    #[test]
    fn patch_serializes_cleared_fields_as_null() {
        let patch = TaskNodePatch {
            content: Some(None),
            ..TaskNodePatch::title("Renamed")
        };
        let value = serde_json::to_value(&patch).expect("serialize patch");
        assert_eq!(value["title"], "Renamed");
        assert!(value["content"].is_null());
        assert!(value.get("color").is_none());
    }

    #[test]
    fn task_node_accepts_backend_nulls_and_legacy_subfolder() {
        let raw = r#"{
            "id": "subfolder-1",
            "type": "subfolder",
            "title": "Nested",
            "parentId": "folder-1",
            "order": 2,
            "status": null,
            "isExpanded": null,
            "isDeleted": null,
            "createdAt": "2026-02-16T08:00:00Z"
        }"#;
        let node: TaskNode = serde_json::from_str(raw).expect("deserialize node");
        assert_eq!(node.node_type, NodeType::Folder);
        assert!(!node.is_expanded);
        assert!(!node.is_deleted);
        assert_eq!(node.order, 2);
    }

    #[test]
    fn timer_settings_validate_rejects_zero_values() {
        let mut settings = TimerSettings {
            id: 1,
            work_duration: 25,
            break_duration: 5,
            long_break_duration: 15,
            sessions_before_long_break: 4,
            auto_start_breaks: false,
            updated_at: fixed_time("2026-02-16T08:00:00Z"),
        };
        assert!(settings.validate().is_ok());
        TimerSettingsPatch {
            sessions_before_long_break: Some(0),
            ..TimerSettingsPatch::default()
        }
        .apply(&mut settings);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn session_kind_round_trips_wire_names() {
        for kind in [SessionKind::Work, SessionKind::Break, SessionKind::LongBreak] {
            let encoded = serde_json::to_string(&kind).expect("serialize kind");
            assert_eq!(encoded, format!("\"{}\"", kind.as_str()));
            assert_eq!(SessionKind::parse(kind.as_str()), Some(kind));
        }
    }
}
