use crate::domain::models::{ActiveTask, SessionKind};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORK_SECONDS: u32 = 25 * 60;
pub const DEFAULT_BREAK_SECONDS: u32 = 5 * 60;
pub const DEFAULT_LONG_BREAK_SECONDS: u32 = 15 * 60;
pub const DEFAULT_SESSIONS_BEFORE_LONG_BREAK: u32 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    pub work_seconds: u32,
    pub break_seconds: u32,
    pub long_break_seconds: u32,
    pub sessions_before_long_break: u32,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            work_seconds: DEFAULT_WORK_SECONDS,
            break_seconds: DEFAULT_BREAK_SECONDS,
            long_break_seconds: DEFAULT_LONG_BREAK_SECONDS,
            sessions_before_long_break: DEFAULT_SESSIONS_BEFORE_LONG_BREAK,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfigPatch {
    #[serde(default)]
    pub work_seconds: Option<u32>,
    #[serde(default)]
    pub break_seconds: Option<u32>,
    #[serde(default)]
    pub long_break_seconds: Option<u32>,
    #[serde(default)]
    pub sessions_before_long_break: Option<u32>,
}

impl TimerConfig {
    pub fn merged(self, patch: &TimerConfigPatch) -> Self {
        Self {
            work_seconds: patch.work_seconds.unwrap_or(self.work_seconds),
            break_seconds: patch.break_seconds.unwrap_or(self.break_seconds),
            long_break_seconds: patch.long_break_seconds.unwrap_or(self.long_break_seconds),
            // A zero cycle length would make the long-break modulus undefined.
            sessions_before_long_break: patch
                .sessions_before_long_break
                .unwrap_or(self.sessions_before_long_break)
                .max(1),
        }
    }
}

pub fn duration(kind: SessionKind, config: &TimerConfig) -> u32 {
    match kind {
        SessionKind::Work => config.work_seconds,
        SessionKind::Break => config.break_seconds,
        SessionKind::LongBreak => config.long_break_seconds,
    }
}

/// Live timer record. `session_seconds` is the full length of the current
/// segment, which differs from the configured duration after an extension or
/// a per-task override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub session_kind: SessionKind,
    pub remaining_seconds: u32,
    pub session_seconds: u32,
    pub is_running: bool,
    pub completed_work_sessions: u32,
    pub active_task: Option<ActiveTask>,
    pub show_completion_prompt: bool,
    pub config: TimerConfig,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new(TimerConfig::default())
    }
}

impl TimerState {
    pub fn new(config: TimerConfig) -> Self {
        let config = config.merged(&TimerConfigPatch::default());
        Self {
            session_kind: SessionKind::Work,
            remaining_seconds: config.work_seconds,
            session_seconds: config.work_seconds,
            is_running: false,
            completed_work_sessions: 0,
            active_task: None,
            show_completion_prompt: false,
            config,
        }
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.session_seconds.saturating_sub(self.remaining_seconds)
    }

    /// Fraction of the current segment already spent, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.session_seconds == 0 {
            return 0.0;
        }
        f64::from(self.elapsed_seconds()) / f64::from(self.session_seconds)
    }

    fn enter(mut self, kind: SessionKind, seconds: u32) -> Self {
        self.session_kind = kind;
        self.remaining_seconds = seconds;
        self.session_seconds = seconds;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerAction {
    Tick,
    Start,
    Pause,
    Reset,
    AdvanceSession,
    StartRest,
    ExtendWork { minutes: u32 },
    DismissCompletionPrompt,
    SetActiveTask(Option<ActiveTask>),
    UpdateActiveTaskTitle(String),
    SetConfig(TimerConfigPatch),
    OpenForTask { task: ActiveTask, duration_seconds: u32 },
    StartForTask { task: ActiveTask, duration_seconds: u32 },
}

/// Applies one action. Actions whose precondition does not hold return the
/// state unchanged.
pub fn reduce(state: &TimerState, action: TimerAction) -> TimerState {
    let mut next = state.clone();
    match action {
        TimerAction::Tick => {
            if state.is_running {
                next.remaining_seconds = state.remaining_seconds.saturating_sub(1);
            }
        }
        TimerAction::Start => {
            if !state.show_completion_prompt {
                next.is_running = true;
            }
        }
        TimerAction::Pause => {
            next.is_running = false;
        }
        TimerAction::Reset => {
            let seconds = duration(state.session_kind, &state.config);
            next = next.enter(state.session_kind, seconds);
            next.is_running = false;
        }
        TimerAction::AdvanceSession => {
            if state.remaining_seconds != 0 {
                return next;
            }
            next.is_running = false;
            if state.session_kind.is_rest() {
                next = next.enter(SessionKind::Work, state.config.work_seconds);
                next.completed_work_sessions = state.completed_work_sessions.saturating_add(1);
            } else {
                next.show_completion_prompt = true;
            }
        }
        TimerAction::StartRest => {
            if !state.show_completion_prompt {
                return next;
            }
            let completed = state.completed_work_sessions.saturating_add(1);
            let cycle = state.config.sessions_before_long_break.max(1);
            let kind = if completed % cycle == 0 {
                SessionKind::LongBreak
            } else {
                SessionKind::Break
            };
            next = next.enter(kind, duration(kind, &state.config));
            next.completed_work_sessions = completed;
            next.show_completion_prompt = false;
            next.is_running = true;
        }
        TimerAction::ExtendWork { minutes } => {
            if !state.show_completion_prompt || state.session_kind != SessionKind::Work {
                return next;
            }
            next = next.enter(SessionKind::Work, minutes.saturating_mul(60));
            next.show_completion_prompt = false;
            next.is_running = true;
        }
        TimerAction::DismissCompletionPrompt => {
            next.show_completion_prompt = false;
        }
        TimerAction::SetActiveTask(task) => {
            next.active_task = task;
        }
        TimerAction::UpdateActiveTaskTitle(title) => {
            if let Some(task) = next.active_task.as_mut() {
                task.title = title;
            }
        }
        TimerAction::SetConfig(patch) => {
            next.config = state.config.merged(&patch);
            if !state.is_running {
                let seconds = duration(state.session_kind, &next.config);
                next = next.enter(state.session_kind, seconds);
            }
        }
        TimerAction::OpenForTask {
            task,
            duration_seconds,
        } => {
            next = next.enter(SessionKind::Work, duration_seconds);
            next.active_task = Some(task);
            next.show_completion_prompt = false;
            next.is_running = false;
        }
        TimerAction::StartForTask {
            task,
            duration_seconds,
        } => {
            next = next.enter(SessionKind::Work, duration_seconds);
            next.active_task = Some(task);
            next.show_completion_prompt = false;
            next.is_running = true;
        }
    }
    next
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
