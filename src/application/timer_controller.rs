use crate::application::data_service::DataService;
use crate::application::observer::{Listeners, SubscriptionId};
use crate::domain::models::{ActiveTask, SessionKind, TimerSettings, TimerSettingsPatch};
use crate::domain::timer::{format_clock, reduce, TimerAction, TimerConfig, TimerConfigPatch, TimerState};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notifier::{completion_message, Notifier};
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

const TICK: Duration = Duration::from_secs(1);

pub const WORK_MINUTES_RANGE: RangeInclusive<u32> = 5..=240;
pub const BREAK_MINUTES_RANGE: RangeInclusive<u32> = 1..=60;
pub const LONG_BREAK_MINUTES_RANGE: RangeInclusive<u32> = 1..=60;
pub const SESSIONS_RANGE: RangeInclusive<u32> = 1..=20;

fn clamp(value: u32, range: &RangeInclusive<u32>) -> u32 {
    value.clamp(*range.start(), *range.end())
}

/// Backend bookkeeping for the session currently on the clock. A segment
/// that is paused and resumed spans several sessions, so each one measures
/// its duration from `start_remaining`. The backend id arrives
/// asynchronously, so an end requested before it arrives is parked in
/// `deferred_ends` under its generation and issued once the id is known.
#[derive(Debug, Default)]
struct SessionSlot {
    id: Option<i64>,
    generation: u64,
    in_flight: bool,
    start_remaining: u32,
    deferred_ends: Vec<(u64, u32, bool)>,
}

#[derive(Debug)]
struct ControllerState {
    timer: TimerState,
    session: SessionSlot,
    ticker: Option<JoinHandle<()>>,
}

struct ControllerInner<D: ?Sized, N: ?Sized> {
    state: Mutex<ControllerState>,
    data_service: Arc<D>,
    notifier: Arc<N>,
    listeners: Listeners<TimerState>,
    notifications_enabled: AtomicBool,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<D: ?Sized, N: ?Sized> Drop for ControllerInner<D, N> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
    }
}

/// Drives [`TimerState`] from a one-second ticker and mirrors segment
/// boundaries to the data service. Persistence is fire-and-forget: failures
/// are logged and never touch the live timer.
pub struct TimerController<D: ?Sized, N: ?Sized> {
    inner: Arc<ControllerInner<D, N>>,
}

impl<D: ?Sized, N: ?Sized> Clone for TimerController<D, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D, N> TimerController<D, N>
where
    D: DataService + ?Sized + 'static,
    N: Notifier + ?Sized + 'static,
{
    pub fn new(data_service: Arc<D>, notifier: Arc<N>, config: TimerConfig) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                state: Mutex::new(ControllerState {
                    timer: TimerState::new(config),
                    session: SessionSlot::default(),
                    ticker: None,
                }),
                data_service,
                notifier,
                listeners: Listeners::default(),
                notifications_enabled: AtomicBool::new(true),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn with_notifications(self, enabled: bool) -> Self {
        self.set_notifications_enabled(enabled);
        self
    }

    pub fn set_notifications_enabled(&self, enabled: bool) {
        self.inner.notifications_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn notifications_enabled(&self) -> bool {
        self.inner.notifications_enabled.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> TimerState {
        self.lock_state().timer.clone()
    }

    pub fn subscribe(&self, listener: impl Fn(&TimerState) + Send + Sync + 'static) -> SubscriptionId {
        self.inner.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    pub fn progress(&self) -> f64 {
        self.state().progress()
    }

    pub fn total_duration(&self) -> u32 {
        self.state().session_seconds
    }

    pub fn format_time(seconds: u32) -> String {
        format_clock(seconds)
    }

    pub fn formatted_remaining(&self) -> String {
        format_clock(self.state().remaining_seconds)
    }

    pub fn is_ticking(&self) -> bool {
        self.lock_state().ticker.is_some()
    }

    pub fn start(&self) {
        let before = self.state();
        let after = self.dispatch(TimerAction::Start);
        if !before.is_running && after.is_running {
            self.begin_session(&after);
            self.ensure_ticker();
        }
    }

    pub fn pause(&self) {
        let before = self.state();
        if !before.is_running {
            return;
        }
        self.stop_ticker();
        let after = self.dispatch(TimerAction::Pause);
        self.end_session(after.remaining_seconds, false);
    }

    pub fn reset(&self) {
        self.stop_ticker();
        self.end_session(self.state().remaining_seconds, false);
        self.dispatch(TimerAction::Reset);
    }

    /// Advances the clock by one second. Reaching zero while running closes
    /// the segment.
    pub fn tick(&self) {
        let after = self.dispatch(TimerAction::Tick);
        if after.is_running && after.remaining_seconds == 0 {
            self.advance_session();
        }
    }

    pub fn advance_session(&self) {
        let before = self.state();
        if before.remaining_seconds != 0 {
            return;
        }
        self.stop_ticker();
        self.end_session(0, true);
        self.dispatch(TimerAction::AdvanceSession);
        info!(kind = before.session_kind.as_str(), "timer segment finished");

        if self.notifications_enabled() {
            self.notify_completion(before.session_kind);
        }
    }

    pub fn start_rest(&self) {
        let before = self.state();
        let after = self.dispatch(TimerAction::StartRest);
        if before.show_completion_prompt && after.is_running {
            self.begin_session(&after);
            self.ensure_ticker();
        }
    }

    pub fn extend_work(&self, minutes: u32) {
        let before = self.state();
        let after = self.dispatch(TimerAction::ExtendWork { minutes });
        if before.show_completion_prompt && after.is_running {
            self.begin_session(&after);
            self.ensure_ticker();
        }
    }

    pub fn dismiss_completion_prompt(&self) {
        self.dispatch(TimerAction::DismissCompletionPrompt);
    }

    /// Binds `task` and starts a work segment of `duration_minutes`, falling
    /// back to the configured work duration.
    pub fn start_for_task(&self, task: ActiveTask, duration_minutes: Option<u32>) {
        self.stop_ticker();
        self.end_session(self.state().remaining_seconds, false);
        let duration_seconds = self.task_duration_seconds(duration_minutes);
        let after = self.dispatch(TimerAction::StartForTask {
            task,
            duration_seconds,
        });
        self.begin_session(&after);
        self.ensure_ticker();
    }

    pub fn open_for_task(&self, task: ActiveTask, duration_minutes: Option<u32>) {
        self.stop_ticker();
        self.end_session(self.state().remaining_seconds, false);
        let duration_seconds = self.task_duration_seconds(duration_minutes);
        self.dispatch(TimerAction::OpenForTask {
            task,
            duration_seconds,
        });
    }

    pub fn clear_task(&self) {
        self.dispatch(TimerAction::SetActiveTask(None));
    }

    pub fn update_active_task_title(&self, title: impl Into<String>) {
        self.dispatch(TimerAction::UpdateActiveTaskTitle(title.into()));
    }

    pub fn set_work_duration_minutes(&self, minutes: u32) -> u32 {
        let clamped = clamp(minutes, &WORK_MINUTES_RANGE);
        self.apply_config(TimerConfigPatch {
            work_seconds: Some(clamped * 60),
            ..TimerConfigPatch::default()
        });
        clamped
    }

    pub fn set_break_duration_minutes(&self, minutes: u32) -> u32 {
        let clamped = clamp(minutes, &BREAK_MINUTES_RANGE);
        self.apply_config(TimerConfigPatch {
            break_seconds: Some(clamped * 60),
            ..TimerConfigPatch::default()
        });
        clamped
    }

    pub fn set_long_break_duration_minutes(&self, minutes: u32) -> u32 {
        let clamped = clamp(minutes, &LONG_BREAK_MINUTES_RANGE);
        self.apply_config(TimerConfigPatch {
            long_break_seconds: Some(clamped * 60),
            ..TimerConfigPatch::default()
        });
        clamped
    }

    pub fn set_sessions_before_long_break(&self, count: u32) -> u32 {
        let clamped = clamp(count, &SESSIONS_RANGE);
        self.apply_config(TimerConfigPatch {
            sessions_before_long_break: Some(clamped),
            ..TimerConfigPatch::default()
        });
        clamped
    }

    /// Applies a locally persisted work duration without echoing it back to
    /// the backend.
    pub fn apply_local_work_duration(&self, minutes: u32) {
        self.dispatch(TimerAction::SetConfig(TimerConfigPatch {
            work_seconds: Some(clamp(minutes, &WORK_MINUTES_RANGE) * 60),
            ..TimerConfigPatch::default()
        }));
    }

    /// Pulls backend settings into the timer config (minutes to seconds).
    pub async fn load_settings(&self) -> Result<TimerSettings, InfraError> {
        let settings = self.inner.data_service.fetch_timer_settings().await?;
        self.dispatch(TimerAction::SetConfig(TimerConfigPatch {
            work_seconds: Some(settings.work_duration.saturating_mul(60)),
            break_seconds: Some(settings.break_duration.saturating_mul(60)),
            long_break_seconds: Some(settings.long_break_duration.saturating_mul(60)),
            sessions_before_long_break: Some(settings.sessions_before_long_break),
        }));
        debug!(work_minutes = settings.work_duration, "timer settings loaded");
        Ok(settings)
    }

    /// Waits for every background persistence call issued so far.
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(
                &mut *self
                    .inner
                    .pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(error) = handle.await {
                    warn!(%error, "timer persistence task failed");
                }
            }
        }
    }

    pub fn shutdown(&self) {
        self.stop_ticker();
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, action: TimerAction) -> TimerState {
        let (next, changed) = {
            let mut state = self.lock_state();
            let next = reduce(&state.timer, action);
            let changed = next != state.timer;
            state.timer = next.clone();
            (next, changed)
        };
        if changed {
            self.inner.listeners.notify(&next);
        }
        next
    }

    fn task_duration_seconds(&self, duration_minutes: Option<u32>) -> u32 {
        match duration_minutes.filter(|minutes| *minutes > 0) {
            Some(minutes) => minutes.saturating_mul(60),
            None => self.state().config.work_seconds,
        }
    }

    fn apply_config(&self, patch: TimerConfigPatch) {
        let after = self.dispatch(TimerAction::SetConfig(patch));
        let config = after.config;
        let settings = TimerSettingsPatch {
            work_duration: Some(config.work_seconds / 60),
            break_duration: Some(config.break_seconds / 60),
            long_break_duration: Some(config.long_break_seconds / 60),
            sessions_before_long_break: Some(config.sessions_before_long_break),
            auto_start_breaks: None,
        };
        let data_service = Arc::clone(&self.inner.data_service);
        spawn_tracked(&self.inner, async move {
            if let Err(error) = data_service.update_timer_settings(&settings).await {
                warn!(%error, "failed to sync timer settings");
            }
        });
    }

    fn ensure_ticker(&self) {
        let mut state = self.lock_state();
        if !state.timer.is_running || state.ticker.is_some() {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("no async runtime available; timer will only advance through tick()");
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        state.ticker = Some(runtime.spawn(run_ticker(weak)));
    }

    fn stop_ticker(&self) {
        let ticker = self.lock_state().ticker.take();
        if let Some(ticker) = ticker {
            ticker.abort();
        }
    }

    /// Sends the completion notification off the async workers, since
    /// desktop notification backends block.
    fn notify_completion(&self, kind: SessionKind) {
        let (title, body) = completion_message(kind);
        let notifier = Arc::clone(&self.inner.notifier);
        if Handle::try_current().is_err() {
            if let Err(error) = notifier.notify(title, body) {
                warn!(%error, "failed to send completion notification");
            }
            return;
        }
        spawn_tracked(&self.inner, async move {
            match tokio::task::spawn_blocking(move || notifier.notify(title, body)).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => warn!(%error, "failed to send completion notification"),
                Err(error) => warn!(%error, "notification task failed"),
            }
        });
    }

    fn begin_session(&self, timer: &TimerState) {
        let kind = timer.session_kind;
        let generation = {
            let mut state = self.lock_state();
            let slot = &mut state.session;
            slot.generation += 1;
            slot.id = None;
            slot.in_flight = true;
            slot.start_remaining = timer.remaining_seconds;
            slot.generation
        };
        let task_id = timer.active_task.as_ref().map(|task| task.id.clone());
        let inner = Arc::clone(&self.inner);
        spawn_tracked(&self.inner, async move {
            let result = inner
                .data_service
                .start_timer_session(kind, task_id.as_deref())
                .await;
            let session = match result {
                Ok(session) => session,
                Err(error) => {
                    warn!(%error, kind = kind.as_str(), "failed to record timer session start");
                    let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
                    if state.session.generation == generation {
                        state.session.in_flight = false;
                    }
                    state.session.deferred_ends.retain(|(parked, _, _)| *parked != generation);
                    return;
                }
            };

            let deferred = {
                let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
                let slot = &mut state.session;
                let parked = slot
                    .deferred_ends
                    .iter()
                    .position(|(parked, _, _)| *parked == generation);
                match parked {
                    Some(position) => {
                        let (_, duration, completed) = slot.deferred_ends.remove(position);
                        Some((duration, completed))
                    }
                    None => {
                        if slot.generation == generation {
                            slot.id = Some(session.id);
                            slot.in_flight = false;
                        } else {
                            debug!(session_id = session.id, "ignoring superseded timer session start");
                        }
                        None
                    }
                }
            };
            if let Some((duration, completed)) = deferred {
                end_remote_session(&inner, session.id, duration, completed);
            }
        });
    }

    /// Closes the open session, recording the seconds counted down since it
    /// began. `remaining` is the clock at the moment of closing.
    fn end_session(&self, remaining: u32, completed: bool) {
        let (id, duration) = {
            let mut state = self.lock_state();
            let slot = &mut state.session;
            let duration = slot.start_remaining.saturating_sub(remaining);
            let id = match slot.id.take() {
                Some(id) => Some(id),
                None => {
                    if slot.in_flight {
                        slot.in_flight = false;
                        slot.deferred_ends.push((slot.generation, duration, completed));
                    }
                    None
                }
            };
            (id, duration)
        };
        if let Some(id) = id {
            end_remote_session(&self.inner, id, duration, completed);
        }
    }
}

fn spawn_tracked<D, N, F>(inner: &Arc<ControllerInner<D, N>>, future: F)
where
    D: ?Sized,
    N: ?Sized,
    F: Future<Output = ()> + Send + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        warn!("no async runtime available; dropping timer persistence call");
        return;
    };
    let handle = runtime.spawn(future);
    let mut pending = inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
    pending.retain(|task| !task.is_finished());
    pending.push(handle);
}

fn end_remote_session<D, N>(inner: &Arc<ControllerInner<D, N>>, id: i64, duration: u32, completed: bool)
where
    D: DataService + ?Sized + 'static,
    N: Notifier + ?Sized + 'static,
{
    let data_service = Arc::clone(&inner.data_service);
    spawn_tracked(inner, async move {
        if let Err(error) = data_service.end_timer_session(id, duration, completed).await {
            warn!(%error, session_id = id, "failed to record timer session end");
        }
    });
}

async fn run_ticker<D, N>(weak: Weak<ControllerInner<D, N>>)
where
    D: DataService + ?Sized + 'static,
    N: Notifier + ?Sized + 'static,
{
    let mut interval = interval_at(Instant::now() + TICK, TICK);
    loop {
        interval.tick().await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        TimerController { inner }.tick();
    }
}
