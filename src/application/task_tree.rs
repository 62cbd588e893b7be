use crate::application::data_service::DataService;
use crate::application::observer::{Listeners, SubscriptionId};
use crate::domain::error::TreeError;
use crate::domain::models::{NodeType, TaskNode, TaskNodePatch, TaskStatus};
use crate::domain::task_tree::{
    self, ChildIndex, FlatFolder, FolderProgress, SortMode, MAX_FOLDER_DEPTH,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_cache::TaskCache;
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const HISTORY_LIMIT: usize = 50;

/// What listeners receive after every change to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    pub nodes: Vec<TaskNode>,
    pub is_loaded: bool,
    pub persist_error: Option<String>,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum History {
    Record,
    Silent,
    Clear,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: Vec<TaskNode>,
    index: ChildIndex,
    loaded: bool,
    persist_error: Option<String>,
    next_seq: u64,
    settled_seq: u64,
    error_seq: u64,
    undo: VecDeque<Vec<TaskNode>>,
    redo: Vec<Vec<TaskNode>>,
}

impl TreeState {
    fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            nodes: self.nodes.clone(),
            is_loaded: self.loaded,
            persist_error: self.persist_error.clone(),
            can_undo: !self.undo.is_empty(),
            can_redo: !self.redo.is_empty(),
        }
    }

    fn replace_nodes(&mut self, nodes: Vec<TaskNode>) {
        self.index = ChildIndex::build(&nodes);
        self.nodes = nodes;
    }

    fn record_undo(&mut self) {
        self.undo.push_back(self.nodes.clone());
        while self.undo.len() > HISTORY_LIMIT {
            self.undo.pop_front();
        }
        self.redo.clear();
    }
}

struct StoreInner<D: ?Sized> {
    state: Mutex<TreeState>,
    /// Sequence number of the last snapshot the backend accepted. Held across
    /// the sync call so snapshots reach the backend one at a time.
    sync_gate: tokio::sync::Mutex<u64>,
    data_service: Arc<D>,
    cache: Option<TaskCache>,
    listeners: Listeners<TreeSnapshot>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<D: ?Sized> StoreInner<D> {
    fn lock_state(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_sync(&self, seq: u64, result: Result<(), InfraError>) {
        let snapshot = {
            let mut state = self.lock_state();
            let before = state.persist_error.clone();
            match result {
                Ok(()) => {
                    if state.error_seq <= seq {
                        state.persist_error = None;
                    }
                    debug!(seq, "task tree synced");
                }
                Err(error) => {
                    if state.settled_seq < seq {
                        warn!(seq, %error, "task tree sync failed");
                        state.persist_error = Some(format!("failed to save tasks: {error}"));
                        state.error_seq = seq;
                    } else {
                        debug!(seq, %error, "ignoring failure of superseded task tree sync");
                    }
                }
            }
            state.settled_seq = state.settled_seq.max(seq);
            (state.persist_error != before).then(|| state.snapshot())
        };
        if let Some(snapshot) = snapshot {
            self.listeners.notify(&snapshot);
        }
    }
}

/// Canonical in-memory task forest with optimistic, full-snapshot persistence.
///
/// Every mutation is validated and applied synchronously, then the whole node
/// set is handed to [`DataService::sync_task_tree`] in the background. Sync
/// failures are surfaced through [`TaskTreeStore::persist_error`] and never
/// roll back local state.
pub struct TaskTreeStore<D: ?Sized> {
    inner: Arc<StoreInner<D>>,
}

impl<D: ?Sized> Clone for TaskTreeStore<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D> TaskTreeStore<D>
where
    D: DataService + ?Sized + 'static,
{
    pub fn new(data_service: Arc<D>) -> Self {
        Self::build(data_service, None)
    }

    pub fn with_cache(data_service: Arc<D>, cache: TaskCache) -> Self {
        Self::build(data_service, Some(cache))
    }

    fn build(data_service: Arc<D>, cache: Option<TaskCache>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(TreeState::default()),
                sync_gate: tokio::sync::Mutex::new(0),
                data_service,
                cache,
                listeners: Listeners::default(),
                pending: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fetches active and deleted nodes. When the fetch fails the local cache
    /// is shown instead, but the store stays unloaded so nothing is synced
    /// over the backend copy.
    pub async fn load(&self) -> Result<usize, InfraError> {
        let active = match self.inner.data_service.fetch_task_tree().await {
            Ok(active) => active,
            Err(error) => {
                warn!(%error, "failed to fetch task tree; falling back to local cache");
                let cached = self.read_cache();
                let snapshot = {
                    let mut state = self.inner.lock_state();
                    if !state.loaded {
                        state.replace_nodes(cached);
                    }
                    state.snapshot()
                };
                self.inner.listeners.notify(&snapshot);
                return Err(error);
            }
        };
        let deleted = match self.inner.data_service.fetch_deleted_tasks().await {
            Ok(deleted) => deleted,
            Err(error) => {
                warn!(%error, "failed to fetch deleted tasks; trash will start empty");
                Vec::new()
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let nodes: Vec<TaskNode> = active
            .into_iter()
            .chain(deleted)
            .filter(|node| seen.insert(node.id.clone()))
            .collect();
        let count = nodes.len();

        let snapshot = {
            let mut state = self.inner.lock_state();
            state.replace_nodes(nodes);
            state.loaded = true;
            state.undo.clear();
            state.redo.clear();
            self.write_cache(&state.nodes);
            state.snapshot()
        };
        info!(count, "task tree loaded");
        self.inner.listeners.notify(&snapshot);
        Ok(count)
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.lock_state().loaded
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        self.inner.lock_state().snapshot()
    }

    pub fn subscribe(&self, listener: impl Fn(&TreeSnapshot) + Send + Sync + 'static) -> SubscriptionId {
        self.inner.listeners.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    pub fn nodes(&self) -> Vec<TaskNode> {
        self.inner.lock_state().nodes.clone()
    }

    pub fn active_nodes(&self) -> Vec<TaskNode> {
        self.filtered(|node| !node.is_deleted)
    }

    pub fn deleted_nodes(&self) -> Vec<TaskNode> {
        self.filtered(|node| node.is_deleted)
    }

    pub fn get_node(&self, id: &str) -> Option<TaskNode> {
        task_tree::find(&self.inner.lock_state().nodes, id).cloned()
    }

    /// Active children of `parent_id` (roots for `None`) in `order`.
    pub fn children(&self, parent_id: Option<&str>) -> Vec<TaskNode> {
        let state = self.inner.lock_state();
        state
            .index
            .children(&state.nodes, parent_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn sorted_children(&self, parent_id: Option<&str>, mode: SortMode) -> Vec<TaskNode> {
        let state = self.inner.lock_state();
        let children = state.index.children(&state.nodes, parent_id);
        task_tree::sort_nodes(children, mode)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn ancestors(&self, id: &str) -> Vec<TaskNode> {
        let state = self.inner.lock_state();
        task_tree::ancestors(&state.nodes, id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn descendant_tasks(&self, folder_id: &str) -> Vec<TaskNode> {
        let state = self.inner.lock_state();
        task_tree::descendant_tasks(&state.nodes, folder_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn folder_progress(&self, folder_id: &str) -> FolderProgress {
        task_tree::folder_progress(&self.inner.lock_state().nodes, folder_id)
    }

    pub fn flatten_folders(&self) -> Vec<FlatFolder> {
        task_tree::flatten_folders(&self.inner.lock_state().nodes)
    }

    pub fn persist_error(&self) -> Option<String> {
        self.inner.lock_state().persist_error.clone()
    }

    pub fn clear_persist_error(&self) {
        let snapshot = {
            let mut state = self.inner.lock_state();
            if state.persist_error.take().is_none() {
                return;
            }
            state.snapshot()
        };
        self.inner.listeners.notify(&snapshot);
    }

    pub fn can_undo(&self) -> bool {
        !self.inner.lock_state().undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.inner.lock_state().redo.is_empty()
    }

    /// Creates a node at the end of its sibling list and returns it before
    /// the backend has seen it.
    pub fn add_node(
        &self,
        node_type: NodeType,
        parent_id: Option<&str>,
        title: &str,
    ) -> Result<TaskNode, TreeError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TreeError::InvalidTitle);
        }
        self.mutate(History::Record, |nodes, index| {
            if let Some(parent_id) = parent_id {
                active_folder(nodes, parent_id)?;
            }
            if node_type == NodeType::Folder {
                let level = parent_id.map_or(0, |parent_id| task_tree::depth(nodes, parent_id) + 1);
                if level >= MAX_FOLDER_DEPTH {
                    return Err(TreeError::DepthExceeded {
                        max: MAX_FOLDER_DEPTH,
                    });
                }
            }
            let order = index.child_ids(parent_id).len() as i64;
            let node = TaskNode::new(
                task_tree::next_node_id(node_type),
                node_type,
                title,
                parent_id.map(ToOwned::to_owned),
                order,
                Utc::now(),
            );
            nodes.push(node.clone());
            Ok(node)
        })
    }

    pub fn update_node(&self, id: &str, patch: &TaskNodePatch) -> Result<TaskNode, TreeError> {
        if patch.title.as_deref().is_some_and(|title| title.trim().is_empty()) {
            return Err(TreeError::InvalidTitle);
        }
        self.mutate(History::Silent, |nodes, _| {
            let node = node_mut(nodes, id)?;
            patch.apply(node, Utc::now());
            Ok(node.clone())
        })
    }

    pub fn toggle_expanded(&self, id: &str) -> Result<bool, TreeError> {
        self.mutate(History::Silent, |nodes, _| {
            let node = node_mut(nodes, id)?;
            if !node.is_folder() {
                return Err(TreeError::NotAFolder(id.to_string()));
            }
            node.is_expanded = !node.is_expanded;
            Ok(node.is_expanded)
        })
    }

    /// Flips a task between TODO and DONE. A completed task moves behind all
    /// of its siblings; a reopened one moves to the end of the open group.
    pub fn toggle_task_status(&self, id: &str) -> Result<TaskNode, TreeError> {
        self.mutate(History::Record, |nodes, index| {
            let node = active_node(nodes, id)?;
            if !node.is_task() {
                return Err(TreeError::NotATask(id.to_string()));
            }
            let parent_id = node.parent_id.clone();
            let status = node.status.unwrap_or(TaskStatus::Todo).toggled();

            let (done, open): (Vec<String>, Vec<String>) = index
                .child_ids(parent_id.as_deref())
                .iter()
                .filter(|sibling| sibling.as_str() != id)
                .cloned()
                .partition(|sibling| task_tree::find(nodes, sibling).is_some_and(TaskNode::is_done));
            let mut ordered = open;
            match status {
                TaskStatus::Done => {
                    ordered.extend(done);
                    ordered.push(id.to_string());
                }
                TaskStatus::Todo => {
                    ordered.push(id.to_string());
                    ordered.extend(done);
                }
            }

            TaskNodePatch {
                status: Some(status),
                ..TaskNodePatch::default()
            }
            .apply(node_mut(nodes, id)?, Utc::now());
            task_tree::renumber(nodes, &ordered);
            active_node(nodes, id).cloned()
        })
    }

    /// Marks every open task below `folder_id` as done; returns how many changed.
    pub fn complete_folder(&self, folder_id: &str) -> Result<usize, TreeError> {
        self.mutate(History::Record, |nodes, _| {
            if !active_node(nodes, folder_id)?.is_folder() {
                return Err(TreeError::NotAFolder(folder_id.to_string()));
            }
            let open: HashSet<String> = task_tree::descendant_tasks(nodes, folder_id)
                .into_iter()
                .filter(|task| !task.is_done())
                .map(|task| task.id.clone())
                .collect();
            let now = Utc::now();
            let done = TaskNodePatch {
                status: Some(TaskStatus::Done),
                ..TaskNodePatch::default()
            };
            for node in nodes.iter_mut().filter(|node| open.contains(&node.id)) {
                done.apply(node, now);
            }
            Ok(open.len())
        })
    }

    /// Hides `id` and everything below it. The nodes stay in the set so they
    /// can be restored.
    pub fn soft_delete(&self, id: &str) -> Result<(), TreeError> {
        self.mutate(History::Record, |nodes, index| {
            let parent_id = active_node(nodes, id)?.parent_id.clone();
            let subtree: HashSet<String> = task_tree::subtree_ids(nodes, id).into_iter().collect();
            let now = Utc::now();
            for node in nodes
                .iter_mut()
                .filter(|node| subtree.contains(&node.id) && !node.is_deleted)
            {
                node.is_deleted = true;
                node.deleted_at = Some(now);
            }
            let remaining = siblings_without(index, parent_id.as_deref(), id);
            task_tree::renumber(nodes, &remaining);
            Ok(())
        })
    }

    /// Brings back `id`, its subtree, and any deleted ancestors, each appended
    /// to the end of its sibling list.
    pub fn restore(&self, id: &str) -> Result<(), TreeError> {
        self.mutate(History::Record, |nodes, _| {
            let node = task_tree::find(nodes, id).ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
            if !node.is_deleted {
                return Ok(());
            }
            let mut chain: Vec<String> = task_tree::ancestors(nodes, id)
                .into_iter()
                .filter(|ancestor| ancestor.is_deleted)
                .map(|ancestor| ancestor.id.clone())
                .collect();
            chain.push(id.to_string());
            for restored_id in &chain {
                reinstate_at_end(nodes, restored_id);
            }

            let subtree: HashSet<String> = task_tree::subtree_ids(nodes, id).into_iter().collect();
            let mut parents: HashSet<Option<String>> = HashSet::new();
            for node in nodes
                .iter_mut()
                .filter(|node| subtree.contains(&node.id) && node.is_deleted)
            {
                node.is_deleted = false;
                node.deleted_at = None;
                parents.insert(node.parent_id.clone());
            }
            let index = ChildIndex::build(nodes);
            for parent_id in parents {
                let ordered = index.child_ids(parent_id.as_deref()).to_vec();
                task_tree::renumber(nodes, &ordered);
            }
            Ok(())
        })
    }

    /// Removes `id` and its subtree for good. Undo history is discarded since
    /// it would resurrect the removed nodes.
    pub fn permanent_delete(&self, id: &str) -> Result<(), TreeError> {
        self.mutate(History::Clear, |nodes, index| {
            let node = task_tree::find(nodes, id).ok_or_else(|| TreeError::NodeNotFound(id.to_string()))?;
            let was_active = !node.is_deleted;
            let parent_id = node.parent_id.clone();
            let subtree: HashSet<String> = task_tree::subtree_ids(nodes, id).into_iter().collect();
            nodes.retain(|node| !subtree.contains(&node.id));
            if was_active {
                let remaining = siblings_without(index, parent_id.as_deref(), id);
                task_tree::renumber(nodes, &remaining);
            }
            Ok(())
        })
    }

    /// Reparents and/or reorders `id` so it lands at `index` among the
    /// children of `new_parent_id`. Indexes past the end append.
    pub fn move_node(&self, id: &str, new_parent_id: Option<&str>, index: usize) -> Result<(), TreeError> {
        self.mutate(History::Record, |nodes, child_index| {
            let node = active_node(nodes, id)?;
            let old_parent_id = node.parent_id.clone();
            let is_folder = node.is_folder();

            if let Some(parent_id) = new_parent_id {
                if task_tree::is_self_or_descendant(nodes, id, parent_id) {
                    return Err(TreeError::CycleDetected);
                }
                active_folder(nodes, parent_id)?;
            }
            if is_folder {
                let level = new_parent_id.map_or(0, |parent_id| task_tree::depth(nodes, parent_id) + 1);
                if level + task_tree::folder_subtree_depth(nodes, id) >= MAX_FOLDER_DEPTH {
                    return Err(TreeError::DepthExceeded {
                        max: MAX_FOLDER_DEPTH,
                    });
                }
            }

            let mut target = siblings_without(child_index, new_parent_id, id);
            let position = index.min(target.len());
            target.insert(position, id.to_string());

            if old_parent_id.as_deref() != new_parent_id {
                let old_siblings = siblings_without(child_index, old_parent_id.as_deref(), id);
                task_tree::renumber(nodes, &old_siblings);
                node_mut(nodes, id)?.parent_id = new_parent_id.map(ToOwned::to_owned);
            }
            task_tree::renumber(nodes, &target);
            Ok(())
        })
    }

    pub fn move_node_into(&self, id: &str, folder_id: &str) -> Result<(), TreeError> {
        let is_folder = self
            .get_node(folder_id)
            .filter(|node| !node.is_deleted)
            .map(|node| node.is_folder())
            .ok_or_else(|| TreeError::InvalidParent(folder_id.to_string()))?;
        if !is_folder {
            return Err(TreeError::NotAFolder(folder_id.to_string()));
        }
        self.move_node(id, Some(folder_id), usize::MAX)
    }

    pub fn move_to_root(&self, id: &str) -> Result<(), TreeError> {
        self.move_node(id, None, usize::MAX)
    }

    /// Steps back one structural edit. Returns false when there is nothing
    /// to undo.
    pub fn undo(&self) -> Result<bool, TreeError> {
        self.travel(|state| {
            let previous = state.undo.pop_back()?;
            state.redo.push(state.nodes.clone());
            Some(previous)
        })
    }

    pub fn redo(&self) -> Result<bool, TreeError> {
        self.travel(|state| {
            let next = state.redo.pop()?;
            state.undo.push_back(state.nodes.clone());
            Some(next)
        })
    }

    /// Waits for every sync issued so far to settle.
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
                    warn!(%error, "task tree sync task failed");
                }
            }
        }
    }

    fn filtered(&self, keep: impl Fn(&TaskNode) -> bool) -> Vec<TaskNode> {
        self.inner
            .lock_state()
            .nodes
            .iter()
            .filter(|node| keep(node))
            .cloned()
            .collect()
    }

    /// Runs `apply` on a copy of the node set and commits the copy if it
    /// changed. Errors leave the store untouched.
    fn mutate<T, F>(&self, history: History, apply: F) -> Result<T, TreeError>
    where
        F: FnOnce(&mut Vec<TaskNode>, &ChildIndex) -> Result<T, TreeError>,
    {
        let (value, committed) = {
            let mut state = self.inner.lock_state();
            if !state.loaded {
                return Err(TreeError::NotLoaded);
            }
            let mut nodes = state.nodes.clone();
            let value = apply(&mut nodes, &state.index)?;
            if nodes == state.nodes {
                return Ok(value);
            }
            match history {
                History::Record => state.record_undo(),
                History::Silent => {}
                History::Clear => {
                    state.undo.clear();
                    state.redo.clear();
                }
            }
            state.replace_nodes(nodes);
            (value, self.persist(&mut state))
        };
        self.dispatch(committed);
        Ok(value)
    }

    fn travel<F>(&self, step: F) -> Result<bool, TreeError>
    where
        F: FnOnce(&mut TreeState) -> Option<Vec<TaskNode>>,
    {
        let committed = {
            let mut state = self.inner.lock_state();
            if !state.loaded {
                return Err(TreeError::NotLoaded);
            }
            let Some(nodes) = step(&mut state) else {
                return Ok(false);
            };
            state.replace_nodes(nodes);
            self.persist(&mut state)
        };
        self.dispatch(committed);
        Ok(true)
    }

    /// Single choke point for every committed change: writes the local cache
    /// and allocates the sequence number of the sync that will carry it.
    fn persist(&self, state: &mut TreeState) -> (u64, Vec<TaskNode>, TreeSnapshot) {
        state.next_seq += 1;
        self.write_cache(&state.nodes);
        (state.next_seq, state.nodes.clone(), state.snapshot())
    }

    fn dispatch(&self, (seq, nodes, snapshot): (u64, Vec<TaskNode>, TreeSnapshot)) {
        self.spawn_sync(seq, nodes);
        self.inner.listeners.notify(&snapshot);
    }

    fn spawn_sync(&self, seq: u64, nodes: Vec<TaskNode>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!(seq, "no async runtime available; task tree sync skipped");
            return;
        };
        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(async move {
            let mut applied = inner.sync_gate.lock().await;
            if *applied > seq {
                debug!(seq, applied = *applied, "skipping snapshot older than the applied one");
                return;
            }
            let result = inner.data_service.sync_task_tree(&nodes).await;
            if result.is_ok() {
                *applied = seq;
            }
            drop(applied);
            inner.finish_sync(seq, result);
        });
        let mut pending = self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|task| !task.is_finished());
        pending.push(handle);
    }

    fn read_cache(&self) -> Vec<TaskNode> {
        let Some(cache) = &self.inner.cache else {
            return Vec::new();
        };
        match cache.load() {
            Ok(nodes) => nodes,
            Err(error) => {
                warn!(%error, path = %cache.path().display(), "ignoring unreadable task cache");
                Vec::new()
            }
        }
    }

    fn write_cache(&self, nodes: &[TaskNode]) {
        if let Some(cache) = &self.inner.cache {
            if let Err(error) = cache.save(nodes) {
                warn!(%error, "failed to write task cache");
            }
        }
    }
}

fn active_node<'a>(nodes: &'a [TaskNode], id: &str) -> Result<&'a TaskNode, TreeError> {
    task_tree::find(nodes, id)
        .filter(|node| !node.is_deleted)
        .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))
}

fn active_folder<'a>(nodes: &'a [TaskNode], id: &str) -> Result<&'a TaskNode, TreeError> {
    task_tree::find(nodes, id)
        .filter(|node| !node.is_deleted && node.is_folder())
        .ok_or_else(|| TreeError::InvalidParent(id.to_string()))
}

fn node_mut<'a>(nodes: &'a mut [TaskNode], id: &str) -> Result<&'a mut TaskNode, TreeError> {
    nodes
        .iter_mut()
        .find(|node| node.id == id)
        .ok_or_else(|| TreeError::NodeNotFound(id.to_string()))
}

fn siblings_without(index: &ChildIndex, parent_id: Option<&str>, id: &str) -> Vec<String> {
    index
        .child_ids(parent_id)
        .iter()
        .filter(|sibling| sibling.as_str() != id)
        .cloned()
        .collect()
}

fn reinstate_at_end(nodes: &mut [TaskNode], id: &str) {
    let Some(parent_id) = task_tree::find(nodes, id).map(|node| node.parent_id.clone()) else {
        return;
    };
    let order = nodes
        .iter()
        .filter(|node| !node.is_deleted && node.parent_id == parent_id && node.id != id)
        .map(|node| node.order + 1)
        .max()
        .unwrap_or(0);
    if let Some(node) = nodes.iter_mut().find(|node| node.id == id) {
        node.is_deleted = false;
        node.deleted_at = None;
        node.order = order;
    }
}
