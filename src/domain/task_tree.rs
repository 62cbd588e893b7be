use crate::domain::models::{NodeType, TaskNode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Folders may sit at depths `0..MAX_FOLDER_DEPTH`; depth 0 is the root level.
pub const MAX_FOLDER_DEPTH: usize = 5;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_node_id(node_type: NodeType) -> String {
    let sequence = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{sequence}", node_type.as_str(), Utc::now().timestamp_micros())
}

/// Parent to active-children view, each list sorted by `order` with ties kept
/// in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildIndex {
    roots: Vec<String>,
    children: HashMap<String, Vec<String>>,
}

impl ChildIndex {
    pub fn build(nodes: &[TaskNode]) -> Self {
        let mut active: Vec<(usize, &TaskNode)> = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.is_deleted)
            .collect();
        active.sort_by_key(|(position, node)| (node.order, *position));

        let mut index = Self::default();
        for (_, node) in active {
            match node.parent_id.as_deref() {
                None => index.roots.push(node.id.clone()),
                Some(parent_id) => index
                    .children
                    .entry(parent_id.to_string())
                    .or_default()
                    .push(node.id.clone()),
            }
        }
        index
    }

    pub fn child_ids(&self, parent_id: Option<&str>) -> &[String] {
        match parent_id {
            None => &self.roots,
            Some(parent_id) => self
                .children
                .get(parent_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }

    pub fn children<'a>(&self, nodes: &'a [TaskNode], parent_id: Option<&str>) -> Vec<&'a TaskNode> {
        let by_id = index_by_id(nodes);
        self.child_ids(parent_id)
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).copied())
            .collect()
    }
}

fn index_by_id(nodes: &[TaskNode]) -> HashMap<&str, &TaskNode> {
    nodes.iter().map(|node| (node.id.as_str(), node)).collect()
}

pub fn find<'a>(nodes: &'a [TaskNode], id: &str) -> Option<&'a TaskNode> {
    nodes.iter().find(|node| node.id == id)
}

/// Ancestors of `id`, root first. The walk stops after `nodes.len()` steps so
/// a corrupt parent chain cannot loop forever.
pub fn ancestors<'a>(nodes: &'a [TaskNode], id: &str) -> Vec<&'a TaskNode> {
    let by_id = index_by_id(nodes);
    let mut chain = Vec::new();
    let mut current = by_id.get(id).and_then(|node| node.parent_id.as_deref());
    while let Some(parent_id) = current {
        if chain.len() >= nodes.len() {
            break;
        }
        let Some(parent) = by_id.get(parent_id).copied() else {
            break;
        };
        chain.push(parent);
        current = parent.parent_id.as_deref();
    }
    chain.reverse();
    chain
}

pub fn depth(nodes: &[TaskNode], id: &str) -> usize {
    ancestors(nodes, id).len()
}

/// True when `candidate_id` is `ancestor_id` or lies somewhere below it.
/// A parent chain that does not terminate within the node count is treated
/// as a match so callers reject the move.
pub fn is_self_or_descendant(nodes: &[TaskNode], ancestor_id: &str, candidate_id: &str) -> bool {
    let by_id = index_by_id(nodes);
    let mut current = Some(candidate_id);
    let mut steps = 0usize;
    while let Some(id) = current {
        if id == ancestor_id {
            return true;
        }
        steps += 1;
        if steps > nodes.len() {
            return true;
        }
        current = by_id.get(id).and_then(|node| node.parent_id.as_deref());
    }
    false
}

/// `root_id` followed by every node below it, deleted or not.
pub fn subtree_ids(nodes: &[TaskNode], root_id: &str) -> Vec<String> {
    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for node in nodes {
        if let Some(parent_id) = node.parent_id.as_deref() {
            children.entry(parent_id).or_default().push(node.id.as_str());
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut ordered = Vec::new();
    let mut stack = vec![root_id];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        ordered.push(id.to_string());
        if let Some(kids) = children.get(id) {
            stack.extend(kids.iter().rev());
        }
    }
    ordered
}

/// Number of active folder levels nested below `id` (0 when it holds no
/// folders).
pub fn folder_subtree_depth(nodes: &[TaskNode], id: &str) -> usize {
    let index = ChildIndex::build(nodes);
    let by_id = index_by_id(nodes);
    let mut deepest = 0usize;
    let mut stack: Vec<(&str, usize)> = vec![(id, 0)];
    let mut seen: HashSet<&str> = HashSet::new();
    while let Some((current, level)) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        deepest = deepest.max(level);
        for child_id in index.child_ids(Some(current)) {
            if by_id.get(child_id.as_str()).is_some_and(|child| child.is_folder()) {
                stack.push((child_id.as_str(), level + 1));
            }
        }
    }
    deepest
}

/// Every active task below `folder_id`, at any nesting level.
pub fn descendant_tasks<'a>(nodes: &'a [TaskNode], folder_id: &str) -> Vec<&'a TaskNode> {
    let index = ChildIndex::build(nodes);
    let by_id = index_by_id(nodes);
    let mut tasks = Vec::new();
    let mut stack = vec![folder_id.to_string()];
    let mut seen: HashSet<String> = HashSet::new();
    while let Some(parent_id) = stack.pop() {
        if !seen.insert(parent_id.clone()) {
            continue;
        }
        for child_id in index.child_ids(Some(parent_id.as_str())) {
            let Some(child) = by_id.get(child_id.as_str()).copied() else {
                continue;
            };
            if child.is_folder() {
                stack.push(child.id.clone());
            } else {
                tasks.push(child);
            }
        }
    }
    tasks
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderProgress {
    pub completed: usize,
    pub total: usize,
}

pub fn folder_progress(nodes: &[TaskNode], folder_id: &str) -> FolderProgress {
    let tasks = descendant_tasks(nodes, folder_id);
    FolderProgress {
        completed: tasks.iter().filter(|task| task.is_done()).count(),
        total: tasks.len(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlatFolder {
    pub id: String,
    pub title: String,
    pub path: String,
    pub depth: usize,
}

/// Active folders in tree order, each with its " / "-joined title path.
pub fn flatten_folders(nodes: &[TaskNode]) -> Vec<FlatFolder> {
    let index = ChildIndex::build(nodes);
    let by_id = index_by_id(nodes);
    let mut flat = Vec::new();
    let mut stack: Vec<(&str, String, usize)> = index
        .child_ids(None)
        .iter()
        .rev()
        .map(|id| (id.as_str(), String::new(), 0))
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();

    while let Some((id, prefix, level)) = stack.pop() {
        let Some(node) = by_id.get(id).copied() else {
            continue;
        };
        if !node.is_folder() || !seen.insert(id) {
            continue;
        }
        let path = if prefix.is_empty() {
            node.title.clone()
        } else {
            format!("{prefix} / {}", node.title)
        };
        for child_id in index.child_ids(Some(id)).iter().rev() {
            stack.push((child_id.as_str(), path.clone(), level + 1));
        }
        flat.push(FlatFolder {
            id: node.id.clone(),
            title: node.title.clone(),
            path,
            depth: level,
        });
    }
    flat
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SortMode {
    #[default]
    Manual,
    Status,
    ScheduledAt,
}

/// Folders first, then tasks; each group ordered by `mode`. Input is expected
/// in manual (`order`) sequence.
pub fn sort_nodes<'a>(nodes: Vec<&'a TaskNode>, mode: SortMode) -> Vec<&'a TaskNode> {
    let (mut folders, mut tasks): (Vec<&TaskNode>, Vec<&TaskNode>) =
        nodes.into_iter().partition(|node| node.is_folder());
    for group in [&mut folders, &mut tasks] {
        match mode {
            SortMode::Manual => {}
            SortMode::Status => group.sort_by_key(|node| (node.is_done(), node.order)),
            SortMode::ScheduledAt => group.sort_by(|left, right| {
                match (left.scheduled_at, right.scheduled_at) {
                    (Some(left_at), Some(right_at)) => left_at.cmp(&right_at),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => left.order.cmp(&right.order),
                }
            }),
        }
    }
    folders.extend(tasks);
    folders
}

/// Assigns `order = position` to every node named in `ordered_ids`.
pub fn renumber(nodes: &mut [TaskNode], ordered_ids: &[String]) {
    let positions: HashMap<&str, i64> = ordered_ids
        .iter()
        .enumerate()
        .map(|(position, id)| (id.as_str(), position as i64))
        .collect();
    for node in nodes.iter_mut() {
        if let Some(order) = positions.get(node.id.as_str()) {
            node.order = *order;
        }
    }
}
