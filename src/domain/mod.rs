pub mod analytics;
pub mod error;
pub mod models;
pub mod task_tree;
pub mod timer;
