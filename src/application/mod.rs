pub mod bootstrap;
pub mod commands;
pub mod data_service;
pub mod migration;
pub mod observer;
pub mod task_tree;
pub mod timer_controller;
