pub mod command_log;
pub mod config;
pub mod data_service_factory;
pub mod error;
pub mod http_data_service;
pub mod logging;
pub mod memory_data_service;
pub mod notifier;
pub mod sqlite_data_service;
pub mod storage;
pub mod task_cache;
