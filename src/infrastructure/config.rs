use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TIMER_JSON: &str = "timer.json";
const SCHEMA_VERSION: u64 = 1;

pub const ENV_API_BASE_URL: &str = "SONICFLOW_API_BASE_URL";
pub const ENV_DATA_SERVICE: &str = "SONICFLOW_DATA_SERVICE";
pub const ENV_LOG: &str = "SONICFLOW_LOG";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataServiceMode {
    #[default]
    Auto,
    Desktop,
    Http,
}

impl DataServiceMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "desktop" | "sqlite" | "ipc" => Some(Self::Desktop),
            "http" | "web" => Some(Self::Http),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataServiceConfig {
    #[serde(default)]
    pub mode: DataServiceMode,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub data_service: DataServiceConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub mode: Option<DataServiceMode>,
    pub base_url: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "SonicFlow",
                "notificationsEnabled": true,
                "dataService": {
                    "mode": "auto",
                    "baseUrl": null
                }
            }),
        ),
        (
            TIMER_JSON,
            serde_json::json!({
                "schema": 1,
                "workDurationMinutes": null
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            write_config(&path, &value)?;
        }
    }
    Ok(())
}

fn write_config(path: &Path, value: &serde_json::Value) -> Result<(), InfraError> {
    let formatted = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{formatted}\n"))?;
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SCHEMA_VERSION {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let value = read_config(&path)?;
    serde_json::from_value(value)
        .map_err(|error| InfraError::InvalidConfig(format!("invalid {}: {error}", path.display())))
}

pub fn save_notifications_enabled(config_dir: &Path, enabled: bool) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    let mut value = read_config(&path)?;
    value["notificationsEnabled"] = serde_json::Value::Bool(enabled);
    write_config(&path, &value)
}

/// Work duration persisted locally so it survives restarts even when the
/// backend is unreachable.
pub fn read_work_duration_minutes(config_dir: &Path) -> Result<Option<u32>, InfraError> {
    let value = read_config(&config_dir.join(TIMER_JSON))?;
    Ok(value
        .get("workDurationMinutes")
        .and_then(serde_json::Value::as_u64)
        .and_then(|minutes| u32::try_from(minutes).ok())
        .filter(|minutes| *minutes > 0))
}

pub fn write_work_duration_minutes(config_dir: &Path, minutes: u32) -> Result<(), InfraError> {
    let path = config_dir.join(TIMER_JSON);
    let mut value = read_config(&path)?;
    value["workDurationMinutes"] = serde_json::Value::from(minutes);
    write_config(&path, &value)
}

pub fn load_env_overrides() -> Result<EnvOverrides, InfraError> {
    load_env_overrides_from_lookup(|key| std::env::var(key).ok())
}

pub fn load_env_overrides_from_lookup<F>(lookup: F) -> Result<EnvOverrides, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let mode = match optional_lookup_value(&lookup, ENV_DATA_SERVICE) {
        Some(raw) => Some(DataServiceMode::parse(&raw).ok_or_else(|| {
            InfraError::InvalidConfig(format!(
                "unsupported {ENV_DATA_SERVICE} value '{raw}' (expected auto, desktop or http)"
            ))
        })?),
        None => None,
    };
    Ok(EnvOverrides {
        mode,
        base_url: optional_lookup_value(&lookup, ENV_API_BASE_URL),
    })
}

fn optional_lookup_value<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "sonicflow-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_are_written_and_loaded() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");

        let config = load_app_config(&dir.path).expect("load app config");
        assert_eq!(config.app_name, "SonicFlow");
        assert!(config.notifications_enabled);
        assert_eq!(config.data_service.mode, DataServiceMode::Auto);
        assert_eq!(read_work_duration_minutes(&dir.path).expect("read timer"), None);
    }

    #[test]
    fn existing_files_are_not_overwritten() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        save_notifications_enabled(&dir.path, false).expect("save flag");
        write_work_duration_minutes(&dir.path, 50).expect("save duration");

        ensure_default_configs(&dir.path).expect("rerun defaults");
        assert!(!load_app_config(&dir.path).expect("load").notifications_enabled);
        assert_eq!(read_work_duration_minutes(&dir.path).expect("read"), Some(50));
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = TempConfigDir::new();
        fs::write(dir.path.join(APP_JSON), r#"{"schema": 2, "appName": "x"}"#).expect("write app");
        match load_app_config(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema 2")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn env_overrides_parse_mode_and_base_url() {
        let overrides = load_env_overrides_from_lookup(|key| match key {
            ENV_DATA_SERVICE => Some(" HTTP ".to_string()),
            ENV_API_BASE_URL => Some("http://localhost:8080".to_string()),
            _ => None,
        })
        .expect("overrides");
        assert_eq!(overrides.mode, Some(DataServiceMode::Http));
        assert_eq!(overrides.base_url.as_deref(), Some("http://localhost:8080"));

        let result = load_env_overrides_from_lookup(|key| match key {
            ENV_DATA_SERVICE => Some("carrier-pigeon".to_string()),
            _ => None,
        });
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));

        let empty = load_env_overrides_from_lookup(|_| Some("   ".to_string())).expect("blank values");
        assert_eq!(empty, EnvOverrides::default());
    }
}
