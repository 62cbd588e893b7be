use crate::application::data_service::DataService;
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::config::{DataServiceConfig, DataServiceMode, EnvOverrides};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::http_data_service::HttpDataService;
use crate::infrastructure::sqlite_data_service::SqliteDataService;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataServiceKind {
    Desktop { database_path: PathBuf },
    Http { base_url: String },
}

impl DataServiceKind {
    /// Environment settings win over `app.json`. In `auto` mode a configured
    /// base URL selects the HTTP backend, otherwise the local database is used.
    pub fn detect(
        config: &DataServiceConfig,
        overrides: &EnvOverrides,
        database_path: &Path,
    ) -> Result<Self, InfraError> {
        let mode = overrides.mode.unwrap_or(config.mode);
        let base_url = overrides
            .base_url
            .clone()
            .or_else(|| config.base_url.clone())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        match (mode, base_url) {
            (DataServiceMode::Desktop, _) | (DataServiceMode::Auto, None) => Ok(Self::Desktop {
                database_path: database_path.to_path_buf(),
            }),
            (DataServiceMode::Http, Some(base_url)) | (DataServiceMode::Auto, Some(base_url)) => {
                Ok(Self::Http { base_url })
            }
            (DataServiceMode::Http, None) => Err(InfraError::InvalidConfig(
                "http data service selected but no base url configured".to_string(),
            )),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Desktop { .. } => "desktop",
            Self::Http { .. } => "http",
        }
    }
}

pub fn build_data_service(
    kind: &DataServiceKind,
    command_log: &CommandLog,
) -> Result<Arc<dyn DataService>, InfraError> {
    match kind {
        DataServiceKind::Desktop { database_path } => Ok(Arc::new(SqliteDataService::new(
            database_path,
            command_log.clone(),
        ))),
        DataServiceKind::Http { base_url } => Ok(Arc::new(HttpDataService::new(base_url)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: DataServiceMode, base_url: Option<&str>) -> DataServiceConfig {
        DataServiceConfig {
            mode,
            base_url: base_url.map(ToOwned::to_owned),
        }
    }

    #[test]
    fn auto_mode_prefers_local_database_without_base_url() {
        let kind = DataServiceKind::detect(
            &config(DataServiceMode::Auto, None),
            &EnvOverrides::default(),
            Path::new("state/sonicflow.sqlite"),
        )
        .expect("detect");
        assert_eq!(
            kind,
            DataServiceKind::Desktop {
                database_path: PathBuf::from("state/sonicflow.sqlite")
            }
        );
        assert_eq!(kind.label(), "desktop");
    }

    #[test]
    fn env_base_url_switches_auto_mode_to_http() {
        let overrides = EnvOverrides {
            mode: None,
            base_url: Some("http://localhost:8080".to_string()),
        };
        let kind = DataServiceKind::detect(&config(DataServiceMode::Auto, None), &overrides, Path::new("db"))
            .expect("detect");
        assert_eq!(
            kind,
            DataServiceKind::Http {
                base_url: "http://localhost:8080".to_string()
            }
        );
    }

    #[test]
    fn env_mode_overrides_config_mode() {
        let overrides = EnvOverrides {
            mode: Some(DataServiceMode::Desktop),
            base_url: None,
        };
        let kind = DataServiceKind::detect(
            &config(DataServiceMode::Http, Some("http://example.com")),
            &overrides,
            Path::new("db"),
        )
        .expect("detect");
        assert_eq!(kind.label(), "desktop");
    }

    #[test]
    fn http_mode_requires_base_url() {
        let result = DataServiceKind::detect(
            &config(DataServiceMode::Http, Some("  ")),
            &EnvOverrides::default(),
            Path::new("db"),
        );
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn build_rejects_malformed_http_url() {
        let log = CommandLog::new(Path::new("logs"));
        let kind = DataServiceKind::Http {
            base_url: "not a url".to_string(),
        };
        assert!(build_data_service(&kind, &log).is_err());
        let desktop = DataServiceKind::Desktop {
            database_path: PathBuf::from("db.sqlite"),
        };
        assert!(build_data_service(&desktop, &log).is_ok());
    }
}
