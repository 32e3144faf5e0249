use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{database::DatabaseConfig, logging::LoggingConfig, planning::PlanningConfig};
use crate::validation::ConfigValidator;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub planning: PlanningConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("database.url", defaults.database.url.clone())?
            .set_default(
                "database.max_connections",
                defaults.database.max_connections as i64,
            )?
            .set_default(
                "database.min_connections",
                defaults.database.min_connections as i64,
            )?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds as i64,
            )?
            .set_default("planning.acting_user_id", defaults.planning.acting_user_id.clone())?
            .set_default(
                "planning.summary_page_size",
                defaults.planning.summary_page_size as i64,
            )?
            .set_default(
                "planning.default_page_size",
                defaults.planning.default_page_size as i64,
            )?
            .set_default("logging.level", defaults.logging.level.to_string())?
            .set_default("logging.format", defaults.logging.format.to_string())?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/task-assigning.toml",
                "task-assigning.toml",
                "/etc/task-assigning/config.toml",
            ];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("TASK_ASSIGNING")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.database.validate()?;
        self.planning.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogLevel, OutputFormat};
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let toml_str = r#"
            [database]
            url = "sqlite::memory:"
            max_connections = 2
            min_connections = 1
            connection_timeout_seconds = 10

            [planning]
            acting_user_id = "admin"
            summary_page_size = 50
            default_page_size = 20

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.planning.acting_user_id, "admin");
        assert_eq!(config.planning.summary_page_size, 50);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, OutputFormat::Json);
    }

    #[test]
    fn test_from_toml_rejects_invalid_values() {
        let toml_str = r#"
            [database]
            url = "mysql://localhost/x"
            max_connections = 2
            min_connections = 1
            connection_timeout_seconds = 10

            [planning]
            acting_user_id = "admin"
            summary_page_size = 50
            default_page_size = 20
        "#;

        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.database.url, config.database.url);
        assert_eq!(parsed.planning.summary_page_size, config.planning.summary_page_size);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [planning]
            acting_user_id = "file_admin"
            summary_page_size = 7
            default_page_size = 5
            "#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.planning.acting_user_id, "file_admin");
        assert_eq!(config.planning.summary_page_size, 7);
        assert_eq!(config.database.url, DatabaseConfig::default().url);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/task-assigning.toml")).is_err());
    }
}
