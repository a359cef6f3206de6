mod file_config;

pub use file_config::FileConfig;

use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;
use tracing::Level;

/// CLI arguments that can be overridden by the TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub username: Option<String>,
    pub hostname: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite file backing the repository's blob store.
    pub db_path: PathBuf,
    /// Repository config file; the maintenance lock lives next to it.
    pub config_path: PathBuf,
    pub username: String,
    pub hostname: String,
    pub log_level: Level,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| anyhow!("db_path must be specified via --db-path or in config file"))?;

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        // Without an explicit repository config, lock next to the database.
        let config_path = file
            .config_path
            .map(PathBuf::from)
            .or_else(|| cli.config_path.clone())
            .unwrap_or_else(|| db_path.clone());

        let username = file
            .username
            .or_else(|| cli.username.clone())
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string());

        let hostname = file
            .hostname
            .or_else(|| cli.hostname.clone())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string());

        let log_level = match file.log_level.or_else(|| cli.log_level.clone()) {
            Some(level) => parse_log_level(&level)
                .ok_or_else(|| anyhow!("Invalid log level: {}", level))?,
            None => Level::INFO,
        };

        Ok(Self {
            db_path,
            config_path,
            username,
            hostname,
            log_level,
        })
    }

    /// Identity maintenance ownership is checked against.
    pub fn username_at_host(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}

fn parse_log_level(s: &str) -> Option<Level> {
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), Some(Level::DEBUG));
        // Case insensitive
        assert_eq!(parse_log_level("WARN"), Some(Level::WARN));
        assert!(parse_log_level("loud").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().join("repo.db")),
            config_path: Some(temp_dir.path().join("repo.config")),
            username: Some("alice".to_string()),
            hostname: Some("box".to_string()),
            log_level: Some("debug".to_string()),
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, temp_dir.path().join("repo.db"));
        assert_eq!(config.config_path, temp_dir.path().join("repo.config"));
        assert_eq!(config.username_at_host(), "alice@box");
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().join("cli.db")),
            username: Some("alice".to_string()),
            hostname: Some("box".to_string()),
            ..Default::default()
        };
        let toml_str = format!(
            r#"
            db_path = "{}"
            username = "maint"
            log_level = "warn"
            "#,
            temp_dir.path().join("file.db").display()
        );
        let file: FileConfig = toml::from_str(&toml_str).unwrap();

        let config = AppConfig::resolve(&cli, Some(file)).unwrap();

        assert_eq!(config.db_path, temp_dir.path().join("file.db"));
        assert_eq!(config.config_path, temp_dir.path().join("file.db"));
        assert_eq!(config.username_at_host(), "maint@box");
        assert_eq!(config.log_level, Level::WARN);
    }

    #[test]
    fn test_resolve_requires_db_path() {
        let result = AppConfig::resolve(&CliConfig::default(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_rejects_missing_directory() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/nonexistent/dir/repo.db")),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_resolve_rejects_bad_log_level() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_path: Some(temp_dir.path().join("repo.db")),
            log_level: Some("chatty".to_string()),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&cli, None).is_err());
    }

    #[test]
    fn test_load_file_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("maintenance.toml");
        std::fs::write(&path, "hostname = \"nas\"\n").unwrap();

        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.hostname.as_deref(), Some("nas"));
        assert!(file.db_path.is_none());

        assert!(FileConfig::load(&temp_dir.path().join("missing.toml")).is_err());
    }
}
