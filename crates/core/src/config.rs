//! Configuration management for ragchat.
//!
//! Sources, lowest precedence first:
//! - Built-in defaults
//! - The config file (`.ragchat/config.yaml` or `RAGCHAT_CONFIG`)
//! - Environment variables
//! - Command-line flags (`with_overrides`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::settings::{ProviderSettings, Settings};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragchat/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Active LLM provider (e.g., "ollama", "openai", "mock")
    pub provider: String,

    /// Model identifier for the active provider
    pub model: String,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Emit JSON log lines
    pub log_json: bool,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Sections from the config file
    pub settings: Settings,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
    #[serde(flatten)]
    settings: Settings,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkspaceSection {
    path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: settings.llm.active_provider.clone(),
            model: ProviderSettings::default().model,
            api_key: None,
            log_level: None,
            log_json: false,
            verbose: false,
            no_color: false,
            settings,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file and environment variables.
    ///
    /// Environment variables:
    /// - `RAGCHAT_WORKSPACE`: Override workspace path
    /// - `RAGCHAT_CONFIG`: Path to config file
    /// - `RAGCHAT_PROVIDER`: LLM provider
    /// - `RAGCHAT_MODEL`: Model identifier
    /// - `RAGCHAT_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("RAGCHAT_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("RAGCHAT_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.ragchat_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("RAGCHAT_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGCHAT_MODEL") {
            config.model = model;
        }

        if let Ok(key) = std::env::var("RAGCHAT_API_KEY") {
            config.api_key = Some(key);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.log_json = json;
            }
        }

        result.provider = config_file.settings.llm.active_provider.clone();
        if let Some(provider) = config_file
            .settings
            .llm
            .providers
            .get(&config_file.settings.llm.active_provider)
        {
            result.model = provider.model.clone();
        }
        result.settings = config_file.settings;

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        log_json: bool,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if log_json {
            self.log_json = true;
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .ragchat directory.
    pub fn ragchat_dir(&self) -> PathBuf {
        self.workspace.join(".ragchat")
    }

    /// Ensure the .ragchat directory exists.
    pub fn ensure_ragchat_dir(&self) -> AppResult<()> {
        let dir = self.ragchat_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .ragchat directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Settings of the active provider, if the file declared any.
    pub fn provider_settings(&self) -> Option<&ProviderSettings> {
        self.settings.llm.providers.get(&self.provider)
    }

    /// Resolve the API key: explicit key first, then the provider's env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        self.provider_settings()
            .and_then(|p| p.api_key_env.as_ref())
            .and_then(|env_var| std::env::var(env_var).ok())
    }

    /// Path of the sqlite vector database.
    pub fn vector_db_path(&self) -> PathBuf {
        self.settings
            .vector_db
            .path
            .clone()
            .unwrap_or_else(|| self.ragchat_dir().join("vectors.db"))
    }

    /// Validate the merged configuration.
    pub fn validate(&self) -> AppResult<()> {
        let mut settings = self.settings.clone();
        settings.llm.active_provider = self.provider.clone();
        settings.validate()?;

        if self.provider == "openai" && self.resolve_api_key().is_none() {
            return Err(AppError::Config(
                "The openai provider requires an API key (RAGCHAT_API_KEY or apiKeyEnv)"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::VectorDbBackend;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert!(!config.verbose);
        assert!(!config.log_json);
    }

    #[test]
    fn test_ragchat_dir() {
        let config = AppConfig::default();
        assert!(config.ragchat_dir().ends_with(".ragchat"));
        assert!(config.vector_db_path().ends_with("vectors.db"));
    }

    #[test]
    fn test_with_overrides() {
        let overridden = AppConfig::default().with_overrides(
            None,
            None,
            Some("mock".to_string()),
            Some("scripted".to_string()),
            None,
            true,
            true,
            false,
        );

        assert_eq!(overridden.provider, "mock");
        assert_eq!(overridden.model, "scripted");
        assert!(overridden.log_json);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
logging:
  level: warn
  json: true
llm:
  activeProvider: mock
  providers:
    mock:
      model: scripted
vector_db:
  backend: memory
chat_history:
  limit: 2
"#,
        )
        .unwrap();

        let config = AppConfig::default().merge_yaml(&path).unwrap();
        assert_eq!(config.provider, "mock");
        assert_eq!(config.model, "scripted");
        assert_eq!(config.log_level, Some("warn".to_string()));
        assert!(config.log_json);
        assert_eq!(config.settings.vector_db.backend, VectorDbBackend::Memory);
        assert_eq!(config.settings.chat_history.limit, 2);
        assert!(config.settings.chat_history.reverse);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_yaml_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "retriever: [not, a, map]").unwrap();
        assert!(matches!(
            AppConfig::default().merge_yaml(&path),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ollama() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }
}
