//! Configuration service for Symfold

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use clap::ValueEnum;
use tracing::debug;

use crate::error::ConfigError;
use crate::models::config::{OutputFormat, SymfoldConfig};

#[async_trait]
pub trait ConfigService: Send + Sync {
    /// Defaults, then global file, then project file, then environment
    async fn load(&self) -> Result<SymfoldConfig, ConfigError>;
    fn config_path(&self, global: bool) -> PathBuf;
}

pub struct DefaultConfigService {
    root: PathBuf,
    global_path: PathBuf,
}

impl DefaultConfigService {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            global_path: Self::global_config_path(),
        }
    }

    pub fn with_global_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_path = path.into();
        self
    }

    fn global_config_path() -> PathBuf {
        // XDG standard: ~/.config/symfold/config.toml
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("symfold")
            .join("config.toml")
    }

    fn project_config_path(&self) -> PathBuf {
        self.root.join(".symfold").join("config.toml")
    }

    async fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
        if !path.exists() {
            return Ok(toml::Table::new());
        }
        debug!("Loading config from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        content
            .parse::<toml::Table>()
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ConfigService for DefaultConfigService {
    async fn load(&self) -> Result<SymfoldConfig, ConfigError> {
        let mut merged = Self::load_table(&self.global_path).await?;
        let project = Self::load_table(&self.project_config_path()).await?;
        merge_tables(&mut merged, project);

        let config: SymfoldConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;

        apply_env_overrides(config, |key| std::env::var(key).ok())
    }

    fn config_path(&self, global: bool) -> PathBuf {
        if global {
            self.global_path.clone()
        } else {
            self.project_config_path()
        }
    }
}

/// Overlay keys win; nested tables merge key by key.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Layer `SYMFOLD_*` variables over the file configuration.
///
/// A blank `SYMFOLD_SERVER` is treated as unset; unparsable values are errors.
fn apply_env_overrides<F>(mut config: SymfoldConfig, var: F) -> Result<SymfoldConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = var("SYMFOLD_SERVER")
        && !val.trim().is_empty()
    {
        config.server.command = Some(val);
    }
    if let Some(val) = var("SYMFOLD_LSP_TIMEOUT") {
        config.lsp.timeout_secs = val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: "SYMFOLD_LSP_TIMEOUT".to_string(),
            message: format!("'{val}' is not a number of seconds"),
        })?;
    }
    if let Some(val) = var("SYMFOLD_OUTPUT_FORMAT") {
        config.output.format =
            OutputFormat::from_str(&val, true).map_err(|_| ConfigError::InvalidValue {
                key: "SYMFOLD_OUTPUT_FORMAT".to_string(),
                message: format!("'{val}' is not one of text, json"),
            })?;
    }
    Ok(config)
}
