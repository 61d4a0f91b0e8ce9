//! Application container for Symfold

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::cli::{Cli, OutputContext};
use crate::error::SymfoldError;
use crate::models::config::SymfoldConfig;
use crate::services::analysis::AnalysisService;
use crate::services::config::{ConfigService, DefaultConfigService};

pub struct App {
    pub(crate) output: OutputContext,
    pub(crate) config_service: Arc<dyn ConfigService>,
    pub(crate) config: SymfoldConfig,
}

impl App {
    /// Load configuration for the current directory and layer CLI flags on top
    pub async fn new(cli: &Cli) -> anyhow::Result<Self> {
        let root = std::env::current_dir()?;

        tracing::debug!("Initializing Symfold at {:?}", root);

        let config_service: Arc<dyn ConfigService> = Arc::new(DefaultConfigService::new(&root));
        let mut config = config_service
            .load()
            .await
            .map_err(SymfoldError::from)
            .context("Failed to load configuration")?;
        cli.apply_overrides(&mut config);

        Ok(Self {
            output: OutputContext::new(config.output.format),
            config_service,
            config,
        })
    }

    pub fn output(&self) -> OutputContext {
        self.output
    }

    pub fn config_paths(&self) -> (PathBuf, PathBuf) {
        (
            self.config_service.config_path(true),
            self.config_service.config_path(false),
        )
    }

    /// Analyze one file and print the listings
    pub async fn run(&self, file: &Path) -> anyhow::Result<()> {
        let (global, project) = self.config_paths();
        tracing::debug!(
            "Config sources: {} and {}",
            global.display(),
            project.display()
        );

        let service = AnalysisService::new(self.config.clone());
        let report = service
            .analyze_file(file)
            .await
            .with_context(|| file.display().to_string())?;
        self.output.print_report(&report);
        Ok(())
    }
}
