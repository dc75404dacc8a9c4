//! Project configuration management for `texwatch.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                             |
//! |-------------|-----------------------------------------------------|
//! | `[build]`   | Tools, recipes, output directory, timeouts          |
//! | `[watch]`   | Debounce, periodic check, root resolution settings  |
//! | `[preview]` | Preview HTTP/WebSocket servers                      |
//!
//! The file is optional: without it every section uses its defaults and the
//! workspace is the current directory.

mod error;
pub mod section;

pub use error::ConfigError;
pub use section::{BuildConfig, PreviewConfig, RecipeConfig, ToolConfig, WatchConfig};

use crate::{
    cli::{Cli, Commands},
    log,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing texwatch.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Absolute path to the config file, if one was found (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Workspace directory: parent of the config file, or cwd (internal use only)
    #[serde(skip)]
    pub workspace: PathBuf,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Trigger and root resolution settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Preview server settings
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl ProjectConfig {
    /// Load configuration and apply CLI overrides.
    ///
    /// Searches upward from cwd for the config file; a missing file is not
    /// an error.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cwd, &cli.config) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.workspace = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| cwd.clone());
                config.config_path = Some(path);
                config
            }
            None => {
                crate::debug!("config"; "no {} found, using defaults", cli.config.display());
                Self {
                    workspace: cwd,
                    ..Self::default()
                }
            }
        };

        config.apply_cli(cli);
        config.validate()?;
        config.warn_missing_commands();
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "ignoring unknown fields in {}: {}", display_path, fields.join(", "));
    }

    /// Apply command-specific CLI options.
    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(recipe) = &cli.recipe {
            self.build.recipe = recipe.clone();
        }

        if let Commands::Watch {
            port,
            ws_port,
            debounce,
            no_preview,
            ..
        } = &cli.command
        {
            Self::update_option(&mut self.preview.port, port.as_ref());
            Self::update_option(&mut self.preview.ws_port, ws_port.as_ref());
            Self::update_option(&mut self.watch.debounce_ms, debounce.as_ref());
            if *no_preview {
                self.preview.enable = false;
            }
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build.validate()?;
        if self.watch.root_extensions.is_empty() {
            return Err(ConfigError::Validation(
                "watch.root_extensions must not be empty".into(),
            ));
        }
        if let Some(ext) = self
            .watch
            .root_extensions
            .iter()
            .find(|e| !self.watch.extensions.contains(e))
        {
            return Err(ConfigError::Validation(format!(
                "watch.root_extensions: `{ext}` is not listed in watch.extensions"
            )));
        }
        Ok(())
    }

    fn warn_missing_commands(&self) {
        for command in self.build.missing_commands() {
            log!("warning"; "`{}` not found in PATH, builds using it will fail", command);
        }
    }

    /// Get the workspace directory.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// Find config file by searching upward from `start`.
///
/// ```text
/// /home/user/thesis/chapters/   ← start
/// /home/user/thesis/texwatch.toml ← found!
/// ```
pub fn find_config_file(start: &Path, config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    start
        .ancestors()
        .map(|dir| dir.join(config_name))
        .find(|candidate| candidate.is_file())
}

/// Parse a config snippet for tests.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> ProjectConfig {
    ProjectConfig::from_str(content).unwrap()
}
