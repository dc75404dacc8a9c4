//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid texwatch.toml")]
    Toml(#[from] toml::de::Error),

    #[error("build.recipe: unknown recipe `{0}`")]
    UnknownRecipe(String),

    #[error("build.recipes: recipe `{recipe}` references unknown tool `{tool}`")]
    UnknownTool { recipe: String, tool: String },

    #[error("invalid configuration: {0}")]
    Validation(String),
}
