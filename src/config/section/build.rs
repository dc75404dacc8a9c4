//! `[build]` section configuration.
//!
//! Tools are named external commands; a recipe is an ordered list of tool
//! names run one after another against the root document.
//!
//! # Example
//!
//! ```toml
//! [build]
//! recipe = "pdflatex -> bibtex -> pdflatex*2"
//! outdir = "%DIR%/build"
//! step_timeout_ms = 60000
//!
//! [[build.tools]]
//! name = "pdflatex"
//! command = "pdflatex"
//! args = ["-synctex=-1", "-interaction=nonstopmode", "-output-directory=%OUTDIR%", "%DOC%"]
//!
//! [[build.recipes]]
//! name = "pdflatex"
//! tools = ["pdflatex"]
//! ```
//!
//! Placeholders: `%DOC%`, `%DOC_EXT%`, `%DOCFILE%`, `%DOCFILE_EXT%`, `%DIR%`,
//! `%OUTDIR%`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One external command of the toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the process (values are placeholder-expanded).
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ToolConfig {
    fn new(name: &str, command: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            env: BTreeMap::new(),
        }
    }
}

/// Named, ordered list of tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeConfig {
    pub name: String,
    pub tools: Vec<String>,
}

/// Build settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Name of the recipe to run.
    pub recipe: String,
    pub tools: Vec<ToolConfig>,
    pub recipes: Vec<RecipeConfig>,
    /// Output directory (placeholders and `~` are expanded).
    pub outdir: String,
    /// Extension of the output artifact.
    pub output_ext: String,
    /// Wall-clock bound for a single step.
    pub step_timeout_ms: u64,
    /// Kill a running build when a newer trigger arrives for the same root.
    pub cancel_superseded: bool,
    /// Maximum builds running at once across all projects.
    pub max_parallel: usize,
}

pub const DEFAULT_RECIPE: &str = "latexmk";

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            recipe: DEFAULT_RECIPE.to_string(),
            tools: default_tools(),
            recipes: default_recipes(),
            outdir: "%DIR%".to_string(),
            output_ext: "pdf".to_string(),
            step_timeout_ms: 120_000,
            cancel_superseded: true,
            max_parallel: 2,
        }
    }
}

fn default_tools() -> Vec<ToolConfig> {
    vec![
        ToolConfig::new(
            "latexmk",
            "latexmk",
            &[
                "-synctex=-1",
                "-interaction=nonstopmode",
                "-file-line-error",
                "-pdf",
                "-outdir=%OUTDIR%",
                "%DOC%",
            ],
        ),
        ToolConfig::new(
            "pdflatex",
            "pdflatex",
            &[
                "-synctex=-1",
                "-interaction=nonstopmode",
                "-file-line-error",
                "-output-directory=%OUTDIR%",
                "%DOC%",
            ],
        ),
        ToolConfig::new("bibtex", "bibtex", &["%OUTDIR%/%DOCFILE%"]),
    ]
}

fn default_recipes() -> Vec<RecipeConfig> {
    vec![
        RecipeConfig {
            name: "latexmk".to_string(),
            tools: vec!["latexmk".to_string()],
        },
        RecipeConfig {
            name: "pdflatex -> bibtex -> pdflatex*2".to_string(),
            tools: ["pdflatex", "bibtex", "pdflatex", "pdflatex"]
                .into_iter()
                .map(String::from)
                .collect(),
        },
    ]
}

impl BuildConfig {
    /// Look up a tool by name.
    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Tools of the selected recipe, in order.
    pub fn selected_tools(&self) -> Result<Vec<&ToolConfig>, ConfigError> {
        let recipe = self
            .recipes
            .iter()
            .find(|r| r.name == self.recipe)
            .ok_or_else(|| ConfigError::UnknownRecipe(self.recipe.clone()))?;

        if recipe.tools.is_empty() {
            return Err(ConfigError::Validation(format!(
                "build.recipes: recipe `{}` has no tools",
                recipe.name
            )));
        }

        recipe
            .tools
            .iter()
            .map(|name| {
                self.tool(name).ok_or_else(|| ConfigError::UnknownTool {
                    recipe: recipe.name.clone(),
                    tool: name.clone(),
                })
            })
            .collect()
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for tool in &self.tools {
            if tool.command.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "build.tools: tool `{}` has an empty command",
                    tool.name
                )));
            }
        }
        if self.step_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "build.step_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.max_parallel == 0 {
            return Err(ConfigError::Validation(
                "build.max_parallel must be at least 1".into(),
            ));
        }
        self.selected_tools().map(|_| ())
    }

    /// Commands of the selected recipe that cannot be found on `PATH`.
    pub fn missing_commands(&self) -> Vec<String> {
        let Ok(tools) = self.selected_tools() else {
            return Vec::new();
        };
        let mut missing: Vec<String> = tools
            .iter()
            .map(|t| t.command.clone())
            .filter(|cmd| which::which(cmd).is_err())
            .collect();
        missing.dedup();
        missing
    }
}
