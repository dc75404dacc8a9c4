//! Turning a configured recipe into concrete process invocations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{BuildConfig, ConfigError};

/// Placeholder values derived from a root document path.
///
/// For `/home/u/thesis/main.tex`:
///
/// | Placeholder      | Value                        |
/// |------------------|------------------------------|
/// | `%DOC%`          | `/home/u/thesis/main`        |
/// | `%DOC_EXT%`      | `/home/u/thesis/main.tex`    |
/// | `%DOCFILE%`      | `main`                       |
/// | `%DOCFILE_EXT%`  | `main.tex`                   |
/// | `%DIR%`          | `/home/u/thesis`             |
/// | `%OUTDIR%`       | expanded `build.outdir`      |
#[derive(Debug, Clone)]
pub struct Placeholders {
    doc: String,
    doc_ext: String,
    docfile: String,
    docfile_ext: String,
    dir: String,
    outdir: String,
}

impl Placeholders {
    pub fn new(root: &Path, outdir_template: &str) -> Self {
        let dir = root.parent().unwrap_or(Path::new("."));
        let stem = root
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut placeholders = Self {
            doc: dir.join(&stem).to_string_lossy().into_owned(),
            doc_ext: root.to_string_lossy().into_owned(),
            docfile: stem,
            docfile_ext: root
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            dir: dir.to_string_lossy().into_owned(),
            outdir: String::new(),
        };

        let outdir = placeholders.expand(outdir_template);
        let outdir = shellexpand::tilde(&outdir).into_owned();
        let outdir = if Path::new(&outdir).is_absolute() {
            PathBuf::from(outdir)
        } else {
            dir.join(outdir)
        };
        placeholders.outdir = outdir.to_string_lossy().into_owned();
        placeholders
    }

    /// Substitute every placeholder in `input`.
    pub fn expand(&self, input: &str) -> String {
        input
            .replace("%DOC_EXT%", &self.doc_ext)
            .replace("%DOCFILE_EXT%", &self.docfile_ext)
            .replace("%DOCFILE%", &self.docfile)
            .replace("%DOC%", &self.doc)
            .replace("%DIR%", &self.dir)
            .replace("%OUTDIR%", &self.outdir)
    }

    pub fn outdir(&self) -> &Path {
        Path::new(&self.outdir)
    }
}

/// One process invocation of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStep {
    /// Tool name from the recipe (for reporting).
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl ToolStep {
    /// Command line for log output.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Files a build is expected to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    /// The rendered output (`<outdir>/<stem>.<output_ext>`).
    pub output: PathBuf,
    /// Uncompressed SyncTeX mapping (`<outdir>/<stem>.synctex`).
    pub mapping: PathBuf,
    pub outdir: PathBuf,
}

/// Fully expanded plan for building one root.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub root: PathBuf,
    /// Working directory of every step (the root's directory).
    pub cwd: PathBuf,
    pub steps: Vec<ToolStep>,
    pub artifacts: Artifacts,
}

/// The selected recipe, validated once at startup.
#[derive(Debug, Clone)]
pub struct Recipe {
    name: String,
    tools: Vec<crate::config::ToolConfig>,
    outdir: String,
    output_ext: String,
}

impl Recipe {
    pub fn from_config(config: &BuildConfig) -> Result<Self, ConfigError> {
        let tools = config.selected_tools()?.into_iter().cloned().collect();
        Ok(Self {
            name: config.recipe.clone(),
            tools,
            outdir: config.outdir.clone(),
            output_ext: config.output_ext.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expand the recipe for `root`.
    pub fn plan(&self, root: &Path) -> BuildPlan {
        let vars = Placeholders::new(root, &self.outdir);
        let outdir = vars.outdir().to_path_buf();
        let stem = root
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let steps = self
            .tools
            .iter()
            .map(|tool| ToolStep {
                name: tool.name.clone(),
                program: vars.expand(&tool.command),
                args: tool.args.iter().map(|a| vars.expand(a)).collect(),
                env: tool
                    .env
                    .iter()
                    .map(|(k, v)| (k.clone(), vars.expand(v)))
                    .collect(),
            })
            .collect();

        BuildPlan {
            root: root.to_path_buf(),
            cwd: root.parent().unwrap_or(Path::new(".")).to_path_buf(),
            steps,
            artifacts: Artifacts {
                output: outdir.join(format!("{stem}.{}", self.output_ext)),
                mapping: outdir.join(format!("{stem}.synctex")),
                outdir,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_placeholders() {
        let vars = Placeholders::new(Path::new("/home/u/thesis/main.tex"), "%DIR%/out");
        assert_eq!(vars.expand("%DOC%"), "/home/u/thesis/main");
        assert_eq!(vars.expand("%DOC_EXT%"), "/home/u/thesis/main.tex");
        assert_eq!(vars.expand("%DOCFILE%.aux"), "main.aux");
        assert_eq!(vars.expand("%DOCFILE_EXT%"), "main.tex");
        assert_eq!(vars.expand("%DIR%"), "/home/u/thesis");
        assert_eq!(vars.expand("-outdir=%OUTDIR%"), "-outdir=/home/u/thesis/out");
    }

    #[test]
    fn test_relative_outdir_is_relative_to_root() {
        let vars = Placeholders::new(Path::new("/p/main.tex"), "build");
        assert_eq!(vars.outdir(), Path::new("/p/build"));
    }

    #[test]
    fn test_plan_default_recipe() {
        let config = test_parse_config("");
        let recipe = Recipe::from_config(&config.build).unwrap();
        let plan = recipe.plan(Path::new("/p/main.tex"));

        assert_eq!(plan.cwd, Path::new("/p"));
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].program, "latexmk");
        assert!(plan.steps[0].args.contains(&"-outdir=/p".to_string()));
        assert_eq!(plan.steps[0].args.last().unwrap(), "/p/main");
        assert_eq!(plan.artifacts.output, Path::new("/p/main.pdf"));
        assert_eq!(plan.artifacts.mapping, Path::new("/p/main.synctex"));
    }

    #[test]
    fn test_plan_multi_pass_recipe() {
        let config = test_parse_config(
            "[build]\nrecipe = \"pdflatex -> bibtex -> pdflatex*2\"\noutdir = \"%DIR%/out\"",
        );
        let recipe = Recipe::from_config(&config.build).unwrap();
        let plan = recipe.plan(Path::new("/p/main.tex"));

        let names: Vec<_> = plan.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["pdflatex", "bibtex", "pdflatex", "pdflatex"]);
        assert_eq!(plan.steps[1].args, ["/p/out/main"]);
        assert_eq!(plan.artifacts.output, Path::new("/p/out/main.pdf"));
    }
}
