//! One-shot lookups: `texwatch root`, `forward` and `inverse`.
//!
//! These read the mapping artifact left by the last build; nothing is built.

use std::path::Path;

use anyhow::{Result, bail};

use crate::build::Recipe;
use crate::config::ProjectConfig;
use crate::locate::{MapStatus, PositionLocator};
use crate::root::RootResolver;
use crate::utils::normalize_path;

pub fn print_root(config: &ProjectConfig, file: &Path) -> Result<()> {
    let mut resolver = RootResolver::new(&config.watch, config.workspace());
    let root = resolver.resolve_root(file)?;
    println!("{}", root.display());
    Ok(())
}

pub fn forward(config: &ProjectConfig, file: &Path, line: u32) -> Result<()> {
    let mut resolver = RootResolver::new(&config.watch, config.workspace());
    let source = normalize_path(file);
    let root = resolver.resolve_root(&source)?;
    let locator = load_map(config, &root)?;

    let found = locator.forward(&root, &source, line)?;
    let position = found.value;
    println!("{} {:.2} {:.2}", position.page, position.x, position.y);
    Ok(())
}

pub fn inverse(config: &ProjectConfig, root: &Path, page: u32, x: f64, y: f64) -> Result<()> {
    let root = normalize_path(root);
    let locator = load_map(config, &root)?;

    let found = locator.inverse(&root, page, x, y)?;
    println!("{}:{}", found.value.file.display(), found.value.line);
    Ok(())
}

fn load_map(config: &ProjectConfig, root: &Path) -> Result<PositionLocator> {
    let recipe = Recipe::from_config(&config.build)?;
    let mapping = recipe.plan(root).artifacts.mapping;

    let locator = PositionLocator::new();
    match locator.reload(root, &mapping, 0) {
        MapStatus::Loaded { records } => {
            crate::debug!("locate"; "{} records from {}", records, mapping.display());
            Ok(locator)
        }
        MapStatus::Stale => bail!("no mapping file at `{}`, build first", mapping.display()),
        MapStatus::Unavailable(reason) => bail!("cannot read `{}`: {}", mapping.display(), reason),
    }
}
