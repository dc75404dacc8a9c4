//! Configuration sections of `texwatch.toml`.

pub mod build;
mod preview;
mod watch;

pub use build::{BuildConfig, RecipeConfig, ToolConfig};
pub use preview::PreviewConfig;
pub use watch::WatchConfig;
