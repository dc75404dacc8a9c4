//! Command-line interface module.

mod args;
pub mod build;
pub mod locate;
pub mod watch;

pub use args::{Cli, Commands};
