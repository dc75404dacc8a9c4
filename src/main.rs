//! texwatch - rebuild LaTeX projects on change and keep previews in sync.

#![allow(dead_code)]

mod actor;
mod build;
mod cli;
mod config;
mod core;
mod editor;
mod locate;
mod logger;
mod preview;
mod root;
mod trigger;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::ProjectConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = ProjectConfig::load(&cli)?;

    match &cli.command {
        Commands::Watch { files, .. } => cli::watch::run_watch(&config, files),
        Commands::Build { file } => cli::build::build_once(&config, file),
        Commands::Root { file } => cli::locate::print_root(&config, file),
        Commands::Forward { file, line } => cli::locate::forward(&config, file, *line),
        Commands::Inverse { root, page, x, y } => {
            cli::locate::inverse(&config, root, *page, *x, *y)
        }
    }
}
