//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// texwatch: rebuild LaTeX projects on change and keep previews in sync
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (searched upward from the current directory)
    #[arg(short = 'C', long, global = true, default_value = "texwatch.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Print debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Recipe to build with (overrides `[build] recipe`)
    #[arg(short, long, global = true)]
    pub recipe: Option<String>,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch projects, rebuild on change and serve previews
    ///
    /// Editor events are read from stdin as JSON lines; navigation and build
    /// status requests are written to stdout as JSON lines.
    #[command(visible_alias = "w")]
    Watch {
        /// Documents to open right away (as if the editor opened them)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        files: Vec<PathBuf>,

        /// HTTP port of the preview server
        #[arg(short, long)]
        port: Option<u16>,

        /// WebSocket port of the preview server
        #[arg(long)]
        ws_port: Option<u16>,

        /// Debounce interval for change-driven builds, in milliseconds
        #[arg(short, long)]
        debounce: Option<u64>,

        /// Do not start the preview servers
        #[arg(long)]
        no_preview: bool,
    },

    /// Build the project containing a document once
    #[command(visible_alias = "b")]
    Build {
        /// Any document of the project
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Print the root document of a file
    Root {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
    },

    /// Map a source line to an output position
    Forward {
        #[arg(value_hint = clap::ValueHint::FilePath)]
        file: PathBuf,
        /// 1-based source line
        line: u32,
    },

    /// Map an output position back to a source line
    Inverse {
        /// Root document of the project
        #[arg(value_hint = clap::ValueHint::FilePath)]
        root: PathBuf,
        /// 1-based page
        page: u32,
        /// Horizontal position in PDF points from the left edge
        x: f64,
        /// Vertical position in PDF points from the top edge
        y: f64,
    },
}
