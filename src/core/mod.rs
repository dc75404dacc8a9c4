//! Core types shared across the codebase.

mod state;

pub use state::{
    is_shutdown, register_server, register_shutdown, request_shutdown, setup_shutdown_handler,
};

/// Build counter of a project.
///
/// Bumped once for every completed, non-cancelled build that produced a
/// usable output artifact. Values come from one process-wide sequence, so a
/// project rediscovered after being discarded never repeats a revision.
/// `0` means "never built".
pub type Revision = u64;
