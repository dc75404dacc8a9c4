//! Actor System for Watch Mode
//!
//! Message-passing concurrency between the editor, the file watcher and the
//! preview viewers:
//!
//! ```text
//! FsActor ──▶ Coordinator ──▶ BuildOrchestrator / PreviewHub / EditorRequest
//! (watch)     (triggers, builds, navigation)
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with debouncing
//! - `coordinator` - Owns project state and runs builds; wires up actors

pub mod coordinator;
pub mod fs;
pub mod messages;

pub use coordinator::{Coordinator, run_actors};
pub use fs::FsActor;
