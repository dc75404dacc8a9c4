//! Small shared helpers.

pub mod path;

pub use path::normalize_path;
