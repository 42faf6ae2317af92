//! Filesystem sandboxing for loomterm's file tools.
//!
//! Every path a tool touches goes through [`PathPolicy::resolve`]: relative
//! paths are anchored at the workspace root, `..` is folded, symlinks are
//! resolved, and forbidden locations are rejected.

pub mod path;

pub use path::{PathPolicy, PathValidationError, validate_path};
