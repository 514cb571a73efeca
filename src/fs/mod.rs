//! Local file system side of an export
//!
//! Recreates the remote directory hierarchy under the local root.

mod mirror;

pub use mirror::*;
