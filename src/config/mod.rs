//! Configuration module for orgdisk
//!
//! CLI arguments and the runtime settings of a download run.

mod settings;

pub use settings::*;
