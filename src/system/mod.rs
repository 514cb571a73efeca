//! Host resource sampling

mod memory;

pub use memory::*;
