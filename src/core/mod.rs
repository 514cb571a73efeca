//! Core export engine
//!
//! The crawler, the download scheduler and the coordinator that sequences
//! them, plus the pacing and cancellation primitives they share.

mod coordinator;
mod crawler;
mod pacer;
mod scheduler;
mod shutdown;

pub use coordinator::*;
pub use crawler::*;
pub use pacer::*;
pub use scheduler::*;
pub use shutdown::*;
