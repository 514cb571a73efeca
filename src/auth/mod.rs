//! Authentication module
//!
//! Exchanges the organization's service credentials for per-user access
//! tokens.

mod token;

pub use token::*;
