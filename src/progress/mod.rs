//! Progress reporting
//!
//! Terminal progress bars for the crawl and download phases.

mod reporter;

pub use reporter::*;
