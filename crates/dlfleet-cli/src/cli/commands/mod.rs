//! CLI command handlers, one per file.

mod fetch;
mod serve;

pub use fetch::run_fetch;
pub use serve::run_serve;
