//! User-facing surfaces

pub mod cli;

pub use cli::{error_message, Args, Cli};
