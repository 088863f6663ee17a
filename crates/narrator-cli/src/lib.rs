//! Command-line driver for narrator.
//!
//! The binary reads one request per stdin line and writes the dispatcher's
//! command stream to stdout as JSON lines. Logs go to stderr.

pub mod bootstrap;
pub mod config;
pub mod input;
pub mod parser;
pub mod shutdown;

pub use bootstrap::{CliContext, bootstrap};
pub use config::load_settings;
pub use input::{Input, parse_line};
pub use parser::Cli;
pub use shutdown::{ExitReason, wind_down};
