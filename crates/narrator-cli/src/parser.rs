//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Drive a virtual narrator from stdin.
///
/// Each input line is a prompt. Prefix with `!` to interrupt whatever is
/// being said, with `>` to speak the line verbatim. `/avatars` lists the
/// avatar catalog.
#[derive(Debug, Parser)]
#[command(name = "narrator")]
#[command(version, about = "Speech dispatch engine for a virtual narrator")]
pub struct Cli {
    /// JSON settings file
    #[arg(short, long, env = "NARRATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// API key for the language model provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
