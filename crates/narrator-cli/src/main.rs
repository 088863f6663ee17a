//! CLI entry point.
//!
//! stdin: one request per line. stdout: emitted commands as JSON lines.
//! stderr: logs.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use narrator_cli::{
    Cli, CliContext, ExitReason, Input, bootstrap, load_settings, parse_line, wind_down,
};
use narrator_core::EmittedCommand;
use narrator_dispatch::{IdleScheduler, SegmentStream};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads OPENAI_API_KEY from the environment
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(cli.config.as_deref())?;
    let CliContext {
        settings,
        dispatcher,
        commands,
        avatars,
    } = bootstrap(settings, cli.api_key).await?;

    let writer = tokio::spawn(write_commands(commands));
    dispatcher.announce_config(settings.frontend_config());

    let idle = settings
        .idle
        .clone()
        .map(|idle| IdleScheduler::spawn(dispatcher.clone(), idle));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reason = ExitReason::EndOfInput;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, dropping queued requests");
                reason = ExitReason::Interrupted;
                break;
            }
        };
        let Some(line) = line else {
            debug!("stdin closed");
            break;
        };

        match parse_line(&line) {
            Some(Input::Speak(request)) => {
                tokio::spawn(report(dispatcher.dispatch(request)));
            }
            Some(Input::ListAvatars) => {
                let names = avatars.available().await;
                eprintln!("{}", names.join("\n"));
            }
            None => {}
        }
    }

    if let Some(idle) = idle {
        idle.stop().await;
    }
    let second_ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    wind_down(&dispatcher, reason, second_ctrl_c).await;
    drop(dispatcher);

    writer.await.context("Command writer task failed")??;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Log how a dispatched request ended.
async fn report(mut segments: SegmentStream) {
    let task = segments.task_id();
    let mut spoken = 0usize;
    while let Some(segment) = segments.next_segment().await {
        match segment {
            Ok(_) => spoken += 1,
            Err(e) => {
                warn!(task, error = %e, "Request failed");
                return;
            }
        }
    }
    debug!(task, segments = spoken, "Request done");
}

/// Write each command as one JSON line until the dispatcher is gone.
async fn write_commands(mut commands: mpsc::UnboundedReceiver<EmittedCommand>) -> Result<()> {
    while let Some(command) = commands.recv().await {
        let line = serde_json::to_string(&command).context("Failed to encode command")?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}").context("Failed to write to stdout")?;
        stdout.flush().context("Failed to flush stdout")?;
    }
    Ok(())
}
