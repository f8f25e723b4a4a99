//! lightlog-hook: CLI hook handler for lightweight Claude Code session logs.
//!
//! Called by Claude Code hooks configured in `.claude/settings.json` for every
//! lifecycle event. Keeps a per-project session state file and rewrites a
//! human-readable JSON snapshot of the session as it progresses.
//!
//! ## Subcommands
//!
//! - `handle`: Main hook handler, reads JSON from stdin
//! - `schema`: Prints the snapshot field descriptions

mod handle;
mod logging;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "lightlog-hook")]
#[command(about = "Lightweight session logger for Claude Code hooks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a hook event (reads JSON from stdin)
    Handle,

    /// Print the snapshot schema as JSON
    Schema,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        // Always exits 0 so the host session is never blocked.
        Commands::Handle => handle::run(),
        Commands::Schema => {
            let schema = lightlog_core::snapshot::schema();
            match serde_json::to_string_pretty(&schema) {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("Failed to render schema: {}", e),
            }
        }
    }
}
