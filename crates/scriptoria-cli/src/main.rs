//! scriptoria - command-line host for the annotation engine
//!
//! Imports a transcript into a session file, manages themes, applies AI assistant responses
//! (annotation suggestions, notes and storyboard orderings), prints statistics and writes
//! exports.
//!
//! # Usage
//!
//! ```bash
//! scriptoria import interview.txt -o interview.json
//! scriptoria theme add interview.json "Family History" "#ffd54f" --hotkey 1
//! scriptoria suggest interview.json response.txt
//! scriptoria order interview.json ordering.txt --replace
//! scriptoria notes interview.json notes.txt
//! scriptoria stats interview.json
//! scriptoria export interview.json --format html -o interview.html
//! ```

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scriptoria_core::Hotkey;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::commands::{ExportFormat, parse_hotkey};

#[derive(Parser)]
#[command(name = "scriptoria")]
#[command(about = "Themed annotations and storyboards over long-form text")]
#[command(version)]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level or spec, e.g. `debug` or `scriptoria_core=debug` (default: RUST_LOG or info)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a session from a text file
    Import {
        /// Source text
        text: PathBuf,

        /// Structural markers (JSON array)
        #[arg(long)]
        markers: Option<PathBuf>,

        /// Session file to create
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Manage themes
    Theme {
        #[command(subcommand)]
        command: ThemeCommands,
    },

    /// Apply annotation suggestions from an assistant response
    Suggest {
        /// Session file
        session: PathBuf,

        /// Assistant response containing [[ANNOTATION :: ...]] blocks
        response: PathBuf,

        /// Only report what would be applied
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply a storyboard ordering from an assistant response
    Order {
        /// Session file
        session: PathBuf,

        /// Assistant response with one `id :: Order#n` line per entry
        response: PathBuf,

        /// Replace the storyboard instead of moving planned entries to the end
        #[arg(long)]
        replace: bool,
    },

    /// Fill in missing notes from an assistant response
    Notes {
        /// Session file
        session: PathBuf,

        /// Assistant response containing [[NOTES :: id :: brief :: detailed]] blocks
        response: PathBuf,
    },

    /// Print storyboard statistics
    Stats {
        /// Session file
        session: PathBuf,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the annotated document or the script
    Export {
        /// Session file
        session: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "html")]
        format: ExportFormat,

        /// HTML page title
        #[arg(long)]
        title: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the annotation listing used as assistant context
    Context {
        /// Session file
        session: PathBuf,
    },

    /// Load a session and report repairs and integrity problems
    Check {
        /// Session file
        session: PathBuf,

        /// Write the repaired session back
        #[arg(long)]
        write: bool,
    },
}

#[derive(Subcommand)]
enum ThemeCommands {
    /// Add a theme
    Add {
        /// Session file
        session: PathBuf,

        /// Theme name (unique, case-insensitive)
        name: String,

        /// Display color, e.g. #ffd54f
        color: String,

        /// Hotkey: 1-9, 0, - or =
        #[arg(long, value_parser = parse_hotkey)]
        hotkey: Option<Hotkey>,
    },

    /// List themes with usage counts
    List {
        /// Session file
        session: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = logging::init(cli.log_level.as_deref())?;
    let config = config::load(cli.config.as_deref())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Import {
            text,
            markers,
            output,
        } => commands::import(&config, &text, markers.as_deref(), &output, &mut out)?,
        Commands::Theme { command } => match command {
            ThemeCommands::Add {
                session,
                name,
                color,
                hotkey,
            } => commands::theme_add(&config, &session, &name, &color, hotkey, &mut out)?,
            ThemeCommands::List { session } => commands::theme_list(&config, &session, &mut out)?,
        },
        Commands::Suggest {
            session,
            response,
            dry_run,
        } => commands::suggest(&config, &session, &response, dry_run, &mut out)?,
        Commands::Order {
            session,
            response,
            replace,
        } => commands::order(&config, &session, &response, replace, &mut out)?,
        Commands::Notes { session, response } => {
            commands::notes(&config, &session, &response, &mut out)?
        }
        Commands::Stats { session, json } => commands::stats(&config, &session, json, &mut out)?,
        Commands::Export {
            session,
            format,
            title,
            output,
        } => commands::export(
            &config,
            &session,
            format,
            title.as_deref(),
            output.as_deref(),
            &mut out,
        )?,
        Commands::Context { session } => commands::context(&config, &session, &mut out)?,
        Commands::Check { session, write } => commands::check(&config, &session, write, &mut out)?,
    }

    out.flush()?;
    Ok(())
}
