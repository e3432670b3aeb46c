//! `hookgate` command-line tool.
//!
//! Offline access to the diff analyzer and to the persisted intake state:
//! inspect a patch the way a review prompt would see it, or look at and
//! clean up dedup and rate-limit entries.

#![deny(unsafe_code)]

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hookgate_core::{Clock, SystemClock};
use hookgate_patch::{PatchAnalyzer, Side, parse, prioritize, snippet_with_context, split_files};
use hookgate_settings::HookgateSettings;
use hookgate_store::StateStore;
use serde_json::json;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "hookgate", version, about = "Webhook intake state and diff analysis tools")]
struct Cli {
    /// Settings file (defaults to `$HOOKGATE_SETTINGS` or `~/.hookgate/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Diff analysis.
    Patch {
        #[command(subcommand)]
        command: PatchCommand,
    },
    /// Persisted intake state.
    State {
        #[command(subcommand)]
        command: StateCommand,
    },
    /// Effective configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum PatchCommand {
    /// Print the patch with old/new line numbers.
    Parse {
        /// Patch file, or `-` for stdin.
        file: PathBuf,
        /// Emit the line indexes as JSON instead.
        #[arg(long)]
        json: bool,
    },
    /// Fit the patch into a character budget, keeping the riskiest hunks.
    Prioritize {
        /// Patch file, or `-` for stdin.
        file: PathBuf,
        /// Budget in characters (defaults to `patch.maxChars`).
        #[arg(long)]
        max_chars: Option<usize>,
    },
    /// Print a numbered line range from one side of the patch.
    Snippet {
        /// Patch file, or `-` for stdin.
        file: PathBuf,
        /// `old` or `new`.
        #[arg(long, default_value = "new")]
        side: Side,
        /// First line of the range.
        #[arg(long)]
        start: u32,
        /// Last line of the range.
        #[arg(long)]
        end: u32,
        /// Context lines either side (defaults to `patch.snippetContextLines`).
        #[arg(long)]
        context: Option<u32>,
    },
    /// List the files in a multi-file `git diff`.
    Files {
        /// Diff file, or `-` for stdin.
        file: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum StateCommand {
    /// Entry counts per scope.
    Stats,
    /// Remove every entry in a scope.
    ClearScope {
        /// Scope name, e.g. `dedupe` or `rate-limit`.
        scope: String,
    },
    /// Remove all expired entries now.
    Purge,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the merged settings as JSON.
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(cli.settings.as_deref())?;
    hookgate_logging::init(&settings.logging.level, settings.logging.json);

    match cli.command {
        Command::Patch { command } => run_patch(command, &settings),
        Command::State { command } => run_state(command, &settings),
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn load(path: Option<&Path>) -> Result<HookgateSettings> {
    match path {
        Some(path) => hookgate_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => hookgate_settings::load_settings().context("failed to load settings"),
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        let _ = std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read patch from stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn run_patch(command: PatchCommand, settings: &HookgateSettings) -> Result<()> {
    let analyzer = PatchAnalyzer::from_settings(&settings.patch);
    match command {
        PatchCommand::Parse { file, json } => {
            let parsed = parse(&read_input(&file)?);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "oldLines": parsed.old_lines,
                        "newLines": parsed.new_lines,
                        "hunks": parsed.hunks.len(),
                    }))?
                );
            } else {
                println!("{}", parsed.annotated_diff);
            }
        }
        PatchCommand::Prioritize { file, max_chars } => {
            let raw = read_input(&file)?;
            let budget = max_chars.unwrap_or(analyzer.max_chars());
            println!("{}", prioritize(&raw, budget));
        }
        PatchCommand::Snippet {
            file,
            side,
            start,
            end,
            context,
        } => {
            let parsed = parse(&read_input(&file)?);
            let text = match context {
                Some(n) => snippet_with_context(&parsed, side, start, end, n),
                None => analyzer.snippet(&parsed, side, start, end),
            };
            println!("{text}");
        }
        PatchCommand::Files { file } => {
            for patch in split_files(&read_input(&file)?) {
                let hunks = parse(&patch.patch).hunks.len();
                println!("{}\t{hunks} hunks", patch.display_path());
            }
        }
    }
    Ok(())
}

fn run_state(command: StateCommand, settings: &HookgateSettings) -> Result<()> {
    let store = StateStore::from_settings(&settings.state);
    match command {
        StateCommand::Stats => {
            println!("{}", serde_json::to_string_pretty(&store.stats())?);
        }
        StateCommand::ClearScope { scope } => {
            store.clear_scope(&scope);
            info!(scope, backend = store.backend_name(), "scope cleared");
        }
        StateCommand::Purge => {
            let removed = store.purge_expired(SystemClock.now_ms());
            println!("{removed} expired entries removed");
        }
    }
    Ok(())
}
