//! CLI driver over a JSON document fixture.
//!
//! # Responsibility
//! - Verify `fretboard_core` linkage with a deterministic health check.
//! - Run timeline commands and bridge sessions against an in-memory store
//!   loaded from (and saved back to) a JSON file.

use clap::{Args, Parser, Subcommand};
use fretboard_core::bridge::messages::ItemState;
use fretboard_core::db::open_db;
use fretboard_core::timeline::{CascadeReport, TimelineResult};
use fretboard_core::{
    default_log_level, init_logging, BridgeHost, CascadeEngine, EngineConfig,
    InMemoryDocumentStore, NameMatch, ParameterSchema, TimelineTree,
};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "fretboard_cli")]
#[command(about = "Drive the fretboard sync engine against a JSON document")]
#[command(version)]
struct Cli {
    /// Command to run; `ping` when omitted.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the core linkage check
    Ping,
    /// Print timeline counts
    Summary { document: PathBuf },
    /// Print the timeline tree
    Items { document: PathBuf },
    /// Resolve items by name
    Find(ItemArgs),
    /// Resolve items by case-insensitive regex
    FindPattern(PatternArgs),
    /// Print one item's state by exact name
    State { document: PathBuf, name: String },
    /// Suppress one item
    Suppress(ItemArgs),
    /// Unsuppress one item
    Unsuppress(ItemArgs),
    /// Flip one item's flag
    Toggle(ItemArgs),
    /// Suppress a group and its contents
    SuppressGroup(GroupArgs),
    /// Unsuppress a group and its contents
    UnsuppressGroup(GroupArgs),
    /// Suppress every item matching a regex
    SuppressPattern(PatternArgs),
    /// Unsuppress every item matching a regex
    UnsuppressPattern(PatternArgs),
    /// Serve newline-delimited envelopes from stdin
    Bridge { document: PathBuf, schema: PathBuf },
}

#[derive(Args, Debug)]
struct ItemArgs {
    document: PathBuf,
    name: String,
    /// Match a case-insensitive substring instead of the exact name
    #[arg(long)]
    contains: bool,
}

impl ItemArgs {
    fn matching(&self) -> NameMatch {
        if self.contains {
            NameMatch::Contains
        } else {
            NameMatch::Exact
        }
    }
}

#[derive(Args, Debug)]
struct GroupArgs {
    document: PathBuf,
    group: String,
    /// Leave the group's own flag untouched
    #[arg(long)]
    contents_only: bool,
}

#[derive(Args, Debug)]
struct PatternArgs {
    document: PathBuf,
    pattern: String,
}

fn main() -> ExitCode {
    if let Ok(dir) = std::env::var("FRETBOARD_LOG_DIR") {
        if let Err(err) = init_logging(default_log_level(), &dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let cli = Cli::parse();
    match run(cli.command.unwrap_or(Command::Ping)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Ping => {
            println!("fretboard_core ping={}", fretboard_core::ping());
            println!("fretboard_core version={}", fretboard_core::core_version());
            Ok(())
        }
        Command::Summary { document } => print_json(&load_tree(&document)?.summarize()),
        Command::Items { document } => {
            let tree = load_tree(&document)?;
            print_json(&fretboard_core::timeline::codec::encode_items(tree.items()))
        }
        Command::Find(args) => {
            let tree = load_tree(&args.document)?;
            print_json(&tree.find_by_name(&args.name, !args.contains))
        }
        Command::FindPattern(args) => {
            let matches = load_tree(&args.document)?
                .find_by_pattern(&args.pattern)
                .map_err(|err| err.to_string())?;
            print_json(&matches)
        }
        Command::State { document, name } => {
            let tree = load_tree(&document)?;
            print_json(&ItemState::from_lookup(&name, tree.get(&name)))
        }
        Command::Suppress(args) => {
            let matching = args.matching();
            cascade(&args.document, |engine| engine.suppress(&args.name, matching))
        }
        Command::Unsuppress(args) => {
            let matching = args.matching();
            cascade(&args.document, |engine| engine.unsuppress(&args.name, matching))
        }
        Command::Toggle(args) => {
            let matching = args.matching();
            cascade(&args.document, |engine| engine.toggle(&args.name, matching))
        }
        Command::SuppressGroup(args) => cascade(&args.document, |engine| {
            if args.contents_only {
                engine.suppress_group_contents(&args.group)
            } else {
                engine.suppress_group_with_contents(&args.group)
            }
        }),
        Command::UnsuppressGroup(args) => cascade(&args.document, |engine| {
            if args.contents_only {
                engine.unsuppress_group_contents(&args.group)
            } else {
                engine.unsuppress_group_with_contents(&args.group)
            }
        }),
        Command::SuppressPattern(args) => cascade(&args.document, |engine| {
            engine.suppress_by_pattern(&args.pattern)
        }),
        Command::UnsuppressPattern(args) => cascade(&args.document, |engine| {
            engine.unsuppress_by_pattern(&args.pattern)
        }),
        Command::Bridge { document, schema } => run_bridge(&document, &schema),
    }
}

/// Runs one cascade operation and saves the document back.
fn cascade<F>(document: &Path, operation: F) -> Result<(), String>
where
    F: FnOnce(&mut CascadeEngine<'_, InMemoryDocumentStore>) -> TimelineResult<CascadeReport>,
{
    let mut store = load_document(document)?;
    let outcome = operation(&mut CascadeEngine::new(&mut store));
    // Partial batches have already written their successes.
    save_document(document, &store)?;
    let report = outcome.map_err(|err| err.to_string())?;
    print_json(&json!({
        "affected": report.affected,
        "newState": report.new_state,
        "failed": report
            .failures
            .iter()
            .map(|failure| failure.name.as_str())
            .collect::<Vec<_>>(),
    }))
}

/// Serves newline-delimited envelopes from stdin until EOF.
fn run_bridge(document: &Path, schema: &Path) -> Result<(), String> {
    let store = load_document(document)?;
    let raw_schema =
        std::fs::read_to_string(schema).map_err(|err| format!("{}: {err}", schema.display()))?;
    let schema = ParameterSchema::from_json(&raw_schema).map_err(|err| err.to_string())?;
    let config = EngineConfig::from_env().map_err(|err| err.to_string())?;
    let conn = open_db(template_db_path()).map_err(|err| err.to_string())?;
    let mut host = BridgeHost::new(store, schema, config).with_templates(conn);

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.map_err(|err| err.to_string())?;
        if line.trim().is_empty() {
            continue;
        }
        for message in host.handle_json(&line) {
            let encoded = message.to_json().map_err(|err| err.to_string())?;
            writeln!(stdout, "{encoded}").map_err(|err| err.to_string())?;
        }
        stdout.flush().map_err(|err| err.to_string())?;
    }

    save_document(document, host.store())
}

fn load_document(path: &Path) -> Result<InMemoryDocumentStore, String> {
    let raw = std::fs::read_to_string(path).map_err(|err| format!("{}: {err}", path.display()))?;
    InMemoryDocumentStore::from_json(&raw).map_err(|err| format!("{}: {err}", path.display()))
}

fn load_tree(path: &Path) -> Result<TimelineTree, String> {
    TimelineTree::load(&load_document(path)?).map_err(|err| err.to_string())
}

fn save_document(path: &Path, store: &InMemoryDocumentStore) -> Result<(), String> {
    if store.writes().is_empty() {
        return Ok(());
    }
    let raw = store.to_json().map_err(|err| err.to_string())?;
    std::fs::write(path, raw).map_err(|err| format!("{}: {err}", path.display()))
}

fn template_db_path() -> PathBuf {
    match std::env::var("FRETBOARD_DB_PATH") {
        Ok(raw) if !raw.trim().is_empty() => PathBuf::from(raw.trim()),
        _ => std::env::temp_dir().join("fretboard_templates.sqlite3"),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let encoded = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
    println!("{encoded}");
    Ok(())
}
