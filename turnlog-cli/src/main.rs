//! Turnlog CLI
//!
//! Drives the Gemini turn recorder from the command line.
//!
//! Usage from workspace root:
//!   cargo run --bin turnlog -- replay turnlog-cli/scenarios/new_chat.json
//!   cargo run --bin turnlog -- replay scenario.json --history history.json
//!   cargo run --bin turnlog -- history history.json

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use turnlog_recorder::{
    history::load_history_file, logging::init_tracing, HistoryRecord, HistoryStore,
    JsonFileHistoryStore, JsonFileSettingsStore, MemoryHistoryStore, MemorySettingsStore,
    RecorderConfig, SettingsStore,
};

mod scenario;

use scenario::{replay, Scenario};

#[derive(Parser)]
#[command(name = "turnlog")]
#[command(about = "📝 Turnlog CLI - Gemini conversation turn recorder")]
#[command(
    long_about = "Turnlog CLI replays scripted page sessions through the turn recorder and inspects the history it writes."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Scenario JSON: initial page plus the steps to drive it through
    scenario: PathBuf,

    /// Append captured turns to this history file instead of memory
    #[clap(long)]
    history: Option<PathBuf>,

    /// Settings file backing the log configuration
    #[clap(long, env = "TURNLOG_SETTINGS")]
    settings: Option<PathBuf>,

    /// Recorder config JSON (timeouts, prefix lengths)
    #[clap(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct HistoryArgs {
    /// History file written by `replay --history`
    file: PathBuf,

    /// Print raw JSON instead of a summary
    #[clap(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario and print the captured history as JSON
    Replay(ReplayArgs),
    /// Show a persisted history file
    History(HistoryArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let cli = Cli::parse();
    match cli.command {
        Commands::Replay(args) => run_replay(args).await,
        Commands::History(args) => show_history(args),
    }
}

async fn run_replay(args: ReplayArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => RecorderConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RecorderConfig::default(),
    };
    let scenario = Scenario::from_file(&args.scenario)?;

    // The watcher must outlive the replay for external edits to be seen.
    let mut _watcher = None;
    let settings: Arc<dyn SettingsStore> = match &args.settings {
        Some(path) => {
            let store = JsonFileSettingsStore::open(path)
                .with_context(|| format!("Failed to open settings {}", path.display()))?;
            _watcher = Some(store.watch().context("Failed to watch settings file")?);
            Arc::new(store)
        }
        None => Arc::new(MemorySettingsStore::new()),
    };

    let history: Arc<dyn HistoryStore> = match &args.history {
        Some(path) => Arc::new(
            JsonFileHistoryStore::open(path)
                .with_context(|| format!("Failed to open history {}", path.display()))?,
        ),
        None => Arc::new(MemoryHistoryStore::new()),
    };

    eprintln!("🔄 Replaying {}...", args.scenario.display());
    let report = replay(scenario, config, settings, history).await?;

    for response in &report.responses {
        eprintln!("💬 {}", serde_json::to_string(response)?);
    }
    println!("{}", serde_json::to_string_pretty(&report.records)?);

    match &args.history {
        Some(path) => eprintln!(
            "✅ Captured {} turn(s), appended to {}",
            report.records.len(),
            path.display()
        ),
        None => eprintln!("✅ Captured {} turn(s)", report.records.len()),
    }
    Ok(())
}

fn show_history(args: HistoryArgs) -> Result<()> {
    let records = load_history_file(&args.file)
        .with_context(|| format!("Failed to read history {}", args.file.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No turns recorded".yellow());
        return Ok(());
    }
    for record in &records {
        print_record(record);
    }
    println!("{} {}", "Total:".bold(), records.len());
    Ok(())
}

fn print_record(record: &HistoryRecord) {
    let kind = if record.is_new_chat {
        "NEW".green().bold()
    } else {
        "CONT".cyan().bold()
    };
    println!("{} {} {}", kind, record.timestamp.dimmed(), record.title.bold());
    println!("   🔗 {}", record.url);
    println!(
        "   👤 {} <{}>  🤖 {}",
        record.account_name, record.account_email, record.model_name
    );
    if let Some(plan) = &record.gemini_plan {
        println!("   💳 {plan}");
    }
    if let Some(gem) = &record.gem {
        println!("   💎 {} ({})", gem.name.as_deref().unwrap_or("Gem"), gem.id);
    }
    if !record.attached_files.is_empty() {
        println!("   📎 {}", record.attached_files.join(", "));
    }
    for line in record.prompt.lines() {
        println!("   │ {line}");
    }
    println!();
}
