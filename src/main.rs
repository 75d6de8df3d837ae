//! CLI entry point for `mailtriage`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailtriage::config::{self, Config};
use mailtriage::model::Record;
use mailtriage::provider::gmail::GmailClient;
use mailtriage::rules::{Combinator, Predicate, RuleDocument};
use mailtriage::store::{summary, FileStore, RecordStore};
use mailtriage::sync::{self, SyncOptions, SyncReport};
use mailtriage::triage::{self, Dispatcher, RunReport};

#[derive(Parser)]
#[command(
    name = "mailtriage",
    version,
    about = "Fetch Gmail messages into a local store and apply rule-driven actions to them"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,

    /// Configuration file (default: $MAILTRIAGE_CONFIG or the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Rule document to apply
    #[arg(long, global = true, value_name = "PATH")]
    rules: Option<PathBuf>,

    /// Record store file
    #[arg(long, global = true, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Args)]
struct RunArgs {
    /// Clear the store and reload it from the mailbox
    #[arg(long)]
    reload: bool,

    /// Do not fetch new messages into an existing store
    #[arg(long)]
    no_update: bool,

    /// Evaluate rules but do not change anything in the mailbox
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync the store and apply the rule document (default)
    Run(RunArgs),
    /// Only sync the store from the mailbox
    Sync {
        /// Clear the store and reload it from the mailbox
        #[arg(long)]
        reload: bool,
        #[arg(long)]
        json: bool,
    },
    /// Validate a rule document and print what it does
    Check {
        /// Rule document (default: --rules or the configured path)
        #[arg(value_name = "RULES")]
        path: Option<PathBuf>,
    },
    /// List stored records
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show store statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(path) = cli.rules.clone() {
        config.rules.path = path;
    }
    if let Some(path) = cli.store.clone() {
        config.store.path = Some(path);
    }

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        None => cmd_run(&config, &cli.run),
        Some(Commands::Run(args)) => cmd_run(&config, &args),
        Some(Commands::Sync { reload, json }) => cmd_sync(&config, reload, json),
        Some(Commands::Check { path }) => {
            cmd_check(path.as_deref().unwrap_or(config.rules.path.as_path()))
        }
        Some(Commands::List { json }) => cmd_list(&config, json),
        Some(Commands::Stats { json }) => cmd_stats(&config, json),
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_default();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailtriage.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailtriage", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Sync, then evaluate every stored record and apply the actions.
fn cmd_run(config: &Config, args: &RunArgs) -> anyhow::Result<()> {
    // Fail on a bad rule document before touching the mailbox.
    let document = load_rules(&config.rules.path)?;

    let client = GmailClient::connect(&config.gmail).context("Gmail authentication failed")?;
    let mut store = open_store(config)?;

    let options = SyncOptions {
        reload: args.reload || config.sync.reload,
        update: config.sync.update && !args.no_update,
        limit: config.sync.limit,
    };
    let sync_report = sync_with_progress(&client, &mut store, &options)?;

    let records = store.all();
    let now = Utc::now();
    let report = if args.dry_run {
        triage::preview(&records, &document, now)
    } else {
        let mut dispatcher = Dispatcher::new(&client);
        triage::run(&records, &document, &mut dispatcher, now)
    };

    if args.json {
        let value = serde_json::json!({
            "dry_run": args.dry_run,
            "sync": sync_report,
            "run": report,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_sync_table(&sync_report);
        print_run_table(&report, args.dry_run);
    }
    Ok(())
}

/// Only bring the store up to date.
fn cmd_sync(config: &Config, reload: bool, json: bool) -> anyhow::Result<()> {
    let client = GmailClient::connect(&config.gmail).context("Gmail authentication failed")?;
    let mut store = open_store(config)?;
    let options = SyncOptions {
        reload: reload || config.sync.reload,
        // An explicit sync always updates.
        update: true,
        limit: config.sync.limit,
    };
    let report = sync_with_progress(&client, &mut store, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_sync_table(&report);
    }
    Ok(())
}

/// Validate a rule document and describe it.
fn cmd_check(path: &Path) -> anyhow::Result<()> {
    let document = load_rules(path)?;

    let combinator = match document.combinator {
        Combinator::All => "all",
        Combinator::Any => "any",
    };
    println!();
    println!("  {:<20} {}", "Rule document", path.display());
    println!(
        "  {:<20} {} of {} clause(s)",
        "Match when",
        combinator,
        document.rules.len()
    );
    for clause in &document.rules {
        let name = clause.name.as_deref().unwrap_or("-");
        let operand = match &clause.predicate {
            Predicate::Contains(v)
            | Predicate::NotContains(v)
            | Predicate::Equals(v)
            | Predicate::NotEquals(v) => format!("\"{v}\""),
            Predicate::LessThan(i)
            | Predicate::GreaterThan(i) => i.to_string(),
            Predicate::Unsupported { .. } => "(never matches)".to_string(),
        };
        println!(
            "    {:<16} {:<10} {:<13} {}",
            name,
            clause.field.name(),
            clause.predicate.name(),
            operand
        );
    }
    println!("  {:<20} {}", "Actions", document.actions.len());
    for action in &document.actions {
        println!("    {action}");
    }
    println!();
    Ok(())
}

/// Print stored records.
fn cmd_list(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let records = store.all();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records in {}", config::store_path(config).display());
        return Ok(());
    }
    println!("{:<18} {:<17} {:<30} Subject", "Id", "Date", "From");
    println!("{}", "-".repeat(100));
    for record in &records {
        println!(
            "{:<18} {:<17} {:<30} {}",
            truncate(&record.id, 18),
            short_date(record),
            truncate(&record.from_mail, 30),
            truncate(&record.subject, 60)
        );
    }
    println!("\n{} record(s)", records.len());
    Ok(())
}

/// Show record count, date range and top senders of the store.
fn cmd_stats(config: &Config, json: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let path = config::store_path(config);
    let start = Instant::now();
    let store = open_store(config)?;
    let elapsed = start.elapsed();
    let records = store.all();
    let file_size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    let range = summary::date_range(&records);
    let unparseable = summary::count_unparseable_dates(&records);
    let top = summary::top_senders(&records, 10);

    if json {
        let value = serde_json::json!({
            "store": path.display().to_string(),
            "store_size": file_size,
            "records": records.len(),
            "date_range": range.map(|(min, max)| serde_json::json!({
                "oldest": min.to_rfc3339(),
                "newest": max.to_rfc3339(),
            })),
            "unparseable_dates": unparseable,
            "top_senders": top.iter().map(|(sender, count)| serde_json::json!({
                "sender": sender,
                "count": count,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "Store", path.display());
    println!("  {:<20} {}", "Store size", format_size(file_size, BINARY));
    println!("  {:<20} {}", "Records", records.len());
    if let Some((min, max)) = range {
        println!(
            "  {:<20} {} to {}",
            "Date range",
            min.format("%Y-%m-%d"),
            max.format("%Y-%m-%d")
        );
    }
    if unparseable > 0 {
        println!("  {:<20} {}", "Unparseable dates", unparseable);
    }
    println!("  {:<20} {:.2?}", "Load time", elapsed);

    if !top.is_empty() {
        println!();
        println!("  Top senders:");
        for (sender, count) in &top {
            println!("    {count:>6}  {sender}");
        }
    }
    println!();
    Ok(())
}

fn load_rules(path: &Path) -> anyhow::Result<RuleDocument> {
    RuleDocument::load(path).with_context(|| format!("Invalid rule document {}", path.display()))
}

fn open_store(config: &Config) -> anyhow::Result<FileStore> {
    let path = config::store_path(config);
    FileStore::open(&path).with_context(|| format!("Cannot open record store {}", path.display()))
}

fn sync_with_progress(
    client: &GmailClient,
    store: &mut FileStore,
    options: &SyncOptions,
) -> anyhow::Result<SyncReport> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Fetching [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );

    let report = sync::sync(
        client,
        store,
        options,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    );
    pb.finish_and_clear();
    Ok(report?)
}

fn print_sync_table(report: &SyncReport) {
    println!();
    println!("  {:<20} {}", "Sync mode", report.mode);
    println!("  {:<20} {}", "Listed", report.listed);
    println!("  {:<20} {}", "Inserted", report.inserted);
    if report.duplicates > 0 {
        println!("  {:<20} {}", "Already stored", report.duplicates);
    }
    if report.older > 0 {
        println!("  {:<20} {}", "Not newer", report.older);
    }
    if report.failed > 0 {
        println!("  {:<20} {}", "Failed", report.failed);
    }
}

fn print_run_table(report: &RunReport, dry_run: bool) {
    println!();
    if dry_run {
        println!("  Dry run: no actions were applied.");
    }
    println!("  {:<20} {}", "Processed", report.processed);
    println!("  {:<20} {}", "Matched", report.matched);
    println!("  {:<20} {}", "Skipped", report.skipped);
    println!("  {:<20} {}", "Actions applied", report.actions_applied);
    if report.actions_skipped > 0 {
        println!("  {:<20} {}", "Actions skipped", report.actions_skipped);
    }
    println!("  {:<20} {}", "Errors", report.errors.len());
    for failure in &report.errors {
        let what = failure.action.as_deref().unwrap_or("evaluate");
        println!("    {:<18} {:<16} {}", failure.record_id, what, failure.reason);
    }
    if dry_run && !report.matched_ids.is_empty() {
        println!();
        println!("  Would act on:");
        for id in &report.matched_ids {
            println!("    {id}");
        }
    }
    println!();
}

fn short_date(record: &Record) -> String {
    match record.parsed_date() {
        Ok(date) => date.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => truncate(&record.date, 17),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
