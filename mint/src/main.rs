//! Sequential task-queue runner for a command-line coding agent.
//!
//! Reads an ordered queue (`.mint/queues/<id>.json` or any JSON path) and
//! drives the configured agent through it row by row.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};

use mint::core::queue::TASK_START_ROW;
use mint::core::types::QueueProperties;
use mint::doctor::run_doctor;
use mint::exit_codes;
use mint::io::config::{MintConfig, RunSettings, load_config, write_config};
use mint::io::executor::AgentExecutor;
use mint::io::init::{MintPaths, QueueInit, init_queue};
use mint::io::queue_store::{FileQueueStore, QueueRef, QueueStore};
use mint::io::session_log::CodexSessionDir;
use mint::logging;
use mint::pipeline::{RowEvent, run_queue};

#[derive(Parser)]
#[command(
    name = "mint",
    version,
    about = "Run a queue of coding-agent tasks row by row",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Queue to run when no subcommand is given.
    queue: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Process the queue: archive approved rows, start new ones, resume ongoing ones.
    Run {
        /// Queue id or path to a queue `.json` file. Defaults to `default_queue`.
        queue: Option<String>,
    },
    /// Create or refresh a queue with the local properties and make it the default.
    Init {
        /// Queue id or path to a queue `.json` file.
        queue: String,
    },
    /// Store a local setting.
    Setup {
        target: SetupTarget,
        value: Option<String>,
    },
    /// Check config, queue, command and session directory.
    Doctor {
        /// Queue to check instead of `default_queue`.
        queue: Option<String>,
    },
    /// Print the config path, creating a default config if missing.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SetupTarget {
    Prefix,
    Command,
    #[value(alias = "auto_close")]
    AutoClose,
    Queue,
    List,
}

impl SetupTarget {
    fn config_key(self) -> &'static str {
        match self {
            SetupTarget::Prefix => "properties.prefix",
            SetupTarget::Command => "properties.command",
            SetupTarget::AutoClose => "properties.auto_close",
            SetupTarget::Queue => "default_queue",
            SetupTarget::List => "",
        }
    }
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("read current directory")?;
    match cli.command {
        None => cmd_run(&root, cli.queue),
        Some(Command::Run { queue }) => cmd_run(&root, queue),
        Some(Command::Init { queue }) => cmd_init(&root, &queue),
        Some(Command::Setup { target, value }) => cmd_setup(&root, target, value),
        Some(Command::Doctor { queue }) => Ok(cmd_doctor(&root, queue.as_deref())),
        Some(Command::Config) => cmd_config(&root),
    }
}

fn cmd_run(root: &Path, queue: Option<String>) -> Result<i32> {
    let paths = MintPaths::new(root);
    let mut cfg = load_config(&paths.config_path)?;
    let requested = queue.unwrap_or_else(|| cfg.default_queue.clone());
    if requested.trim().is_empty() {
        bail!("no queue given: use `mint run <queue>` or `mint setup queue <queue>`");
    }
    let queue = QueueRef::parse(&requested)?;
    let mut store = FileQueueStore::new(paths.queue_path(&queue));

    println!("Mint starting...");
    println!("Using queue: {}", store.path().display());

    let queue_props = store.properties()?;
    if cfg.sync_properties(&queue_props) {
        write_config(&paths.config_path, &cfg)?;
        println!("Synced queue properties into {}.", paths.config_path.display());
    }
    let settings = RunSettings::resolve(&queue_props, &cfg.properties)?;
    let session_root = cfg
        .session_root()
        .context("cannot locate agent sessions: HOME is not set and session_dir is not configured")?;

    let executor = AgentExecutor::new(CodexSessionDir::new(session_root))
        .with_timeout(cfg.timeout())
        .with_thoughts_limit(cfg.thoughts_limit_chars)
        .with_echo(cfg.echo_output);
    let summary = run_queue(&mut store, &executor, &settings, print_event)?;

    if summary.executed_rows == 0 && summary.archived_rows == 0 {
        if summary.stopped_at_row <= TASK_START_ROW {
            println!("Mint finished: no rows found (row {TASK_START_ROW} has no prompt).");
        } else {
            println!("Mint finished: no runnable rows found.");
        }
        return Ok(exit_codes::OK);
    }

    println!("Mint finished successfully.");
    println!("- Executed rows: {}", summary.executed_rows);
    println!("- Archived rows: {}", summary.archived_rows);
    Ok(exit_codes::OK)
}

fn print_event(event: &RowEvent) {
    match event {
        RowEvent::Archived { position, ticket } => {
            println!("Row {position}: Approved -> archived ({ticket}).");
        }
        RowEvent::Started { position, ticket } => {
            println!("Row {position}: New task found -> running agent ({ticket}).");
        }
        RowEvent::Resumed { position, ticket } => {
            println!("Row {position}: Ongoing -> resuming task ({ticket}).");
        }
        RowEvent::Finished {
            position,
            status,
            return_code,
        } => {
            println!("Row {position}: {status} (exit code {return_code}).");
        }
    }
}

fn cmd_init(root: &Path, queue: &str) -> Result<i32> {
    let paths = MintPaths::new(root);
    let mut cfg = load_config(&paths.config_path)?;
    let queue_ref = QueueRef::parse(queue)?;
    let path = paths.queue_path(&queue_ref);

    let properties = QueueProperties {
        prefix: cfg.properties.prefix.clone(),
        command: cfg.properties.command.clone(),
        auto_close: cfg.properties.auto_close.to_string(),
    };
    match init_queue(&path, &properties)? {
        QueueInit::Created => println!("Initialized queue: {}", path.display()),
        QueueInit::Refreshed => println!("Refreshed queue properties: {}", path.display()),
    }

    cfg.default_queue = queue.trim().to_string();
    write_config(&paths.config_path, &cfg)?;
    println!("Default queue: {queue_ref}");
    Ok(exit_codes::OK)
}

fn cmd_setup(root: &Path, target: SetupTarget, value: Option<String>) -> Result<i32> {
    if target == SetupTarget::List {
        println!("Setup targets:");
        println!("  mint setup prefix <text>");
        println!("  mint setup command <cmd>");
        println!("  mint setup auto-close <true|false>");
        println!("  mint setup queue <queue>");
        return Ok(exit_codes::OK);
    }

    let value = value.unwrap_or_default();
    let value = value.trim();
    if value.is_empty() {
        bail!("missing value for {}", target.config_key());
    }

    let paths = MintPaths::new(root);
    let mut cfg = load_config(&paths.config_path)?;
    match target {
        SetupTarget::Prefix => cfg.properties.prefix = value.to_string(),
        SetupTarget::Command => cfg.properties.command = value.to_string(),
        SetupTarget::AutoClose => {
            cfg.properties.auto_close = match value.to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => bail!("auto-close must be true or false"),
            };
        }
        SetupTarget::Queue => {
            QueueRef::parse(value)?;
            cfg.default_queue = value.to_string();
        }
        SetupTarget::List => unreachable!("handled above"),
    }
    write_config(&paths.config_path, &cfg)?;
    println!("Saved: {}", target.config_key());
    println!("Config file: {}", paths.config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_doctor(root: &Path, queue: Option<&str>) -> i32 {
    let checks = run_doctor(root, queue);
    for check in &checks {
        let icon = if check.passed { "OK" } else { "FAIL" };
        println!("[{icon}] {} - {}", check.label, check.detail);
    }
    let failures = checks.iter().filter(|check| !check.passed).count();
    if failures > 0 {
        println!("Doctor found {failures} issue(s).");
        return exit_codes::ISSUES;
    }
    println!("Doctor check passed.");
    exit_codes::OK
}

fn cmd_config(root: &Path) -> Result<i32> {
    let paths = MintPaths::new(root);
    if !paths.config_path.exists() {
        write_config(&paths.config_path, &MintConfig::default())?;
    }
    println!("{}", paths.config_path.display());
    Ok(exit_codes::OK)
}
