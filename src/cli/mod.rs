//! CLI definitions and runtime wiring.
//!
//! The commands are thin wrappers: they parse arguments, call mutation
//! primitives on the store, mark the sync controller dirty, and read
//! entities back for display. The sync engine lives in [`crate::sync`].

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::{self, ConfigPaths};
use crate::error::{BeadworkError, Result};
use crate::storage::SqliteStorage;
use crate::sync::flush::{SyncController, FLUSH_DEBOUNCE};

pub mod commands;

/// bd - dependency-aware issue tracker.
///
/// Issues chained together like beads: a lightweight tracker with
/// first-class dependency support and a git-friendly JSONL journal.
#[derive(Parser, Debug)]
#[command(name = "bd", version, about = "Dependency-aware issue tracker")]
pub struct Cli {
    /// Database path (default: auto-discover .beads/ or ~/.beads/default.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Actor name for the audit trail (default: $BD_ACTOR or $USER)
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable the automatic journal flush after mutations
    #[arg(long, global = true)]
    pub no_auto_flush: bool,

    /// Disable the hash-gated journal import on startup
    #[arg(long, global = true)]
    pub no_auto_import: bool,

    /// Verbose diagnostics
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a beads workspace in the current directory
    Init {
        /// Issue ID prefix for this workspace
        #[arg(long, default_value = "bd")]
        prefix: String,
    },
    /// Create a new issue
    Create(commands::create::CreateArgs),
    /// Show issue details
    Show {
        /// Issue ID
        id: String,
    },
    /// Update an issue
    Update(commands::update::UpdateArgs),
    /// Close one or more issues
    Close {
        /// Issue IDs
        #[arg(required = true)]
        ids: Vec<String>,
        /// Reason for closing
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Delete an issue (removed from the journal on next flush)
    Delete {
        /// Issue ID
        id: String,
    },
    /// List issues, optionally filtered
    List(commands::list::ListArgs),
    /// Manage dependencies
    Dep {
        #[command(subcommand)]
        command: commands::dep::DepCommand,
    },
    /// Manage labels
    Label {
        #[command(subcommand)]
        command: commands::label::LabelCommand,
    },
    /// Import the journal into the database
    Import {
        /// Journal path (default: the workspace journal)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Export the database to the journal
    Export {
        /// Journal path (default: the workspace journal)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Everything a command needs: the shared store, the sync controller, and
/// resolved identity/paths.
pub struct CommandContext {
    pub store: Arc<Mutex<SqliteStorage>>,
    pub controller: SyncController,
    pub paths: ConfigPaths,
    pub actor: String,
    pub json: bool,
}

impl CommandContext {
    /// Run a closure against the locked store.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut SqliteStorage) -> Result<R>) -> Result<R> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| BeadworkError::Config("store mutex poisoned".to_string()))?;
        f(&mut store)
    }
}

/// Parse arguments, wire up the runtime, and dispatch the command.
///
/// # Errors
///
/// Returns the command's error after the sync controller has shut down
/// (final flush included), so the exit path never loses dirty state.
pub fn run(cli: Cli) -> Result<()> {
    // Init works before any discovery.
    if let Commands::Init { ref prefix } = cli.command {
        return commands::init::execute(prefix);
    }

    let paths = resolve_paths(&cli)?;
    std::fs::create_dir_all(&paths.beads_dir)?;

    let mut storage = SqliteStorage::open(&paths.db_path)?;
    let actor = config::resolve_actor(cli.actor.as_deref());

    crate::sync::check_version(&mut storage, env!("CARGO_PKG_VERSION"));

    // Hash-gated import, unless suppressed or the user is importing anyway.
    if !cli.no_auto_import && !matches!(cli.command, Commands::Import { .. }) {
        crate::sync::auto_import(&mut storage, &paths.journal_path);
    }

    let store = Arc::new(Mutex::new(storage));
    let controller = SyncController::new(
        Arc::clone(&store),
        paths.journal_path.clone(),
        FLUSH_DEBOUNCE,
        !cli.no_auto_flush,
    );

    let mut ctx = CommandContext {
        store,
        controller,
        paths,
        actor,
        json: cli.json,
    };

    let result = dispatch(cli.command, &mut ctx);

    // Final synchronous flush before the store handle goes away.
    ctx.controller.shutdown();

    result
}

fn dispatch(command: Commands, ctx: &mut CommandContext) -> Result<()> {
    match command {
        Commands::Init { .. } => unreachable!("handled before runtime wiring"),
        Commands::Create(args) => commands::create::execute(&args, ctx),
        Commands::Show { id } => commands::show::execute(&id, ctx),
        Commands::Update(args) => commands::update::execute(&args, ctx),
        Commands::Close { ids, reason } => {
            commands::close::execute(&ids, reason.as_deref(), ctx)
        }
        Commands::Delete { id } => commands::delete::execute(&id, ctx),
        Commands::List(args) => commands::list::execute(&args, ctx),
        Commands::Dep { command } => commands::dep::execute(&command, ctx),
        Commands::Label { command } => commands::label::execute(&command, ctx),
        Commands::Import { input } => commands::import::execute(input.as_deref(), ctx),
        Commands::Export { output } => commands::export::execute(output.as_deref(), ctx),
    }
}

fn resolve_paths(cli: &Cli) -> Result<ConfigPaths> {
    match config::discover_beads_dir(None) {
        Ok(beads_dir) => ConfigPaths::resolve(&beads_dir, cli.db.as_deref()),
        Err(BeadworkError::NotInitialized) => {
            if let Some(ref db) = cli.db {
                let beads_dir = db
                    .parent()
                    .map_or_else(|| PathBuf::from("."), PathBuf::from);
                Ok(ConfigPaths {
                    beads_dir,
                    db_path: db.clone(),
                    journal_path: db.with_extension("jsonl"),
                    prefix: "bd".to_string(),
                })
            } else {
                config::home_fallback_paths()
            }
        }
        Err(e) => Err(e),
    }
}
