#[macro_use]
extern crate prettytable;

use anyhow::{anyhow, Context};
use directories::ProjectDirs;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use structopt::StructOpt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod assistant;
mod cli;
mod interface;
mod layout;
mod model;
use crate::assistant::Assistant;
use crate::model::init_journal;
use rusqlite::Connection;

use cli::{Command::*, CommandLineArgs};

fn find_default_journal_file() -> anyhow::Result<PathBuf> {
    let base_dirs = ProjectDirs::from("com", "gozque", "daylane")
        .ok_or(anyhow!("Failed to find journal file."))?;
    let root_dir = base_dirs.data_dir();
    if !root_dir.exists() {
        std::fs::create_dir_all(root_dir).context("Failed to create directory.")?;
    }
    let mut path = PathBuf::from(root_dir);
    path.push("db.sqlite");
    Ok(path)
}

/// Get a connection to the journal database, creating its tables if they
/// do not exist.
pub fn get_journal_db(journal_path: PathBuf) -> anyhow::Result<Connection> {
    let db = Connection::open(&journal_path)
        .with_context(|| format!("Failed to open journal {}.", journal_path.display()))?;
    init_journal(&db)?;
    Ok(db)
}

/// Logs go to stderr so they never mix with the tables. RUST_LOG overrides
/// the default level.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging();

    // Get the command-line arguments.
    let CommandLineArgs {
        action,
        journal_file,
        assistant_url,
        refresh_marker,
        timeout,
    } = CommandLineArgs::from_args();

    // Unpack the journal file.
    let journal_file = match journal_file {
        Some(path) => path,
        None => find_default_journal_file()?,
    };
    debug!(journal = %journal_file.display(), "using journal");

    let database = get_journal_db(journal_file)?;

    // Perform the action.
    match action {
        Add {
            title,
            estimate,
            priority,
        } => interface::add_task(&database, title, estimate, priority),
        Done { id } => interface::done(&database, id),
        List { budget } => interface::list(&database, budget),
        Clear => interface::clear(&database),
        History { query } => interface::history(&database, query),
        Ask { stdin, prompt } => {
            let prompt = if stdin {
                let mut transcript = String::new();
                std::io::stdin()
                    .read_to_string(&mut transcript)
                    .context("Failed to read the request from standard input.")?;
                transcript
            } else {
                prompt.join(" ")
            };
            let assistant = Assistant::new(assistant_url, Duration::from_secs(timeout))
                .context("Failed to set up the assistant client.")?
                .with_refresh_marker(refresh_marker);
            interface::ask(&database, &assistant, &prompt).map(|_| ())
        }
    }?;
    Ok(())
}
