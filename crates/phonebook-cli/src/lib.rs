//! One-off phonebook command line: list every stored contact, or add one.
//!
//! ```text
//! phonebook <password>                      # list
//! phonebook <password> "Ada Lovelace" 39-44-5323523   # add
//! ```

use std::io::Write;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use phonebook_core::{ContactRepository, NewContact};
use phonebook_store_sqlite::{ConnectionString, SqliteContactStore};
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub const USAGE: &str = "Usage for listing:  phonebook <password>\n\
Usage for adding:   phonebook <password> \"Name\" 040-1234567";

const ARITY_ERROR: &str = "Both name and number are required when adding a new entry.\n\
Example: phonebook <password> \"Ada Lovelace\" 39-44-5323523";

#[derive(Debug, Parser)]
#[command(name = "phonebook")]
#[command(about = "List or add phonebook entries directly in the store")]
#[command(after_help = USAGE)]
pub struct Cli {
    /// Store password, substituted into the connection string.
    password: String,
    name: Option<String>,
    number: Option<String>,

    /// Full connection string; assembled from the DB_* settings when absent.
    #[arg(long, env = "PHONEBOOK_DATABASE_URL")]
    database_url: Option<String>,
    #[arg(long, env = "DB_USER", default_value = "phonebook")]
    db_user: String,
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    db_host: String,
    #[arg(long, env = "DB_NAME", default_value = "phonebook")]
    db_name: String,
    #[arg(long, env = "DB_APPNAME", default_value = "PhonebookApp")]
    db_app_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedCommand {
    List,
    Add(NewContact),
}

impl Cli {
    /// Resolves the positional arguments into a command.
    ///
    /// # Errors
    /// Fails with the usage message when only one of name and number is given.
    pub fn command(&self) -> Result<SeedCommand> {
        match (&self.name, &self.number) {
            (None, None) => Ok(SeedCommand::List),
            (Some(name), Some(number)) => Ok(SeedCommand::Add(NewContact::new(name, number))),
            _ => Err(anyhow!(ARITY_ERROR)),
        }
    }

    /// # Errors
    /// Fails when the provided or assembled connection string does not parse.
    pub fn connection_string(&self) -> Result<ConnectionString> {
        match &self.database_url {
            Some(raw) => ConnectionString::with_password(raw, &self.password),
            None => ConnectionString::assemble(
                &self.db_user,
                &self.password,
                &self.db_host,
                &self.db_name,
                &self.db_app_name,
            ),
        }
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Parses arguments, opens the store, runs the command, and closes the store
/// whether or not the command succeeded.
///
/// # Errors
/// Returns usage, connection, validation, and storage failures.
pub fn run_cli(cli: &Cli) -> Result<()> {
    let command = cli.command()?;
    let connection = cli.connection_string()?;

    let store = SqliteContactStore::open(&connection)?;
    let result = store
        .migrate()
        .and_then(|()| run_command(&command, &store, &mut std::io::stdout().lock()));
    let closed = store.close();

    result?;
    closed
}

/// # Errors
/// Returns storage failures, and validation or duplicate-name failures on add.
pub fn run_command(
    command: &SeedCommand,
    contacts: &dyn ContactRepository,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        SeedCommand::List => {
            let all = contacts.list().context("Error listing persons")?;
            writeln!(out, "phonebook:")?;
            for contact in &all {
                writeln!(out, "{} {}", contact.name, contact.number)?;
            }
            debug!(count = all.len(), "listed persons");
        }
        SeedCommand::Add(input) => {
            let contact = contacts.create(input).context("Error adding person")?;
            writeln!(out, "added {} number {} to phonebook", contact.name, contact.number)?;
        }
    }
    Ok(())
}
