//! dbpsql CLI - example program over the dbpsql query helpers
//!
//! Startup follows the library's intended order:
//! - load the YAML config (`DATABASE_URL` overrides the DSN)
//! - apply pending migrations from the configured directory
//! - connect with bounded retry
//! - run one command against `test_table`, then close the pool

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dbpsql_core::config::DEFAULT_CONFIG_PATH;
use dbpsql_core::{apply_migrations, Config, Database, DbError, ErrorKind};
use tracing::info;

mod test_table;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "dbpsql",
    author,
    version,
    about = "Example client for the dbpsql PostgreSQL query helpers",
    long_about = "Connects to PostgreSQL with bounded retry, applies migrations, and runs \
                  named-parameter queries against the example test_table."
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "DBPSQL_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    /// Enable debug logging (includes compiled SQL)
    #[arg(long, global = true)]
    debug: bool,

    /// Do not apply migrations before running the command
    #[arg(long, global = true)]
    skip_migrations: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the example flow: list all rows, fetch id 2, check id 3
    Demo,
    /// Apply pending migrations and exit
    Migrate,
    /// List every row of test_table
    List,
    /// Show one row
    Get(IdArgs),
    /// Report whether a row exists
    Exists(IdArgs),
    /// Insert a row with a unique name and print its id
    Add(AddArgs),
    /// Change the name of a row
    Rename(RenameArgs),
    /// Delete a row
    Remove(IdArgs),
}

#[derive(Args, Debug)]
struct IdArgs {
    /// Record id
    id: i64,
}

#[derive(Args, Debug)]
struct AddArgs {
    /// Name for the new record
    name: String,
}

#[derive(Args, Debug)]
struct RenameArgs {
    /// Record id
    id: i64,

    /// New name
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry DBPSQL_CONFIG, which clap reads while parsing
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug })?;

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let migrate_only = matches!(cli.command, Commands::Migrate);
    if migrate_only || !cli.skip_migrations {
        apply_migrations(config.dsn(), config.migrations_path())
            .await
            .context("init migrations failed")?;
    }
    if migrate_only {
        return Ok(());
    }

    let db = Database::connect(config.dsn())
        .await
        .context("init db failed")?;

    let result = run(&db, cli.command).await;
    // close() logs its own failure; the command's outcome decides the exit code
    db.close().await.ok();
    result
}

async fn run(db: &Database, command: Commands) -> Result<()> {
    let mut pool = db.clone();

    match command {
        Commands::Demo => demo(db).await?,
        Commands::Migrate => {}
        Commands::List => {
            for row in test_table::list(&mut pool).await? {
                println!("{}\t{}", row.id, row.name);
            }
        }
        Commands::Get(args) => {
            let row = test_table::get(&mut pool, args.id)
                .await
                .with_context(|| format!("failed to get record {}", args.id))?;
            println!("{}\t{}", row.id, row.name);
        }
        Commands::Exists(args) => {
            report_existence(test_table::ensure_id_free(&mut pool, args.id).await)?;
        }
        Commands::Add(args) => {
            let id = test_table::add(db, &args.name)
                .await
                .with_context(|| format!("failed to add record {:?}", args.name))?;
            info!(id, name = %args.name, "record added");
            println!("{id}");
        }
        Commands::Rename(args) => {
            test_table::rename(&mut pool, args.id, &args.name)
                .await
                .with_context(|| format!("failed to rename record {}", args.id))?;
            println!("renamed {}", args.id);
        }
        Commands::Remove(args) => {
            test_table::remove(&mut pool, args.id)
                .await
                .with_context(|| format!("failed to remove record {}", args.id))?;
            println!("removed {}", args.id);
        }
    }

    Ok(())
}

fn report_existence(outcome: Result<(), DbError>) -> Result<()> {
    match outcome {
        Ok(()) => println!("Record does not exist"),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => println!("Record already exists"),
        Err(err) => return Err(err).context("existence check failed"),
    }
    Ok(())
}

async fn demo(db: &Database) -> Result<()> {
    let mut pool = db.clone();

    let all = test_table::list(&mut pool).await?;
    println!("all: {all:?}");

    let one = test_table::get(&mut pool, 2).await?;
    println!("one: {one:?}");

    report_existence(test_table::ensure_id_free(&mut pool, 3).await)?;
    println!("stopped example");
    Ok(())
}
