//! morphguard CLI
//!
//! Plans and applies polymorphic partition changes against a PostgreSQL
//! database. Every mutating command runs inside one transaction; `--dry-run`
//! prints the planned statements and rolls back.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use morphguard::{
    connect, Association, MayPostgresExecutor, MorphConfig, MorphExecutor, MorphManager,
    PartitionLayout, PgCatalog, Script, TopologySnapshot,
};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "morphguard")]
#[command(about = "Partition polymorphic associations in PostgreSQL")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Configuration file
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AssociationArgs {
    /// Logical table readers use (e.g. `likes`)
    #[arg(long)]
    base: String,

    /// Discriminator stem; expands to `<column>_id` / `<column>_type`
    #[arg(long)]
    column: String,

    /// Column on child tables referenced by `<column>_id`
    #[arg(long, default_value = "id")]
    referenced_column: String,
}

impl AssociationArgs {
    fn association(&self) -> Result<Association> {
        Ok(Association::new(&self.base, &self.column)?
            .with_referenced_column(&self.referenced_column)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show partitions and proxy state of an association
    Status {
        #[command(flatten)]
        association: AssociationArgs,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Register a partition for a child table
    Add {
        #[command(flatten)]
        association: AssociationArgs,

        /// Child table the new partition references
        #[arg(long)]
        child: String,

        /// Copy the partition's columns from this table (required for the first partition)
        #[arg(long)]
        like: Option<String>,

        /// Show the statements without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Unregister a partition
    Remove {
        #[command(flatten)]
        association: AssociationArgs,

        #[arg(long)]
        child: String,

        /// Also drop the partition table
        #[arg(long)]
        drop_storage: bool,

        #[arg(long)]
        dry_run: bool,
    },

    /// Replace the proxy by the sole remaining partition renamed to the base name
    Collapse {
        #[command(flatten)]
        association: AssociationArgs,

        #[arg(long)]
        dry_run: bool,
    },

    /// Drop the table of an already removed partition
    DropStorage {
        #[command(flatten)]
        association: AssociationArgs,

        #[arg(long)]
        child: String,

        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    if cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    } else if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let quiet = cli.quiet;
    match run(cli) {
        Ok(()) => {
            if !quiet {
                println!("✅ Success");
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = MorphConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let database_url = cli
        .database_url
        .clone()
        .or_else(|| std::env::var("MORPHGUARD_DATABASE_URL").ok())
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .or_else(|| config.database.url.clone())
        .context(
            "Database URL not provided. Use --database-url, set MORPHGUARD_DATABASE_URL or \
             DATABASE_URL, or set [database] url in the config file",
        )?;

    let client = connect(&database_url).context("connecting to database")?;
    let executor = MayPostgresExecutor::new(client);

    match cli.command {
        Commands::Status { association, json } => {
            let association = association.association()?;
            let snapshot = with_manager(&executor, &config, |manager| {
                Ok(manager.status(&association)?)
            })?;
            print_status(&snapshot, json)
        }
        Commands::Add {
            association,
            child,
            like,
            dry_run,
        } => {
            let association = association.association()?;
            transact(&executor, &config, dry_run, |manager| {
                let partition = manager.partition(&association, &child)?;
                let layout = like.clone().map(PartitionLayout::Like);
                Ok(if dry_run {
                    manager.plan_add_partition(&partition, layout)?
                } else {
                    manager.add_partition(&partition, layout)?
                })
            })
        }
        Commands::Remove {
            association,
            child,
            drop_storage,
            dry_run,
        } => {
            let association = association.association()?;
            transact(&executor, &config, dry_run, |manager| {
                let partition = manager.partition(&association, &child)?;
                Ok(if dry_run {
                    manager.plan_remove_partition(&partition, drop_storage)?
                } else {
                    manager.remove_partition(&partition, drop_storage)?
                })
            })
        }
        Commands::Collapse {
            association,
            dry_run,
        } => {
            let association = association.association()?;
            transact(&executor, &config, dry_run, |manager| {
                Ok(if dry_run {
                    manager.plan_collapse(&association)?
                } else {
                    manager.collapse(&association)?
                })
            })
        }
        Commands::DropStorage {
            association,
            child,
            dry_run,
        } => {
            let association = association.association()?;
            transact(&executor, &config, dry_run, |manager| {
                let partition = manager.partition(&association, &child)?;
                Ok(if dry_run {
                    manager.plan_drop_storage(&partition)
                } else {
                    manager.drop_storage(&partition)?
                })
            })
        }
    }
}

fn with_manager<T>(
    executor: &dyn MorphExecutor,
    config: &MorphConfig,
    f: impl FnOnce(&MorphManager<'_>) -> Result<T>,
) -> Result<T> {
    let catalog = PgCatalog::from_config(executor, &config.partitions)?;
    let manager = MorphManager::from_config(&catalog, &config.partitions);
    f(&manager)
}

/// Run `f` in a transaction, committing unless `dry_run` or `f` fails.
fn transact(
    executor: &MayPostgresExecutor,
    config: &MorphConfig,
    dry_run: bool,
    f: impl FnOnce(&MorphManager<'_>) -> Result<Script>,
) -> Result<()> {
    let transaction = executor.begin().context("starting transaction")?;
    let script = match with_manager(&transaction, config, f) {
        Ok(script) => script,
        Err(e) => {
            transaction.rollback().context("rolling back")?;
            return Err(e);
        }
    };

    if dry_run {
        transaction.rollback().context("rolling back dry run")?;
        print_script(&script, "Would execute");
    } else {
        transaction.commit().context("committing")?;
        print_script(&script, "Executed");
    }
    Ok(())
}

fn print_script(script: &Script, verb: &str) {
    if script.is_empty() {
        println!("Nothing to do");
        return;
    }
    println!("{} {} statement(s):", verb, script.len());
    for (i, statement) in script.iter().enumerate() {
        println!("\n-- {}. {}", i + 1, statement.kind());
        println!("{}", statement.to_sql());
    }
    println!();
}

fn print_status(snapshot: &TopologySnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let association = &snapshot.association;
    println!(
        "\n📊 {} ({}_id / {}_type)\n",
        association.base_table().bold(),
        association.discriminator(),
        association.discriminator()
    );
    println!("  Topology:       {:?}", snapshot.topology);
    println!("  Base relation:  {:?}", snapshot.base_relation);
    println!("  Source:         {:?}", snapshot.source);
    match &snapshot.trigger_function {
        Some(function) => println!("  Routing:        {}()", function),
        None => println!("  Routing:        {}", "none".dimmed()),
    }
    if snapshot.adopted {
        println!(
            "  {}",
            "⚠️  Partitions read from the trigger function; the next change writes them to the ledger"
                .yellow()
        );
    }

    println!();
    if snapshot.partitions.is_empty() {
        println!("Partitions: None");
    } else {
        println!("Partitions ({}):", snapshot.partitions.len());
        for partition in &snapshot.partitions {
            println!(
                "  ✓ {} → {} ('{}')",
                partition.child_table(),
                partition.table_name(),
                partition.type_tag()
            );
        }
    }
    Ok(())
}
