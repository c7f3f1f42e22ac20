//! shardstore Inspector
//!
//! Read-only look into a filesystem store. The store is opened without
//! recovery, so an interrupted publish is reported and left for the next
//! writer to roll forward.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use shardstore::{AccessMode, BinaryCollection, Config, Database, Key};
use tracing_subscriber::{fmt, EnvFilter};

/// shardstore inspector
#[derive(Parser, Debug)]
#[command(name = "shardstore-inspect")]
#[command(about = "Inspect the files and collections of a shardstore directory")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./shardstore_data")]
    data_dir: String,

    /// Read cache page size in bytes
    #[arg(short, long, default_value = "4096")]
    page_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List published keys
    Keys,

    /// Print file length and, if it holds a collection, its element count
    Stat {
        /// Key as category/high.low (hex)
        key: String,
    },

    /// Print every element of the collection stored at a key, in hex
    Dump {
        /// Key as category/high.low (hex)
        key: String,

        /// Stop after this many elements
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check that the collection stored at a key is intact and sorted
    Verify {
        /// Key as category/high.low (hex)
        key: String,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,shardstore=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> shardstore::Result<()> {
    let config = Config::builder()
        .filesystem(&args.data_dir)
        .page_size(args.page_size)
        .sync_on_publish(false)
        .read_only(true)
        .build();

    let db = Database::open(config)?;
    db.start()?;
    tracing::debug!("Inspecting {} (shardstore v{})", args.data_dir, shardstore::VERSION);

    let result = match args.command {
        Commands::Keys => {
            for key in db.committed_keys()? {
                println!("{key}");
            }
            Ok(())
        }
        Commands::Stat { key } => stat(&db, key.parse()?),
        Commands::Dump { key, limit } => dump(&db, key.parse()?, limit),
        Commands::Verify { key } => verify(&db, key.parse()?),
    };

    db.stop()?;
    result
}

fn stat(db: &Database, key: Key) -> shardstore::Result<()> {
    let txn = db.create_transaction()?;
    if !txn.contains_file(&key)? {
        println!("{key}: not found");
        return Ok(());
    }
    let mut file = txn.get_file(key, AccessMode::ReadOnly)?;
    let len = file.len()?;
    match BinaryCollection::open(&mut file) {
        Ok(collection) => println!("{key}: {len} bytes, collection of {} elements", collection.len()),
        Err(_) => println!("{key}: {len} bytes"),
    }
    Ok(())
}

fn dump(db: &Database, key: Key, limit: Option<usize>) -> shardstore::Result<()> {
    let txn = db.create_transaction()?;
    let mut file = txn.get_file(key, AccessMode::ReadOnly)?;
    let collection = BinaryCollection::open(&mut file)?;
    for value in collection.iter().take(limit.unwrap_or(usize::MAX)) {
        let value = value?;
        let hex: String = value.iter().map(|b| format!("{b:02x}")).collect();
        println!("{hex}");
    }
    Ok(())
}

fn verify(db: &Database, key: Key) -> shardstore::Result<()> {
    let txn = db.create_transaction()?;
    let mut file = txn.get_file(key, AccessMode::ReadOnly)?;
    let collection = BinaryCollection::open(&mut file)?;
    collection.verify()?;
    println!("{key}: ok, {} elements", collection.len());
    Ok(())
}
