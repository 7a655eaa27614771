//! CaskKV CLI
//!
//! Opens a database directory locally and runs one command against it.

use std::path::PathBuf;

use caskkv::{Config, Engine, IndexType};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// CaskKV CLI
#[derive(Parser, Debug)]
#[command(name = "caskkv-cli")]
#[command(about = "Inspect and modify a CaskKV database directory")]
#[command(version)]
struct Args {
    /// Database directory
    #[arg(short, long, default_value = "./caskkv_data")]
    dir: PathBuf,

    /// Index backend the directory was created with
    #[arg(short, long, value_enum, default_value_t = IndexArg::Btree)]
    index: IndexArg,

    /// Segment size in MB before rotation
    #[arg(long, default_value = "256")]
    data_file_mb: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IndexArg {
    Btree,
    Art,
    Bptree,
}

impl From<IndexArg> for IndexType {
    fn from(arg: IndexArg) -> Self {
        match arg {
            IndexArg::Btree => IndexType::BTree,
            IndexArg::Art => IndexType::Art,
            IndexArg::Bptree => IndexType::BPlusTree,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Delete {
        /// The key to delete
        key: String,
    },

    /// List keys, optionally limited to a prefix
    List {
        #[arg(short, long, default_value = "")]
        prefix: String,
    },

    /// Show engine statistics
    Stat,

    /// Compact the data files
    Merge,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,caskkv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let config = Config::builder()
        .dir_path(&args.dir)
        .index_type(args.index.into())
        .data_file_size(args.data_file_mb * 1024 * 1024)
        .build();

    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = run(&engine, args.command);
    let closed = engine.close();

    if let Err(e) = outcome.and(closed) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> caskkv::Result<()> {
    match command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value } => {
            engine.put(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Delete { key } => {
            engine.delete(key.as_bytes())?;
            println!("OK");
        }
        Commands::List { prefix } => {
            let mut iter = engine.iter(caskkv::IteratorOptions {
                prefix: prefix.into_bytes(),
                reverse: false,
            });
            while iter.valid() {
                println!("{}", String::from_utf8_lossy(iter.key()));
                iter.next();
            }
            iter.close();
        }
        Commands::Stat => {
            let stat = engine.stat()?;
            println!("keys:        {}", stat.key_num);
            println!("data files:  {}", stat.data_file_num);
            println!("reclaimable: {} bytes", stat.reclaimable_size);
            println!("disk size:   {} bytes", stat.disk_size);
        }
        Commands::Merge => {
            engine.merge()?;
            println!("OK");
        }
    }
    Ok(())
}
