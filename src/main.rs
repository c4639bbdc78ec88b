use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about = "Keep Elasticsearch indices in sync with a SQLite source", long_about = None)]
struct Cli {
    /// Config file (default: $INDEX_SYNC_CONFIG, ./index-sync.toml, ~/.index-sync/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create physical index and alias
    Create {
        /// Index name (default: all registered indexes)
        index: Option<String>,
    },

    /// Export rows into the index
    Export {
        /// Index name (default: all registered indexes)
        index: Option<String>,

        /// Only export rows flagged as changed
        #[arg(long)]
        changed: bool,
    },

    /// Re-export specific rows; ids without source rows are deleted
    ExportIds {
        /// Index name
        index: String,

        /// Row ids
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
    },

    /// Move the alias to a new physical index if the mapping changed
    Migrate {
        /// Index name (default: all registered indexes)
        index: Option<String>,
    },

    /// Delete the physical index behind the alias
    Delete {
        /// Index name (default: all registered indexes)
        index: Option<String>,
    },

    /// Show alias, current and expected physical index
    Status {
        /// Index name (default: all registered indexes)
        index: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    index_sync::logging::init(cli.verbose)?;

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Create { index } => {
            commands::create::execute(config, index.as_deref())?;
        }
        Commands::Export { index, changed } => {
            commands::export::execute(config, index.as_deref(), changed)?;
        }
        Commands::ExportIds { index, ids } => {
            commands::export_ids::execute(config, &index, &ids)?;
        }
        Commands::Migrate { index } => {
            commands::migrate::execute(config, index.as_deref())?;
        }
        Commands::Delete { index } => {
            commands::delete::execute(config, index.as_deref())?;
        }
        Commands::Status { index } => {
            commands::status::execute(config, index.as_deref())?;
        }
    }

    Ok(())
}
