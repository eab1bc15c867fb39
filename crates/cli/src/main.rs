//! Offline tooling for zone structures: render a structure's bin addresses, or
//! preview reconfiguring a zone from one structure file to another.

use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use slotforge_infra::EngineConfig;

mod commands;

#[derive(Parser)]
#[command(name = "slotforge")]
#[command(about = "Zone structure and bin reconfiguration tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every bin address a structure generates, in generation order
    Generate {
        /// Structure JSON file
        spec: PathBuf,

        /// Warehouse code (address prefix)
        warehouse_code: String,

        /// Zone code (address prefix)
        zone_code: String,

        /// Print full bin descriptors as JSON lines instead of bare addresses
        #[arg(long)]
        json: bool,
    },

    /// Print aisle/shelf/bin totals of a structure without generating it
    Count {
        /// Structure JSON file
        spec: PathBuf,
    },

    /// Preview reconfiguring a zone built from CURRENT into PROPOSED
    Preview {
        /// Structure JSON file the zone currently has
        current: PathBuf,

        /// Structure JSON file to reconfigure to
        proposed: PathBuf,

        #[arg(long, default_value = "WH")]
        warehouse_code: String,

        #[arg(long, default_value = "Z1")]
        zone_code: String,

        /// JSON object mapping bin addresses to item counts
        #[arg(long)]
        occupancy: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    slotforge_observability::init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let out = BufWriter::new(io::stdout().lock());
    match cli.command {
        Commands::Generate {
            spec,
            warehouse_code,
            zone_code,
            json,
        } => commands::generate(&config, &spec, &warehouse_code, &zone_code, json, out),
        Commands::Count { spec } => commands::count(&spec, out),
        Commands::Preview {
            current,
            proposed,
            warehouse_code,
            zone_code,
            occupancy,
        } => commands::preview(
            &config,
            &current,
            &proposed,
            &warehouse_code,
            &zone_code,
            occupancy.as_deref(),
            out,
        ),
    }
}
