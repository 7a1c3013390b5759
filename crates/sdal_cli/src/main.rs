//! SDAL CLI
//!
//! Command-line tools for mastering and checking SDAL disc images.
//!
//! # Commands
//!
//! - `build` - Build a disc image from a JSON extract
//! - `validate` - Walk an image and report every defect
//! - `inspect` - Display image layout and per-region statistics

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SDAL disc-image mastering tools.
#[derive(Parser)]
#[command(name = "sdal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a disc image from a JSON extract
    Build {
        /// Path to the JSON extract
        extract: PathBuf,

        /// Where to write the finished image
        #[arg(short, long)]
        out: PathBuf,

        /// Volume identifier stamped into the image
        #[arg(long)]
        volume_id: Option<String>,

        /// Coordinate precision in decimal digits
        #[arg(long)]
        precision: Option<u8>,

        /// Density overlay zoom levels (0 disables the overlay)
        #[arg(long)]
        density_zooms: Option<u8>,

        /// Maximum uncompressed payload bytes per parcel
        #[arg(long)]
        parcel_bytes: Option<usize>,
    },

    /// Walk an image and report every defect
    Validate {
        /// Path to the image
        image: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display image layout and per-region statistics
    Inspect {
        /// Path to the image
        image: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Build {
            extract,
            out,
            volume_id,
            precision,
            density_zooms,
            parcel_bytes,
        } => {
            let overrides = commands::build::ConfigOverrides {
                volume_id,
                precision,
                density_zooms,
                parcel_bytes,
            };
            commands::build::run(&extract, &out, &overrides)?;
        }
        Commands::Validate { image, format } => {
            commands::validate::run(&image, &format)?;
        }
        Commands::Inspect { image, format } => {
            commands::inspect::run(&image, &format)?;
        }
        Commands::Version => {
            println!("SDAL CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SDAL Core v{}", sdal_core::VERSION);
        }
    }

    Ok(())
}
