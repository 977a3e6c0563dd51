//! sqlimport: bulk-load delimited text files into SQL Server tables.
//!
//! ```bash
//! # Stream rows over TDS (comma-delimited, header matched by name)
//! sqlimport load orders.csv --table dbo.Orders -S db01 -U loader --header name
//!
//! # Server-side BULK INSERT from a share the engine can read
//! sqlimport load orders.txt --table dbo.Orders -S db01 --strategy staged \
//!     --staging-dir /mnt/import --engine-dir '\\files\import'
//!
//! # Find fields wider than their columns
//! sqlimport scan-lengths orders.csv --table dbo.Orders -S db01 --header
//! ```

use clap::{Parser, Subcommand};
use sqlimport_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "sqlimport", version, about = "Bulk-load delimited files into SQL Server")]
struct Cli {
    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Directory for log files (default: ~/.sqlimport/logs)
    #[arg(long, global = true, env = "SQLIMPORT_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a delimited file into an existing table
    Load(cli::load::LoadArgs),

    /// Report fields longer than their column's declared width
    ScanLengths(cli::scan::ScanArgs),
}

impl Commands {
    fn wants_json(&self) -> bool {
        match self {
            Commands::Load(args) => args.json,
            Commands::ScanLengths(args) => args.json,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "sqlimport",
        verbose: cli.verbose,
        log_dir: cli.log_dir.clone(),
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    let json_mode = cli.command.wants_json();
    let result = match cli.command {
        Commands::Load(args) => cli::load::run(args),
        Commands::ScanLengths(args) => cli::scan::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(1)
        }
    }
}
