//! `sqlimport load` - bulk-load a delimited file into an existing table.

use crate::cli::connection::ConnectionArgs;
use crate::cli::error::{explain, HelpfulError};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use sqlimport_core::{parse_delimiter, HeaderMatch, HeaderMode, QuotePolicy, SmallDateTimeTag, TableName};
use sqlimport_loader::{
    LoadOptions, LoadOrchestrator, LoadReport, LoadRequest, ProgressMode, RemoteShareConfig,
    TransportConfig, DEFAULT_SMB_CLIENT,
};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Send typed rows over the connection in batches
    Streaming,
    /// Stage the file where the server can read it, then BULK INSERT
    Staged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HeaderArg {
    /// First line names the columns; match them to the table
    Name,
    /// First line is a header; map fields by position
    Position,
    /// No header line
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProgressArg {
    Silent,
    Log,
    Bar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SmallDateTimeArg {
    /// SQLSMALLDDATETIME, as written by earlier tooling
    Legacy,
    /// SQLDATETIM4
    Corrected,
}

/// Arguments for the `load` command
#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Delimited source file
    #[arg(value_name = "FILE")]
    pub source: PathBuf,

    /// Target table: name, schema.name or database.schema.name
    #[arg(short, long)]
    pub table: String,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[arg(long, value_enum, default_value_t = StrategyArg::Streaming)]
    pub strategy: StrategyArg,

    /// Field delimiter: one character, or tab/pipe/comma/semicolon.
    /// Defaults to ',' for streaming and '|' for staged loads
    #[arg(long)]
    pub delimiter: Option<String>,

    #[arg(long, value_enum, default_value_t = HeaderArg::None)]
    pub header: HeaderArg,

    /// Match header names exactly (default: case-insensitive)
    #[arg(long)]
    pub exact_header_match: bool,

    /// Fail unless the header names every table column, in table order
    #[arg(long)]
    pub strict_header: bool,

    /// Empty the table before loading
    #[arg(long)]
    pub truncate: bool,

    /// Rows per bulk-copy batch; 0 sends one batch (default: 5000)
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Report progress every N rows (default: 10000)
    #[arg(long)]
    pub progress_every: Option<u64>,

    /// Load statement timeout in seconds (default: 600)
    #[arg(long)]
    pub timeout: Option<u64>,

    #[arg(long, value_enum, default_value_t = ProgressArg::Log)]
    pub progress: ProgressArg,

    /// Batch 10000, timeout 1200s, disable indexes and constraints during the load
    #[arg(long)]
    pub high_performance: bool,

    /// Do not take a table lock during the load
    #[arg(long)]
    pub no_table_lock: bool,

    /// Enforce check constraints during the load
    #[arg(long)]
    pub check_constraints: bool,

    /// Load empty fields as column defaults instead of NULL
    #[arg(long)]
    pub empty_as_default: bool,

    /// Keep identity values from the file
    #[arg(long)]
    pub keep_identity: bool,

    /// Disable nonclustered indexes during the load and rebuild them after
    #[arg(long)]
    pub manage_indexes: bool,

    /// Disable constraints during the load and re-enable them after
    #[arg(long)]
    pub manage_constraints: bool,

    /// Leave rows with too few or too many fields untouched
    #[arg(long)]
    pub no_repair: bool,

    /// Do not request the UTF-8 code page for staged loads
    #[arg(long)]
    pub no_utf8: bool,

    /// Keep surrounding quotes on fields
    #[arg(long)]
    pub keep_quotes: bool,

    /// Format-file tag for SMALLDATETIME columns
    #[arg(long, value_enum, default_value_t = SmallDateTimeArg::Legacy)]
    pub smalldatetime_tag: SmallDateTimeArg,

    /// Local directory to stage files in (staged strategy)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// The staging directory as the database engine sees it
    #[arg(long)]
    pub engine_dir: Option<String>,

    /// Remote share to stage through, e.g. //files/import (staged strategy)
    #[arg(long)]
    pub share: Option<String>,

    /// Directory inside the share
    #[arg(long, default_value = "")]
    pub share_dir: String,

    #[arg(long)]
    pub share_user: Option<String>,

    #[arg(long, env = "SQLIMPORT_SHARE_PASSWORD", hide_env_values = true)]
    pub share_password: Option<String>,

    #[arg(long)]
    pub share_domain: Option<String>,

    /// SMB client executable
    #[arg(long, default_value = DEFAULT_SMB_CLIENT)]
    pub smb_client: String,

    /// Print the load report as JSON
    #[arg(long)]
    pub json: bool,
}

impl LoadArgs {
    fn transport(&self) -> Result<TransportConfig> {
        let Some(share) = &self.share else {
            if self.engine_dir.is_some() && self.staging_dir.is_none() {
                return Err(HelpfulError::new("--engine-dir needs --staging-dir")
                    .with_context("--engine-dir names the staging directory as the server sees it")
                    .with_suggestion(r"TRY: --staging-dir /mnt/import --engine-dir '\\files\import'")
                    .into());
            }
            return Ok(TransportConfig::LocalOrMappedPath {
                staging_dir: self.staging_dir.clone(),
                engine_dir: self.engine_dir.clone(),
            });
        };
        let username = self.share_user.clone().ok_or_else(|| {
            HelpfulError::new("--share needs --share-user")
                .with_suggestion("TRY: --share-user loader --share-domain CORP")
        })?;
        let engine_dir = self.engine_dir.clone().ok_or_else(|| {
            HelpfulError::new("--share needs --engine-dir")
                .with_context("The server reads staged files through its own path to the share")
                .with_suggestion(r"TRY: --engine-dir '\\files\import\incoming'")
        })?;
        Ok(TransportConfig::RemoteShare(RemoteShareConfig {
            share: share.clone(),
            directory: self.share_dir.clone(),
            username,
            password: self.share_password.clone().unwrap_or_default(),
            domain: self.share_domain.clone(),
            engine_dir,
            client: self.smb_client.clone(),
        }))
    }

    fn uses_staging_flags(&self) -> bool {
        self.staging_dir.is_some() || self.engine_dir.is_some() || self.share.is_some()
    }

    pub fn build_options(&self) -> Result<LoadOptions> {
        let mut options = match self.strategy {
            StrategyArg::Streaming => {
                if self.uses_staging_flags() {
                    return Err(HelpfulError::new("Staging flags need --strategy staged")
                        .with_context("--staging-dir, --engine-dir and --share only apply to server-side loads")
                        .into());
                }
                LoadOptions::row_streaming()
            }
            StrategyArg::Staged => LoadOptions::server_staged(self.transport()?),
        };
        if self.high_performance {
            options = options.high_performance();
        }

        if let Some(delimiter) = &self.delimiter {
            options.delimiter = parse_delimiter(delimiter)?;
        }
        options.header_mode = match self.header {
            HeaderArg::Name => HeaderMode::ByName,
            HeaderArg::Position => HeaderMode::ByPosition,
            HeaderArg::None => HeaderMode::NoHeader,
        };
        if self.exact_header_match {
            options.header_match = HeaderMatch::Exact;
        }
        options.strict_header = self.strict_header;
        options.truncate = self.truncate;
        if let Some(batch_size) = self.batch_size {
            options.batch_size = batch_size;
        }
        if let Some(every) = self.progress_every {
            options.progress_every = every;
        }
        if let Some(timeout) = self.timeout {
            options.timeout_secs = timeout;
        }
        options.progress = match self.progress {
            ProgressArg::Silent => ProgressMode::Silent,
            ProgressArg::Log => ProgressMode::Log,
            ProgressArg::Bar => ProgressMode::Bar,
        };
        if self.no_table_lock {
            options.table_lock = false;
        }
        options.check_constraints = self.check_constraints;
        options.keep_nulls = !self.empty_as_default;
        options.keep_identity = self.keep_identity;
        options.manage_indexes |= self.manage_indexes;
        options.manage_constraints |= self.manage_constraints;
        options.repair_rows = !self.no_repair;
        options.utf8 = !self.no_utf8;
        if self.keep_quotes {
            options.quote_policy = QuotePolicy::Keep;
        }
        options.small_datetime_tag = match self.smalldatetime_tag {
            SmallDateTimeArg::Legacy => SmallDateTimeTag::Legacy,
            SmallDateTimeArg::Corrected => SmallDateTimeTag::Corrected,
        };

        options.validate()?;
        Ok(options)
    }
}

/// Execute the load command
pub fn run(args: LoadArgs) -> Result<()> {
    let options = args.build_options()?;
    let table = TableName::parse(&args.table)
        .with_context(|| format!("Invalid table name: {}", args.table))?;

    super::block_on(async move {
        let mut db = args.connection.connect().await?;
        let request = LoadRequest::new(args.source.clone(), table.clone());
        let mut orchestrator = LoadOrchestrator::new(&mut db, options);
        let report = orchestrator
            .run(&request)
            .await
            .map_err(|e| explain(e, &args.source, &table))?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        if report.is_degraded() {
            warn!("Load finished but {} is left degraded", report.table);
        }
        Ok(())
    })
}

fn print_report(report: &LoadReport) {
    println!("Loaded {} ({}): {}", report.table, report.strategy, report.stats);
    if report.rows_rejected > 0 {
        println!("  {} rows rejected (see log for line numbers)", report.rows_rejected);
    }
    if !report.unmatched_headers.is_empty() {
        println!("  Ignored columns: {}", report.unmatched_headers.join(", "));
    }
    for warning in &report.maintenance_warnings {
        println!("  WARNING: {}", warning);
    }
    for warning in &report.cleanup_warnings {
        println!("  Cleanup: {}", warning);
    }
}
