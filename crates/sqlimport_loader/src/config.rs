//! Load configuration.
//!
//! Every knob of a load is carried explicitly in [`LoadOptions`]; nothing is
//! read from the process environment here.

use serde::{Deserialize, Serialize};
use sqlimport_core::{
    DescriptorOptions, HeaderMatch, HeaderMode, LoadError, QuotePolicy, Result, SmallDateTimeTag,
};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 5_000;
pub const DEFAULT_PROGRESS_EVERY: u64 = 10_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_SMB_CLIENT: &str = "smbclient";

/// Default delimiter for row-streaming loads.
pub const STREAMING_DELIMITER: char = ',';
/// Default delimiter for server-staged loads.
pub const STAGED_DELIMITER: char = '|';

/// How progress is rendered while a load runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressMode {
    Silent,
    /// `info!` lines every progress threshold
    #[default]
    Log,
    /// Terminal spinner with a running row count
    Bar,
}

/// Credentials and location of a remote file share.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteShareConfig {
    /// `//server/share`
    pub share: String,
    /// Directory inside the share that receives staged files
    #[serde(default)]
    pub directory: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub domain: Option<String>,
    /// The same directory as the database engine sees it (e.g. a UNC path)
    pub engine_dir: String,
    /// SMB client executable
    #[serde(default = "default_smb_client")]
    pub client: String,
}

fn default_smb_client() -> String {
    DEFAULT_SMB_CLIENT.to_string()
}

impl fmt::Debug for RemoteShareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteShareConfig")
            .field("share", &self.share)
            .field("directory", &self.directory)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .field("engine_dir", &self.engine_dir)
            .field("client", &self.client)
            .finish()
    }
}

/// Where staged files go for a server-staged load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TransportConfig {
    /// A local directory, mapped drive or UNC path the engine can read.
    ///
    /// Without a `staging_dir` files are handed to the engine where they lie.
    LocalOrMappedPath {
        #[serde(default)]
        staging_dir: Option<PathBuf>,
        /// Prefix the engine uses for `staging_dir`; defaults to the same path.
        /// Only valid together with `staging_dir`.
        #[serde(default)]
        engine_dir: Option<String>,
    },
    /// An SMB share written through an external client command.
    RemoteShare(RemoteShareConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::LocalOrMappedPath {
            staging_dir: None,
            engine_dir: None,
        }
    }
}

/// The load strategy. Selected by the caller, never auto-detected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum LoadStrategy {
    /// Client-side bulk copy of typed rows in batches
    #[default]
    RowStreaming,
    /// Server-side `BULK INSERT` of a staged file
    ServerStaged { transport: TransportConfig },
}

impl LoadStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LoadStrategy::RowStreaming => "row-streaming",
            LoadStrategy::ServerStaged { .. } => "server-staged",
        }
    }

    pub fn default_delimiter(&self) -> char {
        match self {
            LoadStrategy::RowStreaming => STREAMING_DELIMITER,
            LoadStrategy::ServerStaged { .. } => STAGED_DELIMITER,
        }
    }
}

/// Options for one load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub strategy: LoadStrategy,
    pub delimiter: char,
    pub header_mode: HeaderMode,
    pub header_match: HeaderMatch,
    /// Reject header names that differ from the table column at the same position
    pub strict_header: bool,
    pub truncate: bool,
    /// Rows per bulk-copy batch; 0 sends everything in one batch
    pub batch_size: usize,
    pub progress_every: u64,
    pub timeout_secs: u64,
    pub table_lock: bool,
    pub check_constraints: bool,
    pub keep_nulls: bool,
    pub keep_identity: bool,
    pub manage_indexes: bool,
    pub manage_constraints: bool,
    /// Pad or trim every staged row to the target column count
    pub repair_rows: bool,
    /// Append `CODEPAGE = '65001'` to the load statement
    pub utf8: bool,
    pub quote_policy: QuotePolicy,
    pub progress: ProgressMode,
    pub small_datetime_tag: SmallDateTimeTag,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            strategy: LoadStrategy::RowStreaming,
            delimiter: STREAMING_DELIMITER,
            header_mode: HeaderMode::default(),
            header_match: HeaderMatch::default(),
            strict_header: false,
            truncate: false,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_every: DEFAULT_PROGRESS_EVERY,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            table_lock: true,
            check_constraints: false,
            keep_nulls: true,
            keep_identity: false,
            manage_indexes: false,
            manage_constraints: false,
            repair_rows: true,
            utf8: true,
            quote_policy: QuotePolicy::default(),
            progress: ProgressMode::default(),
            small_datetime_tag: SmallDateTimeTag::default(),
        }
    }
}

impl LoadOptions {
    pub fn row_streaming() -> Self {
        Self::default()
    }

    pub fn server_staged(transport: TransportConfig) -> Self {
        Self {
            strategy: LoadStrategy::ServerStaged { transport },
            delimiter: STAGED_DELIMITER,
            ..Self::default()
        }
    }

    /// Large batches, a long timeout, table lock and suspended indexes and
    /// constraints for the duration of the load.
    pub fn high_performance(mut self) -> Self {
        self.batch_size = 10_000;
        self.timeout_secs = 1_200;
        self.manage_indexes = true;
        self.manage_constraints = true;
        self.table_lock = true;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn descriptor_options(&self) -> DescriptorOptions {
        DescriptorOptions {
            small_datetime_tag: self.small_datetime_tag,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(self.delimiter, '"' | '\r' | '\n') {
            return Err(LoadError::invalid_config(format!(
                "Delimiter {:?} cannot be used",
                self.delimiter
            )));
        }
        if self.timeout_secs == 0 {
            return Err(LoadError::invalid_config("Timeout must be at least one second"));
        }
        if let LoadStrategy::ServerStaged {
            transport:
                TransportConfig::LocalOrMappedPath {
                    staging_dir: None,
                    engine_dir: Some(_),
                },
        } = &self.strategy
        {
            return Err(LoadError::invalid_config(
                "An engine directory needs a staging directory to copy files into",
            ));
        }
        if let LoadStrategy::ServerStaged {
            transport: TransportConfig::RemoteShare(share),
        } = &self.strategy
        {
            if share.share.trim().is_empty() {
                return Err(LoadError::invalid_config("Remote share path is empty"));
            }
            if share.engine_dir.trim().is_empty() {
                return Err(LoadError::invalid_config(
                    "Remote share needs the directory path as seen by the database engine",
                ));
            }
        }
        Ok(())
    }
}
