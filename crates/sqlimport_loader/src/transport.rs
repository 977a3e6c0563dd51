//! Staging transports: make a local file readable by the database engine.
//!
//! A server-staged load needs its data and format files somewhere both this
//! process and the engine can reach. [`LocalTransport`] covers local
//! directories, mapped drives and UNC paths; [`RemoteShareTransport`] pushes
//! files to an SMB share through an external client.

use crate::config::{RemoteShareConfig, TransportConfig};
use async_trait::async_trait;
use sqlimport_core::{LoadError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// A copy made by a transport, removed once the load finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedCopy {
    Local(PathBuf),
    /// File name inside the share's staging directory
    Remote(String),
}

/// Where a staged file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedLocation {
    /// Path the engine uses in the load statement
    pub engine_path: String,
    /// `None` when the engine reads the caller's file in place
    pub owned: Option<OwnedCopy>,
}

#[async_trait]
pub trait StagingTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Make `local` reachable by the engine under `file_name`.
    async fn stage(&self, local: &Path, file_name: &str) -> Result<StagedLocation>;

    /// Delete a copy made by [`stage`](Self::stage). No-op for in-place files.
    async fn remove(&self, location: &StagedLocation) -> Result<()>;
}

/// Build the transport described by `config`.
pub fn from_config(config: &TransportConfig) -> Box<dyn StagingTransport> {
    match config {
        TransportConfig::LocalOrMappedPath {
            staging_dir,
            engine_dir,
        } => Box::new(LocalTransport::new(staging_dir.clone(), engine_dir.clone())),
        TransportConfig::RemoteShare(share) => Box::new(RemoteShareTransport::new(share.clone())),
    }
}

/// Join a directory and file name using the separator style of `dir`.
pub fn join_engine_path(dir: &str, file_name: &str) -> String {
    let sep = if dir.contains('\\') { '\\' } else { '/' };
    let trimmed = dir.trim_end_matches(['\\', '/']);
    if trimmed.is_empty() {
        return format!("{}{}", sep, file_name);
    }
    format!("{}{}{}", trimmed, sep, file_name)
}

/// Local directory, mapped drive or UNC path.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    staging_dir: Option<PathBuf>,
    engine_dir: Option<String>,
}

impl LocalTransport {
    pub fn new(staging_dir: Option<PathBuf>, engine_dir: Option<String>) -> Self {
        Self {
            staging_dir,
            engine_dir,
        }
    }

    /// Hand files to the engine where they already are.
    pub fn in_place() -> Self {
        Self::default()
    }

    fn engine_path_for(&self, copy: &Path, file_name: &str) -> String {
        match &self.engine_dir {
            Some(dir) => join_engine_path(dir, file_name),
            None => copy.display().to_string(),
        }
    }
}

#[async_trait]
impl StagingTransport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn stage(&self, local: &Path, file_name: &str) -> Result<StagedLocation> {
        // In place: the engine reads the file at its real path, so the
        // engine directory (which maps the staging directory) does not apply.
        let Some(dir) = &self.staging_dir else {
            if self.engine_dir.is_some() {
                return Err(LoadError::invalid_config(
                    "An engine directory needs a staging directory to copy files into",
                ));
            }
            let absolute = if local.is_absolute() {
                local.to_path_buf()
            } else {
                std::env::current_dir()?.join(local)
            };
            return Ok(StagedLocation {
                engine_path: absolute.display().to_string(),
                owned: None,
            });
        };

        let target = dir.join(file_name);
        tokio::fs::copy(local, &target).await.map_err(|e| {
            LoadError::transport_with(
                format!("Failed to copy {} to {}", local.display(), target.display()),
                e,
            )
        })?;
        debug!("Staged {} at {}", local.display(), target.display());

        Ok(StagedLocation {
            engine_path: self.engine_path_for(&target, file_name),
            owned: Some(OwnedCopy::Local(target)),
        })
    }

    async fn remove(&self, location: &StagedLocation) -> Result<()> {
        match &location.owned {
            Some(OwnedCopy::Local(path)) => tokio::fs::remove_file(path).await.map_err(|e| {
                LoadError::transport_with(format!("Failed to delete {}", path.display()), e)
            }),
            Some(OwnedCopy::Remote(name)) => Err(LoadError::transport(format!(
                "Local transport cannot remove remote file '{}'",
                name
            ))),
            None => Ok(()),
        }
    }
}

/// SMB share written through `smbclient` (or a compatible command).
///
/// The password is handed over in the `PASSWD` environment variable so it
/// never shows up in a process listing.
#[derive(Debug, Clone)]
pub struct RemoteShareTransport {
    config: RemoteShareConfig,
}

impl RemoteShareTransport {
    pub fn new(config: RemoteShareConfig) -> Self {
        Self { config }
    }

    fn user_arg(&self) -> String {
        match &self.config.domain {
            Some(domain) if !domain.is_empty() => format!("{}\\{}", domain, self.config.username),
            _ => self.config.username.clone(),
        }
    }

    fn cd_prefix(&self) -> String {
        let dir = self.config.directory.trim_matches(['/', '\\']);
        if dir.is_empty() {
            String::new()
        } else {
            format!("cd \"{}\"; ", dir)
        }
    }

    async fn run(&self, commands: String) -> Result<()> {
        debug!(
            "{} {} -U {} -c '{}'",
            self.config.client,
            self.config.share,
            self.user_arg(),
            commands
        );
        let output = Command::new(&self.config.client)
            .arg(&self.config.share)
            .arg("-U")
            .arg(self.user_arg())
            .arg("-c")
            .arg(&commands)
            .env("PASSWD", &self.config.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                LoadError::transport_with(format!("Failed to run {}", self.config.client), e)
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(LoadError::transport(format!(
                "{} exited with {}: {}",
                self.config.client, output.status, detail
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StagingTransport for RemoteShareTransport {
    fn name(&self) -> &'static str {
        "remote-share"
    }

    async fn stage(&self, local: &Path, file_name: &str) -> Result<StagedLocation> {
        let commands = format!(
            "{}put \"{}\" \"{}\"",
            self.cd_prefix(),
            local.display(),
            file_name
        );
        self.run(commands).await?;
        info!("Uploaded {} to {}", file_name, self.config.share);

        Ok(StagedLocation {
            engine_path: join_engine_path(&self.config.engine_dir, file_name),
            owned: Some(OwnedCopy::Remote(file_name.to_string())),
        })
    }

    async fn remove(&self, location: &StagedLocation) -> Result<()> {
        match &location.owned {
            Some(OwnedCopy::Remote(name)) => {
                self.run(format!("{}del \"{}\"", self.cd_prefix(), name)).await
            }
            Some(OwnedCopy::Local(path)) => tokio::fs::remove_file(path).await.map_err(|e| {
                LoadError::transport_with(format!("Failed to delete {}", path.display()), e)
            }),
            None => Ok(()),
        }
    }
}
