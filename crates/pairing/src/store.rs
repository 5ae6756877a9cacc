//! Per-attempt temporary credential directory
//!
//! Each pairing attempt owns `<root>/<attempt_id>/`. The protocol client
//! writes its multi-file auth state there; the workflow itself only ever
//! reads `creds.json`, as opaque bytes, after the connection opened.
//! The directory is removed on every terminal path and before each retry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::constants::CREDS_FILE;
use crate::error::{Error, Result};

/// Handle to one attempt's credential directory.
#[derive(Debug, Clone)]
pub struct CredentialDir {
    path: PathBuf,
}

impl CredentialDir {
    /// Path of the directory for `attempt_id` under `root`, without touching disk.
    pub fn new(root: &Path, attempt_id: &str) -> Self {
        Self {
            path: root.join(attempt_id),
        }
    }

    /// Create the directory (and `root` if needed).
    ///
    /// Permissions are 0700 on unix since the directory ends up holding
    /// account credentials.
    pub async fn create(root: &Path, attempt_id: &str) -> Result<Self> {
        let dir = Self::new(root, attempt_id);
        tokio::fs::create_dir_all(&dir.path)
            .await
            .map_err(|e| Error::Io(format!("creating {}: {e}", dir.path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&dir.path, perms)
                .await
                .map_err(|e| Error::Io(format!("setting credential dir permissions: {e}")))?;
        }

        debug!(path = %dir.path.display(), "created credential directory");
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn creds_path(&self) -> PathBuf {
        self.path.join(CREDS_FILE)
    }

    /// Read `creds.json` as raw bytes.
    ///
    /// The protocol client may still be flushing its last write when the
    /// connection opens, so a missing file is polled up to `attempts` times,
    /// `poll` apart. Any other read error fails immediately.
    pub async fn read_credentials(&self, attempts: u32, poll: Duration) -> Result<Vec<u8>> {
        let path = self.creds_path();
        let attempts = attempts.max(1);

        for attempt in 1..=attempts {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    debug!(path = %path.display(), bytes = bytes.len(), "read credentials");
                    return Ok(bytes);
                }
                Err(e) if e.kind() == ErrorKind::NotFound && attempt < attempts => {
                    debug!(path = %path.display(), attempt, "credentials not flushed yet, polling");
                    tokio::time::sleep(poll).await;
                }
                Err(e) => {
                    return Err(Error::Export(format!("reading {}: {e}", path.display())));
                }
            }
        }

        Err(Error::Export(format!("{} never appeared", path.display())))
    }

    /// Remove the directory and everything in it. A missing directory is
    /// not an error, so this may be called any number of times.
    pub async fn cleanup(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed credential directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove credential directory");
                Err(Error::Io(format!("removing {}: {e}", self.path.display())))
            }
        }
    }
}
