//! JSON persistence of the proxy list between runs.

use crate::error::Result;
use crate::proxy::Proxy;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Reads and writes the proxy snapshot file.
///
/// The file is a JSON array with one entry per proxy: host, port,
/// per-site status map and alert flag.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot, replacing any previous file.
    ///
    /// The new contents are written to a sibling temp file and renamed
    /// into place so readers never see a truncated file.
    pub async fn save(&self, proxies: &[Proxy]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let contents = serde_json::to_vec_pretty(proxies)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!(
            "Saved {} proxies to {}",
            proxies.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Read the snapshot. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<Vec<Proxy>>> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let proxies = serde_json::from_slice(&contents)?;
        Ok(Some(proxies))
    }
}
