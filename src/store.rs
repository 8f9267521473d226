use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tempfile::{Builder, TempDir};

use crate::domain::Version;
use crate::error::BiographError;

/// On-disk dataset cache.
///
/// Each downloaded release lives in `<root>/<source>/<version>/`. The matching
/// `<root>/metadata/<source>/<version>.json` is written only after the release
/// directory is in place, so a release without metadata is never reported as
/// a local copy.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub source: String,
    pub version: Version,
    pub files: Vec<String>,
    pub downloaded_at: String,
    pub tool: String,
    pub resolved_path: String,
}

impl Store {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn source_dir(&self, source: &str) -> Utf8PathBuf {
        self.root.join(source)
    }

    pub fn version_dir(&self, source: &str, version: &Version) -> Utf8PathBuf {
        self.source_dir(source).join(version.as_str())
    }

    pub fn metadata_dir(&self, source: &str) -> Utf8PathBuf {
        self.root.join("metadata").join(source)
    }

    pub fn metadata_path(&self, source: &str, version: &Version) -> Utf8PathBuf {
        self.metadata_dir(source)
            .join(format!("{}.json", version.as_str()))
    }

    pub fn ensure_root(&self) -> Result<(), BiographError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| BiographError::Filesystem(err.to_string()))
    }

    /// Complete local releases of `source`, oldest download first.
    pub fn local_releases(&self, source: &str) -> Result<Vec<Metadata>, BiographError> {
        let mut entries = Self::list_metadata(&self.metadata_dir(source))?
            .into_iter()
            .filter(|meta| meta.source == source)
            .filter(|meta| {
                self.version_dir(source, &meta.version)
                    .as_std_path()
                    .is_dir()
            })
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| a.downloaded_at.cmp(&b.downloaded_at));
        Ok(entries)
    }

    pub fn has_version(&self, source: &str, version: &Version) -> Result<bool, BiographError> {
        Ok(self
            .local_releases(source)?
            .iter()
            .any(|meta| &meta.version == version))
    }

    /// Most recently downloaded complete release.
    pub fn latest_local(&self, source: &str) -> Result<Option<Metadata>, BiographError> {
        Ok(self.local_releases(source)?.pop())
    }

    /// Scratch directory next to the final release location, so the commit is a rename.
    pub fn staging_dir(&self, source: &str) -> Result<TempDir, BiographError> {
        let parent = self.source_dir(source);
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| BiographError::Filesystem(err.to_string()))?;
        Builder::new()
            .prefix(".biodatagraph-download")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| BiographError::Filesystem(err.to_string()))
    }

    /// Moves a fully staged release into place and records it.
    pub fn commit_release(
        &self,
        staging: TempDir,
        source: &str,
        version: &Version,
        files: Vec<String>,
        downloaded_at: String,
    ) -> Result<Metadata, BiographError> {
        let target = self.version_dir(source, version);
        atomic_rename_dir(staging.path(), target.as_std_path())
            .map_err(|err| BiographError::Filesystem(err.to_string()))?;
        // The staging path no longer exists; keep it from being cleaned up.
        let _ = staging.keep();
        let meta = Metadata {
            source: source.to_string(),
            version: version.clone(),
            files,
            downloaded_at,
            tool: format!("biodatagraph/{}", env!("CARGO_PKG_VERSION")),
            resolved_path: target.to_string(),
        };
        Self::write_metadata(&self.metadata_path(source, version), &meta)?;
        Ok(meta)
    }

    pub fn write_metadata(path: &Utf8Path, metadata: &Metadata) -> Result<(), BiographError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| BiographError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(metadata)
            .map_err(|err| BiographError::Filesystem(err.to_string()))?;
        fs::write(tmp_path.as_std_path(), &content)
            .map_err(|err| BiographError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| BiographError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn list_metadata(root: &Utf8Path) -> Result<Vec<Metadata>, BiographError> {
        if !root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for path in walk_dir(root.as_std_path())? {
            if path.is_file() && path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path)
                    .map_err(|err| BiographError::Filesystem(err.to_string()))?;
                let metadata: Metadata = serde_json::from_str(&content)
                    .map_err(|err| BiographError::Filesystem(format!("{}: {err}", path.display())))?;
                entries.push(metadata);
            }
        }
        Ok(entries)
    }

    /// Metadata of every recorded release, in directory order.
    pub fn all_releases(&self) -> Result<Vec<Metadata>, BiographError> {
        Self::list_metadata(&self.root.join("metadata"))
    }
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, BiographError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| BiographError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| BiographError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}
