use std::sync::Mutex;

use camino::Utf8PathBuf;
use regex::Regex;
use tracing::{debug, info};

use crate::config::{DatasourceRequest, SourceFile, VersionStrategy};
use crate::domain::{Taxid, Version};
use crate::error::BiographError;
use crate::http::Fetcher;
use crate::store::Store;

/// Parameters passed to [`Datasource::fetch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    /// Release to fetch; `None` lets the datasource resolve its latest release.
    pub version: Option<Version>,
    /// Taxonomy allow-list; empty means no filtering.
    pub taxids: Vec<Taxid>,
}

/// An external reference dataset with a versioned local cache.
pub trait Datasource {
    fn name(&self) -> &str;
    fn latest_remote_version(&self) -> Result<Version, BiographError>;
    fn has_latest_local_copy(&self) -> Result<bool, BiographError>;
    fn fetch(&self, request: &FetchRequest) -> Result<(), BiographError>;
}

/// Datasource whose releases are a fixed list of files behind URL templates.
///
/// `{version}` in a URL is replaced by the release being fetched.
#[derive(Debug)]
pub struct ReleaseDatasource<F: Fetcher> {
    name: String,
    store: Store,
    strategy: VersionStrategy,
    files: Vec<SourceFile>,
    fetcher: F,
    remote: Mutex<Option<Version>>,
}

impl<F: Fetcher> ReleaseDatasource<F> {
    pub fn new(
        name: impl Into<String>,
        store: Store,
        strategy: VersionStrategy,
        files: Vec<SourceFile>,
        fetcher: F,
    ) -> Result<Self, BiographError> {
        let name = name.into();
        let is_valid = !name.is_empty()
            && name != "metadata"
            && name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-'));
        if !is_valid {
            return Err(BiographError::InvalidConfig(format!(
                "invalid datasource name: {name}"
            )));
        }
        if let VersionStrategy::Remote { pattern, .. } = &strategy {
            Regex::new(pattern).map_err(|err| {
                BiographError::InvalidConfig(format!("datasource {name}: {err}"))
            })?;
        }
        Ok(Self {
            name,
            store,
            strategy,
            files,
            fetcher,
            remote: Mutex::new(None),
        })
    }

    pub fn from_request(
        request: &DatasourceRequest,
        store: Store,
        fetcher: F,
    ) -> Result<Self, BiographError> {
        Self::new(
            request.name.clone(),
            store,
            request.version.clone(),
            request.files.clone(),
            fetcher,
        )
    }

    fn resolve_remote(&self) -> Result<Version, BiographError> {
        match &self.strategy {
            VersionStrategy::Fixed { version } => Ok(version.clone()),
            VersionStrategy::Daily => chrono::Utc::now()
                .format("%Y-%m-%d")
                .to_string()
                .parse(),
            VersionStrategy::Remote { url, pattern } => {
                let text = self.fetcher.get_text(url)?;
                extract_version(pattern, &text).ok_or_else(|| {
                    BiographError::VersionResolution(format!(
                        "{}: no match for {pattern} at {url}",
                        self.name
                    ))
                })?
            }
        }
    }

    /// Files selected for a fetch under the given taxonomy allow-list.
    pub fn selected_files(&self, taxids: &[Taxid]) -> Vec<&SourceFile> {
        self.files
            .iter()
            .filter(|file| match &file.taxid {
                Some(taxid) => taxids.is_empty() || taxids.contains(taxid),
                None => true,
            })
            .collect()
    }
}

impl<F: Fetcher> Datasource for ReleaseDatasource<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn latest_remote_version(&self) -> Result<Version, BiographError> {
        let mut cached = self
            .remote
            .lock()
            .map_err(|_| BiographError::VersionResolution("version cache poisoned".to_string()))?;
        if let Some(version) = cached.as_ref() {
            return Ok(version.clone());
        }
        let version = self.resolve_remote()?;
        debug!(datasource = %self.name, version = %version, "resolved remote version");
        *cached = Some(version.clone());
        Ok(version)
    }

    fn has_latest_local_copy(&self) -> Result<bool, BiographError> {
        let remote = self.latest_remote_version()?;
        self.store.has_version(&self.name, &remote)
    }

    fn fetch(&self, request: &FetchRequest) -> Result<(), BiographError> {
        let version = match &request.version {
            Some(version) => version.clone(),
            None => self.latest_remote_version()?,
        };
        let files = self.selected_files(&request.taxids);
        if files.is_empty() {
            return Err(BiographError::InvalidConfig(format!(
                "datasource {} has no files for taxids {:?}",
                self.name, request.taxids
            )));
        }

        self.store.ensure_root()?;
        let staging = self.store.staging_dir(&self.name)?;
        let mut names = Vec::with_capacity(files.len());
        for file in files {
            let url = file.url.replace("{version}", version.as_str());
            let file_name = file_name_from_url(&url)?;
            let destination = staging.path().join(&file_name);
            let start = std::time::Instant::now();
            let bytes = self.fetcher.download(&url, &destination)?;
            info!(
                datasource = %self.name,
                file = %file_name,
                bytes,
                latency_ms = start.elapsed().as_millis() as u64,
                "downloaded"
            );
            names.push(file_name);
        }
        self.store.commit_release(
            staging,
            &self.name,
            &version,
            names,
            chrono::Utc::now().to_rfc3339(),
        )?;
        Ok(())
    }
}

/// Directory of the newest complete local release of `source`.
pub fn latest_local_dir(store: &Store, source: &str) -> Result<Utf8PathBuf, BiographError> {
    let meta = store
        .latest_local(source)?
        .ok_or_else(|| BiographError::NoLocalCopy(source.to_string()))?;
    Ok(store.version_dir(source, &meta.version))
}

fn extract_version(pattern: &str, text: &str) -> Option<Result<Version, BiographError>> {
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => return Some(Err(BiographError::InvalidConfig(err.to_string()))),
    };
    let captures = regex.captures(text)?;
    let value = captures.get(1).or_else(|| captures.get(0))?;
    Some(value.as_str().parse())
}

fn file_name_from_url(url: &str) -> Result<String, BiographError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(|name| name.to_string())
        .ok_or_else(|| BiographError::InvalidConfig(format!("URL has no file name: {url}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_ignores_query() {
        assert_eq!(
            file_name_from_url("https://example.org/pub/gene_info.gz?raw=1").unwrap(),
            "gene_info.gz"
        );
        assert!(file_name_from_url("https://example.org/pub/").is_err());
    }

    #[test]
    fn version_uses_first_capture_group() {
        let version = extract_version(r"UniProt Release (\d{4}_\d{2})", "UniProt Release 2024_06\n")
            .unwrap()
            .unwrap();
        assert_eq!(version.as_str(), "2024_06");
        assert!(extract_version(r"(\d+)", "no digits here").is_none());
    }
}
