//! Access to the tables of a census snapshot.
//!
//! A snapshot is a directory tree of Arrow IPC tables, reachable either on
//! the local filesystem or behind an HTTP(S) base URI. Remote tables are
//! fetched into a cache directory before being read, so the rest of the
//! crate only ever sees local files.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use polars::prelude::{DataFrame, IpcReader, SerReader};
use reqwest::Url;

pub(crate) const SUMMARY_TABLE: &str = "census_info/summary.arrow";
pub(crate) const DATASETS_TABLE: &str = "census_info/datasets.arrow";

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("cell-census/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("cannot build http client")
}

#[derive(Debug, Clone)]
enum Location {
    Local(PathBuf),
    Remote(Url),
}

/// One opened census snapshot.
#[derive(Debug)]
pub struct CensusStore {
    location: Location,
    cache_dir: PathBuf,
    client: reqwest::blocking::Client,
}

impl CensusStore {
    /// Open a snapshot at `uri`: a filesystem path, a `file://` URI, or an
    /// `http(s)://` base.
    pub fn open(uri: &str, cache_dir: Option<PathBuf>, timeout: Duration) -> Result<Self> {
        let location = if uri.starts_with("http://") || uri.starts_with("https://") {
            // a trailing slash makes the base join like a directory
            let base = if uri.ends_with('/') {
                uri.to_owned()
            } else {
                format!("{}/", uri)
            };
            Location::Remote(Url::parse(&base).with_context(|| format!("invalid uri '{}'", uri))?)
        } else {
            let path = uri.strip_prefix("file://").unwrap_or(uri);
            Location::Local(PathBuf::from(path))
        };
        let cache_dir = cache_dir.unwrap_or_else(|| {
            std::env::temp_dir().join(format!("cell-census-{}", std::process::id()))
        });
        Ok(Self {
            location,
            cache_dir,
            client: http_client(timeout)?,
        })
    }

    /// The display form of the snapshot's address.
    pub fn uri(&self) -> String {
        match &self.location {
            Location::Local(path) => path.display().to_string(),
            Location::Remote(url) => url.as_str().to_owned(),
        }
    }

    pub fn exists(&self, relpath: &str) -> bool {
        match &self.location {
            Location::Local(root) => root.join(relpath).is_file(),
            Location::Remote(base) => base
                .join(relpath)
                .ok()
                .and_then(|url| self.client.head(url).send().ok())
                .map_or(false, |response| response.status().is_success()),
        }
    }

    /// Read one Arrow IPC table.
    pub fn read_table(&self, relpath: &str) -> Result<DataFrame> {
        let path = self.local_path(relpath)?;
        let file = File::open(&path)
            .with_context(|| format!("cannot open census table '{}'", path.display()))?;
        IpcReader::new(file)
            .finish()
            .with_context(|| format!("cannot read census table '{}'", path.display()))
    }

    /// Names of the entries under a snapshot directory, when the snapshot
    /// is local enough to enumerate.
    pub fn list_dir(&self, relpath: &str) -> Option<Vec<String>> {
        let Location::Local(root) = &self.location else {
            return None;
        };
        let entries = std::fs::read_dir(root.join(relpath)).ok()?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| Some(entry.ok()?.file_name().to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Some(names)
    }

    /// Path of a table on the local filesystem, fetching into the cache
    /// first when the snapshot is remote.
    fn local_path(&self, relpath: &str) -> Result<PathBuf> {
        match &self.location {
            Location::Local(root) => Ok(root.join(relpath)),
            Location::Remote(base) => {
                let url = base
                    .join(relpath)
                    .with_context(|| format!("invalid table path '{}'", relpath))?;
                let dest = self.cache_dir.join(relpath);
                fetch_url(&self.client, &url, &dest)?;
                Ok(dest)
            }
        }
    }
}

/// Download or copy the asset at `uri` to `dest`.
pub fn fetch_uri(uri: &str, dest: &Path, timeout: Duration) -> Result<()> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        let url = Url::parse(uri).with_context(|| format!("invalid uri '{}'", uri))?;
        fetch_url(&http_client(timeout)?, &url, dest)
    } else {
        let src = uri.strip_prefix("file://").unwrap_or(uri);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dest)
            .with_context(|| format!("cannot copy '{}' to '{}'", src, dest.display()))?;
        Ok(())
    }
}

fn fetch_url(client: &reqwest::blocking::Client, url: &Url, dest: &Path) -> Result<()> {
    debug!("fetching '{}'", url);
    let mut response = client
        .get(url.clone())
        .send()
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("cannot fetch '{}'", url))?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(dest)
        .with_context(|| format!("cannot create '{}'", dest.display()))?;
    std::io::copy(&mut response, &mut file)
        .with_context(|| format!("cannot write '{}'", dest.display()))?;
    file.flush()?;
    Ok(())
}
