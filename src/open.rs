use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use log::info;

use crate::census::Census;
use crate::filter::{CmpOp, Literal, ValueFilter};
use crate::release::{
    self, CensusLocator, CELL_CENSUS_MIRRORS_DIRECTORY_URL, CELL_CENSUS_RELEASE_DIRECTORY_URL,
};
use crate::store::{self, CensusStore};

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How to locate and open a census.
///
/// The defaults open the current stable release from the default mirror;
/// an explicit `uri` bypasses the release directory entirely.
#[derive(Debug, Clone)]
pub struct CensusOptions {
    pub version: Option<String>,
    pub uri: Option<String>,
    pub mirror: Option<String>,
    pub release_directory_url: String,
    pub mirrors_directory_url: String,
    pub cache_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for CensusOptions {
    fn default() -> Self {
        Self {
            version: Some("stable".to_owned()),
            uri: None,
            mirror: None,
            release_directory_url: CELL_CENSUS_RELEASE_DIRECTORY_URL.to_owned(),
            mirrors_directory_url: CELL_CENSUS_MIRRORS_DIRECTORY_URL.to_owned(),
            cache_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Open the named census release.
pub fn open(version: &str) -> Result<Census> {
    open_with(&CensusOptions {
        version: Some(version.to_owned()),
        ..Default::default()
    })
}

/// Open a census, fully parameterized.
pub fn open_with(options: &CensusOptions) -> Result<Census> {
    let uri = match &options.uri {
        Some(uri) => uri.clone(),
        None => resolve_soma_uri(options)?,
    };
    info!("opening census at '{}'", uri);
    let store = CensusStore::open(&uri, options.cache_dir.clone(), options.timeout)?;
    Ok(Census::new(store))
}

fn resolve_soma_uri(options: &CensusOptions) -> Result<String> {
    let description = resolve_description(options)?;
    let mirror = resolve_mirror(options)?;
    Ok(release::resolve_locator(&description.soma, Some(&mirror)))
}

fn resolve_description(options: &CensusOptions) -> Result<release::CensusVersionDescription> {
    let version = options
        .version
        .as_deref()
        .ok_or_else(|| anyhow!("Must specify either a census version or an explicit URI."))?;
    let client = store::http_client(options.timeout)?;
    let directory = release::fetch_release_directory(&client, &options.release_directory_url)?;
    release::lookup_version(&directory, version).cloned()
}

fn resolve_mirror(options: &CensusOptions) -> Result<release::Mirror> {
    let client = store::http_client(options.timeout)?;
    let mirrors = release::fetch_mirror_directory(&client, &options.mirrors_directory_url)?;
    mirrors.get(options.mirror.as_deref()).cloned()
}

/// Locator of the source h5ad asset behind one census dataset.
pub fn get_source_h5ad_uri(dataset_id: &str, options: &CensusOptions) -> Result<CensusLocator> {
    let description = resolve_description(options)?;
    let mirror = resolve_mirror(options)?;
    let census = open_with(options)?;
    let datasets = census.datasets()?;

    let matches = ValueFilter::Cmp {
        column: "dataset_id".to_owned(),
        op: CmpOp::Eq,
        value: Literal::Str(dataset_id.to_owned()),
    }
    .matches(&datasets)?;
    let row = *matches
        .first()
        .ok_or_else(|| anyhow!("dataset '{}' not found in census", dataset_id))?;

    let h5ad_path = datasets
        .column("dataset_h5ad_path")?
        .str()?
        .get(row)
        .ok_or_else(|| anyhow!("dataset '{}' has no h5ad path", dataset_id))?
        .to_owned();

    let base = release::resolve_locator(&description.h5ads, Some(&mirror));
    Ok(CensusLocator {
        uri: format!("{}/{}", base.trim_end_matches('/'), h5ad_path),
        relative_uri: None,
        region: description.h5ads.region.clone(),
    })
}

/// Download the source h5ad asset behind one census dataset.
pub fn download_source_h5ad(
    dataset_id: &str,
    to_path: &Path,
    options: &CensusOptions,
) -> Result<()> {
    ensure!(
        !to_path.exists(),
        "'{}' already exists",
        to_path.display()
    );
    let looks_like_dir = to_path
        .to_str()
        .map_or(false, |p| p.ends_with('/') || p.ends_with(std::path::MAIN_SEPARATOR));
    ensure!(
        !looks_like_dir && to_path.file_name().is_some(),
        "'{}' is not a regular file name",
        to_path.display()
    );

    let locator = get_source_h5ad_uri(dataset_id, options)?;
    store::fetch_uri(&locator.uri, to_path, options.timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_version_or_uri_is_required() {
        let options = CensusOptions {
            version: None,
            ..Default::default()
        };
        let err = open_with(&options).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Must specify either a census version or an explicit URI."
        );
    }

    #[test]
    fn an_explicit_uri_skips_the_release_directory() {
        // nothing exists at this path, but opening is lazy: the handle is
        // only bound to the location
        let options = CensusOptions {
            version: None,
            uri: Some("/nonexistent/census".to_owned()),
            ..Default::default()
        };
        let census = open_with(&options).unwrap();
        assert_eq!(census.uri(), "/nonexistent/census");
        assert!(census.summary().is_err());
    }

    #[test]
    fn download_refuses_existing_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("existing.h5ad");
        std::fs::write(&existing, b"x").unwrap();
        let err = download_source_h5ad("some-id", &existing, &CensusOptions::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("already exists"), "{}", err);
    }

    #[test]
    fn download_refuses_directory_destinations() {
        let err = download_source_h5ad(
            "some-id",
            Path::new("/tmp/dirname/"),
            &CensusOptions::default(),
        )
        .unwrap_err()
        .to_string();
        assert!(err.contains("not a regular file name"), "{}", err);
    }
}
