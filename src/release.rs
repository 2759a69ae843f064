//! The census release directory and its mirrors.
//!
//! A release directory maps version names ("2023-07-25", plus aliases such
//! as "stable" and "latest") to the locators of one released census build.
//! A mirror directory names the hosts a build can be fetched from. Both are
//! small JSON documents served over HTTPS.

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};

pub const CELL_CENSUS_RELEASE_DIRECTORY_URL: &str =
    "https://census.cellxgene.cziscience.com/cellxgene-census/v1/release.json";
pub const CELL_CENSUS_MIRRORS_DIRECTORY_URL: &str =
    "https://census.cellxgene.cziscience.com/cellxgene-census/v1/mirrors.json";

/// Where one released artifact lives: an absolute `uri`, and optionally a
/// `relative_uri` to be composed with a mirror's base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusLocator {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusVersionDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    pub release_build: String,
    /// The queryable census snapshot.
    pub soma: CensusLocator,
    /// The source assets the snapshot was built from.
    pub h5ads: CensusLocator,
}

/// Version name -> release description, aliases resolved, directory order
/// preserved.
pub type ReleaseDirectory = IndexMap<String, CensusVersionDescription>;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum DirectoryEntry {
    Alias(String),
    Description(CensusVersionDescription),
}

/// Parse a release directory document, resolving aliases.
pub fn parse_release_directory(json: &str) -> Result<ReleaseDirectory> {
    let raw: IndexMap<String, DirectoryEntry> =
        serde_json::from_str(json).context("cannot parse census release directory")?;
    raw.keys()
        .map(|name| {
            let mut target = name.as_str();
            for _ in 0..raw.len() {
                match raw.get(target) {
                    Some(DirectoryEntry::Alias(next)) => target = next,
                    Some(DirectoryEntry::Description(desc)) => {
                        return Ok((name.clone(), desc.clone()))
                    }
                    None => bail!("census release alias '{}' points at nothing", target),
                }
            }
            bail!("census release alias '{}' forms a cycle", name)
        })
        .collect()
}

/// Look up a version, resolving the `stable` -> `latest` fallback used
/// before the first stable build of a cycle is published.
pub fn lookup_version<'a>(
    directory: &'a ReleaseDirectory,
    version: &str,
) -> Result<&'a CensusVersionDescription> {
    if let Some(desc) = directory.get(version) {
        return Ok(desc);
    }
    if version == "stable" {
        if let Some(desc) = directory.get("latest") {
            warn!("no stable census release; falling back to latest");
            return Ok(desc);
        }
    }
    bail!(
        "The \"{}\" Census version is not valid. Use get_census_version_directory() to retrieve available versions.",
        version
    )
}

/// A host census builds can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mirror {
    pub protocol: String,
    pub base_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorDirectory {
    default: String,
    mirrors: IndexMap<String, Mirror>,
}

impl MirrorDirectory {
    pub fn parse(json: &str) -> Result<Self> {
        let mut raw: IndexMap<String, serde_json::Value> =
            serde_json::from_str(json).context("cannot parse census mirror directory")?;
        let default = raw
            .shift_remove("default")
            .and_then(|v| v.as_str().map(str::to_owned))
            .ok_or_else(|| anyhow!("census mirror directory has no default mirror"))?;
        let mirrors = raw
            .into_iter()
            .map(|(name, value)| {
                let mirror: Mirror = serde_json::from_value(value)
                    .with_context(|| format!("cannot parse mirror '{}'", name))?;
                Ok((name, mirror))
            })
            .collect::<Result<_>>()?;
        Ok(Self { default, mirrors })
    }

    /// The named mirror, or the directory's default.
    pub fn get(&self, name: Option<&str>) -> Result<&Mirror> {
        let name = name.unwrap_or(&self.default);
        self.mirrors.get(name).ok_or_else(|| anyhow!("Mirror not found."))
    }
}

/// Final URI of a locator: its `relative_uri` grafted onto the mirror's
/// base when both are present, its absolute `uri` otherwise.
pub fn resolve_locator(locator: &CensusLocator, mirror: Option<&Mirror>) -> String {
    match (&locator.relative_uri, mirror) {
        (Some(relative), Some(mirror)) => {
            let base = mirror.base_uri.trim_end_matches('/');
            if relative.starts_with('/') {
                format!("{}{}", base, relative)
            } else {
                format!("{}/{}", base, relative)
            }
        }
        _ => locator.uri.clone(),
    }
}

/// Fetch and parse the release directory at `url`.
pub(crate) fn fetch_release_directory(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<ReleaseDirectory> {
    let body = fetch(client, url)?;
    parse_release_directory(&body)
}

pub(crate) fn fetch_mirror_directory(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<MirrorDirectory> {
    let body = fetch(client, url)?;
    MirrorDirectory::parse(&body)
}

/// Directory documents normally live behind HTTPS, but a local path works
/// too (air-gapped mirrors, tests).
fn fetch(client: &reqwest::blocking::Client, url: &str) -> Result<String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .with_context(|| format!("cannot fetch '{}'", url))
    } else {
        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read_to_string(path).with_context(|| format!("cannot read '{}'", path))
    }
}

/// Fetch the default release directory.
pub fn get_census_version_directory() -> Result<ReleaseDirectory> {
    let client = crate::store::http_client(crate::open::DEFAULT_TIMEOUT)?;
    fetch_release_directory(&client, CELL_CENSUS_RELEASE_DIRECTORY_URL)
}

/// Fetch the default release directory and describe one version.
pub fn get_census_version_description(version: &str) -> Result<CensusVersionDescription> {
    let directory = get_census_version_directory()?;
    lookup_version(&directory, version).cloned()
}
