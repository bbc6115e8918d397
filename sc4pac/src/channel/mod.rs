// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! A channel is a named source of package metadata: a URL root serving a
//! contents index plus per-package metadata documents, or a single YAML
//! file carrying the whole channel in place.

use std::{collections::HashMap, time::Duration};

use futures_util::{stream, StreamExt};
use log::warn;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{
    cache::{Artifact, DownloadError, FileCache},
    package::{
        meta::ASSET_TYPE, version, BareAsset, BareModule, ChannelIndex, ChannelItem, DepAsset,
        PackageMeta,
    },
    store,
};

/// Filename of the channel contents index under a channel root
pub const CHANNEL_CONTENTS_FILENAME: &str = "sc4pac-channel-contents.json";

/// Revalidation interval for channel indexes and metadata
pub const CHANNEL_TTL: Duration = Duration::from_secs(30 * 60);

/// In-memory view over one channel's index; package metadata is fetched
/// on demand through the cache.
#[derive(Debug)]
pub struct MetadataRepository {
    pub url: Url,
    index: ChannelIndex,
    /// Populated for single-YAML-file channels only
    inline_metadata: HashMap<(BareModule, String), PackageMeta>,
}

impl MetadataRepository {
    /// Fetch the channel index and build the repository view.
    pub async fn create(url: Url, cache: &FileCache) -> Result<Self, Error> {
        if is_yaml_channel(&url) {
            return Self::create_from_yaml(url, cache).await;
        }

        let index_url = url.join(CHANNEL_CONTENTS_FILENAME)?;
        let path = cache.file(&Artifact::changing(index_url), CHANNEL_TTL).await?;
        let index: ChannelIndex = store::read(&path)?.ok_or(Error::EmptyIndex)?;

        Ok(Self {
            url,
            index,
            inline_metadata: HashMap::new(),
        })
    }

    /// Single-file bypass: the URL points directly at a YAML file holding
    /// package and asset documents, which is parsed in place.
    async fn create_from_yaml(url: Url, cache: &FileCache) -> Result<Self, Error> {
        let path = cache.file(&Artifact::changing(url.clone()), CHANNEL_TTL).await?;
        let text = fs_err::read_to_string(&path)?;

        let mut packages = Vec::new();
        let mut inline_metadata = HashMap::new();

        for document in serde_yaml::Deserializer::from_str(&text) {
            match ChannelDocument::deserialize(document)? {
                ChannelDocument::Asset(item) => {
                    packages.push(ChannelItem {
                        kind: Some(ASSET_TYPE.to_owned()),
                        group: String::new(),
                        name: item.asset_id,
                        version: item.version,
                        summary: String::new(),
                        url: Some(item.url),
                        last_modified: item.last_modified,
                        checksum: item.checksum,
                    });
                }
                ChannelDocument::Package(meta) => {
                    packages.push(ChannelItem {
                        group: meta.group.clone(),
                        name: meta.name.clone(),
                        version: meta.version.clone(),
                        summary: meta.info.summary.clone(),
                        kind: None,
                        url: None,
                        last_modified: None,
                        checksum: None,
                    });
                    inline_metadata.insert((meta.module(), meta.version.clone()), meta);
                }
            }
        }

        Ok(Self {
            url,
            index: ChannelIndex { packages },
            inline_metadata,
        })
    }

    /// Build a repository view over already-loaded documents.
    #[cfg(test)]
    pub(crate) fn from_documents(
        url: Url,
        index: ChannelIndex,
        metadata: impl IntoIterator<Item = PackageMeta>,
    ) -> Self {
        Self {
            url,
            index,
            inline_metadata: metadata
                .into_iter()
                .map(|meta| ((meta.module(), meta.version.clone()), meta))
                .collect(),
        }
    }

    /// Finite lazy sequence over current index contents
    pub fn iterate_channel_contents(&self) -> impl Iterator<Item = &ChannelItem> {
        self.index.packages.iter()
    }

    /// Latest published version of `module` in this channel
    pub fn latest_version_of(&self, module: &BareModule) -> Option<&str> {
        version::latest(
            self.index
                .packages
                .iter()
                .filter(|item| !item.is_asset() && item.module() == *module)
                .map(|item| item.version.as_str()),
        )
    }

    /// Look up an asset by id. The 1:1 mapping from asset id to artifact
    /// URL is a precondition of the channel format; a channel violating
    /// it fails loudly here.
    pub fn asset(&self, asset: &BareAsset) -> Result<Option<DepAsset>, Error> {
        let mut declarations = self
            .index
            .packages
            .iter()
            .filter(|item| item.is_asset() && item.name == asset.0);

        let Some(item) = declarations.next() else {
            return Ok(None);
        };

        if declarations.next().is_some() {
            return Err(Error::AmbiguousAsset(asset.clone()));
        }

        let url = item
            .url
            .clone()
            .ok_or_else(|| Error::AssetWithoutUrl(asset.clone()))?;

        Ok(Some(DepAsset {
            asset: asset.clone(),
            version: item.version.clone(),
            url,
            last_modified: item.last_modified,
            checksum_sha256: item.checksum.as_ref().map(|c| c.sha256.clone()),
        }))
    }

    /// Fetch the metadata document for `(module, version)`; `None` if this
    /// channel does not publish it.
    pub async fn package_meta(
        &self,
        module: &BareModule,
        version: &str,
        cache: &FileCache,
    ) -> Result<Option<PackageMeta>, Error> {
        if !self.inline_metadata.is_empty() {
            return Ok(self
                .inline_metadata
                .get(&(module.clone(), version.to_owned()))
                .cloned());
        }

        let url = self.metadata_url(module, version)?;
        let path = match cache.file(&Artifact::changing(url), CHANNEL_TTL).await {
            Ok(path) => path,
            Err(crate::cache::Error::Download {
                source: DownloadError::NotFound,
                ..
            }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(store::read(&path)?)
    }

    fn metadata_url(&self, module: &BareModule, version: &str) -> Result<Url, Error> {
        Ok(self.url.join(&format!(
            "metadata/{}/{}/{}/pkg.json",
            module.group, module.name, version
        ))?)
    }
}

/// Load all configured channels, in priority order. Channels that fail to
/// load are skipped with a warning; if every channel fails the whole
/// operation fails.
pub async fn load_all(
    urls: &[Url],
    cache: &FileCache,
) -> Result<Vec<MetadataRepository>, Error> {
    if urls.is_empty() {
        return Err(Error::NoChannels);
    }

    let results = stream::iter(urls.iter().cloned())
        .map(|url| MetadataRepository::create(url, cache))
        .buffered(cache.max_parallel())
        .collect::<Vec<_>>()
        .await;

    let mut repositories = Vec::new();
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(repo) => repositories.push(repo),
            Err(e) => warn!("channel {url} unavailable: {e}"),
        }
    }

    if repositories.is_empty() {
        return Err(Error::ChannelsNotAvailable);
    }

    Ok(repositories)
}

/// Channel URLs are directory roots and carry a single trailing slash,
/// except when they point directly at a YAML file.
pub fn normalize_channel_url(url: &Url) -> Result<Url, Error> {
    if is_yaml_channel(url) {
        return Ok(url.clone());
    }

    let mut normalized = url.clone();
    let path = normalized.path().trim_end_matches('/').to_owned();
    normalized.set_path(&format!("{path}/"));
    Ok(normalized)
}

fn is_yaml_channel(url: &Url) -> bool {
    std::path::Path::new(url.path())
        .extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChannelDocument {
    Asset(AssetDocument),
    Package(PackageMeta),
}

/// Asset declaration inside a single-file YAML channel
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetDocument {
    asset_id: String,
    version: String,
    url: Url,
    #[serde(default)]
    last_modified: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    checksum: Option<crate::cache::Checksum>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no channels configured; run `sc4pac channel add <url>` first")]
    NoChannels,
    #[error("every configured channel failed to load")]
    ChannelsNotAvailable,
    #[error("channel index is empty or malformed")]
    EmptyIndex,
    #[error("asset {0} is declared more than once in one channel")]
    AmbiguousAsset(BareAsset),
    #[error("asset {0} has no artifact url")]
    AssetWithoutUrl(BareAsset),
    #[error("invalid channel url: {0}")]
    Url(#[from] url::ParseError),
    #[error("yaml channel: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("cache: {0}")]
    Cache(#[from] crate::cache::Error),
    #[error("store: {0}")]
    Store(#[from] store::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_urls_are_normalized_with_one_trailing_slash() {
        let url = Url::parse("https://example.org/channel").unwrap();
        assert_eq!(
            normalize_channel_url(&url).unwrap().as_str(),
            "https://example.org/channel/"
        );

        let url = Url::parse("https://example.org/channel///").unwrap();
        assert_eq!(
            normalize_channel_url(&url).unwrap().as_str(),
            "https://example.org/channel/"
        );

        let yaml = Url::parse("https://example.org/channel.yaml").unwrap();
        assert_eq!(normalize_channel_url(&yaml).unwrap(), yaml);
    }

    #[test]
    fn yaml_documents_distinguish_assets_from_packages() {
        let yaml = r#"
assetId: big-archive
version: "2.0.0"
url: "https://example.org/big.zip"
"#;
        let doc: ChannelDocument = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(doc, ChannelDocument::Asset(_)));

        let yaml = r#"
group: memo
name: essential-fixes
version: "1.0.0"
subfolder: 150-mods
variants:
  - variant: {}
"#;
        let doc: ChannelDocument = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(doc, ChannelDocument::Package(_)));
    }
}
