// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! The JSON documents served by a channel: the contents index and the
//! per-package metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::package::BareModule;
use crate::variant::Variant;

/// Reserved `type` tag distinguishing assets from modules in the index
pub const ASSET_TYPE: &str = "sc4pac-asset";

/// `sc4pac-channel-contents.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelIndex {
    pub packages: Vec<ChannelItem>,
}

/// One entry of the channel contents index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelItem {
    #[serde(default)]
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub summary: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Artifact location, assets only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Expected artifact checksum, assets only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<crate::cache::Checksum>,
}

impl ChannelItem {
    pub fn is_asset(&self) -> bool {
        self.kind.as_deref() == Some(ASSET_TYPE)
    }

    pub fn module(&self) -> BareModule {
        BareModule::new(self.group.clone(), self.name.clone())
    }
}

/// `metadata/<group>/<name>/<version>/pkg.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMeta {
    pub group: String,
    pub name: String,
    pub version: String,
    /// Relative path under the plugins root the package installs into
    #[serde(default)]
    pub subfolder: String,
    #[serde(default)]
    pub info: Info,
    /// Non-empty; one entry per realization of the package
    pub variants: Vec<VariantData>,
}

impl PackageMeta {
    pub fn module(&self) -> BareModule {
        BareModule::new(self.group.clone(), self.name.clone())
    }

    /// All declared variant value-tuples, in declaration order
    pub fn declared_variants(&self) -> Vec<Variant> {
        self.variants.iter().map(|v| v.variant.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Info {
    pub summary: String,
    pub description: String,
    pub warning: String,
    pub author: String,
    pub website: String,
    pub conflicts: String,
}

/// One realization of a package: a variant value-tuple bound to the assets
/// it extracts from and the modules it depends on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantData {
    #[serde(default)]
    pub variant: Variant,
    #[serde(default)]
    pub dependencies: Vec<BareModule>,
    #[serde(default)]
    pub assets: Vec<AssetReference>,
}

/// Reference from a package variant to an asset archive, with the filter
/// deciding which archive paths are extracted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReference {
    pub asset_id: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deserialize_index() {
        let json = r#"{
            "packages": [
                { "group": "memo", "name": "essential-fixes", "version": "1.0.0", "summary": "Fixes" },
                { "name": "big-archive", "version": "2.0.0", "type": "sc4pac-asset",
                  "url": "https://example.org/big.zip", "lastModified": "2024-05-01T12:00:00Z" }
            ]
        }"#;

        let index: ChannelIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.packages.len(), 2);
        assert!(!index.packages[0].is_asset());
        assert!(index.packages[1].is_asset());
        assert!(index.packages[1].url.is_some());
        assert!(index.packages[1].last_modified.is_some());
    }

    #[test]
    fn deserialize_package_meta() {
        let json = r#"{
            "group": "memo", "name": "essential-fixes", "version": "1.0.0",
            "subfolder": "150-mods",
            "info": { "summary": "Fixes", "warning": "backup first" },
            "variants": [
                {
                    "variant": { "driveside": "right" },
                    "dependencies": [ { "group": "bsc", "name": "common" } ],
                    "assets": [ { "assetId": "big-archive", "include": ["**/*.dat"] } ]
                }
            ]
        }"#;

        let meta: PackageMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.module(), BareModule::new("memo", "essential-fixes"));
        assert_eq!(meta.subfolder, "150-mods");
        assert_eq!(meta.info.warning, "backup first");
        assert_eq!(meta.variants[0].dependencies[0], BareModule::new("bsc", "common"));
        assert_eq!(meta.variants[0].assets[0].asset_id, "big-archive");
        assert!(meta.variants[0].assets[0].exclude.is_empty());
    }
}
