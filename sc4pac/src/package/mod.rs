// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::variant::Variant;

pub use self::meta::{AssetReference, ChannelIndex, ChannelItem, Info, PackageMeta, VariantData};

pub mod meta;
pub mod version;

/// Identity of a package: `group:name`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BareModule {
    pub group: String,
    pub name: String,
}

impl BareModule {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for BareModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

impl FromStr for BareModule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (group, name) = s.split_once(':').ok_or_else(|| ParseError(s.to_owned()))?;

        let well_formed = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        };

        if !well_formed(group) || !well_formed(name) {
            return Err(ParseError(s.to_owned()));
        }

        Ok(Self::new(group, name))
    }
}

/// Identity of a downloadable artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BareAsset(pub String);

impl fmt::Display for BareAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A module resolved to a concrete version and variant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepModule {
    pub module: BareModule,
    pub version: String,
    pub variant: Variant,
}

impl DepModule {
    /// On-disk folder name: `group.name[.v1-v2…].version.sc4pac`,
    /// variant values sorted by key.
    pub fn folder_name(&self) -> String {
        let BareModule { group, name } = &self.module;

        let tokens = self.variant.values().collect::<Vec<_>>().join("-");

        if tokens.is_empty() {
            format!("{group}.{name}.{}.sc4pac", self.version)
        } else {
            format!("{group}.{name}.{tokens}.{}.sc4pac", self.version)
        }
    }
}

impl fmt::Display for DepModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.module, self.version)
    }
}

/// An asset resolved to a concrete artifact URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DepAsset {
    pub asset: BareAsset,
    pub version: String,
    pub url: Url,
    pub last_modified: Option<DateTime<Utc>>,
    pub checksum_sha256: Option<String>,
}

impl fmt::Display for DepAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.asset, self.version)
    }
}

/// A resolved dependency, either a module to install or an artifact to fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dep {
    Module(DepModule),
    Asset(DepAsset),
}

impl Dep {
    pub fn as_module(&self) -> Option<&DepModule> {
        match self {
            Dep::Module(m) => Some(m),
            Dep::Asset(_) => None,
        }
    }

    pub fn as_asset(&self) -> Option<&DepAsset> {
        match self {
            Dep::Module(_) => None,
            Dep::Asset(a) => Some(a),
        }
    }
}

impl fmt::Display for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dep::Module(m) => m.fmt(f),
            Dep::Asset(a) => a.fmt(f),
        }
    }
}

impl From<DepModule> for Dep {
    fn from(dep: DepModule) -> Self {
        Dep::Module(dep)
    }
}

impl From<DepAsset> for Dep {
    fn from(dep: DepAsset) -> Self {
        Dep::Asset(dep)
    }
}

#[derive(Debug, Error)]
#[error("malformed package identifier: {0:?}, expected `group:name`")]
pub struct ParseError(pub String);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_bare_module() {
        let module = "memo:essential-fixes".parse::<BareModule>().unwrap();
        assert_eq!(module, BareModule::new("memo", "essential-fixes"));
        assert_eq!(module.to_string(), "memo:essential-fixes");

        assert!("essential-fixes".parse::<BareModule>().is_err());
        assert!("memo:".parse::<BareModule>().is_err());
        assert!(":name".parse::<BareModule>().is_err());
        assert!("Memo:Fixes".parse::<BareModule>().is_err());
    }

    #[test]
    fn folder_name_without_variant() {
        let dep = DepModule {
            module: BareModule::new("memo", "essential-fixes"),
            version: "1.0.0".into(),
            variant: Variant::default(),
        };
        assert_eq!(dep.folder_name(), "memo.essential-fixes.1.0.0.sc4pac");
    }

    #[test]
    fn folder_name_sorts_variant_tokens_by_key() {
        let variant = Variant::from_iter([("nightmode", "dark"), ("driveside", "right")]);
        let dep = DepModule {
            module: BareModule::new("memo", "roads"),
            version: "2.0".into(),
            variant,
        };
        // keys in order: driveside, nightmode
        assert_eq!(dep.folder_name(), "memo.roads.right-dark.2.0.sc4pac");
    }
}
