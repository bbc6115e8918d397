// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! `sc4pac-plugins.json`: the declarative description of what the user
//! wants installed, plus the roots and channels everything else hangs off.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::{package::BareModule, profile::Profile, store, variant::Variant};

/// Persistent configuration of one profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsConfig {
    pub plugins_root: PathBuf,
    pub cache_root: PathBuf,
    pub temp_root: PathBuf,
    /// Channel URLs in priority order (first wins)
    #[serde(default)]
    pub channels: Vec<Url>,
    /// The user's accumulated variant choices
    #[serde(default)]
    pub variant: Variant,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            plugins_root: PathBuf::from("plugins"),
            cache_root: Profile::default_cache_root(),
            temp_root: PathBuf::from("temp"),
            channels: Vec::new(),
            variant: Variant::default(),
        }
    }
}

/// Top-level document of `sc4pac-plugins.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsData {
    pub config: PluginsConfig,
    /// Directly requested packages; their dependencies are implicit
    #[serde(default)]
    pub explicit: Vec<BareModule>,
}

impl PluginsData {
    pub fn add_explicit(&mut self, module: BareModule) -> bool {
        if self.explicit.contains(&module) {
            false
        } else {
            self.explicit.push(module);
            self.explicit.sort();
            true
        }
    }

    pub fn remove_explicit(&mut self, module: &BareModule) -> bool {
        let before = self.explicit.len();
        self.explicit.retain(|m| m != module);
        self.explicit.len() != before
    }
}

/// The config document bound to its on-disk location, carrying the raw
/// prior value for compare-and-swap saves.
#[derive(Debug)]
pub struct Plugins {
    pub data: PluginsData,
    path: PathBuf,
    prior: Option<Value>,
}

impl Plugins {
    /// Load the profile's config, initializing a default one on first use.
    pub fn load(profile: &Profile) -> Result<Self, store::Error> {
        let path = profile.config_path();
        let data = store::read_or_init(&path, PluginsData::default)?;
        let prior = store::read_raw(&path)?;

        Ok(Self { data, path, prior })
    }

    /// Load without initializing; `None` when no config exists yet.
    pub fn find(profile: &Profile) -> Result<Option<Self>, store::Error> {
        let path = profile.config_path();
        let Some(data) = store::read(&path)? else {
            return Ok(None);
        };
        let prior = store::read_raw(&path)?;

        Ok(Some(Self { data, path, prior }))
    }

    /// Persist the current document. A concurrent edit surfaces as one
    /// internal retry against the re-read prior, then `Stale`.
    pub fn save(&mut self) -> Result<(), store::Error> {
        match store::write(&self.path, &self.data, self.prior.as_ref()) {
            Err(store::Error::Stale) => {
                self.prior = store::read_raw(&self.path)?;
                store::write(&self.path, &self.data, self.prior.as_ref())?;
            }
            other => other?,
        }
        self.prior = store::read_raw(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trip_documented_format() {
        let json = r#"{
            "config": {
                "pluginsRoot": "plugins",
                "cacheRoot": "cache",
                "tempRoot": "temp",
                "channels": ["https://example.org/channel/"],
                "variant": { "driveside": "right" }
            },
            "explicit": [{ "group": "memo", "name": "essential-fixes" }]
        }"#;

        let data: PluginsData = serde_json::from_str(json).unwrap();
        assert_eq!(data.config.plugins_root, PathBuf::from("plugins"));
        assert_eq!(data.config.channels.len(), 1);
        assert_eq!(data.config.variant.get("driveside"), Some("right"));
        assert_eq!(data.explicit, vec![BareModule::new("memo", "essential-fixes")]);

        let serialized = serde_json::to_value(&data).unwrap();
        assert_eq!(serialized["config"]["pluginsRoot"], "plugins");
        assert_eq!(serialized["explicit"][0]["group"], "memo");
    }

    #[test]
    fn explicit_set_semantics() {
        let mut data = PluginsData::default();
        let module = BareModule::new("memo", "essential-fixes");

        assert!(data.add_explicit(module.clone()));
        assert!(!data.add_explicit(module.clone()));
        assert!(data.remove_explicit(&module));
        assert!(!data.remove_explicit(&module));
    }
}
