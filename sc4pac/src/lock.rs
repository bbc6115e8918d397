// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! `sc4pac-plugins-lock.json`: the database of what is actually installed.
//! It is only rewritten through [`PluginsLock::update_to`] while holding
//! the advisory file lock on the lockfile path.

use std::{
    collections::HashSet,
    os::fd::AsRawFd,
    path::PathBuf,
    sync::Arc,
};

use chrono::{DateTime, Utc};
use fs_err as fs;
use nix::fcntl::{flock, FlockArg};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::{
    package::{BareAsset, BareModule, Dep, DepAsset, DepModule},
    plan::UpdatePlan,
    profile::Profile,
    store,
    variant::Variant,
};

/// One installed module and the filesystem paths it produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledData {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub variant: Variant,
    /// Artifacts this module was extracted from
    #[serde(default)]
    pub assets: Vec<InstalledAsset>,
    /// Paths produced under the plugins root, relative
    #[serde(default)]
    pub files: Vec<String>,
}

impl InstalledData {
    pub fn module(&self) -> BareModule {
        BareModule::new(self.group.clone(), self.name.clone())
    }

    pub fn dep(&self) -> DepModule {
        DepModule {
            module: self.module(),
            version: self.version.clone(),
            variant: self.variant.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledAsset {
    pub asset_id: String,
    pub version: String,
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Sidecar checksum at install time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_sha256: Option<String>,
}

impl InstalledAsset {
    pub fn dep(&self) -> DepAsset {
        DepAsset {
            asset: BareAsset(self.asset_id.clone()),
            version: self.version.clone(),
            url: self.url.clone(),
            last_modified: self.last_modified,
            checksum_sha256: self.expected_sha256.clone(),
        }
    }
}

/// Top-level document of `sc4pac-plugins-lock.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsLock {
    #[serde(default)]
    pub installed: Vec<InstalledData>,
}

impl PluginsLock {
    /// The installed state as a dependency set: every module plus every
    /// asset any module was extracted from.
    pub fn installed_deps(&self) -> Vec<Dep> {
        let mut deps = Vec::new();
        let mut seen_assets = HashSet::new();

        for data in &self.installed {
            deps.push(Dep::Module(data.dep()));
            for asset in &data.assets {
                if seen_assets.insert(asset.asset_id.clone()) {
                    deps.push(Dep::Asset(asset.dep()));
                }
            }
        }

        deps
    }

    /// Paths recorded for an installed module
    pub fn files_of(&self, dep: &DepModule) -> Option<&[String]> {
        self.installed
            .iter()
            .find(|data| data.dep() == *dep)
            .map(|data| data.files.as_slice())
    }

    /// The next lock: everything in `plan.to_remove` dropped, the freshly
    /// staged entries appended.
    pub fn update_to(&self, plan: &UpdatePlan, new_entries: Vec<InstalledData>) -> PluginsLock {
        let removed: HashSet<DepModule> = plan
            .to_remove
            .iter()
            .filter_map(Dep::as_module)
            .cloned()
            .collect();

        let mut installed: Vec<InstalledData> = self
            .installed
            .iter()
            .filter(|data| !removed.contains(&data.dep()))
            .cloned()
            .collect();

        installed.extend(new_entries);
        installed.sort_by(|a, b| a.module().cmp(&b.module()));

        PluginsLock { installed }
    }
}

/// The lock document bound to its on-disk location, for CAS writes
#[derive(Debug)]
pub struct LockFile {
    pub data: PluginsLock,
    path: PathBuf,
    prior: Option<Value>,
}

impl LockFile {
    pub fn load(profile: &Profile) -> Result<Self, Error> {
        let path = profile.lock_path();
        let data = store::read(&path)?.unwrap_or_default();
        let prior = store::read_raw(&path)?;

        Ok(Self { data, path, prior })
    }

    /// Replace the document on disk. The expected prior is the content at
    /// load time; a concurrent rewrite surfaces as one internal retry
    /// against the re-read prior, then `Stale`.
    pub fn save(&mut self, data: PluginsLock) -> Result<(), Error> {
        match store::write(&self.path, &data, self.prior.as_ref()) {
            Err(store::Error::Stale) => {
                self.prior = store::read_raw(&self.path)?;
                store::write(&self.path, &data, self.prior.as_ref())?;
            }
            other => other?,
        }
        self.prior = store::read_raw(&self.path)?;
        self.data = data;
        Ok(())
    }
}

/// An acquired file lock guaranteeing a single writer for the whole
/// update. Released when all clones are dropped.
#[derive(Debug, Clone)]
#[allow(unused)]
pub struct Lock(Arc<fs::File>);

/// Acquire the advisory lock on the lockfile path. A lock held by another
/// process is an error, not a wait: one profile has one writer.
pub fn acquire(profile: &Profile) -> Result<Lock, Error> {
    let path = profile.lock_path();

    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&path)?;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(Lock(Arc::new(file))),
        Err(nix::errno::Errno::EWOULDBLOCK) => Err(Error::Locked(path)),
        Err(e) => Err(Error::Flock(e)),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("another sc4pac instance is already modifying this profile ({0:?})")]
    Locked(PathBuf),
    #[error("obtaining exclusive file lock")]
    Flock(#[source] nix::Error),
    #[error("store: {0}")]
    Store(#[from] store::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    fn installed(name: &str, version: &str, asset_version: &str) -> InstalledData {
        InstalledData {
            group: "memo".into(),
            name: name.into(),
            version: version.into(),
            variant: Variant::default(),
            assets: vec![InstalledAsset {
                asset_id: format!("{name}-asset"),
                version: asset_version.into(),
                url: Url::parse(&format!("https://example.org/{name}.zip")).unwrap(),
                last_modified: None,
                sha256: None,
                expected_sha256: None,
            }],
            files: vec![format!("150-mods/memo.{name}.{version}.sc4pac/file.dat")],
        }
    }

    #[test]
    fn round_trip_documented_format() {
        let json = r#"{
            "installed": [
                {
                    "group": "memo",
                    "name": "essential-fixes",
                    "version": "1.0.0",
                    "variant": {},
                    "files": ["150-mods/memo.essential-fixes.1.0.0.sc4pac/readme.txt"]
                }
            ]
        }"#;

        let lock: PluginsLock = serde_json::from_str(json).unwrap();
        assert_eq!(lock.installed.len(), 1);
        assert_eq!(lock.installed[0].module(), BareModule::new("memo", "essential-fixes"));
        assert!(lock.installed[0].assets.is_empty());

        let value = serde_json::to_value(&lock).unwrap();
        assert_eq!(value["installed"][0]["name"], "essential-fixes");
    }

    #[test]
    fn installed_deps_include_assets_once() {
        let mut a = installed("pkg-a", "1", "v1");
        let b = installed("pkg-b", "2", "v2");
        // Both modules share one asset
        a.assets[0].asset_id = "pkg-b-asset".into();
        a.assets[0].version = "v2".into();
        a.assets[0].url = b.assets[0].url.clone();

        let lock = PluginsLock {
            installed: vec![a, b],
        };
        let deps = lock.installed_deps();
        assert_eq!(deps.len(), 3);
        assert_eq!(deps.iter().filter(|d| d.as_asset().is_some()).count(), 1);
    }

    #[test]
    fn update_to_drops_removed_and_appends_new() {
        let old = PluginsLock {
            installed: vec![installed("pkg-a", "1", "v1"), installed("pkg-b", "2", "v2")],
        };

        let plan = UpdatePlan {
            to_install: vec![],
            to_reinstall: vec![],
            to_remove: vec![Dep::Module(old.installed[0].dep())],
        };

        let new = old.update_to(&plan, vec![installed("pkg-c", "3", "v3")]);
        let names: Vec<&str> = new.installed.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["pkg-b", "pkg-c"]);
    }

    #[test]
    fn lock_is_exclusive_per_profile() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::open(dir.path());

        let guard = acquire(&profile).unwrap();
        assert!(matches!(acquire(&profile), Err(Error::Locked(_))));
        drop(guard);
        assert!(acquire(&profile).is_ok());
    }
}
