// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use std::path::{Path, PathBuf};

use fs_err as fs;
use log::trace;

/// A profile directory holding one plugins config, one plugins lockfile,
/// and the associated cache, temp and plugins roots.
#[derive(Debug, Clone)]
pub struct Profile {
    pub root: PathBuf,
}

impl Profile {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        trace!("profile root: {root:?}");
        Self { root }
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("sc4pac-plugins.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("sc4pac-plugins-lock.json")
    }

    /// Resolve a configured root against the profile directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.root.join(path)
        }
    }

    /// Default cache location for fresh profiles
    pub fn default_cache_root() -> PathBuf {
        dirs::cache_dir()
            .map(|dir| dir.join("sc4pac"))
            .unwrap_or_else(|| PathBuf::from("cache"))
    }

    /// Ensure the configured roots exist
    pub fn ensure_dirs(&self, config: &crate::config::PluginsConfig) -> std::io::Result<()> {
        for dir in [
            self.resolve(&config.plugins_root),
            self.resolve(&config.cache_root),
            self.resolve(&config.temp_root),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
