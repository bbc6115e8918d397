// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! Staging extracts the packages of an update plan into a scoped temporary
//! plugins tree. The staging directory is removed on every exit path,
//! successful or not; only the publish step touches the live tree.

use std::{collections::HashMap, path::{Path, PathBuf}};

use fs_err as fs;
use log::{info, warn};
use tempfile::TempDir;
use thiserror::Error;

use crate::{
    extract::{Extractor, FileFilter},
    package::{BareAsset, DepModule},
    resolver::Resolution,
};

/// Result of staging: the scoped staging root plus the subpaths produced
/// per module, relative to the plugins root.
pub struct StageResult {
    staging: TempDir,
    pub files: Vec<(DepModule, Vec<String>)>,
    pub had_warnings: bool,
}

impl StageResult {
    /// The staged plugins tree (`<staging>/plugins`)
    pub fn plugins_root(&self) -> PathBuf {
        self.staging.path().join("plugins")
    }
}

/// Extract every module into a fresh staging tree under `temp_root`.
/// Extraction is sequential; it is disk-bound and ordering keeps progress
/// output readable.
pub fn stage(
    temp_root: &Path,
    resolution: &Resolution,
    modules: &[DepModule],
    artifacts: &HashMap<BareAsset, PathBuf>,
    extractor: &dyn Extractor,
) -> Result<StageResult, Error> {
    fs::create_dir_all(temp_root)?;
    let staging = tempfile::Builder::new()
        .prefix("staging-")
        .tempdir_in(temp_root)?;

    let plugins = staging.path().join("plugins");
    let mut files = Vec::new();
    let mut had_warnings = false;

    for module in modules {
        let package = resolution
            .package(&module.module)
            .ok_or_else(|| Error::NotInResolution(module.clone()))?;

        let folder = package_subpath(&package.subfolder, &module.folder_name());
        let target = plugins.join(&folder);
        fs::create_dir_all(&target)?;

        info!("staging {module}");

        for (reference, asset) in &package.assets {
            let archive = artifacts
                .get(&asset.asset)
                .ok_or_else(|| Error::MissingArtifact(asset.asset.clone()))?;

            let filter = FileFilter::new(&reference.include, &reference.exclude)?;
            extractor.extract(archive, &target, &filter)?;
        }

        if let Some(warning) = &package.warning {
            warn!("{module}: {warning}");
            had_warnings = true;
        }

        files.push((module.clone(), vec![folder]));
    }

    Ok(StageResult {
        staging,
        files,
        had_warnings,
    })
}

/// Relative path of a package folder under the plugins root
fn package_subpath(subfolder: &str, folder_name: &str) -> String {
    let subfolder = subfolder.trim_matches('/');
    if subfolder.is_empty() {
        folder_name.to_owned()
    } else {
        format!("{subfolder}/{folder_name}")
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("module is not part of the resolution: {0}")]
    NotInResolution(DepModule),
    #[error("no artifact fetched for asset {0}")]
    MissingArtifact(BareAsset),
    #[error(transparent)]
    Extraction(#[from] crate::extract::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
