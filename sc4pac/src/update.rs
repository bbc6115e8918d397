// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! The update pipeline: resolve (refining variants interactively), plan,
//! confirm, fetch, stage, publish. The profile's file lock is held for
//! the whole run; the only mutation of the live plugins tree happens in
//! the publish step at the very end.

use std::collections::HashMap;
use std::path::PathBuf;

use futures_util::{stream, StreamExt, TryStreamExt};
use log::info;
use thiserror::Error;
use tokio::task;

use crate::{
    cache::{Artifact, FileCache},
    channel::{self, CHANNEL_TTL},
    config::Plugins,
    extract::ZipExtractor,
    lock::{self, InstalledAsset, InstalledData, LockFile},
    package::{BareAsset, Dep, DepAsset},
    plan::UpdatePlan,
    profile::Profile,
    prompt::{self, Prompter},
    publish, resolver, stage, store,
};

/// Run a full update of the profile: make the plugins directory and the
/// lockfile match the configured explicit packages.
pub async fn update(profile: &Profile, prompter: &dyn Prompter, yes: bool) -> Result<(), Error> {
    let mut plugins = Plugins::load(profile)?;
    profile.ensure_dirs(&plugins.data.config)?;

    // Single writer across the entire update
    let guard = lock::acquire(profile)?;
    let mut lock_file = LockFile::load(profile)?;

    let cache = FileCache::new(profile.resolve(&plugins.data.config.cache_root))?;
    let repos = channel::load_all(&plugins.data.config.channels, &cache).await?;

    // Resolve, asking for one variant key at a time until the global
    // variant decides every package on the closure
    let resolution = loop {
        match resolver::resolve(
            &plugins.data.explicit,
            &plugins.data.config.variant,
            &repos,
            &cache,
        )
        .await?
        {
            resolver::Outcome::Resolved(resolution) => break resolution,
            resolver::Outcome::NeedsVariant(missing) => {
                let question = format!(
                    "{} {} requires a choice of {}",
                    missing.module, missing.version, missing.key
                );
                let value = prompter.choose(&question, &missing.values)?;
                plugins.data.config.variant.insert(missing.key, value);
            }
        }
    };

    // Keep the accumulated variant choices even when nothing is installed
    plugins.save()?;

    let installed = lock_file.data.installed_deps();
    let plan = UpdatePlan::from_resolution(&resolution, &installed);

    if plan.is_up_to_date() {
        println!("Everything is up to date.");
        return Ok(());
    }

    print_plan(&plan);

    if !yes && !prompter.confirm("Do you wish to continue?", true)? {
        return Err(Error::Abort);
    }

    // Fetch in reverse transitive order: leaves have the fewest own
    // dependencies, so partial progress is more useful on interruption
    let fetch_order: Vec<DepAsset> = plan.assets_to_fetch().rev().cloned().collect();
    let artifacts: HashMap<BareAsset, PathBuf> = stream::iter(fetch_order)
        .map(|asset| {
            let cache = &cache;
            async move {
                let artifact = Artifact {
                    url: asset.url.clone(),
                    changing: false,
                    last_modified: asset.last_modified,
                    checksum_sha256: asset.checksum_sha256.clone(),
                };
                let path = cache.file(&artifact, CHANNEL_TTL).await?;
                Ok::<_, Error>((asset.asset, path))
            }
        })
        .buffer_unordered(cache.max_parallel())
        .try_collect()
        .await?;

    // Stage sequentially into a scoped temp tree
    let temp_root = profile.resolve(&plugins.data.config.temp_root);
    let modules: Vec<_> = plan.modules_to_install().cloned().collect();
    let staged = task::block_in_place(|| {
        stage::stage(&temp_root, &resolution, &modules, &artifacts, &ZipExtractor)
    })?;

    if staged.had_warnings && !yes && !prompter.confirm("Continue despite warnings?", true)? {
        return Err(Error::Abort);
    }

    let entries = installed_entries(&resolution, &staged.files, &artifacts);

    let plugins_root = profile.resolve(&plugins.data.config.plugins_root);
    publish::publish(
        &guard,
        &plugins_root,
        &staged.plugins_root(),
        &staged.files,
        &plan,
        &mut lock_file,
        entries,
    )?;

    info!("update finished");
    Ok(())
}

/// Lock entries for the freshly staged modules, with the sidecar checksum
/// of each artifact recorded at install time.
fn installed_entries(
    resolution: &resolver::Resolution,
    staged_files: &[(crate::package::DepModule, Vec<String>)],
    artifacts: &HashMap<BareAsset, PathBuf>,
) -> Vec<InstalledData> {
    staged_files
        .iter()
        .filter_map(|(module, files)| {
            let package = resolution.package(&module.module)?;

            let assets = package
                .assets
                .iter()
                .map(|(_, asset)| InstalledAsset {
                    asset_id: asset.asset.0.clone(),
                    version: asset.version.clone(),
                    url: asset.url.clone(),
                    last_modified: asset.last_modified,
                    sha256: artifacts
                        .get(&asset.asset)
                        .and_then(|path| FileCache::read_check(path))
                        .map(|check| check.checksum.sha256),
                    expected_sha256: asset.checksum_sha256.clone(),
                })
                .collect();

            Some(InstalledData {
                group: module.module.group.clone(),
                name: module.module.name.clone(),
                version: module.version.clone(),
                variant: module.variant.clone(),
                assets,
                files: files.clone(),
            })
        })
        .collect()
}

fn print_plan(plan: &UpdatePlan) {
    let removed: Vec<_> = plan
        .to_remove
        .iter()
        .filter(|d| {
            // Reinstalls show up under "reinstall" only
            !plan
                .to_reinstall
                .iter()
                .any(|m| matches!(d, Dep::Module(dm) if dm == m))
        })
        .collect();

    if !removed.is_empty() {
        println!("The following packages will be removed:");
        for dep in &removed {
            println!("  {dep}");
        }
    }
    if !plan.to_reinstall.is_empty() {
        println!("The following packages will be reinstalled:");
        for dep in &plan.to_reinstall {
            println!("  {dep}");
        }
    }

    let installed: Vec<_> = plan
        .to_install
        .iter()
        .filter(|d| {
            !plan
                .to_reinstall
                .iter()
                .any(|m| matches!(d, Dep::Module(dm) if dm == m))
        })
        .collect();

    if !installed.is_empty() {
        println!("The following packages will be installed:");
        for dep in &installed {
            println!("  {dep}");
        }
    }
    println!();
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("aborted by user")]
    Abort,
    #[error(transparent)]
    Prompt(#[from] prompt::Error),
    #[error(transparent)]
    Channel(#[from] channel::Error),
    #[error(transparent)]
    Resolver(#[from] resolver::Error),
    #[error(transparent)]
    Cache(#[from] crate::cache::Error),
    #[error(transparent)]
    Stage(#[from] stage::Error),
    #[error(transparent)]
    Publish(#[from] publish::Error),
    #[error(transparent)]
    Lock(#[from] lock::Error),
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
