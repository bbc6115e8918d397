// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! The atomic step of an update: obsolete trees are removed, staged trees
//! are moved into the live plugins directory, and the lockfile is
//! rewritten to reflect what is actually on disk. Partial successes are
//! not rolled back; failed packages are surfaced for manual intervention.

use std::path::Path;

use fs_err as fs;
use log::{info, warn};
use thiserror::Error;

use crate::{
    lock::{self, InstalledData, LockFile},
    package::{Dep, DepModule},
    plan::UpdatePlan,
};

/// Carry out the plan against the live plugins root. The caller holds the
/// profile's file lock for the whole update; passing it here keeps that
/// explicit.
pub fn publish(
    _lock: &lock::Lock,
    plugins_root: &Path,
    staged_plugins: &Path,
    staged_files: &[(DepModule, Vec<String>)],
    plan: &UpdatePlan,
    lock_file: &mut LockFile,
    new_entries: Vec<InstalledData>,
) -> Result<(), Error> {
    // Removals precede moves: reinstalled packages are listed in both
    for dep in &plan.to_remove {
        let Dep::Module(module) = dep else {
            continue;
        };

        let Some(files) = lock_file.data.files_of(module) else {
            warn!("{module} is not in the lockfile, nothing to remove");
            continue;
        };

        for sub in files {
            let path = plugins_root.join(sub);
            if path.exists() {
                info!("removing {sub}");
                remove_tree(&path)?;
            } else {
                warn!("{sub} already absent, skipping removal");
            }
        }
    }

    // Move staged trees into place, collecting per-package failures
    let mut failed: Vec<DepModule> = Vec::new();
    for (module, subpaths) in staged_files {
        let mut ok = true;
        for sub in subpaths {
            let src = staged_plugins.join(sub);
            let dest = plugins_root.join(sub);

            if let Err(e) = move_tree(&src, &dest) {
                warn!("failed to move {sub} into place: {e}");
                ok = false;
            }
        }
        if !ok {
            failed.push(module.clone());
        }
    }

    // The lock reflects actual on-disk state: failed packages stay out
    let surviving = new_entries
        .into_iter()
        .filter(|entry| !failed.iter().any(|m| *m == entry.dep()))
        .collect();

    let next = lock_file.data.update_to(plan, surviving);
    lock_file.save(next)?;

    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::PublishWarning {
            packages: failed
                .iter()
                .map(|m| m.module.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        })
    }
}

/// Rename, falling back to copy+remove when the rename fails (commonly
/// when staging and plugins live on different devices).
fn move_tree(src: &Path, dest: &Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if dest.exists() {
        remove_tree(dest)?;
    }

    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_recursively(src, dest)?;
            remove_tree(src)
        }
    }
}

fn copy_recursively(src: &Path, dest: &Path) -> std::io::Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_recursively(&entry.path(), &dest.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(src, dest).map(|_| ())
    }
}

fn remove_tree(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("some packages could not be published, manual intervention needed: {packages}")]
    PublishWarning { packages: String },
    #[error("lock: {0}")]
    Lock(#[from] lock::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::package::BareModule;
    use crate::profile::Profile;
    use crate::variant::Variant;

    fn entry(name: &str, version: &str, files: Vec<String>) -> InstalledData {
        InstalledData {
            group: "memo".into(),
            name: name.into(),
            version: version.into(),
            variant: Variant::default(),
            assets: vec![],
            files,
        }
    }

    fn dep(name: &str, version: &str) -> DepModule {
        DepModule {
            module: BareModule::new("memo", name),
            version: version.into(),
            variant: Variant::default(),
        }
    }

    #[test]
    fn swaps_staged_trees_and_rewrites_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::open(dir.path());
        let plugins = dir.path().join("plugins");
        let staged = dir.path().join("staging/plugins");

        // Old state: pkg-old installed on disk and in the lock
        let old_sub = "150-mods/memo.pkg-old.1.sc4pac";
        fs::create_dir_all(plugins.join(old_sub)).unwrap();
        std::fs::write(plugins.join(old_sub).join("a.dat"), b"old").unwrap();

        let mut lock_file = LockFile::load(&profile).unwrap();
        lock_file
            .save(crate::lock::PluginsLock {
                installed: vec![entry("pkg-old", "1", vec![old_sub.into()])],
            })
            .unwrap();

        // New state: pkg-new staged
        let new_sub = "150-mods/memo.pkg-new.2.sc4pac";
        fs::create_dir_all(staged.join(new_sub)).unwrap();
        std::fs::write(staged.join(new_sub).join("b.dat"), b"new").unwrap();

        let plan = UpdatePlan {
            to_install: vec![Dep::Module(dep("pkg-new", "2"))],
            to_reinstall: vec![],
            to_remove: vec![Dep::Module(dep("pkg-old", "1"))],
        };

        let guard = lock::acquire(&profile).unwrap();
        publish(
            &guard,
            &plugins,
            &staged,
            &[(dep("pkg-new", "2"), vec![new_sub.into()])],
            &plan,
            &mut lock_file,
            vec![entry("pkg-new", "2", vec![new_sub.into()])],
        )
        .unwrap();

        assert!(!plugins.join(old_sub).exists());
        assert_eq!(
            std::fs::read(plugins.join(new_sub).join("b.dat")).unwrap(),
            b"new"
        );

        // Lockfile matches the on-disk state
        let reloaded = LockFile::load(&profile).unwrap();
        assert_eq!(reloaded.data.installed.len(), 1);
        assert_eq!(reloaded.data.installed[0].name, "pkg-new");
        for data in &reloaded.data.installed {
            for sub in &data.files {
                assert!(plugins.join(sub).exists());
            }
        }
    }

    #[test]
    fn absent_removal_targets_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::open(dir.path());
        let plugins = dir.path().join("plugins");

        let mut lock_file = LockFile::load(&profile).unwrap();
        lock_file
            .save(crate::lock::PluginsLock {
                installed: vec![entry("gone", "1", vec!["150-mods/memo.gone.1.sc4pac".into()])],
            })
            .unwrap();

        let plan = UpdatePlan {
            to_install: vec![],
            to_reinstall: vec![],
            to_remove: vec![Dep::Module(dep("gone", "1"))],
        };

        let guard = lock::acquire(&profile).unwrap();
        publish(&guard, &plugins, &plugins, &[], &plan, &mut lock_file, vec![]).unwrap();
        assert!(lock_file.data.installed.is_empty());
    }

    #[test]
    fn copy_fallback_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");

        fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/file.dat"), b"content").unwrap();

        copy_recursively(&src, &dest).unwrap();
        assert_eq!(
            std::fs::read(dest.join("nested/file.dat")).unwrap(),
            b"content"
        );
    }
}
