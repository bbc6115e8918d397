// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! The diff between desired (resolution) and actual (lockfile) state.

use std::collections::HashSet;

use crate::{
    package::{BareAsset, BareModule, Dep, DepModule},
    resolver::Resolution,
};

/// What an update will do: install, reinstall, remove. Reinstalled
/// modules appear in both `to_install` and `to_remove` (removal precedes
/// reinstall).
#[derive(Debug, Default, Clone)]
pub struct UpdatePlan {
    /// In resolution order (dependents before their dependencies)
    pub to_install: Vec<Dep>,
    /// Modules whose own version and variant are unchanged but which
    /// depend on a changed asset
    pub to_reinstall: Vec<DepModule>,
    pub to_remove: Vec<Dep>,
}

impl UpdatePlan {
    pub fn from_resolution(resolution: &Resolution, installed: &[Dep]) -> Self {
        let wanted = resolution.transitive_dependencies();
        let wanted_set: HashSet<&Dep> = wanted.iter().collect();
        let installed_set: HashSet<&Dep> = installed.iter().collect();

        let missing: Vec<&Dep> = wanted.iter().filter(|d| !installed_set.contains(d)).collect();
        let obsolete: Vec<&Dep> = installed.iter().filter(|d| !wanted_set.contains(d)).collect();

        let missing_assets: HashSet<BareAsset> = missing
            .iter()
            .filter_map(|d| d.as_asset())
            .map(|a| a.asset.clone())
            .collect();

        // Unchanged modules that reference a changed asset get reinstalled
        let affected: HashSet<BareModule> = resolution.dependents_of(&missing_assets);
        let to_reinstall: Vec<DepModule> = wanted
            .iter()
            .filter(|d| installed_set.contains(d))
            .filter_map(Dep::as_module)
            .filter(|m| affected.contains(&m.module))
            .cloned()
            .collect();

        // Assets the reinstalled modules extract from, needed again even
        // though they are not themselves missing
        let reinstall_assets: HashSet<BareAsset> = to_reinstall
            .iter()
            .filter_map(|m| resolution.package(&m.module))
            .flat_map(|p| p.assets.iter().map(|(_, a)| a.asset.clone()))
            .collect();

        let missing_set: HashSet<&Dep> = missing.iter().copied().collect();
        let reinstall_set: HashSet<&DepModule> = to_reinstall.iter().collect();

        let to_install: Vec<Dep> = wanted
            .iter()
            .filter(|d| match d {
                Dep::Module(m) => missing_set.contains(d) || reinstall_set.contains(m),
                Dep::Asset(a) => missing_set.contains(d) || reinstall_assets.contains(&a.asset),
            })
            .cloned()
            .collect();

        let mut to_remove: Vec<Dep> = obsolete.into_iter().cloned().collect();
        for module in &to_reinstall {
            let dep = Dep::Module(module.clone());
            if !to_remove.contains(&dep) {
                to_remove.push(dep);
            }
        }

        Self {
            to_install,
            to_reinstall,
            to_remove,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.to_install.is_empty() && self.to_remove.is_empty()
    }

    /// Modules to stage and publish, in install order
    pub fn modules_to_install(&self) -> impl Iterator<Item = &DepModule> {
        self.to_install.iter().filter_map(Dep::as_module)
    }

    /// Artifacts to fetch, in install order
    pub fn assets_to_fetch(
        &self,
    ) -> impl DoubleEndedIterator<Item = &crate::package::DepAsset> {
        self.to_install.iter().filter_map(Dep::as_asset)
    }
}

#[cfg(test)]
mod test {
    use url::Url;

    use super::*;
    use crate::cache::FileCache;
    use crate::channel::MetadataRepository;
    use crate::package::{
        meta::ASSET_TYPE, AssetReference, ChannelIndex, ChannelItem, Info, PackageMeta,
        VariantData,
    };
    use crate::resolver::{resolve, Outcome};
    use crate::variant::Variant;

    fn channel(asset_version: &str) -> MetadataRepository {
        let items = vec![
            ChannelItem {
                group: "memo".into(),
                name: "pkg-a".into(),
                version: "1".into(),
                summary: String::new(),
                kind: None,
                url: None,
                last_modified: None,
                checksum: None,
            },
            ChannelItem {
                group: String::new(),
                name: "asset-x".into(),
                version: asset_version.into(),
                summary: String::new(),
                kind: Some(ASSET_TYPE.into()),
                url: Some(Url::parse("https://example.org/asset-x.zip").unwrap()),
                last_modified: None,
                checksum: None,
            },
        ];
        let metadata = vec![PackageMeta {
            group: "memo".into(),
            name: "pkg-a".into(),
            version: "1".into(),
            subfolder: "150-mods".into(),
            info: Info::default(),
            variants: vec![VariantData {
                variant: Variant::default(),
                dependencies: vec![],
                assets: vec![AssetReference {
                    asset_id: "asset-x".into(),
                    include: vec![],
                    exclude: vec![],
                }],
            }],
        }];

        MetadataRepository::from_documents(
            Url::parse("https://example.org/channel/").unwrap(),
            ChannelIndex { packages: items },
            metadata,
        )
    }

    async fn resolution_of(repo: MetadataRepository) -> Resolution {
        let cache = FileCache::new(tempfile::tempdir().unwrap().into_path()).unwrap();
        let explicit = vec![BareModule::new("memo", "pkg-a")];
        match resolve(&explicit, &Variant::default(), &[repo], &cache).await.unwrap() {
            Outcome::Resolved(resolution) => resolution,
            Outcome::NeedsVariant(_) => panic!("unexpected variant prompt"),
        }
    }

    #[tokio::test]
    async fn fresh_install_wants_everything() {
        let resolution = resolution_of(channel("v1")).await;
        let plan = UpdatePlan::from_resolution(&resolution, &[]);

        assert_eq!(plan.to_install.len(), 2);
        assert!(plan.to_reinstall.is_empty());
        assert!(plan.to_remove.is_empty());
        assert!(!plan.is_up_to_date());
    }

    #[tokio::test]
    async fn matching_installed_state_is_up_to_date() {
        let resolution = resolution_of(channel("v1")).await;
        let installed: Vec<Dep> = resolution.transitive_dependencies().to_vec();

        let plan = UpdatePlan::from_resolution(&resolution, &installed);
        assert!(plan.is_up_to_date());
        assert!(plan.to_install.is_empty());
        assert!(plan.to_reinstall.is_empty());
        assert!(plan.to_remove.is_empty());
    }

    #[tokio::test]
    async fn bumped_asset_forces_reinstall_of_dependents() {
        // Installed state was resolved against asset-x v1
        let old = resolution_of(channel("v1")).await;
        let installed: Vec<Dep> = old.transitive_dependencies().to_vec();

        // The channel then bumps the asset to v2
        let new = resolution_of(channel("v2")).await;
        let plan = UpdatePlan::from_resolution(&new, &installed);

        assert_eq!(plan.to_reinstall.len(), 1);
        assert_eq!(plan.to_reinstall[0].module, BareModule::new("memo", "pkg-a"));

        // remove: old asset + the reinstalled module
        assert_eq!(plan.to_remove.len(), 2);
        assert!(plan
            .to_remove
            .iter()
            .any(|d| matches!(d, Dep::Asset(a) if a.version == "v1")));
        assert!(plan
            .to_remove
            .iter()
            .any(|d| matches!(d, Dep::Module(m) if m.module.name == "pkg-a")));

        // install: new asset + the reinstalled module
        assert!(plan
            .to_install
            .iter()
            .any(|d| matches!(d, Dep::Asset(a) if a.version == "v2")));
        assert!(plan
            .to_install
            .iter()
            .any(|d| matches!(d, Dep::Module(m) if m.module.name == "pkg-a")));
    }

    #[tokio::test]
    async fn dropped_module_is_removed() {
        let old = resolution_of(channel("v1")).await;
        let installed: Vec<Dep> = old.transitive_dependencies().to_vec();

        // Nothing explicit anymore: empty resolution
        let empty = Resolution::default();
        let plan = UpdatePlan::from_resolution(&empty, &installed);

        assert!(plan.to_install.is_empty());
        assert!(plan.to_reinstall.is_empty());
        assert_eq!(plan.to_remove.len(), 2);
    }
}
