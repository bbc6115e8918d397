// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

//! Transitive dependency closure over the configured channels, with
//! variant selection per package. A missing variant key is not a failure
//! but a recoverable outcome the driver answers by asking the user and
//! resolving again.

use std::collections::{HashMap, HashSet, VecDeque};

use log::debug;
use thiserror::Error;

use crate::{
    cache::FileCache,
    channel::{self, MetadataRepository},
    package::{AssetReference, BareAsset, BareModule, Dep, DepAsset, DepModule},
    variant::{Choice, DecisionTree, Variant},
};

/// Result of a resolve run: either a full resolution, or the next variant
/// key the user has to decide before resolving can continue.
pub enum Outcome {
    Resolved(Resolution),
    NeedsVariant(VariantPrompt),
}

/// A package whose decision tree reached an undecided key
#[derive(Debug, Clone)]
pub struct VariantPrompt {
    pub module: BareModule,
    pub version: String,
    pub key: String,
    pub values: Vec<String>,
}

/// One fully resolved module with everything staging needs
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub dep: DepModule,
    pub subfolder: String,
    pub warning: Option<String>,
    /// Selected asset references paired with their resolved artifacts
    pub assets: Vec<(AssetReference, DepAsset)>,
}

/// The dependency graph of one resolve run.
///
/// Invariants: every asset referenced by a wanted module is present, and
/// no two modules with the same identity differ in version or variant
/// (selection is deterministic, and each module is resolved exactly once).
#[derive(Debug, Default)]
pub struct Resolution {
    /// Discovery order: explicit modules first, leaves last
    deps: Vec<Dep>,
    packages: HashMap<BareModule, ResolvedPackage>,
    module_edges: HashMap<BareModule, Vec<BareModule>>,
}

impl Resolution {
    /// All wanted dependencies in resolution order
    pub fn transitive_dependencies(&self) -> &[Dep] {
        &self.deps
    }

    /// Direct dependencies of a module: its dependency modules followed by
    /// its asset references
    pub fn dependencies_of(&self, module: &BareModule) -> Vec<Dep> {
        let mut deps = Vec::new();

        if let Some(edges) = self.module_edges.get(module) {
            for target in edges {
                if let Some(package) = self.packages.get(target) {
                    deps.push(Dep::Module(package.dep.clone()));
                }
            }
        }
        if let Some(package) = self.packages.get(module) {
            deps.extend(package.assets.iter().map(|(_, asset)| Dep::Asset(asset.clone())));
        }

        deps
    }

    /// Modules that directly reference any of the given assets
    pub fn dependents_of(&self, assets: &HashSet<BareAsset>) -> HashSet<BareModule> {
        self.packages
            .iter()
            .filter(|(_, package)| {
                package
                    .assets
                    .iter()
                    .any(|(_, asset)| assets.contains(&asset.asset))
            })
            .map(|(module, _)| module.clone())
            .collect()
    }

    pub fn package(&self, module: &BareModule) -> Option<&ResolvedPackage> {
        self.packages.get(module)
    }
}

/// Compute the dependency closure of the explicit modules.
pub async fn resolve(
    explicit: &[BareModule],
    global_variant: &Variant,
    repos: &[MetadataRepository],
    cache: &FileCache,
) -> Result<Outcome, Error> {
    let mut resolution = Resolution::default();
    let mut seen_assets: HashMap<BareAsset, DepAsset> = HashMap::new();

    let mut queue: VecDeque<BareModule> = explicit.iter().cloned().collect();

    while let Some(module) = queue.pop_front() {
        if resolution.packages.contains_key(&module) {
            continue;
        }

        let (repo, version) = find_module(&module, repos)?;
        debug!("resolved {module} to version {version} from {}", repo.url);

        let meta = repo
            .package_meta(&module, &version, cache)
            .await?
            .ok_or_else(|| Error::MetadataNotFound(module.clone(), version.clone()))?;

        let declared = meta.declared_variants();
        let tree = DecisionTree::from_variants(&declared).map_err(|e| match e {
            crate::variant::Error::Unsatisfiable { .. } => unreachable!("building, not walking"),
            other => Error::AmbiguousVariants(module.clone(), other.to_string()),
        })?;

        let index = match tree.select(global_variant) {
            Ok(Choice::Selected(index)) => index,
            Ok(Choice::Missing { key, values }) => {
                return Ok(Outcome::NeedsVariant(VariantPrompt {
                    module,
                    version,
                    key,
                    values,
                }));
            }
            Err(e) => return Err(Error::UnsatisfiableVariantConstraints(format!("{module}: {e}"))),
        };

        let data = &meta.variants[index];

        let dep = DepModule {
            module: module.clone(),
            version: version.clone(),
            variant: data.variant.clone(),
        };
        resolution.deps.push(Dep::Module(dep.clone()));

        let mut assets = Vec::new();
        for reference in &data.assets {
            let bare = BareAsset(reference.asset_id.clone());
            let asset = match seen_assets.get(&bare) {
                Some(asset) => asset.clone(),
                None => {
                    let asset = find_asset(&bare, repos)?;
                    seen_assets.insert(bare, asset.clone());
                    resolution.deps.push(Dep::Asset(asset.clone()));
                    asset
                }
            };
            assets.push((reference.clone(), asset));
        }

        for dependency in &data.dependencies {
            queue.push_back(dependency.clone());
        }
        resolution.module_edges.insert(module.clone(), data.dependencies.clone());

        resolution.packages.insert(
            module,
            ResolvedPackage {
                dep,
                subfolder: meta.subfolder.clone(),
                warning: (!meta.info.warning.is_empty()).then(|| meta.info.warning.clone()),
                assets,
            },
        );
    }

    Ok(Outcome::Resolved(resolution))
}

/// First channel publishing the module wins outright; versions only break
/// ties within one channel.
fn find_module<'a>(
    module: &BareModule,
    repos: &'a [MetadataRepository],
) -> Result<(&'a MetadataRepository, String), Error> {
    repos
        .iter()
        .find_map(|repo| {
            repo.latest_version_of(module)
                .map(|version| (repo, version.to_owned()))
        })
        .ok_or_else(|| Error::VersionNotFound(module.clone()))
}

fn find_asset(asset: &BareAsset, repos: &[MetadataRepository]) -> Result<DepAsset, Error> {
    for repo in repos {
        if let Some(dep) = repo.asset(asset)? {
            return Ok(dep);
        }
    }
    Err(Error::AssetNotFound(asset.clone()))
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no channel publishes {0}")]
    VersionNotFound(BareModule),
    #[error("channel index lists {0} {1} but its metadata is missing")]
    MetadataNotFound(BareModule, String),
    #[error("referenced asset is unknown: {0}")]
    AssetNotFound(BareAsset),
    #[error("variant metadata of {0} is ambiguous: {1}")]
    AmbiguousVariants(BareModule, String),
    #[error("unsatisfiable variant constraints: {0}")]
    UnsatisfiableVariantConstraints(String),
    #[error("channel: {0}")]
    Channel(#[from] channel::Error),
}

#[cfg(test)]
mod test {
    use url::Url;

    use super::*;
    use crate::package::{ChannelIndex, ChannelItem, Info, PackageMeta, VariantData};

    fn module_item(group: &str, name: &str, version: &str) -> ChannelItem {
        ChannelItem {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            summary: String::new(),
            kind: None,
            url: None,
            last_modified: None,
            checksum: None,
        }
    }

    fn asset_item(id: &str, version: &str) -> ChannelItem {
        ChannelItem {
            group: String::new(),
            name: id.into(),
            version: version.into(),
            summary: String::new(),
            kind: Some(crate::package::meta::ASSET_TYPE.into()),
            url: Some(Url::parse(&format!("https://example.org/{id}.zip")).unwrap()),
            last_modified: None,
            checksum: None,
        }
    }

    fn package(group: &str, name: &str, version: &str, variants: Vec<VariantData>) -> PackageMeta {
        PackageMeta {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            subfolder: "150-mods".into(),
            info: Info::default(),
            variants,
        }
    }

    fn plain_variant(dependencies: Vec<BareModule>, asset_ids: Vec<&str>) -> VariantData {
        VariantData {
            variant: Variant::default(),
            dependencies,
            assets: asset_ids
                .into_iter()
                .map(|id| AssetReference {
                    asset_id: id.into(),
                    include: vec![],
                    exclude: vec![],
                })
                .collect(),
        }
    }

    fn repo(items: Vec<ChannelItem>, metadata: Vec<PackageMeta>) -> MetadataRepository {
        MetadataRepository::from_documents(
            Url::parse("https://example.org/channel/").unwrap(),
            ChannelIndex { packages: items },
            metadata,
        )
    }

    fn cache() -> FileCache {
        FileCache::new(tempfile::tempdir().unwrap().into_path()).unwrap()
    }

    #[tokio::test]
    async fn resolves_transitive_closure_with_assets() {
        let repos = vec![repo(
            vec![
                module_item("memo", "essential-fixes", "1.0.0"),
                module_item("bsc", "common", "2.1.0"),
                asset_item("big-archive", "2.0.0"),
            ],
            vec![
                package(
                    "memo",
                    "essential-fixes",
                    "1.0.0",
                    vec![plain_variant(
                        vec![BareModule::new("bsc", "common")],
                        vec!["big-archive"],
                    )],
                ),
                package("bsc", "common", "2.1.0", vec![plain_variant(vec![], vec!["big-archive"])]),
            ],
        )];

        let explicit = vec![BareModule::new("memo", "essential-fixes")];
        let outcome = resolve(&explicit, &Variant::default(), &repos, &cache())
            .await
            .unwrap();

        let Outcome::Resolved(resolution) = outcome else {
            panic!("expected a full resolution");
        };

        let deps = resolution.transitive_dependencies();
        assert_eq!(deps.len(), 3);
        assert!(matches!(&deps[0], Dep::Module(m) if m.module.name == "essential-fixes"));
        // The shared asset appears exactly once
        assert_eq!(deps.iter().filter(|d| d.as_asset().is_some()).count(), 1);

        let dependents = resolution.dependents_of(&HashSet::from([BareAsset("big-archive".into())]));
        assert_eq!(dependents.len(), 2);
    }

    #[tokio::test]
    async fn undecided_variant_key_is_surfaced_for_prompting() {
        let left = VariantData {
            variant: Variant::from_iter([("driveside", "left")]),
            dependencies: vec![],
            assets: vec![],
        };
        let right = VariantData {
            variant: Variant::from_iter([("driveside", "right")]),
            dependencies: vec![],
            assets: vec![],
        };

        let repos = vec![repo(
            vec![module_item("memo", "roads", "2.0")],
            vec![package("memo", "roads", "2.0", vec![left, right])],
        )];

        let explicit = vec![BareModule::new("memo", "roads")];

        let outcome = resolve(&explicit, &Variant::default(), &repos, &cache())
            .await
            .unwrap();
        let Outcome::NeedsVariant(prompt) = outcome else {
            panic!("expected a variant prompt");
        };
        assert_eq!(prompt.key, "driveside");
        assert_eq!(prompt.values, vec!["left".to_owned(), "right".to_owned()]);

        // After the user decides, resolution succeeds and records the variant
        let chosen = Variant::from_iter([("driveside", "right")]);
        let outcome = resolve(&explicit, &chosen, &repos, &cache()).await.unwrap();
        let Outcome::Resolved(resolution) = outcome else {
            panic!("expected a full resolution");
        };
        let dep = &resolution.package(&explicit[0]).unwrap().dep;
        assert_eq!(dep.variant.get("driveside"), Some("right"));
    }

    #[tokio::test]
    async fn first_channel_wins_even_with_a_lower_version() {
        let first = repo(
            vec![module_item("x", "y", "1.0")],
            vec![package("x", "y", "1.0", vec![plain_variant(vec![], vec![])])],
        );
        let second = repo(
            vec![module_item("x", "y", "1.1")],
            vec![package("x", "y", "1.1", vec![plain_variant(vec![], vec![])])],
        );

        let explicit = vec![BareModule::new("x", "y")];
        let outcome = resolve(&explicit, &Variant::default(), &[first, second], &cache())
            .await
            .unwrap();

        let Outcome::Resolved(resolution) = outcome else {
            panic!("expected a full resolution");
        };
        assert_eq!(resolution.package(&explicit[0]).unwrap().dep.version, "1.0");
    }

    #[tokio::test]
    async fn unknown_module_and_asset_fail() {
        let repos = vec![repo(
            vec![module_item("memo", "pkg", "1.0")],
            vec![package("memo", "pkg", "1.0", vec![plain_variant(vec![], vec!["ghost"])])],
        )];

        let missing = vec![BareModule::new("no", "where")];
        assert!(matches!(
            resolve(&missing, &Variant::default(), &repos, &cache()).await,
            Err(Error::VersionNotFound(_))
        ));

        let explicit = vec![BareModule::new("memo", "pkg")];
        assert!(matches!(
            resolve(&explicit, &Variant::default(), &repos, &cache()).await,
            Err(Error::AssetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn configured_variant_conflicting_with_metadata_fails() {
        let only_left = VariantData {
            variant: Variant::from_iter([("driveside", "left")]),
            dependencies: vec![],
            assets: vec![],
        };

        let repos = vec![repo(
            vec![module_item("memo", "roads", "2.0")],
            vec![package("memo", "roads", "2.0", vec![only_left])],
        )];

        let explicit = vec![BareModule::new("memo", "roads")];
        let configured = Variant::from_iter([("driveside", "right")]);

        assert!(matches!(
            resolve(&explicit, &configured, &repos, &cache()).await,
            Err(Error::UnsatisfiableVariantConstraints(_))
        ));
    }
}
