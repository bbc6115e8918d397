// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, ArgMatches, Command};
use itertools::Itertools;
use thiserror::Error;

use sc4pac::{
    cache::FileCache,
    channel,
    config::Plugins,
    package::{self, BareModule},
    Profile,
};

pub fn command() -> Command {
    Command::new("info")
        .about("Show package metadata")
        .arg(arg!(<PKG> "package to describe, as group:name").value_parser(clap::value_parser!(String)))
}

pub async fn handle(args: &ArgMatches, profile: &Profile) -> Result<(), Error> {
    let module = args
        .get_one::<String>("PKG")
        .expect("required arg")
        .parse::<BareModule>()?;

    let plugins = Plugins::load(profile)?;
    let cache = FileCache::new(profile.resolve(&plugins.data.config.cache_root))?;
    let repos = channel::load_all(&plugins.data.config.channels, &cache).await?;

    let (repo, version) = repos
        .iter()
        .find_map(|repo| {
            repo.latest_version_of(&module)
                .map(|version| (repo, version.to_owned()))
        })
        .ok_or_else(|| Error::NoPackage(module.clone()))?;

    let meta = repo
        .package_meta(&module, &version, &cache)
        .await?
        .ok_or_else(|| Error::NoPackage(module.clone()))?;

    let field = |label: &str, value: &str| {
        if !value.is_empty() {
            println!("{label:<14}: {value}");
        }
    };

    field("Package", &module.to_string());
    field("Version", &meta.version);
    field("Channel", repo.url.as_str());
    field("Subfolder", &meta.subfolder);
    field("Summary", &meta.info.summary);
    field("Description", &meta.info.description);
    field("Warning", &meta.info.warning);
    field("Conflicts", &meta.info.conflicts);
    field("Author", &meta.info.author);
    field("Website", &meta.info.website);

    for data in &meta.variants {
        let variant = data
            .variant
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .join(", ");
        let label = if variant.is_empty() { "(default)".to_owned() } else { variant };

        let dependencies = if data.dependencies.is_empty() {
            "none".to_owned()
        } else {
            data.dependencies.iter().map(ToString::to_string).join(", ")
        };

        println!("Variant       : {label}");
        println!("  Dependencies: {dependencies}");
        if !data.assets.is_empty() {
            println!(
                "  Assets      : {}",
                data.assets.iter().map(|a| a.asset_id.as_str()).join(", ")
            );
        }
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] package::ParseError),

    #[error("no channel publishes {0}")]
    NoPackage(BareModule),

    #[error(transparent)]
    Channel(#[from] channel::Error),

    #[error(transparent)]
    Cache(#[from] sc4pac::cache::Error),

    #[error(transparent)]
    Store(#[from] sc4pac::store::Error),
}
