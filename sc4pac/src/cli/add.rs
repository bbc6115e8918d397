// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use sc4pac::{
    cache::FileCache,
    channel,
    config::Plugins,
    package::{self, BareModule},
    Profile,
};

pub fn command() -> Command {
    Command::new("add")
        .about("Add packages to the explicit set")
        .arg(arg!(<PKG>... "packages to add, as group:name").value_parser(clap::value_parser!(String)))
}

pub async fn handle(args: &ArgMatches, profile: &Profile) -> Result<(), Error> {
    let modules = args
        .get_many::<String>("PKG")
        .expect("required arg")
        .map(|raw| raw.parse::<BareModule>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut plugins = Plugins::load(profile)?;

    // Validate against the channels before committing to the config
    let cache = FileCache::new(profile.resolve(&plugins.data.config.cache_root))?;
    let repos = channel::load_all(&plugins.data.config.channels, &cache).await?;

    for module in &modules {
        if !repos.iter().any(|repo| repo.latest_version_of(module).is_some()) {
            return Err(Error::NoPackage(module.clone()));
        }
    }

    let mut added = 0;
    for module in modules {
        if plugins.data.add_explicit(module.clone()) {
            println!("Added {module}.");
            added += 1;
        } else {
            println!("{module} is already in the explicit set.");
        }
    }
    plugins.save()?;

    if added > 0 {
        println!("Run `sc4pac update` to install.");
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
