// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use std::collections::HashSet;

use clap::{arg, Arg, ArgAction, ArgMatches, Command};
use itertools::Itertools;
use thiserror::Error;

use sc4pac::{cache::FileCache, channel, config::Plugins, Profile};

pub fn command() -> Command {
    Command::new("search")
        .about("Search the channels for packages")
        .arg(
            Arg::new("threshold")
                .long("threshold")
                .help("Minimum match score, 0 to 100")
                .action(ArgAction::Set)
                .default_value("50")
                .value_parser(clap::value_parser!(u32).range(0..=100)),
        )
        .arg(arg!(<TEXT> "search text").value_parser(clap::value_parser!(String)))
}

pub async fn handle(args: &ArgMatches, profile: &Profile) -> Result<(), Error> {
    let query = args.get_one::<String>("TEXT").expect("required arg");
    let threshold = *args.get_one::<u32>("threshold").expect("defaulted arg");

    let plugins = Plugins::load(profile)?;
    let cache = FileCache::new(profile.resolve(&plugins.data.config.cache_root))?;
    let repos = channel::load_all(&plugins.data.config.channels, &cache).await?;

    // First channel wins for duplicated identities, like resolution does
    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for repo in &repos {
        for item in repo.iterate_channel_contents() {
            if item.is_asset() || !seen.insert(item.module()) {
                continue;
            }

            let scored = score(query, &item.group, &item.name, &item.summary);
            if scored >= threshold {
                results.push((scored, item.clone()));
            }
        }
    }

    if results.is_empty() {
        println!("No matching packages found.");
        return Ok(());
    }

    for (_, item) in results
        .iter()
        .sorted_by(|(a, x), (b, y)| b.cmp(a).then_with(|| x.module().cmp(&y.module())))
    {
        if item.summary.is_empty() {
            println!("{} {}", item.module(), item.version);
        } else {
            println!("{} {} - {}", item.module(), item.version, item.summary);
        }
    }

    Ok(())
}

/// Fuzzy match score in 0..=100: exact name matches rank highest, name
/// substrings scale with how much of the name they cover, summary
/// substrings rank low.
fn score(query: &str, group: &str, name: &str, summary: &str) -> u32 {
    let query = query.to_lowercase();
    let name_lower = name.to_lowercase();

    if name_lower == query || format!("{group}:{name}").to_lowercase() == query {
        return 100;
    }
    if name_lower.contains(&query) || group.to_lowercase().contains(&query) {
        let coverage = (query.len() * 50 / name_lower.len().max(1)) as u32;
        return 50 + coverage.min(49);
    }
    if summary.to_lowercase().contains(&query) {
        return 30;
    }
    0
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Channel(#[from] channel::Error),

    #[error(transparent)]
    Cache(#[from] sc4pac::cache::Error),

    #[error(transparent)]
    Store(#[from] sc4pac::store::Error),
}
