// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, ArgMatches, Command};
use thiserror::Error;
use url::Url;

use sc4pac::{
    cache::FileCache,
    channel::{self, MetadataRepository},
    config::Plugins,
    Profile,
};

/// Control flow for the subcommands
enum Action {
    Add(Url),
    Remove(Url),
    List,
}

pub fn command() -> Command {
    Command::new("channel")
        .about("Manage metadata channels")
        .subcommand_required(true)
        .subcommand(
            Command::new("add")
                .about("Add a channel")
                .arg(arg!(<URL> "channel url").value_parser(clap::value_parser!(Url))),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove a channel")
                .arg(arg!(<URL> "channel url").value_parser(clap::value_parser!(Url))),
        )
        .subcommand(Command::new("list").about("List the configured channels in priority order"))
}

pub async fn handle(args: &ArgMatches, profile: &Profile) -> Result<(), Error> {
    let action = match args.subcommand() {
        Some(("add", cmd_args)) => {
            Action::Add(cmd_args.get_one::<Url>("URL").cloned().expect("required arg"))
        }
        Some(("remove", cmd_args)) => {
            Action::Remove(cmd_args.get_one::<Url>("URL").cloned().expect("required arg"))
        }
        Some(("list", _)) => Action::List,
        _ => unreachable!(),
    };

    match action {
        Action::Add(url) => add(url, profile).await,
        Action::Remove(url) => remove(url, profile),
        Action::List => list(profile),
    }
}

async fn add(url: Url, profile: &Profile) -> Result<(), Error> {
    let url = channel::normalize_channel_url(&url)?;

    let mut plugins = Plugins::load(profile)?;
    if plugins.data.config.channels.contains(&url) {
        println!("Channel {url} is already configured.");
        return Ok(());
    }

    // Reject channels whose index cannot be loaded
    let cache = FileCache::new(profile.resolve(&plugins.data.config.cache_root))?;
    MetadataRepository::create(url.clone(), &cache).await?;

    plugins.data.config.channels.push(url.clone());
    plugins.save()?;

    println!("Added channel {url}.");
    Ok(())
}

fn remove(url: Url, profile: &Profile) -> Result<(), Error> {
    let url = channel::normalize_channel_url(&url)?;

    let mut plugins = Plugins::load(profile)?;
    let before = plugins.data.config.channels.len();
    plugins.data.config.channels.retain(|configured| *configured != url);

    if plugins.data.config.channels.len() == before {
        return Err(Error::NoSuchChannel(url));
    }

    plugins.save()?;
    println!("Removed channel {url}.");
    Ok(())
}

fn list(profile: &Profile) -> Result<(), Error> {
    let plugins = Plugins::load(profile)?;

    if plugins.data.config.channels.is_empty() {
        println!("No channels have been configured yet.");
        return Ok(());
    }

    for url in &plugins.data.config.channels {
        println!(" - {url}");
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("channel is not configured: {0}")]
    NoSuchChannel(Url),

    #[error(transparent)]
    Channel(#[from] channel::Error),

    #[error(transparent)]
    Cache(#[from] sc4pac::cache::Error),

    #[error(transparent)]
    Store(#[from] sc4pac::store::Error),
}
