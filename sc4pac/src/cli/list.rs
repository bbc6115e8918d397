// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use clap::{ArgMatches, Command};
use itertools::Itertools;
use thiserror::Error;

use sc4pac::{config::Plugins, LockFile, Profile};

pub fn command() -> Command {
    Command::new("list")
        .about("List installed packages")
        .long_about("List installed packages; explicitly requested ones are marked with `*`")
}

pub fn handle(_args: &ArgMatches, profile: &Profile) -> Result<(), Error> {
    let Some(plugins) = Plugins::find(profile)? else {
        println!("No profile configured yet; run `sc4pac channel add <url>` first.");
        return Ok(());
    };
    let lock_file = LockFile::load(profile)?;

    if lock_file.data.installed.is_empty() {
        println!("Nothing is installed.");
        return Ok(());
    }

    for data in lock_file
        .data
        .installed
        .iter()
        .sorted_by(|a, b| a.module().cmp(&b.module()))
    {
        let marker = if plugins.data.explicit.contains(&data.module()) {
            "*"
        } else {
            " "
        };

        let variant = data
            .variant
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .join(", ");

        if variant.is_empty() {
            println!("{marker} {} {}", data.module(), data.version);
        } else {
            println!("{marker} {} {} [{variant}]", data.module(), data.version);
        }
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lock(#[from] sc4pac::lock::Error),

    #[error(transparent)]
    Store(#[from] sc4pac::store::Error),
}
