// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, Arg, ArgAction, ArgMatches, Command};
use log::warn;
use thiserror::Error;

use sc4pac::{
    config::Plugins,
    prompt::{self, Interactive, Prompter},
    Profile,
};

pub fn command() -> Command {
    Command::new("variant")
        .about("Manage accumulated variant choices")
        .subcommand_required(true)
        .subcommand(
            Command::new("reset")
                .about("Forget variant choices so the next update asks again")
                .arg(
                    Arg::new("interactive")
                        .short('i')
                        .long("interactive")
                        .help("Select the keys to reset interactively")
                        .action(ArgAction::SetTrue),
                )
                .arg(arg!([KEY]... "variant keys to reset").value_parser(clap::value_parser!(String))),
        )
}

pub fn handle(args: &ArgMatches, profile: &Profile) -> Result<(), Error> {
    match args.subcommand() {
        Some(("reset", cmd_args)) => reset(cmd_args, profile),
        _ => unreachable!(),
    }
}

fn reset(args: &ArgMatches, profile: &Profile) -> Result<(), Error> {
    let mut plugins = Plugins::load(profile)?;

    let keys: Vec<String> = if args.get_flag("interactive") {
        let options: Vec<String> = plugins
            .data
            .config
            .variant
            .iter()
            .map(|(key, value)| format!("{key} = {value}"))
            .collect();
        if options.is_empty() {
            println!("No variant choices configured.");
            return Ok(());
        }

        let configured: Vec<String> = plugins.data.config.variant.keys().map(str::to_owned).collect();
        Interactive
            .multi_select("Select variant keys to reset", &options)?
            .into_iter()
            .map(|index| configured[index].clone())
            .collect()
    } else {
        args.get_many::<String>("KEY")
            .unwrap_or_default()
            .cloned()
            .collect()
    };

    if keys.is_empty() {
        println!("Nothing to reset.");
        return Ok(());
    }

    for key in keys {
        if plugins.data.config.variant.remove(&key).is_some() {
            println!("Reset {key}.");
        } else {
            warn!("variant key {key} is not configured");
        }
    }
    plugins.save()?;

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Prompt(#[from] prompt::Error),

    #[error(transparent)]
    Store(#[from] sc4pac::store::Error),
}
