// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, Arg, ArgAction, ArgMatches, Command};
use log::warn;
use thiserror::Error;

use sc4pac::{
    config::Plugins,
    package::{self, BareModule},
    prompt::{self, Interactive, Prompter},
    Profile,
};

pub fn command() -> Command {
    Command::new("remove")
        .about("Remove packages from the explicit set")
        .long_about(
            "Remove packages from the explicit set; the next `sc4pac update` \
             carries out the removal on disk",
        )
        .arg(
            Arg::new("interactive")
                .short('i')
                .long("interactive")
                .help("Select the packages to remove interactively")
                .action(ArgAction::SetTrue),
        )
        .arg(arg!([PKG]... "packages to remove, as group:name").value_parser(clap::value_parser!(String)))
}

pub fn handle(args: &ArgMatches, profile: &Profile) -> Result<(), Error> {
    let mut plugins = Plugins::load(profile)?;

    let modules: Vec<BareModule> = if args.get_flag("interactive") {
        let options: Vec<String> = plugins.data.explicit.iter().map(ToString::to_string).collect();
        if options.is_empty() {
            println!("Nothing is explicitly installed.");
            return Ok(());
        }

        Interactive
            .multi_select("Select packages to remove", &options)?
            .into_iter()
            .map(|index| plugins.data.explicit[index].clone())
            .collect()
    } else {
        args.get_many::<String>("PKG")
            .unwrap_or_default()
            .map(|raw| raw.parse::<BareModule>())
            .collect::<Result<_, _>>()?
    };

    if modules.is_empty() {
        println!("Nothing to remove.");
        return Ok(());
    }

    let mut removed = 0;
    for module in modules {
        if plugins.data.remove_explicit(&module) {
            println!("Removed {module}.");
            removed += 1;
        } else {
            warn!("{module} is not in the explicit set");
        }
    }
    plugins.save()?;

    if removed > 0 {
        println!("Run `sc4pac update` to apply.");
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] package::ParseError),

    #[error(transparent)]
    Prompt(#[from] prompt::Error),

    #[error(transparent)]
    Store(#[from] sc4pac::store::Error),
}
