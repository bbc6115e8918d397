// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgAction, Command};
use thiserror::Error;

use sc4pac::Profile;

mod add;
mod channel;
mod info;
mod list;
mod remove;
mod search;
mod update;
mod variant;

/// Generate the CLI command structure
fn command() -> Command {
    Command::new("sc4pac")
        .about("Declarative package manager for SimCity 4 plugins")
        .arg(
            Arg::new("profile")
                .short('P')
                .long("profile")
                .global(true)
                .help("Profile directory (defaults to $SC4PAC_PROFILE or the working directory)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .global(true)
                .help("Assume yes for all questions")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .help("Print additional information about what sc4pac is doing")
                .action(ArgAction::SetTrue),
        )
        .arg_required_else_help(true)
        .subcommand(add::command())
        .subcommand(update::command())
        .subcommand(remove::command())
        .subcommand(list::command())
        .subcommand(info::command())
        .subcommand(search::command())
        .subcommand(variant::command())
        .subcommand(channel::command())
}

/// Process all CLI arguments
pub async fn process() -> Result<(), Error> {
    let matches = command().get_matches();

    init_logging(matches.get_flag("verbose"));

    let root = matches
        .get_one::<String>("profile")
        .cloned()
        .or_else(|| std::env::var("SC4PAC_PROFILE").ok())
        .unwrap_or_else(|| ".".to_owned());
    let profile = Profile::open(root);

    let yes = matches.get_flag("yes");

    match matches.subcommand() {
        Some(("add", args)) => add::handle(args, &profile).await.map_err(Error::Add),
        Some(("update", args)) => update::handle(args, &profile, yes).await.map_err(Error::Update),
        Some(("remove", args)) => remove::handle(args, &profile).map_err(Error::Remove),
        Some(("list", args)) => list::handle(args, &profile).map_err(Error::List),
        Some(("info", args)) => info::handle(args, &profile).await.map_err(Error::Info),
        Some(("search", args)) => search::handle(args, &profile).await.map_err(Error::Search),
        Some(("variant", args)) => variant::handle(args, &profile).map_err(Error::Variant),
        Some(("channel", args)) => channel::handle(args, &profile).await.map_err(Error::Channel),
        _ => unreachable!(),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "sc4pac=debug" } else { "sc4pac=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Add(#[source] add::Error),

    #[error("{0}")]
    Update(#[source] sc4pac::update::Error),

    #[error("{0}")]
    Remove(#[source] remove::Error),

    #[error("{0}")]
    List(#[source] list::Error),

    #[error("{0}")]
    Info(#[source] info::Error),

    #[error("{0}")]
    Search(#[source] search::Error),

    #[error("{0}")]
    Variant(#[source] variant::Error),

    #[error("{0}")]
    Channel(#[source] channel::Error),
}
