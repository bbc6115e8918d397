// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

use std::io::IsTerminal;

use clap::{ArgMatches, Command};

use sc4pac::{
    prompt::{Interactive, NonInteractive},
    update, Profile,
};

pub fn command() -> Command {
    Command::new("update")
        .about("Install the configured packages")
        .long_about(
            "Resolve the explicit packages against the configured channels, \
             download what is missing and swap the result into the plugins directory",
        )
}

pub async fn handle(_args: &ArgMatches, profile: &Profile, yes: bool) -> Result<(), update::Error> {
    if std::io::stdin().is_terminal() {
        update::update(profile, &Interactive, yes).await
    } else {
        update::update(profile, &NonInteractive, yes).await
    }
}
