pub mod create;

use std::io;

use anyhow::Result;
use clap::{ArgMatches, Command};

use crate::ark::ArkClient;
use crate::config::Config;
use create::{CreateOptions, RunContext};

pub fn command() -> Command {
    Command::new("restore")
        .about("Work with restores")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(CreateOptions::command())
}

/// The config file is only read once the arguments have been validated and
/// completed, so argument errors are reported even when it is unreadable.
pub async fn dispatch(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("create", sub)) => {
            let mut options = CreateOptions::from_matches(sub);
            let args = create::positional_args(sub);
            options.prepare(&args)?;

            let config = Config::load()?;
            let client = ArkClient::new(&config);
            let mut ctx = RunContext::new(&client, config.namespace.as_str(), io::stdout());
            options.run(&mut ctx).await?;
            Ok(())
        }
        // subcommand_required keeps clap from handing us anything else
        _ => Ok(()),
    }
}
