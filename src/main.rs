use anyhow::Result;
use clap::{ArgMatches, Command};

use ark_restore::{logging, restore};

fn cli() -> Command {
    Command::new("ark")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Back up and restore Kubernetes cluster resources")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(restore::command())
}

#[tokio::main]
async fn main() {
    logging::init_tracing();

    let matches = cli().get_matches();

    if let Err(err) = run(&matches).await {
        eprintln!("An error occurred: {err}");
        std::process::exit(1);
    }
}

async fn run(matches: &ArgMatches) -> Result<()> {
    if let Some(("restore", sub)) = matches.subcommand() {
        restore::dispatch(sub).await?;
    }

    Ok(())
}
