mod fetch;
mod schedule;
mod trace;
mod watch;

use std::process::ExitCode;

use feedgate_core::{FeedGateway, GatewayConfig};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<ExitCode, CliError> {
    match &cli.command {
        Command::Fetch(args) => fetch::run(args, cli.pretty).await,
        Command::Trace => trace::run(cli.pretty).await,
        Command::Schedule(args) => schedule::run(args, cli.pretty),
        Command::Watch(args) => watch::run(args, cli.pretty).await,
    }
}

fn build_gateway() -> Result<FeedGateway, CliError> {
    let config = GatewayConfig::from_env()?;
    Ok(FeedGateway::builder(config).build()?)
}
