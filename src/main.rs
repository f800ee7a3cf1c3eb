use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use stocksback::cli::Cli;
use stocksback::telemetry;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);
    cli.run().await
}
