//! `casket` binary entry point.
//!
//! Parses arguments, installs logging and hands over to
//! [`casket_source::cli::run`].

use anyhow::Result;
use casket_source::cli::{Cli, init_tracing, run};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    run(cli).await
}
