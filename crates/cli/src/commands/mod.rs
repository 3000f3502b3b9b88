//! Subcommand entry points.

mod serve;
mod supervise;

use anyhow::Result;

use crate::cli::{Cli, Commands};

pub async fn dispatch(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Serve(args) => serve::run(args).await,
		Commands::Supervise(args) => supervise::run(args).await,
	}
}
