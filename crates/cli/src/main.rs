use std::error::Error;
use std::process::ExitCode;

use capsule_bridge::{cli::Cli, commands, logging};
use clap::Parser;
use colored::Colorize;

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	match commands::dispatch(cli).await {
		Ok(code) => code,
		Err(err) => {
			eprintln!("{} {err}", "error:".red().bold());
			let mut source = err.source();
			while let Some(cause) = source {
				eprintln!("  {} {cause}", "caused by:".dimmed());
				source = cause.source();
			}
			ExitCode::from(err.exit_code())
		}
	}
}
