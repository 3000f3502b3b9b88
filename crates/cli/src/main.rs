use clap::Parser;
use pair_cli::{cli::Cli, commands, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let code = match commands::dispatch(cli).await {
		Ok(()) => 0,
		Err(err) => {
			eprintln!("Error: {err:#}");
			1
		}
	};
	// A supervised worker may still be blocked reading stdin; do not wait for it.
	std::process::exit(code);
}
