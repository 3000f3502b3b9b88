use std::io::BufRead;

use anyhow::Result;
use pair_runtime::{ProcessLauncher, SessionSupervisor};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::SuperviseArgs;
use crate::config::supervisor_config;

pub async fn run(args: SuperviseArgs) -> Result<()> {
	let raw: Vec<String> = std::env::args().skip(1).collect();
	let config = supervisor_config(&args, &raw)?;
	info!(
		target = "pair.supervisor",
		entry = %config.entry.display(),
		argv = ?config.argv,
		"starting supervisor"
	);

	let operator = (!args.test).then(operator_lines);
	SessionSupervisor::new(config, ProcessLauncher).run(operator).await?;
	Ok(())
}

/// Terminal lines for the worker. Read on a plain thread so a blocked read
/// never holds up runtime shutdown.
fn operator_lines() -> mpsc::UnboundedReceiver<String> {
	let (tx, rx) = mpsc::unbounded_channel();
	std::thread::spawn(move || {
		for line in std::io::stdin().lock().lines() {
			match line {
				Ok(line) => {
					if tx.send(line).is_err() {
						break;
					}
				}
				Err(err) => {
					warn!(target = "pair.supervisor", error = %err, "operator input closed");
					break;
				}
			}
		}
	});
	rx
}
