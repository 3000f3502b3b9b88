use std::sync::Arc;

use anyhow::Result;
use pair::{BackendFactory, GatewayConnector, PairingCoordinator, RestartSignal};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cli::ServeArgs;
use crate::config::ServeConfig;
use crate::link::{ControlLink, Detached};
use crate::server;

pub async fn run(args: ServeArgs) -> Result<()> {
	let config = ServeConfig::from_args(&args)?;
	info!(
		target = "pair",
		backend = ?args.backend,
		gateway = %config.gateway_url,
		supervised = config.supervised,
		"starting worker"
	);

	let (restart, link): (Arc<dyn RestartSignal>, Option<JoinHandle<()>>) = if config.supervised {
		let (link, task) = ControlLink::stdio();
		(Arc::new(link), Some(task))
	} else {
		(Arc::new(Detached), None)
	};

	let coordinator = PairingCoordinator::new(
		Arc::new(BackendFactory::new(config.backend.clone())),
		Arc::new(GatewayConnector::new(config.gateway_url.clone())),
		restart,
		config.lifecycle.clone(),
	);

	server::serve(config.addr, coordinator, shutdown_signal(link)).await?;
	info!(target = "pair", "worker stopped");
	Ok(())
}

/// Resolves on Ctrl-C, or when the supervisor closes the control channel.
async fn shutdown_signal(link: Option<JoinHandle<()>>) {
	let supervisor_gone = async move {
		match link {
			Some(task) => {
				let _ = task.await;
				debug!(target = "pair", "control channel closed");
			}
			None => std::future::pending().await,
		}
	};

	tokio::select! {
		result = tokio::signal::ctrl_c() => {
			if let Err(err) = result {
				warn!(target = "pair", error = %err, "failed to listen for Ctrl-C");
				std::future::pending::<()>().await;
			}
		}
		_ = supervisor_gone => {}
	}
	info!(target = "pair", "shutting down");
}
