//! Single-worker supervision.
//!
//! The supervisor owns at most one worker. Policy:
//!
//! - `reset` from the worker: kill it and start a replacement with the same argv
//! - `uptime` from the worker: reply with the supervisor's uptime in seconds
//! - exit code 0: intentional stop, supervision ends
//! - any other exit: wait for the entry file to change, then start again
//! - operator input: forwarded to the worker as [`ControlMessage::Operator`]

use std::path::PathBuf;
use std::time::Duration;

use pair_protocol::ControlMessage;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::launcher::{WorkerEvent, WorkerEvents, WorkerHandle, WorkerLauncher};
use crate::watch::EntryWatch;

/// Poll interval of the entry watch unless configured otherwise.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
	/// Executable of the worker; also the file watched after a crash.
	pub entry: PathBuf,
	/// Arguments of every worker generation.
	pub argv: Vec<String>,
	pub watch_interval: Duration,
}

/// Supervisor view of the current worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProcess {
	pub pid: Option<u32>,
	pub argv: Vec<String>,
	pub is_running: bool,
}

pub struct SessionSupervisor<L> {
	config: SupervisorConfig,
	launcher: L,
	started: Instant,
	running: bool,
	generation: u64,
	worker: Option<WorkerHandle>,
	events_tx: mpsc::UnboundedSender<(u64, WorkerEvent)>,
	events_rx: mpsc::UnboundedReceiver<(u64, WorkerEvent)>,
	watch: Option<EntryWatch>,
}

impl<L: WorkerLauncher> SessionSupervisor<L> {
	pub fn new(config: SupervisorConfig, launcher: L) -> Self {
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		Self {
			config,
			launcher,
			started: Instant::now(),
			running: false,
			generation: 0,
			worker: None,
			events_tx,
			events_rx,
			watch: None,
		}
	}

	pub fn process(&self) -> SessionProcess {
		SessionProcess {
			pid: self.worker.as_ref().and_then(WorkerHandle::pid),
			argv: self.config.argv.clone(),
			is_running: self.running,
		}
	}

	pub fn uptime(&self) -> Duration {
		self.started.elapsed()
	}

	pub fn launcher(&self) -> &L {
		&self.launcher
	}

	/// Starts a worker unless one is running. Returns whether one was started.
	pub fn start(&mut self) -> Result<bool> {
		if self.running {
			debug!(target = "pair.supervisor", "worker already running; start ignored");
			return Ok(false);
		}

		self.generation += 1;
		let events = WorkerEvents::new(self.generation, self.events_tx.clone());
		let handle = self.launcher.launch(&self.config.entry, &self.config.argv, events)?;
		info!(target = "pair.supervisor", pid = ?handle.pid(), generation = self.generation, "worker started");
		self.worker = Some(handle);
		self.running = true;
		Ok(true)
	}

	/// Kills the current worker, if any.
	pub fn terminate(&mut self) {
		if let Some(worker) = self.worker.take() {
			info!(target = "pair.supervisor", pid = ?worker.pid(), "terminating worker");
			worker.terminate();
		}
		self.running = false;
	}

	/// Forwards an operator line to the current worker.
	pub fn forward(&self, line: &str) {
		let Some(worker) = &self.worker else {
			warn!(target = "pair.supervisor", "no worker running; operator input dropped");
			return;
		};
		if worker.send(ControlMessage::Operator { line: line.to_string() }).is_err() {
			warn!(target = "pair.supervisor", "worker control channel closed; operator input dropped");
		}
	}

	/// Starts the first worker and supervises until a worker stops with exit code 0.
	///
	/// `operator` carries lines typed at the supervisor's terminal; pass `None`
	/// to run without interactive input.
	pub async fn run(mut self, mut operator: Option<mpsc::UnboundedReceiver<String>>) -> Result<()> {
		self.start()?;
		loop {
			tokio::select! {
				Some((generation, event)) = self.events_rx.recv() => {
					if generation != self.generation {
						debug!(target = "pair.supervisor", generation, ?event, "ignoring event of a replaced worker");
						continue;
					}
					if self.handle(event)? {
						return Ok(());
					}
				}
				_ = entry_changed(&mut self.watch) => {
					info!(target = "pair.supervisor", "entry file changed; restarting worker");
					self.watch = None;
					self.start()?;
				}
				line = next_line(&mut operator) => match line {
					Some(line) => self.forward(&line),
					None => operator = None,
				},
			}
		}
	}

	/// Applies the policy to one event of the current worker. Returns `true`
	/// when supervision should end.
	fn handle(&mut self, event: WorkerEvent) -> Result<bool> {
		match event {
			WorkerEvent::Control(ControlMessage::Reset) => {
				info!(target = "pair.supervisor", "worker requested reset");
				self.terminate();
				self.start()?;
			}
			WorkerEvent::Control(ControlMessage::Uptime) => {
				let seconds = self.uptime().as_secs_f64();
				if let Some(worker) = &self.worker {
					let _ = worker.send(ControlMessage::UptimeReply { seconds });
				}
			}
			WorkerEvent::Control(other) => {
				debug!(target = "pair.supervisor", message = ?other, "ignoring control message from worker");
			}
			WorkerEvent::Exited(Some(0)) => {
				info!(target = "pair.supervisor", "worker stopped");
				self.worker = None;
				self.running = false;
				return Ok(true);
			}
			WorkerEvent::Exited(code) => {
				error!(target = "pair.supervisor", code = ?code, "worker crashed; waiting for entry file change");
				self.worker = None;
				self.running = false;
				self.watch = Some(EntryWatch::new(&self.config.entry, self.config.watch_interval)?);
			}
		}
		Ok(false)
	}
}

async fn entry_changed(watch: &mut Option<EntryWatch>) {
	match watch {
		Some(watch) => watch.changed().await,
		None => std::future::pending().await,
	}
}

async fn next_line(operator: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
	match operator {
		Some(rx) => rx.recv().await,
		None => std::future::pending().await,
	}
}

#[cfg(test)]
mod tests;
