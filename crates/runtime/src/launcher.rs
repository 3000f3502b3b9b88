//! Worker process launching.

use std::path::Path;
use std::process::Stdio;

use pair_protocol::ControlMessage;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::channel::{read_message, write_message};
use crate::error::{Error, Result};

/// Something that happened to a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
	/// A message the worker wrote on its control channel.
	Control(ControlMessage),
	/// The worker exited; `None` when it was killed by a signal.
	Exited(Option<i32>),
}

/// Sink for the events of one worker generation.
#[derive(Clone)]
pub struct WorkerEvents {
	generation: u64,
	tx: mpsc::UnboundedSender<(u64, WorkerEvent)>,
}

impl WorkerEvents {
	pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, WorkerEvent)>) -> Self {
		Self { generation, tx }
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Reports `event`. Returns `false` once the supervisor is gone.
	pub fn send(&self, event: WorkerEvent) -> bool {
		self.tx.send((self.generation, event)).is_ok()
	}
}

/// Supervisor-side handle of a running worker.
///
/// Dropping the handle kills the worker.
pub struct WorkerHandle {
	pid: Option<u32>,
	control: mpsc::UnboundedSender<ControlMessage>,
	kill: Option<oneshot::Sender<()>>,
}

impl WorkerHandle {
	pub fn new(pid: Option<u32>, control: mpsc::UnboundedSender<ControlMessage>, kill: oneshot::Sender<()>) -> Self {
		Self {
			pid,
			control,
			kill: Some(kill),
		}
	}

	pub fn pid(&self) -> Option<u32> {
		self.pid
	}

	/// Queues a message for the worker's control channel.
	pub fn send(&self, message: ControlMessage) -> Result<()> {
		self.control.send(message).map_err(|_| Error::ChannelClosed)
	}

	/// Kills the worker. Its exit is still reported through [`WorkerEvents`].
	pub fn terminate(mut self) {
		if let Some(kill) = self.kill.take() {
			let _ = kill.send(());
		}
	}
}

/// Starts workers.
pub trait WorkerLauncher: Send {
	/// Starts `entry` with `argv`. Control messages and the exit of the worker
	/// are reported to `events`.
	fn launch(&mut self, entry: &Path, argv: &[String], events: WorkerEvents) -> Result<WorkerHandle>;
}

/// Launches workers as child processes with the control channel on stdio.
///
/// The worker's stdin carries supervisor → worker messages and its stdout
/// worker → supervisor messages; stderr is inherited for logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

impl WorkerLauncher for ProcessLauncher {
	fn launch(&mut self, entry: &Path, argv: &[String], events: WorkerEvents) -> Result<WorkerHandle> {
		let mut child = Command::new(entry)
			.args(argv)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::inherit())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| Error::Launch(format!("{}: {e}", entry.display())))?;

		let pid = child.id();
		let mut stdin = child
			.stdin
			.take()
			.ok_or_else(|| Error::Launch("worker stdin is not piped".into()))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| Error::Launch("worker stdout is not piped".into()))?;

		let (control_tx, mut control_rx) = mpsc::unbounded_channel::<ControlMessage>();
		tokio::spawn(async move {
			while let Some(message) = control_rx.recv().await {
				if let Err(err) = write_message(&mut stdin, &message).await {
					debug!(target = "pair.supervisor", error = %err, "worker control channel closed");
					break;
				}
			}
		});

		let reader_events = events.clone();
		tokio::spawn(async move {
			let mut reader = BufReader::new(stdout);
			loop {
				match read_message(&mut reader).await {
					Ok(Some(message)) => {
						if !reader_events.send(WorkerEvent::Control(message)) {
							break;
						}
					}
					Ok(None) => break,
					Err(err) => {
						warn!(target = "pair.supervisor", error = %err, "worker control channel failed");
						break;
					}
				}
			}
		});

		let (kill_tx, kill_rx) = oneshot::channel();
		tokio::spawn(async move {
			let status = tokio::select! {
				status = child.wait() => status,
				_ = kill_rx => {
					if let Err(err) = child.kill().await {
						warn!(target = "pair.supervisor", error = %err, "failed to kill worker");
					}
					child.wait().await
				}
			};
			let code = match status {
				Ok(status) => status.code(),
				Err(err) => {
					warn!(target = "pair.supervisor", error = %err, "failed to reap worker");
					None
				}
			};
			events.send(WorkerEvent::Exited(code));
		});

		Ok(WorkerHandle::new(pid, control_tx, kill_tx))
	}
}
