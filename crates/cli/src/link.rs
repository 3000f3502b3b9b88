//! Worker side of the supervisor control channel.
//!
//! A supervised worker reads [`ControlMessage`]s on stdin and writes them on
//! stdout. Operator lines typed at the supervisor arrive wrapped in
//! [`ControlMessage::Operator`]; `reset` and `uptime` are acted on.

use pair::RestartSignal;
use pair_protocol::ControlMessage;
use pair_runtime::{read_message, write_message};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sends control messages to the supervisor.
#[derive(Clone)]
pub struct ControlLink {
	tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControlLink {
	/// Runs the link over this process's stdin and stdout.
	pub fn stdio() -> (Self, JoinHandle<()>) {
		Self::spawn(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
	}

	/// Runs the link over `reader` and `writer`. The returned task ends when
	/// the supervisor side of `reader` closes.
	pub fn spawn<R, W>(reader: R, mut writer: W) -> (Self, JoinHandle<()>)
	where
		R: AsyncBufRead + Unpin + Send + 'static,
		W: AsyncWrite + Unpin + Send + 'static,
	{
		let (tx, mut rx) = mpsc::unbounded_channel::<ControlMessage>();
		tokio::spawn(async move {
			while let Some(message) = rx.recv().await {
				if let Err(err) = write_message(&mut writer, &message).await {
					warn!(target = "pair", error = %err, "control channel write failed");
					break;
				}
			}
		});

		let link = Self { tx };
		let task = tokio::spawn(link.clone().read_loop(reader));
		(link, task)
	}

	pub fn send(&self, message: ControlMessage) -> bool {
		self.tx.send(message).is_ok()
	}

	async fn read_loop<R: AsyncBufRead + Unpin>(self, mut reader: R) {
		loop {
			match read_message(&mut reader).await {
				Ok(Some(message)) => self.handle(message),
				Ok(None) => {
					debug!(target = "pair", "supervisor closed the control channel");
					return;
				}
				Err(err) => {
					warn!(target = "pair", error = %err, "control channel read failed");
					return;
				}
			}
		}
	}

	fn handle(&self, message: ControlMessage) {
		match message {
			ControlMessage::Operator { line } => match line.trim() {
				"reset" => self.request_restart("operator"),
				"uptime" => {
					self.send(ControlMessage::Uptime);
				}
				"" => {}
				other => debug!(target = "pair", line = other, "ignoring operator input"),
			},
			ControlMessage::UptimeReply { seconds } => {
				info!(target = "pair", seconds, "supervisor uptime");
			}
			other => debug!(target = "pair", message = ?other, "ignoring control message"),
		}
	}
}

impl RestartSignal for ControlLink {
	fn request_restart(&self, reason: &str) {
		info!(target = "pair", reason, "requesting worker restart");
		if !self.send(ControlMessage::Reset) {
			warn!(target = "pair", "control channel closed; restart request dropped");
		}
	}
}

/// Restart signal of a worker running without a supervisor.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl RestartSignal for Detached {
	fn request_restart(&self, reason: &str) {
		warn!(target = "pair", reason, "restart requested but no supervisor is attached; session ended");
	}
}
