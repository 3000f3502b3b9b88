//! Entry-file change detection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;

/// Polls one file and reports when it is modified or recreated.
///
/// Polls metadata, so a file replaced by a rename counts as a change.
pub struct EntryWatch {
	path: PathBuf,
	rx: mpsc::UnboundedReceiver<()>,
	_watcher: PollWatcher,
}

impl EntryWatch {
	pub fn new(path: &Path, interval: Duration) -> Result<Self> {
		let (tx, rx) = mpsc::unbounded_channel();
		let mut watcher = PollWatcher::new(
			move |res: notify::Result<Event>| match res {
				Ok(event) if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
					let _ = tx.send(());
				}
				Ok(_) => {}
				Err(err) => warn!(target = "pair.supervisor", error = %err, "entry watch error"),
			},
			Config::default().with_poll_interval(interval),
		)?;
		watcher.watch(path, RecursiveMode::NonRecursive)?;
		debug!(target = "pair.supervisor", path = %path.display(), "watching entry file");

		Ok(Self {
			path: path.to_path_buf(),
			rx,
			_watcher: watcher,
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Waits for the next change.
	pub async fn changed(&mut self) {
		if self.rx.recv().await.is_none() {
			std::future::pending::<()>().await;
		}
	}
}
