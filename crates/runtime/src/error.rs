//! Error types for worker supervision.

use thiserror::Error;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
	/// The worker process could not be started.
	#[error("Failed to launch worker: {0}")]
	Launch(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// The entry-file watcher could not be set up.
	#[error("Watch error: {0}")]
	Watch(#[from] notify::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// The other end of a control channel is gone.
	#[error("Control channel closed")]
	ChannelClosed,
}
