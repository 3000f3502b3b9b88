//! Error types for stores, transports and pairing sessions.

use thiserror::Error;

/// Result type alias for session and store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Backend failure carried as the source of [`Error::Store`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
	/// Caller input rejected before any connection was opened.
	#[error("{0}")]
	Validation(String),

	/// A store backend failed to read, write or delete a record.
	#[error("store {op} failed for '{id}'")]
	Store {
		op: StoreOp,
		id: String,
		#[source]
		source: BoxError,
	},

	/// Some entries of a batched key write failed; the others were applied.
	#[error("batched write failed for {} record(s): {}", failed.len(), failed.join(", "))]
	Batch { failed: Vec<String> },

	/// The remote side refused to issue a pairing code.
	#[error("Error requesting pairing code: {0}")]
	PairingRequest(String),

	/// The stored identity is already linked; no pairing code can be issued.
	#[error("This number already has a linked session")]
	AlreadyRegistered,

	/// A session for the number is running and its code was already handed out.
	#[error("A pairing session for this number is already running")]
	SessionActive,

	/// The connection closed before a pairing code was produced.
	#[error("Connection closed before a pairing code was issued")]
	ConnectionClosed,

	#[error("Transport error: {0}")]
	Transport(String),

	/// The snapshot publish target rejected or lost the upload.
	#[error("Publish failed: {0}")]
	Publish(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
	Read,
	Write,
	Remove,
	Clear,
}

impl std::fmt::Display for StoreOp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			StoreOp::Read => "read",
			StoreOp::Write => "write",
			StoreOp::Remove => "remove",
			StoreOp::Clear => "clear",
		})
	}
}

impl Error {
	pub fn store(op: StoreOp, id: impl Into<String>, source: impl Into<BoxError>) -> Self {
		Error::Store {
			op,
			id: id.into(),
			source: source.into(),
		}
	}

	pub fn is_validation(&self) -> bool {
		matches!(self, Error::Validation(_))
	}

	/// HTTP status the request layer answers with when this error reaches a caller.
	pub fn status_code(&self) -> u16 {
		match self {
			Error::Validation(_) => 400,
			Error::PairingRequest(_) | Error::Transport(_) => 502,
			Error::AlreadyRegistered | Error::SessionActive => 409,
			Error::ConnectionClosed => 503,
			_ => 500,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_codes_follow_error_kind() {
		assert_eq!(Error::Validation("x".into()).status_code(), 400);
		assert_eq!(Error::PairingRequest("x".into()).status_code(), 502);
		assert_eq!(Error::ConnectionClosed.status_code(), 503);
		assert_eq!(Error::SessionActive.status_code(), 409);
		assert_eq!(Error::store(StoreOp::Write, "creds", "disk full").status_code(), 500);
	}

	#[test]
	fn store_error_keeps_backend_failure_as_source() {
		let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only filesystem");
		let err = Error::store(StoreOp::Write, "creds", io);

		assert_eq!(err.to_string(), "store write failed for 'creds'");
		let source = std::error::Error::source(&err).expect("store error without source");
		assert_eq!(source.to_string(), "read-only filesystem");
		assert_eq!(
			source.downcast_ref::<std::io::Error>().map(std::io::Error::kind),
			Some(std::io::ErrorKind::PermissionDenied)
		);
	}

	#[test]
	fn batch_error_lists_failed_ids() {
		let err = Error::Batch {
			failed: vec!["pre-key-1".into(), "session-2".into()],
		};
		assert_eq!(err.to_string(), "batched write failed for 2 record(s): pre-key-1, session-2");
	}
}
