//! Disconnect classification and the recovery each class demands.

use serde::{Deserialize, Serialize};

/// Why an active session's transport closed.
///
/// The set is closed: status codes or names the service invents later land in
/// [`DisconnectReason::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisconnectReason {
	RestartRequired,
	LoggedOut,
	TimedOut,
	ConnectionLost,
	ConnectionReplaced,
	ConnectionClosed,
	BadSession,
	#[serde(other)]
	Other,
}

/// What the lifecycle handler does after a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
	/// Open a new connection in the same worker, same phone, same store.
	ReconnectInPlace,
	/// Destroy the stored credentials and end the session.
	ClearStoreAndStop,
	/// Ask the supervisor to replace the whole worker process.
	RestartProcess,
}

impl DisconnectReason {
	pub const ALL: [DisconnectReason; 8] = [
		DisconnectReason::RestartRequired,
		DisconnectReason::LoggedOut,
		DisconnectReason::TimedOut,
		DisconnectReason::ConnectionLost,
		DisconnectReason::ConnectionReplaced,
		DisconnectReason::ConnectionClosed,
		DisconnectReason::BadSession,
		DisconnectReason::Other,
	];

	/// Maps the service's numeric close status to a reason.
	///
	/// 408 is shared by "connection lost" and "timed out" on the wire and is
	/// reported as [`DisconnectReason::ConnectionLost`]; both recover the same way.
	pub fn from_status_code(code: u16) -> Self {
		match code {
			515 => DisconnectReason::RestartRequired,
			401 => DisconnectReason::LoggedOut,
			408 => DisconnectReason::ConnectionLost,
			440 => DisconnectReason::ConnectionReplaced,
			428 => DisconnectReason::ConnectionClosed,
			500 => DisconnectReason::BadSession,
			_ => DisconnectReason::Other,
		}
	}

	pub fn recovery(self) -> RecoveryAction {
		match self {
			DisconnectReason::RestartRequired => RecoveryAction::ReconnectInPlace,
			DisconnectReason::LoggedOut => RecoveryAction::ClearStoreAndStop,
			DisconnectReason::TimedOut
			| DisconnectReason::ConnectionLost
			| DisconnectReason::ConnectionReplaced
			| DisconnectReason::ConnectionClosed
			| DisconnectReason::BadSession
			| DisconnectReason::Other => RecoveryAction::RestartProcess,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			DisconnectReason::RestartRequired => "restart-required",
			DisconnectReason::LoggedOut => "logged-out",
			DisconnectReason::TimedOut => "timed-out",
			DisconnectReason::ConnectionLost => "connection-lost",
			DisconnectReason::ConnectionReplaced => "connection-replaced",
			DisconnectReason::ConnectionClosed => "connection-closed",
			DisconnectReason::BadSession => "bad-session",
			DisconnectReason::Other => "other",
		}
	}
}

impl std::fmt::Display for DisconnectReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_reason_has_exactly_one_documented_action() {
		for reason in DisconnectReason::ALL {
			let expected = match reason {
				DisconnectReason::RestartRequired => RecoveryAction::ReconnectInPlace,
				DisconnectReason::LoggedOut => RecoveryAction::ClearStoreAndStop,
				_ => RecoveryAction::RestartProcess,
			};
			assert_eq!(reason.recovery(), expected, "{reason}");
		}
	}

	#[test]
	fn status_codes_map_to_reasons() {
		assert_eq!(DisconnectReason::from_status_code(515), DisconnectReason::RestartRequired);
		assert_eq!(DisconnectReason::from_status_code(401), DisconnectReason::LoggedOut);
		assert_eq!(DisconnectReason::from_status_code(440), DisconnectReason::ConnectionReplaced);
		assert_eq!(DisconnectReason::from_status_code(418), DisconnectReason::Other);
	}

	#[test]
	fn names_serialize_kebab_case_and_unknown_names_fall_back() {
		for reason in DisconnectReason::ALL {
			let json = serde_json::to_string(&reason).unwrap();
			assert_eq!(json, format!("\"{}\"", reason.as_str()));
		}
		let unknown: DisconnectReason = serde_json::from_str("\"multidevice-mismatch\"").unwrap();
		assert_eq!(unknown, DisconnectReason::Other);
	}
}
