//! Frames exchanged with the transport gateway.
//!
//! The gateway owns the messaging service's handshake and encryption. This
//! side hands it the stored credentials, asks it for pairing codes and serves
//! its key-store reads and writes. Credential payloads use the text-safe form
//! of [`crate::codec`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::disconnect::DisconnectReason;

/// Frames sent to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
	/// First frame on every connection.
	Hello { creds: Value },
	RequestPairingCode { id: u64, phone: String },
	/// Answer to [`GatewayFrame::KeysGet`]; absent ids map to `null`.
	KeysResult { id: u64, values: BTreeMap<String, Value> },
	/// Answer to [`GatewayFrame::KeysSet`].
	KeysAck {
		id: u64,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		error: Option<String>,
	},
}

/// Frames received from the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
	/// Partial credential tree to merge into the stored one.
	CredsUpdate { creds: Value },
	Connection {
		status: ConnectionState,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		reason: Option<DisconnectReason>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		status_code: Option<u16>,
	},
	PairingCode { id: u64, code: String },
	PairingError { id: u64, message: String },
	KeysGet { id: u64, category: String, ids: Vec<String> },
	/// `data[category][id]`; `null` deletes the entry.
	KeysSet { id: u64, data: BTreeMap<String, BTreeMap<String, Value>> },
	/// Inbound chat traffic. Not consumed here.
	Message,
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
	Connecting,
	Open,
	Close,
}

impl GatewayFrame {
	/// Resolves the reason of a `close` frame, preferring the explicit name over the status code.
	pub fn close_reason(reason: Option<DisconnectReason>, status_code: Option<u16>) -> DisconnectReason {
		reason
			.or_else(|| status_code.map(DisconnectReason::from_status_code))
			.unwrap_or(DisconnectReason::ConnectionClosed)
	}
}
