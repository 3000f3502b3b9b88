//! Session transport seam.
//!
//! The messaging protocol itself lives behind [`Connector`]. A connection
//! exposes two typed event streams (credential updates and status changes)
//! and a [`SessionSocket`] for the few requests this crate makes. Inbound chat
//! traffic never reaches this side.

mod gateway;

use std::sync::Arc;

use async_trait::async_trait;
use pair_protocol::{DisconnectReason, Node};
use tokio::sync::mpsc;

pub use gateway::GatewayConnector;

use crate::creds::AuthCreds;
use crate::error::Result;
use crate::keys::KeyStore;

/// Status change of a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionUpdate {
	Connecting,
	Open,
	Closed(DisconnectReason),
}

/// The two event streams of a connection.
///
/// Both senders are dropped when the connection ends; a status stream that
/// ends without [`ConnectionUpdate::Closed`] is read as
/// [`DisconnectReason::ConnectionClosed`].
pub struct Subscription {
	/// Partial creds trees to merge into the stored ones.
	pub creds: mpsc::UnboundedReceiver<Node>,
	pub status: mpsc::UnboundedReceiver<ConnectionUpdate>,
}

impl Subscription {
	/// Creates a subscription together with the sending halves.
	pub fn channel() -> (SubscriptionSender, Self) {
		let (creds_tx, creds) = mpsc::unbounded_channel();
		let (status_tx, status) = mpsc::unbounded_channel();
		(
			SubscriptionSender {
				creds: creds_tx,
				status: status_tx,
			},
			Self { creds, status },
		)
	}
}

/// Producer side of a [`Subscription`].
#[derive(Clone)]
pub struct SubscriptionSender {
	pub creds: mpsc::UnboundedSender<Node>,
	pub status: mpsc::UnboundedSender<ConnectionUpdate>,
}

/// Requests issued on an open connection.
#[async_trait]
pub trait SessionSocket: Send + Sync {
	/// Asks the remote side for a pairing code linking `phone`.
	async fn request_pairing_code(&self, phone: &str) -> Result<String>;

	/// Closes the connection. Idempotent.
	async fn close(&self);
}

pub struct Connection {
	pub socket: Arc<dyn SessionSocket>,
	pub events: Subscription,
}

/// Opens connections for a session.
#[async_trait]
pub trait Connector: Send + Sync {
	/// Starts the handshake with `creds`. Key reads and writes requested by the
	/// remote side during the connection go through `keys`.
	async fn connect(&self, creds: &AuthCreds, keys: KeyStore) -> Result<Connection>;
}
