//! Pairing requests.
//!
//! Each normalised phone number is one session: its store is opened under the
//! phone's digits and at most one [`ConnectionLifecycleHandler`] runs for it.
//! Requests arriving while that session is still waiting for its code join
//! the pending request and receive the same answer.

use std::collections::HashMap;
use std::sync::Arc;

use pair_protocol::{PairRequest, PushMessage};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::lifecycle::{ConnectionLifecycleHandler, LifecycleConfig, PairingSlot, RestartSignal};
use crate::store::{CredentialStore, StoreFactory};
use crate::transport::Connector;

/// Shortest accepted number, country code included.
pub const MIN_PHONE_DIGITS: usize = 11;

/// Answer shared by every caller waiting on the same session.
pub type PairingResult = std::result::Result<String, Arc<Error>>;

/// Strips everything but digits and checks the length.
pub fn normalize_phone(phone: Option<&str>) -> Result<String> {
	let phone = phone.map(str::trim).unwrap_or_default();
	if phone.is_empty() {
		return Err(Error::Validation("Please provide a phone number".into()));
	}
	let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
	if digits.len() < MIN_PHONE_DIGITS {
		return Err(Error::Validation("Please enter your number with country code".into()));
	}
	Ok(digits)
}

/// `None` once the session's code was handed out and it keeps running.
type Waiters = Option<Vec<oneshot::Sender<PairingResult>>>;

struct Inner {
	stores: Arc<dyn StoreFactory>,
	connector: Arc<dyn Connector>,
	restart: Arc<dyn RestartSignal>,
	observers: broadcast::Sender<PushMessage>,
	config: LifecycleConfig,
	sessions: Mutex<HashMap<String, Waiters>>,
}

/// Starts sessions for pairing requests and fans their results out.
#[derive(Clone)]
pub struct PairingCoordinator {
	inner: Arc<Inner>,
}

impl PairingCoordinator {
	pub fn new(
		stores: Arc<dyn StoreFactory>,
		connector: Arc<dyn Connector>,
		restart: Arc<dyn RestartSignal>,
		config: LifecycleConfig,
	) -> Self {
		let (observers, _) = broadcast::channel(64);
		Self {
			inner: Arc::new(Inner {
				stores,
				connector,
				restart,
				observers,
				config,
				sessions: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Receives a [`PushMessage`] for every session that opens from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
		self.inner.observers.subscribe()
	}

	/// Number of sessions currently running in this worker.
	pub fn active_sessions(&self) -> usize {
		self.inner.sessions.lock().len()
	}

	/// Resolves to the pairing code for `request`, starting a session when
	/// none is pending for the number.
	pub async fn request_code(&self, request: PairRequest) -> PairingResult {
		let phone = normalize_phone(request.phone.as_deref()).map_err(Arc::new)?;
		let (tx, rx) = oneshot::channel();
		{
			let mut sessions = self.inner.sessions.lock();
			match sessions.get_mut(&phone) {
				Some(Some(waiters)) => {
					debug!(target = "pair", phone = %phone, "joining pending pairing request");
					waiters.push(tx);
				}
				Some(None) => return Err(Arc::new(Error::SessionActive)),
				None => {
					let store = self
						.inner
						.stores
						.open(&phone, request.backend.as_ref())
						.map_err(Arc::new)?;
					sessions.insert(phone.clone(), Some(vec![tx]));
					self.start_session(phone, store);
				}
			}
		}
		rx.await.unwrap_or_else(|_| Err(Arc::new(Error::ConnectionClosed)))
	}

	fn start_session(&self, phone: String, store: Arc<dyn CredentialStore>) {
		let inner = self.inner.clone();
		let handler = ConnectionLifecycleHandler::new(
			phone.clone(),
			store,
			inner.connector.clone(),
			inner.restart.clone(),
			inner.observers.clone(),
			inner.config.clone(),
		);
		let (slot, code_rx) = PairingSlot::new();
		info!(target = "pair", "starting pairing session");

		let results = tokio::spawn(fan_out(inner.clone(), phone.clone(), code_rx));
		tokio::spawn(async move {
			let outcome = handler.run(slot).await;
			let _ = results.await;
			inner.sessions.lock().remove(&phone);
			debug!(target = "pair", phone = %phone, ?outcome, "pairing session ended");
		});
	}
}

async fn fan_out(inner: Arc<Inner>, phone: String, code_rx: oneshot::Receiver<Result<String>>) {
	let result: PairingResult = match code_rx.await {
		Ok(result) => result.map_err(Arc::new),
		Err(_) => Err(Arc::new(Error::ConnectionClosed)),
	};
	let waiters = inner
		.sessions
		.lock()
		.get_mut(&phone)
		.and_then(Option::take)
		.unwrap_or_default();
	debug!(target = "pair", phone = %phone, waiters = waiters.len(), ok = result.is_ok(), "pairing result ready");
	for waiter in waiters {
		let _ = waiter.send(result.clone());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn phone_is_reduced_to_digits() {
		assert_eq!(normalize_phone(Some("+91 77888-61848")).unwrap(), "917788861848");
		assert_eq!(normalize_phone(Some("917788861848")).unwrap(), "917788861848");
	}

	#[test]
	fn short_or_missing_phone_is_rejected() {
		let err = normalize_phone(Some("7788861848")).unwrap_err();
		assert!(err.is_validation());
		assert_eq!(err.to_string(), "Please enter your number with country code");

		assert_eq!(normalize_phone(None).unwrap_err().to_string(), "Please provide a phone number");
		assert_eq!(normalize_phone(Some("  ")).unwrap_err().to_string(), "Please provide a phone number");
		assert!(normalize_phone(Some("abc-def")).unwrap_err().is_validation());
	}
}
