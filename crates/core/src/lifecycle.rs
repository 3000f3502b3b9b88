//! Connection lifecycle of one pairing session.
//!
//! ```text
//! Idle -> Connecting -> [PairingPending] -> Open -> Closed(reason)
//!              ^                                        |
//!              +------------- restart-required ---------+
//! ```
//!
//! The handler loads the session's [`CredentialBundle`], connects, asks for a
//! pairing code when the identity is unregistered, persists every credential
//! update as it arrives and applies the recovery policy of
//! [`DisconnectReason::recovery`] when the connection closes.

use std::sync::Arc;
use std::time::Duration;

use pair_protocol::{DisconnectReason, Node, PushMessage, RecoveryAction};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::keys::CredentialBundle;
use crate::store::{CredentialStore, masked_session};
use crate::transport::{Connection, ConnectionUpdate, Connector, SessionSocket, Subscription};

/// Wait between connecting and requesting a pairing code.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Idle,
	Connecting,
	PairingPending,
	Open,
	Closed(DisconnectReason),
}

/// What happens once a session reaches [`SessionState::Open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenAction {
	/// Announce the session identifier to push-channel observers.
	#[default]
	Broadcast,
	/// Ask the supervisor for a fresh worker.
	Restart,
}

/// Channel to whoever can replace the worker process.
pub trait RestartSignal: Send + Sync {
	fn request_restart(&self, reason: &str);
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
	pub settle_delay: Duration,
	pub on_open: OpenAction,
}

impl Default for LifecycleConfig {
	fn default() -> Self {
		Self {
			settle_delay: DEFAULT_SETTLE_DELAY,
			on_open: OpenAction::Broadcast,
		}
	}
}

/// The caller's pending pairing request. Settled at most once.
#[derive(Clone)]
pub struct PairingSlot {
	tx: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

impl PairingSlot {
	pub fn new() -> (Self, oneshot::Receiver<Result<String>>) {
		let (tx, rx) = oneshot::channel();
		(
			Self {
				tx: Arc::new(Mutex::new(Some(tx))),
			},
			rx,
		)
	}

	pub fn is_pending(&self) -> bool {
		self.tx.lock().is_some()
	}

	/// Hands `code` to the caller. Returns `false` if the slot was already settled.
	pub fn resolve(&self, code: String) -> bool {
		self.settle(Ok(code))
	}

	/// Fails the caller's request. Returns `false` if the slot was already settled.
	pub fn reject(&self, err: Error) -> bool {
		self.settle(Err(err))
	}

	fn settle(&self, result: Result<String>) -> bool {
		match self.tx.lock().take() {
			Some(tx) => {
				let _ = tx.send(result);
				true
			}
			None => false,
		}
	}
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
	/// The account logged the session out; its store was cleared.
	LoggedOut,
	/// A worker restart was requested.
	RestartRequested,
	/// The credentials could not be loaded; the caller received the error.
	Aborted,
	/// The pairing-code request failed; the caller received the error and the
	/// connection was closed.
	PairingFailed,
}

enum Ended {
	Closed(DisconnectReason),
	Restart,
	PairingFailed,
}

pub struct ConnectionLifecycleHandler {
	phone: String,
	store: Arc<dyn CredentialStore>,
	connector: Arc<dyn Connector>,
	restart: Arc<dyn RestartSignal>,
	observers: broadcast::Sender<PushMessage>,
	config: LifecycleConfig,
	state: watch::Sender<SessionState>,
}

impl ConnectionLifecycleHandler {
	pub fn new(
		phone: String,
		store: Arc<dyn CredentialStore>,
		connector: Arc<dyn Connector>,
		restart: Arc<dyn RestartSignal>,
		observers: broadcast::Sender<PushMessage>,
		config: LifecycleConfig,
	) -> Self {
		let (state, _) = watch::channel(SessionState::Idle);
		Self {
			phone,
			store,
			connector,
			restart,
			observers,
			config,
			state,
		}
	}

	pub fn phone(&self) -> &str {
		&self.phone
	}

	pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
		self.state.subscribe()
	}

	fn masked(&self) -> String {
		masked_session(self.store.session())
	}

	fn set_state(&self, state: SessionState) {
		debug!(target = "pair.session", session = %self.store.session(), ?state, "session state");
		self.state.send_replace(state);
	}

	/// Drives the session until it stops for good.
	///
	/// `slot` is settled exactly once: with the pairing code, with the error
	/// that prevented it, with [`Error::AlreadyRegistered`] once a registered
	/// identity is back online, or with [`Error::ConnectionClosed`] when the
	/// connection ends first. A failed pairing-code request ends the session.
	/// A `restart-required` close reconnects with the same phone and store;
	/// other closes end the session.
	pub async fn run(self, slot: PairingSlot) -> SessionOutcome {
		let mut bundle = match CredentialBundle::load(self.store.clone()).await {
			Ok(bundle) => bundle,
			Err(err) => {
				error!(target = "pair.session", session = %self.masked(), error = &err as &dyn std::error::Error, "failed to load credentials");
				slot.reject(err);
				return SessionOutcome::Aborted;
			}
		};
		if bundle.creds.is_registered() {
			info!(target = "pair.session", session = %self.masked(), "resuming registered identity");
		}

		loop {
			self.set_state(SessionState::Connecting);
			let connection = match self.connector.connect(&bundle.creds, bundle.keys.clone()).await {
				Ok(connection) => connection,
				Err(err) => {
					warn!(target = "pair.session", session = %self.masked(), error = %err, "connect failed");
					slot.reject(err);
					self.set_state(SessionState::Closed(DisconnectReason::ConnectionClosed));
					self.restart.request_restart("connect failed");
					return SessionOutcome::RestartRequested;
				}
			};

			let ended = self.drive(&mut bundle, connection, &slot).await;
			let reason = match ended {
				Ended::Restart => {
					self.restart.request_restart("session open");
					return SessionOutcome::RestartRequested;
				}
				Ended::PairingFailed => {
					self.set_state(SessionState::Closed(DisconnectReason::ConnectionClosed));
					info!(target = "pair.session", session = %self.masked(), "pairing failed; session ended");
					return SessionOutcome::PairingFailed;
				}
				Ended::Closed(reason) => reason,
			};

			self.set_state(SessionState::Closed(reason));
			let recovery = reason.recovery();
			info!(target = "pair.session", session = %self.masked(), %reason, ?recovery, "connection closed");
			match recovery {
				RecoveryAction::ReconnectInPlace => continue,
				RecoveryAction::ClearStoreAndStop => {
					if let Err(err) = self.store.clear().await {
						error!(target = "pair.session", session = %self.masked(), error = &err as &dyn std::error::Error, "failed to clear logged-out session");
					}
					return SessionOutcome::LoggedOut;
				}
				RecoveryAction::RestartProcess => {
					self.restart.request_restart(reason.as_str());
					return SessionOutcome::RestartRequested;
				}
			}
		}
	}

	/// Runs one connection until it closes.
	async fn drive(&self, bundle: &mut CredentialBundle, connection: Connection, slot: &PairingSlot) -> Ended {
		let Connection { socket, events } = connection;
		let Subscription {
			creds: mut creds_rx,
			status: mut status_rx,
		} = events;

		let registered = bundle.creds.is_registered();
		let mut pairing = (!registered).then(|| {
			self.set_state(SessionState::PairingPending);
			self.spawn_pairing(socket.clone(), slot.clone())
		});

		let ended = loop {
			tokio::select! {
				biased;
				Some(update) = creds_rx.recv() => self.persist_creds(bundle, update).await,
				update = status_rx.recv() => match update {
					Some(ConnectionUpdate::Connecting) => {}
					Some(ConnectionUpdate::Open) => {
						self.set_state(SessionState::Open);
						if registered && slot.reject(Error::AlreadyRegistered) {
							debug!(target = "pair.session", "registered identity reconnected; no code needed");
						}
						if self.announce_open(bundle).await {
							break Ended::Restart;
						}
					}
					Some(ConnectionUpdate::Closed(reason)) => break Ended::Closed(reason),
					None => break Ended::Closed(DisconnectReason::ConnectionClosed),
				},
				Some(failed) = pairing_done(&mut pairing) => {
					if failed {
						break Ended::PairingFailed;
					}
				}
			}
		};

		while let Ok(update) = creds_rx.try_recv() {
			self.persist_creds(bundle, update).await;
		}
		if let Some(task) = pairing {
			task.abort();
		}
		slot.reject(Error::ConnectionClosed);
		socket.close().await;
		ended
	}

	/// Requests the code after the settle delay. The task yields `true` when
	/// the request failed.
	fn spawn_pairing(&self, socket: Arc<dyn SessionSocket>, slot: PairingSlot) -> JoinHandle<bool> {
		let phone = self.phone.clone();
		let settle = self.config.settle_delay;
		tokio::spawn(async move {
			tokio::time::sleep(settle).await;
			debug!(target = "pair.session", phone = %phone, "requesting pairing code");
			match socket.request_pairing_code(&phone).await {
				Ok(code) => {
					if slot.resolve(code) {
						info!(target = "pair.session", "pairing code issued");
					} else {
						info!(target = "pair.session", "pairing code reissued after reconnect; caller already answered");
					}
					false
				}
				Err(err) => {
					warn!(target = "pair.session", error = %err, "pairing code request failed");
					slot.reject(err);
					true
				}
			}
		})
	}

	async fn persist_creds(&self, bundle: &mut CredentialBundle, update: Node) {
		if let Err(err) = bundle.update_creds(update).await {
			warn!(target = "pair.session", session = %self.masked(), error = &err as &dyn std::error::Error, "failed to persist credential update");
		}
	}

	/// Flushes the store and announces the session. Returns `true` when the
	/// worker should be restarted instead.
	async fn announce_open(&self, bundle: &CredentialBundle) -> bool {
		if let Err(err) = bundle.save_creds().await {
			warn!(target = "pair.session", session = %self.masked(), error = &err as &dyn std::error::Error, "failed to save credentials on open");
		}
		let session_id = match self.store.flush().await {
			Ok(id) => id.unwrap_or_else(|| self.store.session().to_string()),
			Err(err) => {
				error!(target = "pair.session", session = %self.masked(), error = &err as &dyn std::error::Error, "failed to flush credentials");
				return false;
			}
		};
		info!(target = "pair.session", session = %self.masked(), "session open");
		debug!(target = "pair.session", session_id = %session_id, "session identifier");

		match self.config.on_open {
			OpenAction::Broadcast => {
				let receivers = self.observers.send(PushMessage { session_id }).unwrap_or(0);
				debug!(target = "pair.session", receivers, "session identifier broadcast");
				false
			}
			OpenAction::Restart => true,
		}
	}
}

/// Waits for the pairing task once; pending forever when there is none.
async fn pairing_done(pairing: &mut Option<JoinHandle<bool>>) -> Option<bool> {
	let Some(task) = pairing.as_mut() else {
		return std::future::pending().await;
	};
	let failed = task.await.unwrap_or(false);
	*pairing = None;
	Some(failed)
}
