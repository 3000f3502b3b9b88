//! Test doubles for sessions.
//!
//! [`MockConnector`] stands in for the protocol gateway: every connection
//! plays a scripted sequence of events and answers pairing-code requests from
//! a preset result. [`RecordingRestart`] captures restart requests instead of
//! talking to a supervisor.
//!
//! # Example
//!
//! ```ignore
//! use pair::testing::{MockConnector, Step};
//!
//! let connector = MockConnector::new("ABCD-1234");
//! connector.push_script(vec![Step::Wait(Duration::from_secs(5)), Step::Close(DisconnectReason::LoggedOut)]);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pair_protocol::{DisconnectReason, Node};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::creds::AuthCreds;
use crate::error::{Error, Result};
use crate::keys::KeyStore;
use crate::lifecycle::RestartSignal;
use crate::transport::{Connection, ConnectionUpdate, Connector, SessionSocket, Subscription, SubscriptionSender};

/// One scripted connection event.
#[derive(Debug, Clone)]
pub enum Step {
	Wait(Duration),
	Creds(Node),
	Open,
	Close(DisconnectReason),
	/// Ends both event streams without a close update.
	Drop,
}

/// Everything the mock observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockAction {
	Connect { registered: bool },
	RequestCode { phone: String, at: Instant },
	Close,
}

#[derive(Default)]
struct MockState {
	scripts: VecDeque<Vec<Step>>,
	actions: Vec<MockAction>,
	live: Vec<SubscriptionSender>,
	connect_error: Option<String>,
	pairing_error: Option<String>,
}

/// Scripted [`Connector`].
///
/// Connections without a queued script stay open until the handler closes
/// them.
#[derive(Clone)]
pub struct MockConnector {
	code: String,
	state: Arc<Mutex<MockState>>,
}

impl MockConnector {
	pub fn new(code: &str) -> Self {
		Self {
			code: code.to_string(),
			state: Arc::new(Mutex::new(MockState::default())),
		}
	}

	/// Queues the event script of the next unscripted connection.
	pub fn push_script(&self, steps: Vec<Step>) {
		self.state.lock().scripts.push_back(steps);
	}

	/// Makes every following connection attempt fail.
	pub fn fail_connects(&self, message: &str) {
		self.state.lock().connect_error = Some(message.to_string());
	}

	/// Makes every following pairing-code request fail.
	pub fn fail_pairing(&self, message: &str) {
		self.state.lock().pairing_error = Some(message.to_string());
	}

	/// Lets pairing-code requests succeed again.
	pub fn heal_pairing(&self) {
		self.state.lock().pairing_error = None;
	}

	pub fn actions(&self) -> Vec<MockAction> {
		self.state.lock().actions.clone()
	}

	pub fn connect_count(&self) -> usize {
		self.count(|a| matches!(a, MockAction::Connect { .. }))
	}

	/// Phones of every pairing-code request, in order.
	pub fn requested_phones(&self) -> Vec<String> {
		self.state
			.lock()
			.actions
			.iter()
			.filter_map(|a| match a {
				MockAction::RequestCode { phone, .. } => Some(phone.clone()),
				_ => None,
			})
			.collect()
	}

	pub fn close_count(&self) -> usize {
		self.count(|a| matches!(a, MockAction::Close))
	}

	/// Sends a status update on the most recent connection.
	pub fn emit(&self, update: ConnectionUpdate) {
		if let Some(events) = self.state.lock().live.last() {
			let _ = events.status.send(update);
		}
	}

	fn count(&self, pred: impl Fn(&MockAction) -> bool) -> usize {
		self.state.lock().actions.iter().filter(|a| pred(a)).count()
	}
}

#[async_trait]
impl Connector for MockConnector {
	async fn connect(&self, creds: &AuthCreds, _keys: KeyStore) -> Result<Connection> {
		let (events, subscription) = Subscription::channel();
		let script = {
			let mut state = self.state.lock();
			state.actions.push(MockAction::Connect {
				registered: creds.is_registered(),
			});
			if let Some(message) = &state.connect_error {
				return Err(Error::Transport(message.clone()));
			}
			state.live.push(events.clone());
			state.scripts.pop_front()
		};

		if let Some(steps) = script {
			tokio::spawn(play(steps, events, self.state.clone()));
		}

		let socket = MockSocket {
			code: self.code.clone(),
			state: self.state.clone(),
		};
		Ok(Connection {
			socket: Arc::new(socket),
			events: subscription,
		})
	}
}

async fn play(steps: Vec<Step>, events: SubscriptionSender, state: Arc<Mutex<MockState>>) {
	let _ = events.status.send(ConnectionUpdate::Connecting);
	for step in steps {
		match step {
			Step::Wait(delay) => tokio::time::sleep(delay).await,
			Step::Creds(update) => {
				let _ = events.creds.send(update);
			}
			Step::Open => {
				let _ = events.status.send(ConnectionUpdate::Open);
			}
			Step::Close(reason) => {
				let _ = events.status.send(ConnectionUpdate::Closed(reason));
			}
			Step::Drop => {
				state
					.lock()
					.live
					.retain(|live| !live.status.same_channel(&events.status));
				return;
			}
		}
	}
}

struct MockSocket {
	code: String,
	state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SessionSocket for MockSocket {
	async fn request_pairing_code(&self, phone: &str) -> Result<String> {
		let mut state = self.state.lock();
		state.actions.push(MockAction::RequestCode {
			phone: phone.to_string(),
			at: Instant::now(),
		});
		match &state.pairing_error {
			Some(message) => Err(Error::PairingRequest(message.clone())),
			None => Ok(self.code.clone()),
		}
	}

	async fn close(&self) {
		self.state.lock().actions.push(MockAction::Close);
	}
}

/// [`RestartSignal`] that records every request.
#[derive(Default, Clone)]
pub struct RecordingRestart {
	reasons: Arc<Mutex<Vec<String>>>,
}

impl RecordingRestart {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn reasons(&self) -> Vec<String> {
		self.reasons.lock().clone()
	}
}

impl RestartSignal for RecordingRestart {
	fn request_restart(&self, reason: &str) {
		self.reasons.lock().push(reason.to_string());
	}
}
