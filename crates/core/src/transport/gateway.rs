//! WebSocket transport to the protocol gateway.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pair_protocol::gateway::ConnectionState;
use pair_protocol::{ClientFrame, DisconnectReason, GatewayFrame, codec};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use super::{Connection, ConnectionUpdate, Connector, SessionSocket, Subscription, SubscriptionSender};
use crate::creds::AuthCreds;
use crate::error::{Error, Result};
use crate::keys::{KeyStore, KeyWrites};

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<String>>>>>;

enum Outbound {
	Frame(ClientFrame),
	Close,
}

/// Opens one gateway WebSocket per connection.
pub struct GatewayConnector {
	url: String,
}

impl GatewayConnector {
	pub fn new(url: impl Into<String>) -> Self {
		Self { url: url.into() }
	}
}

#[async_trait]
impl Connector for GatewayConnector {
	async fn connect(&self, creds: &AuthCreds, keys: KeyStore) -> Result<Connection> {
		let (ws, _) = connect_async(self.url.as_str())
			.await
			.map_err(|e| Error::Transport(format!("gateway connect to {} failed: {e}", self.url)))?;
		info!(target = "pair.session", url = %self.url, "gateway connected");

		let (mut ws_tx, mut ws_rx) = ws.split();
		let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
		out_tx
			.send(Outbound::Frame(ClientFrame::Hello {
				creds: creds.to_record(),
			}))
			.map_err(|_| Error::ConnectionClosed)?;

		tokio::spawn(async move {
			while let Some(outbound) = out_rx.recv().await {
				let frame = match outbound {
					Outbound::Frame(frame) => frame,
					Outbound::Close => {
						let _ = ws_tx.close().await;
						break;
					}
				};
				let text = match serde_json::to_string(&frame) {
					Ok(text) => text,
					Err(err) => {
						warn!(target = "pair.session", error = %err, "dropping unserializable gateway frame");
						continue;
					}
				};
				if ws_tx.send(Message::Text(text)).await.is_err() {
					break;
				}
			}
		});

		let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
		let (events, subscription) = Subscription::channel();
		let reader = GatewayReader {
			events,
			out: out_tx.clone(),
			pending: pending.clone(),
			keys,
		};

		let read_task = tokio::spawn(async move {
			let mut closed = false;
			while let Some(msg) = ws_rx.next().await {
				match msg {
					Ok(Message::Text(text)) => match serde_json::from_str::<GatewayFrame>(&text) {
						Ok(frame) => {
							if reader.handle(frame).await {
								closed = true;
								break;
							}
						}
						Err(err) => warn!(target = "pair.session", error = %err, "unparseable gateway frame"),
					},
					Ok(Message::Close(_)) => break,
					Ok(_) => {}
					Err(err) => {
						warn!(target = "pair.session", error = %err, "gateway websocket error");
						break;
					}
				}
			}
			if !closed {
				let _ = reader
					.events
					.status
					.send(ConnectionUpdate::Closed(DisconnectReason::ConnectionClosed));
			}
			fail_pending(&reader.pending);
		});

		let socket = GatewaySocket {
			out: out_tx,
			pending,
			next_id: AtomicU64::new(1),
			read_task: Mutex::new(Some(read_task)),
		};
		Ok(Connection {
			socket: Arc::new(socket),
			events: subscription,
		})
	}
}

fn fail_pending(pending: &Pending) {
	for (_, waiter) in pending.lock().drain() {
		let _ = waiter.send(Err(Error::ConnectionClosed));
	}
}

struct GatewayReader {
	events: SubscriptionSender,
	out: mpsc::UnboundedSender<Outbound>,
	pending: Pending,
	keys: KeyStore,
}

impl GatewayReader {
	/// Handles one frame; returns `true` once the connection reported its close.
	async fn handle(&self, frame: GatewayFrame) -> bool {
		match frame {
			GatewayFrame::CredsUpdate { creds } => {
				let _ = self.events.creds.send(codec::decode(&creds));
			}
			GatewayFrame::Connection {
				status,
				reason,
				status_code,
			} => {
				let update = match status {
					ConnectionState::Connecting => ConnectionUpdate::Connecting,
					ConnectionState::Open => ConnectionUpdate::Open,
					ConnectionState::Close => {
						ConnectionUpdate::Closed(GatewayFrame::close_reason(reason, status_code))
					}
				};
				debug!(target = "pair.session", ?update, "gateway connection update");
				let _ = self.events.status.send(update);
				return matches!(update, ConnectionUpdate::Closed(_));
			}
			GatewayFrame::PairingCode { id, code } => self.settle(id, Ok(code)),
			GatewayFrame::PairingError { id, message } => self.settle(id, Err(Error::PairingRequest(message))),
			GatewayFrame::KeysGet { id, category, ids } => {
				let values: BTreeMap<String, Value> = self
					.keys
					.get(&category, &ids)
					.await
					.into_iter()
					.map(|(id, value)| (id, value.map(|node| codec::encode(&node)).unwrap_or(Value::Null)))
					.collect();
				let _ = self.out.send(Outbound::Frame(ClientFrame::KeysResult { id, values }));
			}
			GatewayFrame::KeysSet { id, data } => {
				let writes: KeyWrites = data
					.into_iter()
					.map(|(category, ids)| {
						let ids = ids
							.into_iter()
							.map(|(id, value)| (id, (!value.is_null()).then(|| codec::decode(&value))))
							.collect();
						(category, ids)
					})
					.collect();
				let error = self.keys.set(writes).await.err().map(|err| err.to_string());
				let _ = self.out.send(Outbound::Frame(ClientFrame::KeysAck { id, error }));
			}
			GatewayFrame::Message => {}
			GatewayFrame::Unknown => trace!(target = "pair.session", "ignoring unknown gateway frame"),
		}
		false
	}

	fn settle(&self, id: u64, result: Result<String>) {
		match self.pending.lock().remove(&id) {
			Some(waiter) => {
				let _ = waiter.send(result);
			}
			None => warn!(target = "pair.session", id, "gateway answered an unknown request"),
		}
	}
}

struct GatewaySocket {
	out: mpsc::UnboundedSender<Outbound>,
	pending: Pending,
	next_id: AtomicU64,
	read_task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl SessionSocket for GatewaySocket {
	async fn request_pairing_code(&self, phone: &str) -> Result<String> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);

		let frame = ClientFrame::RequestPairingCode {
			id,
			phone: phone.to_string(),
		};
		if self.out.send(Outbound::Frame(frame)).is_err() {
			self.pending.lock().remove(&id);
			return Err(Error::ConnectionClosed);
		}
		rx.await.unwrap_or(Err(Error::ConnectionClosed))
	}

	async fn close(&self) {
		let _ = self.out.send(Outbound::Close);
		if let Some(task) = self.read_task.lock().take() {
			task.abort();
		}
		fail_pending(&self.pending);
	}
}
