//! One-shot snapshot publishing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use pair_protocol::CREDS_ID;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{CredentialStore, strip_nulls};
use crate::error::{Error, Result};

/// Append-only target that stores a body and hands back a retrievable handle.
#[async_trait]
pub trait SnapshotPublisher: Send + Sync {
	async fn publish(&self, name: &str, body: String) -> Result<String>;
}

/// Publishes snapshots with a single HTTP POST.
///
/// The handle is the response body, either as plain text or as the `url`
/// field of a JSON object.
pub struct HttpPublisher {
	http: reqwest::Client,
	endpoint: String,
}

impl HttpPublisher {
	pub fn new(http: reqwest::Client, endpoint: String) -> Self {
		Self { http, endpoint }
	}
}

#[async_trait]
impl SnapshotPublisher for HttpPublisher {
	async fn publish(&self, name: &str, body: String) -> Result<String> {
		let response = self
			.http
			.post(&self.endpoint)
			.query(&[("name", name)])
			.header(reqwest::header::CONTENT_TYPE, "application/json")
			.body(body)
			.send()
			.await?
			.error_for_status()?;
		let text = response.text().await?;
		handle_from_response(&text).ok_or_else(|| Error::Publish("empty response from publish target".into()))
	}
}

fn handle_from_response(text: &str) -> Option<String> {
	let text = text.trim();
	if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(text) {
		return obj.get("url").and_then(Value::as_str).map(str::to_string);
	}
	let text = text.trim_matches('"');
	(!text.is_empty()).then(|| text.to_string())
}

/// Derives the announced session identifier from a publish handle.
///
/// `prefix` is stripped when present and `tag` is prepended.
pub fn short_session_id(handle: &str, prefix: &str, tag: &str) -> String {
	let rest = handle.strip_prefix(prefix).unwrap_or(handle);
	format!("{tag}{rest}")
}

/// Keeps records in memory and publishes them once as a consolidated snapshot.
///
/// This is not a general store: nothing leaves the process until the first
/// [`CredentialStore::flush`], and later flushes return the identifier of that
/// first publication. A crash before the flush loses every record.
pub struct PublishStore {
	session: String,
	publisher: Arc<dyn SnapshotPublisher>,
	prefix: String,
	tag: String,
	records: Mutex<BTreeMap<String, Value>>,
	published: tokio::sync::Mutex<Option<String>>,
}

impl PublishStore {
	pub fn new(session: &str, publisher: Arc<dyn SnapshotPublisher>, prefix: String, tag: String) -> Self {
		Self {
			session: session.to_string(),
			publisher,
			prefix,
			tag,
			records: Mutex::new(BTreeMap::new()),
			published: tokio::sync::Mutex::new(None),
		}
	}

	/// The `{"creds": .., "keys": {..}}` document that a flush uploads.
	pub fn snapshot(&self) -> Value {
		let records = self.records.lock();
		let mut keys = Map::new();
		for (id, value) in records.iter().filter(|(id, _)| id.as_str() != CREDS_ID) {
			keys.insert(id.clone(), value.clone());
		}
		let mut doc = Map::new();
		doc.insert("creds".into(), records.get(CREDS_ID).cloned().unwrap_or(Value::Null));
		doc.insert("keys".into(), Value::Object(keys));
		Value::Object(doc)
	}
}

#[async_trait]
impl CredentialStore for PublishStore {
	async fn read(&self, id: &str) -> Result<Option<Value>> {
		Ok(self.records.lock().get(id).cloned())
	}

	async fn write(&self, id: &str, payload: Value) -> Result<()> {
		self.records.lock().insert(id.to_string(), strip_nulls(payload));
		Ok(())
	}

	async fn remove(&self, id: &str) -> Result<()> {
		self.records.lock().remove(id);
		Ok(())
	}

	async fn clear(&self) -> Result<()> {
		self.records.lock().clear();
		Ok(())
	}

	async fn flush(&self) -> Result<Option<String>> {
		let mut published = self.published.lock().await;
		if let Some(id) = published.as_ref() {
			debug!(target = "pair.store", session = %super::masked_session(&self.session), "snapshot already published");
			return Ok(Some(id.clone()));
		}

		if !self.records.lock().contains_key(CREDS_ID) {
			return Err(Error::Publish("no credentials to publish".into()));
		}
		let body = serde_json::to_string(&self.snapshot())?;
		let handle = self.publisher.publish(&self.session, body).await?;
		let id = short_session_id(&handle, &self.prefix, &self.tag);
		info!(target = "pair.store", session = %super::masked_session(&self.session), "credentials snapshot published");
		*published = Some(id.clone());
		Ok(Some(id))
	}

	fn session(&self) -> &str {
		&self.session
	}
}
