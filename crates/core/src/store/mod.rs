//! Keyed record persistence.
//!
//! Every backend stores text-safe JSON payloads (see [`pair_protocol::codec`])
//! under string ids: `"creds"` for the credential tree and `"{category}-{id}"`
//! for key material. Backends are interchangeable behind [`CredentialStore`]:
//!
//! - [`FileStore`]: one file per record under a per-session directory
//! - [`DocumentStore`]: one document per record in a remote collection
//! - [`PublishStore`]: in-memory records published once as a consolidated snapshot
//!
//! Batched access ([`get_many`], [`set_many`]) is built on the single-record
//! operations and runs each id independently.

mod document;
mod file;
mod publish;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use pair_protocol::DocumentBackend;
use serde_json::Value;
use tracing::warn;

pub use document::{DataApiCollection, DocumentCollection, DocumentStore, MemoryCollection};
pub use file::FileStore;
pub use publish::{HttpPublisher, PublishStore, SnapshotPublisher, short_session_id};

use crate::error::{Error, Result};

/// Uniform record contract shared by all backends.
#[async_trait]
pub trait CredentialStore: Send + Sync {
	/// Reads a record. Absence is `Ok(None)`; only backend failures are errors.
	async fn read(&self, id: &str) -> Result<Option<Value>>;

	/// Creates or replaces a record. Top-level `null` fields are dropped first.
	async fn write(&self, id: &str, payload: Value) -> Result<()>;

	/// Deletes a record if present.
	async fn remove(&self, id: &str) -> Result<()>;

	/// Destroys every record of the session.
	async fn clear(&self) -> Result<()>;

	/// Makes everything written so far durable and returns the session
	/// identifier to announce, if the backend produces one.
	async fn flush(&self) -> Result<Option<String>> {
		Ok(None)
	}

	/// Name of the session this store holds.
	fn session(&self) -> &str;
}

/// Session names are phone numbers; logs above debug level show only the
/// last four characters.
pub fn masked_session(session: &str) -> String {
	let tail: String = session.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
	format!("***{tail}")
}

/// Drops top-level `null` fields from an object payload.
pub fn strip_nulls(payload: Value) -> Value {
	match payload {
		Value::Object(map) => Value::Object(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
		other => other,
	}
}

/// Reads several records concurrently.
///
/// Every id appears in the result. A failed read is logged and reported as
/// absent so one broken record cannot hide its siblings.
pub async fn get_many(store: &dyn CredentialStore, ids: &[String]) -> BTreeMap<String, Option<Value>> {
	let reads = ids.iter().map(|id| async move {
		let value = match store.read(id).await {
			Ok(value) => value,
			Err(err) => {
				warn!(target = "pair.store", id = %id, error = &err as &dyn std::error::Error, "record read failed; treating as absent");
				None
			}
		};
		(id.clone(), value)
	});
	join_all(reads).await.into_iter().collect()
}

/// Applies several writes concurrently; a `None` value removes the record.
///
/// Entries are independent: all of them run to completion even when some fail,
/// and the failures are reported together as [`Error::Batch`].
pub async fn set_many(store: &dyn CredentialStore, entries: Vec<(String, Option<Value>)>) -> Result<()> {
	let writes = entries.into_iter().map(|(id, value)| async move {
		let outcome = match value {
			Some(payload) => store.write(&id, payload).await,
			None => store.remove(&id).await,
		};
		(id, outcome)
	});

	let failed: Vec<String> = join_all(writes)
		.await
		.into_iter()
		.filter_map(|(id, outcome)| match outcome {
			Ok(()) => None,
			Err(err) => {
				warn!(target = "pair.store", id = %id, error = &err as &dyn std::error::Error, "batched record write failed");
				Some(id)
			}
		})
		.collect();

	if failed.is_empty() { Ok(()) } else { Err(Error::Batch { failed }) }
}

/// Backend selection with its connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
	/// Per-session directories under `root`.
	File { root: PathBuf },
	/// Remote document collection; each session gets `{collection}_{session}`.
	Document(DocumentBackend),
	/// One-shot snapshot upload.
	Publish {
		endpoint: String,
		/// Prefix stripped from the returned handle.
		prefix: String,
		/// Tag prepended to the short session identifier.
		tag: String,
	},
}

/// Opens the store of one session.
pub trait StoreFactory: Send + Sync {
	/// Opens the store for `session`. A caller-supplied document backend
	/// replaces the configured backend for this session only.
	fn open(&self, session: &str, document: Option<&DocumentBackend>) -> Result<Arc<dyn CredentialStore>>;
}

/// [`StoreFactory`] driven by a [`BackendConfig`].
pub struct BackendFactory {
	config: BackendConfig,
	http: reqwest::Client,
}

impl BackendFactory {
	pub fn new(config: BackendConfig) -> Self {
		Self {
			config,
			http: reqwest::Client::new(),
		}
	}

	pub fn config(&self) -> &BackendConfig {
		&self.config
	}

	fn document_store(&self, session: &str, params: &DocumentBackend) -> Arc<dyn CredentialStore> {
		let collection = DataApiCollection::new(self.http.clone(), session_collection(params, session));
		Arc::new(DocumentStore::new(session, Arc::new(collection)))
	}
}

/// Scopes a document backend to one session: every session keeps its records
/// in `<collection>_<session>`, whether the backend came from configuration or
/// from the request.
pub(crate) fn session_collection(params: &DocumentBackend, session: &str) -> DocumentBackend {
	let mut params = params.clone();
	params.collection = format!("{}_{}", params.collection, session);
	params
}

impl StoreFactory for BackendFactory {
	fn open(&self, session: &str, document: Option<&DocumentBackend>) -> Result<Arc<dyn CredentialStore>> {
		if let Some(params) = document {
			return Ok(self.document_store(session, params));
		}

		match &self.config {
			BackendConfig::File { root } => Ok(Arc::new(FileStore::open(root, session))),
			BackendConfig::Document(params) => Ok(self.document_store(session, params)),
			BackendConfig::Publish { endpoint, prefix, tag } => {
				let publisher = HttpPublisher::new(self.http.clone(), endpoint.clone());
				Ok(Arc::new(PublishStore::new(session, Arc::new(publisher), prefix.clone(), tag.clone())))
			}
		}
	}
}
