//! Document-collection store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use pair_protocol::DocumentBackend;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{CredentialStore, strip_nulls};
use crate::error::{Error, Result, StoreOp};

/// Field holding payloads that are not JSON objects.
const SCALAR_FIELD: &str = "__value";

/// Minimal document-collection surface used by [`DocumentStore`].
///
/// Documents are keyed by `_id`. `upsert_one` replaces the document body with
/// `fields`, creating the document when missing, in a single operation.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
	async fn find_one(&self, id: &str) -> Result<Option<Map<String, Value>>>;
	async fn upsert_one(&self, id: &str, fields: Map<String, Value>) -> Result<()>;
	async fn delete_one(&self, id: &str) -> Result<()>;
	async fn delete_all(&self) -> Result<()>;
}

/// One document per record.
///
/// Writes are upserts by id, never delete-then-insert, so a concurrent reader
/// never observes the record missing.
pub struct DocumentStore {
	session: String,
	collection: Arc<dyn DocumentCollection>,
}

impl DocumentStore {
	pub fn new(session: &str, collection: Arc<dyn DocumentCollection>) -> Self {
		Self {
			session: session.to_string(),
			collection,
		}
	}
}

#[async_trait]
impl CredentialStore for DocumentStore {
	async fn read(&self, id: &str) -> Result<Option<Value>> {
		let Some(mut doc) = self.collection.find_one(id).await? else {
			return Ok(None);
		};
		doc.remove("_id");
		if let Some(scalar) = doc.remove(SCALAR_FIELD) {
			return Ok(Some(scalar));
		}
		Ok(Some(Value::Object(doc)))
	}

	async fn write(&self, id: &str, payload: Value) -> Result<()> {
		let fields = match strip_nulls(payload) {
			Value::Object(map) => map,
			scalar => {
				let mut map = Map::with_capacity(1);
				map.insert(SCALAR_FIELD.to_string(), scalar);
				map
			}
		};
		self.collection.upsert_one(id, fields).await
	}

	async fn remove(&self, id: &str) -> Result<()> {
		self.collection.delete_one(id).await
	}

	async fn clear(&self) -> Result<()> {
		self.collection.delete_all().await
	}

	fn session(&self) -> &str {
		&self.session
	}
}

/// Collection served by a MongoDB-Data-API-style HTTP endpoint.
pub struct DataApiCollection {
	http: reqwest::Client,
	params: DocumentBackend,
}

impl DataApiCollection {
	pub fn new(http: reqwest::Client, params: DocumentBackend) -> Self {
		Self { http, params }
	}

	async fn action(&self, name: &str, mut body: Value, op: StoreOp, id: &str) -> Result<Value> {
		if let Value::Object(map) = &mut body {
			map.insert("dataSource".into(), json!(self.params.data_source));
			map.insert("database".into(), json!(self.params.database));
			map.insert("collection".into(), json!(self.params.collection));
		}

		let url = format!("{}/action/{name}", self.params.url.trim_end_matches('/'));
		let mut request = self.http.post(&url).json(&body);
		if let Some(key) = &self.params.api_key {
			request = request.header("api-key", key);
		}

		debug!(target = "pair.store", action = name, collection = %self.params.collection, "document action");
		let response = request.send().await.map_err(|e| Error::store(op, id, e))?;
		let response = response.error_for_status().map_err(|e| Error::store(op, id, e))?;
		response.json::<Value>().await.map_err(|e| Error::store(op, id, e))
	}
}

#[async_trait]
impl DocumentCollection for DataApiCollection {
	async fn find_one(&self, id: &str) -> Result<Option<Map<String, Value>>> {
		let reply = self
			.action("findOne", json!({ "filter": { "_id": id } }), StoreOp::Read, id)
			.await?;
		match reply.get("document") {
			Some(Value::Object(doc)) => Ok(Some(doc.clone())),
			_ => Ok(None),
		}
	}

	async fn upsert_one(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
		let body = json!({
			"filter": { "_id": id },
			"replacement": fields,
			"upsert": true,
		});
		self.action("replaceOne", body, StoreOp::Write, id).await.map(|_| ())
	}

	async fn delete_one(&self, id: &str) -> Result<()> {
		self.action("deleteOne", json!({ "filter": { "_id": id } }), StoreOp::Remove, id)
			.await
			.map(|_| ())
	}

	async fn delete_all(&self) -> Result<()> {
		let collection = self.params.collection.clone();
		self.action("deleteMany", json!({ "filter": {} }), StoreOp::Clear, &collection)
			.await
			.map(|_| ())
	}
}

/// In-process collection with the same replace-or-insert semantics as the remote one.
#[derive(Default)]
pub struct MemoryCollection {
	docs: Mutex<BTreeMap<String, Map<String, Value>>>,
}

impl MemoryCollection {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of stored documents.
	pub fn len(&self) -> usize {
		self.docs.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.docs.lock().is_empty()
	}
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
	async fn find_one(&self, id: &str) -> Result<Option<Map<String, Value>>> {
		Ok(self.docs.lock().get(id).cloned())
	}

	async fn upsert_one(&self, id: &str, fields: Map<String, Value>) -> Result<()> {
		let mut doc = fields;
		doc.insert("_id".into(), Value::String(id.to_string()));
		self.docs.lock().insert(id.to_string(), doc);
		Ok(())
	}

	async fn delete_one(&self, id: &str) -> Result<()> {
		self.docs.lock().remove(id);
		Ok(())
	}

	async fn delete_all(&self) -> Result<()> {
		self.docs.lock().clear();
		Ok(())
	}
}
