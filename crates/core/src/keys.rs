//! Key material and the credential bundle.

use std::collections::BTreeMap;
use std::sync::Arc;

use pair_protocol::{CREDS_ID, Node, codec, key_record_id};
use tracing::{debug, info};

use crate::creds::AuthCreds;
use crate::error::Result;
use crate::store::{self, CredentialStore, masked_session};

/// Pending key writes: `category -> id -> value`, where `None` deletes.
pub type KeyWrites = BTreeMap<String, BTreeMap<String, Option<Node>>>;

/// Category-scoped view of the key records in a [`CredentialStore`].
#[derive(Clone)]
pub struct KeyStore {
	store: Arc<dyn CredentialStore>,
}

impl KeyStore {
	pub fn new(store: Arc<dyn CredentialStore>) -> Self {
		Self { store }
	}

	/// Reads `ids` of `category`. Every id is present in the result; absent
	/// or unreadable records map to `None`.
	pub async fn get(&self, category: &str, ids: &[String]) -> BTreeMap<String, Option<Node>> {
		let record_ids: Vec<String> = ids.iter().map(|id| key_record_id(category, id)).collect();
		let mut values = store::get_many(self.store.as_ref(), &record_ids).await;
		ids.iter()
			.zip(record_ids)
			.map(|(id, record_id)| {
				let value = values.remove(&record_id).flatten().map(|v| codec::decode(&v));
				(id.clone(), value)
			})
			.collect()
	}

	/// Applies every write independently; see [`store::set_many`].
	pub async fn set(&self, writes: KeyWrites) -> Result<()> {
		let entries: Vec<_> = writes
			.into_iter()
			.flat_map(|(category, ids)| {
				ids.into_iter()
					.map(move |(id, value)| (key_record_id(&category, &id), value.map(|node| codec::encode(&node))))
			})
			.collect();
		debug!(target = "pair.store", count = entries.len(), "writing key records");
		store::set_many(self.store.as_ref(), entries).await
	}
}

/// Everything needed to resume a session: the creds tree plus its key store.
pub struct CredentialBundle {
	pub creds: AuthCreds,
	pub keys: KeyStore,
	store: Arc<dyn CredentialStore>,
}

impl CredentialBundle {
	/// Loads the bundle of a session, generating fresh creds when none are stored.
	///
	/// Freshly generated creds are not written until the first save.
	pub async fn load(store: Arc<dyn CredentialStore>) -> Result<Self> {
		let creds = match store.read(CREDS_ID).await? {
			Some(record) => AuthCreds::from_record(&record),
			None => {
				info!(target = "pair.store", session = %masked_session(store.session()), "no stored credentials; generating fresh identity");
				AuthCreds::generate()
			}
		};
		Ok(Self {
			creds,
			keys: KeyStore::new(store.clone()),
			store,
		})
	}

	/// Merges a partial update into the creds and persists the result.
	pub async fn update_creds(&mut self, update: Node) -> Result<()> {
		self.creds.merge(update);
		self.save_creds().await
	}

	pub async fn save_creds(&self) -> Result<()> {
		self.store.write(CREDS_ID, self.creds.to_record()).await
	}

	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::store::{DocumentStore, MemoryCollection};

	fn memory_store() -> Arc<dyn CredentialStore> {
		Arc::new(DocumentStore::new("alpha", Arc::new(MemoryCollection::new())))
	}

	#[tokio::test]
	async fn keys_round_trip_binary_material_by_category() {
		let store = memory_store();
		let keys = KeyStore::new(store.clone());

		let mut writes = KeyWrites::new();
		writes
			.entry("pre-key".into())
			.or_default()
			.insert("1".into(), Some(Node::Bytes(vec![0, 1, 2, 255])));
		keys.set(writes).await.unwrap();

		let values = keys.get("pre-key", &["1".into(), "2".into()]).await;
		assert_eq!(values["1"], Some(Node::Bytes(vec![0, 1, 2, 255])));
		assert_eq!(values["2"], None);

		let stored = store.read("pre-key-1").await.unwrap().unwrap();
		assert_eq!(stored, json!({"type": "Buffer", "data": "AAEC/w=="}));
	}

	#[tokio::test]
	async fn none_deletes_key_records() {
		let store = memory_store();
		let keys = KeyStore::new(store.clone());
		store.write("session-abc", json!({"x": 1})).await.unwrap();

		let mut writes = KeyWrites::new();
		writes.entry("session".into()).or_default().insert("abc".into(), None);
		keys.set(writes).await.unwrap();

		assert_eq!(store.read("session-abc").await.unwrap(), None);
	}

	#[tokio::test]
	async fn bundle_generates_then_reloads_creds() {
		let store = memory_store();

		let mut bundle = CredentialBundle::load(store.clone()).await.unwrap();
		assert!(!bundle.creds.is_registered());
		assert_eq!(store.read(CREDS_ID).await.unwrap(), None);

		let mut update = Node::map();
		update.insert("registered", true);
		bundle.update_creds(update).await.unwrap();

		let reloaded = CredentialBundle::load(store).await.unwrap();
		assert!(reloaded.creds.is_registered());
		assert_eq!(reloaded.creds, bundle.creds);
	}
}
