//! File-per-record store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::debug;

use super::{CredentialStore, strip_nulls};
use crate::error::{Error, Result, StoreOp};

/// One JSON file per record under `{root}/{session}/`.
///
/// The directory is the session: [`CredentialStore::clear`] removes it
/// recursively. Writes go to a temporary sibling and are renamed into place so
/// a crash mid-write leaves the previous record intact.
#[derive(Debug)]
pub struct FileStore {
	dir: PathBuf,
	session: String,
	tmp_seq: AtomicU64,
}

impl FileStore {
	pub fn open(root: &Path, session: &str) -> Self {
		Self {
			dir: root.join(session),
			session: session.to_string(),
			tmp_seq: AtomicU64::new(0),
		}
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Path of the file holding `id`.
	pub fn record_path(&self, id: &str) -> PathBuf {
		self.dir.join(format!("{}.json", file_name(id)))
	}
}

/// Record ids may contain `/` and `:` (device addresses); neither is safe in a file name.
fn file_name(id: &str) -> String {
	id.replace('/', "__").replace(':', "-")
}

#[async_trait]
impl CredentialStore for FileStore {
	async fn read(&self, id: &str) -> Result<Option<Value>> {
		let path = self.record_path(id);
		match fs::read(&path).await {
			Ok(bytes) => {
				let value = serde_json::from_slice(&bytes).map_err(|e| Error::store(StoreOp::Read, id, e))?;
				Ok(Some(value))
			}
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
			Err(err) => Err(Error::store(StoreOp::Read, id, err)),
		}
	}

	async fn write(&self, id: &str, payload: Value) -> Result<()> {
		let body = serde_json::to_vec(&strip_nulls(payload))?;
		fs::create_dir_all(&self.dir)
			.await
			.map_err(|e| Error::store(StoreOp::Write, id, e))?;

		let path = self.record_path(id);
		let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
		let tmp = self.dir.join(format!(".{}.{seq}.tmp", file_name(id)));
		fs::write(&tmp, &body).await.map_err(|e| Error::store(StoreOp::Write, id, e))?;
		fs::rename(&tmp, &path).await.map_err(|e| Error::store(StoreOp::Write, id, e))?;
		Ok(())
	}

	async fn remove(&self, id: &str) -> Result<()> {
		match fs::remove_file(self.record_path(id)).await {
			Ok(()) => Ok(()),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(err) => Err(Error::store(StoreOp::Remove, id, err)),
		}
	}

	async fn clear(&self) -> Result<()> {
		match fs::remove_dir_all(&self.dir).await {
			Ok(()) => {
				debug!(target = "pair.store", dir = %self.dir.display(), "session directory removed");
				Ok(())
			}
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
			Err(err) => Err(Error::store(StoreOp::Clear, &self.session, err)),
		}
	}

	fn session(&self) -> &str {
		&self.session
	}
}
