//! Identifiers of persisted records.

/// Record id of the credential tree.
pub const CREDS_ID: &str = "creds";

/// Record id of one key-material entry: `"{category}-{id}"`.
pub fn key_record_id(category: &str, id: &str) -> String {
	format!("{category}-{id}")
}
