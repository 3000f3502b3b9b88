//! HTTP request/response bodies and push-channel messages.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body of a pairing request.
///
/// `phone` is also accepted as a JSON number, which is what numeric form
/// inputs tend to produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairRequest {
	#[serde(default, deserialize_with = "phone_string")]
	pub phone: Option<String>,
	/// Document-collection parameters chosen by the caller instead of the
	/// deployment default.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub backend: Option<DocumentBackend>,
}

/// Result of a pairing request: exactly one of `code` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PairResponse {
	Code { code: String },
	Error { error: String },
}

impl PairResponse {
	pub fn code(code: impl Into<String>) -> Self {
		PairResponse::Code { code: code.into() }
	}

	pub fn error(error: impl Into<String>) -> Self {
		PairResponse::Error { error: error.into() }
	}
}

/// Pushed to every push-channel subscriber once a session is open and published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
	pub session_id: String,
}

/// Connection parameters of an HTTP document-collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentBackend {
	/// Base URL; actions are posted to `{url}/action/{name}`.
	pub url: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub api_key: Option<String>,
	#[serde(default = "default_data_source")]
	pub data_source: String,
	pub database: String,
	pub collection: String,
}

fn default_data_source() -> String {
	"Cluster0".to_string()
}

fn phone_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(match Option::<Value>::deserialize(deserializer)? {
		Some(Value::String(s)) => Some(s),
		Some(Value::Number(n)) => Some(n.to_string()),
		_ => None,
	})
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn phone_accepts_strings_and_numbers() {
		let req: PairRequest = serde_json::from_value(json!({"phone": "917788861848"})).unwrap();
		assert_eq!(req.phone.as_deref(), Some("917788861848"));

		let req: PairRequest = serde_json::from_value(json!({"phone": 917788861848u64})).unwrap();
		assert_eq!(req.phone.as_deref(), Some("917788861848"));

		let req: PairRequest = serde_json::from_value(json!({})).unwrap();
		assert_eq!(req.phone, None);
	}

	#[test]
	fn responses_carry_either_code_or_error() {
		assert_eq!(serde_json::to_value(PairResponse::code("ABCD-1234")).unwrap(), json!({"code": "ABCD-1234"}));
		assert_eq!(serde_json::to_value(PairResponse::error("nope")).unwrap(), json!({"error": "nope"}));
	}

	#[test]
	fn push_message_uses_camel_case() {
		let msg = PushMessage { session_id: "Pair~abc".into() };
		assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"sessionId":"Pair~abc"}"#);
	}

	#[test]
	fn document_backend_defaults_data_source() {
		let backend: DocumentBackend =
			serde_json::from_value(json!({"url": "https://data.example/v1", "database": "auth", "collection": "sessions"})).unwrap();
		assert_eq!(backend.data_source, "Cluster0");
		assert_eq!(backend.api_key, None);
	}
}
