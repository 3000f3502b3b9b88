//! Text-safe encoding of credential trees.
//!
//! Binary leaves become `{"type": "Buffer", "data": "<base64>"}` objects so a
//! tree can be stored anywhere JSON can. Decoding also accepts the legacy
//! `{"buffer": true, "value": ...}` shape written by older releases, and the
//! `{"type": "Buffer", "data": [1, 2, 3]}` shape produced when raw buffers were
//! serialized without the codec.
//!
//! Decoding never fails: a tagged object whose payload cannot be read decodes
//! to an empty byte sequence.
//!
//! A map whose own fields are exactly a buffer tag is indistinguishable from a
//! byte leaf and decodes as bytes.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use serde_json::{Map, Value};

use crate::node::Node;

/// Tag value marking an encoded byte leaf.
pub const BUFFER_TAG: &str = "Buffer";

/// Converts a credential tree into its text-safe JSON form.
pub fn encode(node: &Node) -> Value {
	match node {
		Node::Null => Value::Null,
		Node::Bool(b) => Value::Bool(*b),
		Node::Number(n) => Value::Number(n.clone()),
		Node::String(s) => Value::String(s.clone()),
		Node::Bytes(bytes) => encode_bytes(bytes),
		Node::Array(items) => Value::Array(items.iter().map(encode).collect()),
		Node::Map(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), encode(v))).collect()),
	}
}

/// Rebuilds a credential tree from its text-safe JSON form.
pub fn decode(value: &Value) -> Node {
	match value {
		Value::Null => Node::Null,
		Value::Bool(b) => Node::Bool(*b),
		Value::Number(n) => Node::Number(n.clone()),
		Value::String(s) => Node::String(s.clone()),
		Value::Array(items) => Node::Array(items.iter().map(decode).collect()),
		Value::Object(map) => match buffer_payload(map) {
			Some(payload) => Node::Bytes(decode_payload(payload)),
			None => Node::Map(map.iter().map(|(k, v)| (k.clone(), decode(v))).collect::<BTreeMap<_, _>>()),
		},
	}
}

/// Encodes a tree straight to a JSON string.
pub fn to_text(node: &Node) -> String {
	encode(node).to_string()
}

/// Parses a JSON string and decodes it into a tree.
pub fn from_text(text: &str) -> Result<Node, serde_json::Error> {
	let value: Value = serde_json::from_str(text)?;
	Ok(decode(&value))
}

fn encode_bytes(bytes: &[u8]) -> Value {
	let mut tagged = Map::with_capacity(2);
	tagged.insert("type".into(), Value::String(BUFFER_TAG.into()));
	tagged.insert("data".into(), Value::String(STANDARD.encode(bytes)));
	Value::Object(tagged)
}

/// Returns the payload slot of a tagged buffer object, or `None` for ordinary maps.
fn buffer_payload(map: &Map<String, Value>) -> Option<Option<&Value>> {
	let typed = map.get("type").and_then(Value::as_str) == Some(BUFFER_TAG);
	let flagged = map.get("buffer").and_then(Value::as_bool) == Some(true);
	if !typed && !flagged {
		return None;
	}

	let payload = match map.get("data") {
		Some(Value::Null) | None => map.get("value"),
		data => data,
	};
	Some(payload)
}

fn decode_payload(payload: Option<&Value>) -> Vec<u8> {
	match payload {
		Some(Value::String(text)) => decode_base64(text),
		Some(Value::Array(items)) => items
			.iter()
			.map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
			.collect::<Option<Vec<u8>>>()
			.unwrap_or_default(),
		_ => Vec::new(),
	}
}

/// Lenient base64: standard or url-safe alphabet, padded or not.
fn decode_base64(text: &str) -> Vec<u8> {
	[&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
		.into_iter()
		.find_map(|engine| engine.decode(text).ok())
		.unwrap_or_default()
}
