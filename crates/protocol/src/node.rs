//! In-memory credential tree.

use std::collections::BTreeMap;

use serde_json::Number;

/// A credential tree node.
///
/// Mirrors the JSON data model with one addition: [`Node::Bytes`] holds raw key
/// material. Trees of this type are what sessions mutate; the text-safe form
/// produced by [`crate::codec::encode`] is what stores persist.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Node {
	#[default]
	Null,
	Bool(bool),
	Number(Number),
	String(String),
	Bytes(Vec<u8>),
	Array(Vec<Node>),
	Map(BTreeMap<String, Node>),
}

impl Node {
	/// Creates an empty map node.
	pub fn map() -> Self {
		Node::Map(BTreeMap::new())
	}

	/// Looks up `key` when this node is a map.
	pub fn get(&self, key: &str) -> Option<&Node> {
		match self {
			Node::Map(map) => map.get(key),
			_ => None,
		}
	}

	/// Inserts `key` into a map node, converting non-map nodes into an empty map first.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Node>) {
		if !matches!(self, Node::Map(_)) {
			*self = Node::map();
		}
		if let Node::Map(map) = self {
			map.insert(key.into(), value.into());
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Node::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Node::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Node::Bytes(b) => Some(b),
			_ => None,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Node::Null)
	}

	/// Shallow merge: every top-level entry of `update` replaces the entry in `self`.
	///
	/// A non-map `update` replaces `self` wholesale.
	pub fn merge(&mut self, update: Node) {
		match (self, update) {
			(Node::Map(base), Node::Map(update)) => base.extend(update),
			(this, update) => *this = update,
		}
	}
}

impl From<bool> for Node {
	fn from(value: bool) -> Self {
		Node::Bool(value)
	}
}

impl From<&str> for Node {
	fn from(value: &str) -> Self {
		Node::String(value.to_string())
	}
}

impl From<String> for Node {
	fn from(value: String) -> Self {
		Node::String(value)
	}
}

impl From<Vec<u8>> for Node {
	fn from(value: Vec<u8>) -> Self {
		Node::Bytes(value)
	}
}

impl From<&[u8]> for Node {
	fn from(value: &[u8]) -> Self {
		Node::Bytes(value.to_vec())
	}
}

impl From<u64> for Node {
	fn from(value: u64) -> Self {
		Node::Number(value.into())
	}
}

impl From<i64> for Node {
	fn from(value: i64) -> Self {
		Node::Number(value.into())
	}
}

impl From<Vec<Node>> for Node {
	fn from(value: Vec<Node>) -> Self {
		Node::Array(value)
	}
}

impl From<BTreeMap<String, Node>> for Node {
	fn from(value: BTreeMap<String, Node>) -> Self {
		Node::Map(value)
	}
}
