//! Identity and registration state of a session.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pair_protocol::{Node, codec};
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::Value;
use x25519_dalek::{PublicKey, StaticSecret};

/// The `creds` record.
///
/// The tree is opaque apart from the handful of fields this crate reads
/// (`registered`) or seeds when generating fresh state. Updates from the
/// transport are partial trees merged shallowly on top.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthCreds(Node);

impl AuthCreds {
	/// Generates fresh, unregistered identity state.
	pub fn generate() -> Self {
		let mut signed_pre_key = Node::map();
		signed_pre_key.insert("keyPair", key_pair());
		signed_pre_key.insert("keyId", 1u64);

		let mut adv_secret = [0u8; 32];
		OsRng.fill_bytes(&mut adv_secret);

		let mut creds = Node::map();
		creds.insert("noiseKey", key_pair());
		creds.insert("pairingEphemeralKeyPair", key_pair());
		creds.insert("signedIdentityKey", key_pair());
		creds.insert("signedPreKey", signed_pre_key);
		creds.insert("registrationId", u64::from(OsRng.next_u32() as u16 & 16383));
		creds.insert("advSecretKey", STANDARD.encode(adv_secret));
		creds.insert("nextPreKeyId", 1u64);
		creds.insert("firstUnuploadedPreKeyId", 1u64);
		creds.insert("accountSyncCounter", 0u64);
		creds.insert("registered", false);
		Self(creds)
	}

	pub fn from_node(node: Node) -> Self {
		Self(node)
	}

	/// Decodes a stored `creds` record.
	pub fn from_record(value: &Value) -> Self {
		Self(codec::decode(value))
	}

	pub fn to_record(&self) -> Value {
		codec::encode(&self.0)
	}

	pub fn node(&self) -> &Node {
		&self.0
	}

	/// Whether the identity has already been linked to an account.
	pub fn is_registered(&self) -> bool {
		self.0.get("registered").and_then(Node::as_bool).unwrap_or(false)
	}

	/// Applies a partial update from the transport.
	pub fn merge(&mut self, update: Node) {
		self.0.merge(update);
	}
}

fn key_pair() -> Node {
	let secret = StaticSecret::random_from_rng(OsRng);
	let public = PublicKey::from(&secret);
	let mut pair = Node::map();
	pair.insert("private", secret.to_bytes().to_vec());
	pair.insert("public", public.as_bytes().to_vec());
	pair
}
