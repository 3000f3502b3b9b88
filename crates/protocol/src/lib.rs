//! Wire types for the pairing service.
//!
//! This crate contains the data shapes shared by the worker, the supervisor and
//! the transport gateway, plus the codec that turns credential trees with
//! binary leaves into JSON that survives text-only storage.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No I/O, no async, no logging
//! - **1:1 with the wire**: Field names match what goes over HTTP, stdio and
//!   the gateway socket
//! - **Stable**: Persisted records written by one release must decode in the next
//!
//! Stores, sessions and process management are built on top of these types in
//! `pair-rs` and `pair-runtime`.

pub mod codec;
pub mod control;
pub mod disconnect;
pub mod gateway;
pub mod node;
pub mod pairing;
pub mod record;

pub use codec::{decode, encode};
pub use control::ControlMessage;
pub use disconnect::{DisconnectReason, RecoveryAction};
pub use gateway::{ClientFrame, ConnectionState, GatewayFrame};
pub use node::Node;
pub use pairing::{DocumentBackend, PairRequest, PairResponse, PushMessage};
pub use record::{CREDS_ID, key_record_id};
