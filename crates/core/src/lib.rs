//! Pairing sessions and credential persistence.
//!
//! This crate turns a pairing request into a running session and keeps the
//! session's credentials durable:
//!
//! - **Stores**: One record contract ([`CredentialStore`]) over per-record
//!   files, a remote document collection or a one-shot snapshot publish target
//! - **Bundle**: The `creds` tree and category-scoped key records
//! - **Transport**: The seam to the messaging protocol, with a WebSocket
//!   gateway implementation
//! - **Lifecycle**: Pairing-code issuance, credential flush and the recovery
//!   policy for every disconnect reason
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  PairingCoordinator  │  one session per phone, request coalescing
//! └──────────┬───────────┘
//! ┌──────────▼───────────┐
//! │ ConnectionLifecycle  │  connect, pair, persist, recover
//! └───┬──────────────┬───┘
//! ┌───▼─────┐  ┌─────▼────┐
//! │Connector│  │  Store   │  file / document / publish
//! └─────────┘  └──────────┘
//! ```
//!
//! Restarting the whole worker is delegated to a [`RestartSignal`]; the
//! `pair-runtime` crate implements the supervisor on the other end.

pub mod creds;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod pairing;
pub mod store;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use creds::AuthCreds;
pub use error::{Error, Result, StoreOp};
pub use keys::{CredentialBundle, KeyStore, KeyWrites};
pub use lifecycle::{
	ConnectionLifecycleHandler, DEFAULT_SETTLE_DELAY, LifecycleConfig, OpenAction, PairingSlot, RestartSignal,
	SessionOutcome, SessionState,
};
pub use pairing::{MIN_PHONE_DIGITS, PairingCoordinator, PairingResult, normalize_phone};
pub use store::{BackendConfig, BackendFactory, CredentialStore, StoreFactory};
pub use transport::{Connection, ConnectionUpdate, Connector, GatewayConnector, SessionSocket, Subscription};
