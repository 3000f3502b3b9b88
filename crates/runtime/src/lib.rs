//! Session worker supervision.
//!
//! This crate keeps exactly one session worker alive:
//!
//! - **Launcher**: Starts the worker process with the control channel on its stdio
//! - **Channel**: Newline-delimited [`ControlMessage`] framing
//! - **Supervisor**: Reset, uptime and crash policy for the single worker
//! - **Watch**: Entry-file change detection that gates respawn after a crash
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  operator lines
//! │ SessionSupervisor│◄──────────────── stdin
//! └───┬──────────▲───┘
//!     │ stdin    │ stdout (reset / uptime)
//! ┌───▼──────────┴───┐
//! │  worker process  │  pair serve --supervised
//! └──────────────────┘
//! ```
//!
//! [`ControlMessage`]: pair_protocol::ControlMessage

pub mod channel;
pub mod error;
pub mod launcher;
pub mod supervisor;
pub mod watch;

pub use channel::{read_message, write_message};
pub use error::{Error, Result};
pub use launcher::{ProcessLauncher, WorkerEvent, WorkerEvents, WorkerHandle, WorkerLauncher};
pub use supervisor::{DEFAULT_WATCH_INTERVAL, SessionProcess, SessionSupervisor, SupervisorConfig};
pub use watch::EntryWatch;
