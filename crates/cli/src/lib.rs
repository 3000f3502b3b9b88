//! Command-line front end of the pairing service.
//!
//! `pair serve` runs one worker: the HTTP endpoint, the push channel and the
//! pairing sessions behind them. `pair supervise` runs a worker as a child
//! process and keeps it alive.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod server;
