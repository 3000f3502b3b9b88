//! Errors raised while turning command-line options into runtime config.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("the {backend} backend requires --{option}")]
	MissingOption {
		backend: &'static str,
		option: &'static str,
	},

	#[error("invalid listen address {addr}: {source}")]
	Address {
		addr: String,
		#[source]
		source: std::net::AddrParseError,
	},

	#[error("`supervise` missing from the command line")]
	NotSupervised,

	#[error("cannot locate the pair executable: {0}")]
	Entry(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
