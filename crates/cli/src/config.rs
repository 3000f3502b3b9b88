//! Typed configuration built from the parsed command line.

use std::net::SocketAddr;
use std::time::Duration;

use pair::{BackendConfig, LifecycleConfig, OpenAction};
use pair_protocol::DocumentBackend;
use pair_runtime::SupervisorConfig;

use crate::cli::{BackendKind, OnOpen, SUPERVISOR_ONLY, ServeArgs, SuperviseArgs};
use crate::error::{CliError, Result};

/// Everything a worker needs to run.
#[derive(Debug, Clone)]
pub struct ServeConfig {
	pub addr: SocketAddr,
	pub backend: BackendConfig,
	pub gateway_url: String,
	pub lifecycle: LifecycleConfig,
	pub supervised: bool,
}

impl ServeConfig {
	pub fn from_args(args: &ServeArgs) -> Result<Self> {
		let addr = format!("{}:{}", args.host, args.port);
		let addr = addr
			.parse()
			.map_err(|source| CliError::Address { addr: addr.clone(), source })?;

		Ok(Self {
			addr,
			backend: backend_config(args)?,
			gateway_url: args.gateway_url.clone(),
			lifecycle: LifecycleConfig {
				settle_delay: Duration::from_millis(args.settle_ms),
				on_open: match args.on_open {
					OnOpen::Broadcast => OpenAction::Broadcast,
					OnOpen::Restart => OpenAction::Restart,
				},
			},
			supervised: args.supervised,
		})
	}
}

fn backend_config(args: &ServeArgs) -> Result<BackendConfig> {
	match args.backend {
		BackendKind::File => Ok(BackendConfig::File {
			root: args.sessions_dir.clone(),
		}),
		BackendKind::Document => {
			let require = |value: &Option<String>, option: &'static str| {
				value.clone().ok_or(CliError::MissingOption {
					backend: "document",
					option,
				})
			};
			Ok(BackendConfig::Document(DocumentBackend {
				url: require(&args.document_url, "document-url")?,
				api_key: args.document_api_key.clone(),
				data_source: args.document_data_source.clone(),
				database: require(&args.document_database, "document-database")?,
				collection: require(&args.document_collection, "document-collection")?,
			}))
		}
		BackendKind::Publish => Ok(BackendConfig::Publish {
			endpoint: args.publish_url.clone().ok_or(CliError::MissingOption {
				backend: "publish",
				option: "publish-url",
			})?,
			prefix: args.publish_prefix.clone(),
			tag: args.session_tag.clone(),
		}),
	}
}

/// Builds the supervisor config. `raw` is the full command line without the
/// program name; the worker gets the same arguments with `supervise` replaced
/// by `serve --supervised`.
pub fn supervisor_config(args: &SuperviseArgs, raw: &[String]) -> Result<SupervisorConfig> {
	// Reject bad worker options here instead of in a crash loop.
	ServeConfig::from_args(&args.serve)?;

	Ok(SupervisorConfig {
		entry: std::env::current_exe().map_err(CliError::Entry)?,
		argv: worker_argv(raw)?,
		watch_interval: Duration::from_millis(args.watch_interval_ms),
	})
}

/// Rewrites a `supervise` command line into the worker's `serve` command line.
pub fn worker_argv(raw: &[String]) -> Result<Vec<String>> {
	let position = raw
		.iter()
		.position(|arg| arg == "supervise")
		.ok_or(CliError::NotSupervised)?;

	let mut argv: Vec<String> = raw[..position].to_vec();
	argv.push("serve".into());
	argv.push("--supervised".into());

	let mut rest = raw[position + 1..].iter();
	while let Some(arg) = rest.next() {
		let (name, inline_value) = match arg.split_once('=') {
			Some((name, _)) => (name, true),
			None => (arg.as_str(), false),
		};
		match SUPERVISOR_ONLY.iter().find(|(option, _)| *option == name) {
			Some((_, takes_value)) => {
				if *takes_value && !inline_value {
					rest.next();
				}
			}
			None => argv.push(arg.clone()),
		}
	}
	Ok(argv)
}
