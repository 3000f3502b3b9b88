
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Pairing-code service.
#[derive(Parser, Debug)]
#[command(name = "pair")]
#[command(about = "Pairing-code service: issue link codes and keep session credentials")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run a worker that answers pairing requests over HTTP.
	Serve(ServeArgs),
	/// Run a worker under supervision: restart on request, respawn after a crash
	/// once the executable changes.
	Supervise(SuperviseArgs),
}

/// Storage backend for session credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
	/// One JSON file per record under the sessions directory
	File,
	/// Remote document collection over HTTP
	Document,
	/// In-memory records uploaded once as a snapshot
	Publish,
}

/// What a worker does once a session is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnOpen {
	/// Push the session identifier to `/ws` subscribers
	Broadcast,
	/// Ask the supervisor for a fresh worker
	Restart,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
	/// Listen port
	#[arg(long, env = "PORT", default_value_t = 8000)]
	pub port: u16,

	/// Listen address
	#[arg(long, env = "PAIR_HOST", default_value = "0.0.0.0")]
	pub host: String,

	/// Credential storage backend
	#[arg(long, env = "PAIR_BACKEND", value_enum, default_value_t = BackendKind::File)]
	pub backend: BackendKind,

	/// Root of per-session directories (file backend)
	#[arg(long, env = "PAIR_SESSIONS_DIR", default_value = "./sessions")]
	pub sessions_dir: PathBuf,

	/// Base URL of the document endpoint (document backend)
	#[arg(long, env = "PAIR_DOCUMENT_URL")]
	pub document_url: Option<String>,

	/// API key sent with document requests
	#[arg(long, env = "PAIR_DOCUMENT_API_KEY", hide_env_values = true)]
	pub document_api_key: Option<String>,

	/// Data source name of the document endpoint
	#[arg(long, env = "PAIR_DOCUMENT_DATA_SOURCE", default_value = "Cluster0")]
	pub document_data_source: String,

	/// Database holding the session collections
	#[arg(long, env = "PAIR_DOCUMENT_DATABASE")]
	pub document_database: Option<String>,

	/// Collection name prefix; each session gets `{prefix}_{phone}`
	#[arg(long, env = "PAIR_DOCUMENT_COLLECTION")]
	pub document_collection: Option<String>,

	/// Upload endpoint (publish backend)
	#[arg(long, env = "PAIR_PUBLISH_URL")]
	pub publish_url: Option<String>,

	/// Prefix stripped from the upload handle
	#[arg(long, env = "PAIR_PUBLISH_PREFIX", default_value = "")]
	pub publish_prefix: String,

	/// Tag prepended to published session identifiers
	#[arg(long, env = "PAIR_SESSION_TAG", default_value = "")]
	pub session_tag: String,

	/// WebSocket URL of the messaging gateway
	#[arg(long, env = "PAIR_GATEWAY_URL", default_value = "ws://127.0.0.1:8765")]
	pub gateway_url: String,

	/// Delay between connecting and requesting the pairing code, in milliseconds
	#[arg(long, env = "PAIR_SETTLE_MS", default_value_t = 3000)]
	pub settle_ms: u64,

	/// Action once a session is linked
	#[arg(long, env = "PAIR_ON_OPEN", value_enum, default_value_t = OnOpen::Broadcast)]
	pub on_open: OnOpen,

	/// Speak the control protocol on stdio (set by `pair supervise`)
	#[arg(long, hide = true)]
	pub supervised: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SuperviseArgs {
	#[command(flatten)]
	pub serve: ServeArgs,

	/// Poll interval of the executable watch after a crash, in milliseconds
	#[arg(long, env = "PAIR_WATCH_INTERVAL_MS", default_value_t = 1000)]
	pub watch_interval_ms: u64,

	/// Do not forward terminal input to the worker
	#[arg(long)]
	pub test: bool,
}

/// Options that only the supervisor understands, with whether they take a value.
pub(crate) const SUPERVISOR_ONLY: &[(&str, bool)] = &[("--watch-interval-ms", true), ("--test", false)];
