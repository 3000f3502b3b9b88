#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;

use pair_runtime::{ProcessLauncher, SessionSupervisor, SupervisorConfig};

fn shell(script: String) -> SupervisorConfig {
	SupervisorConfig {
		entry: PathBuf::from("/bin/sh"),
		argv: vec!["-c".into(), script],
		watch_interval: Duration::from_millis(50),
	}
}

#[tokio::test]
async fn reset_from_real_worker_respawns_it() {
	let dir = tempfile::tempdir().unwrap();
	let marker = dir.path().join("started-once");
	let script = format!(
		"if [ -f '{m}' ]; then exit 0; fi; touch '{m}'; echo reset; exec sleep 30",
		m = marker.display()
	);

	let supervisor = SessionSupervisor::new(shell(script), ProcessLauncher);
	tokio::time::timeout(Duration::from_secs(10), supervisor.run(None))
		.await
		.expect("supervisor did not finish")
		.unwrap();

	assert!(marker.exists());
}

#[tokio::test]
async fn uptime_reply_reaches_worker_stdin() {
	let dir = tempfile::tempdir().unwrap();
	let reply = dir.path().join("reply");
	let script = format!("echo uptime; read line; echo \"$line\" > '{}'; exit 0", reply.display());

	let supervisor = SessionSupervisor::new(shell(script), ProcessLauncher);
	tokio::time::timeout(Duration::from_secs(10), supervisor.run(None))
		.await
		.expect("supervisor did not finish")
		.unwrap();

	let line = std::fs::read_to_string(&reply).unwrap();
	assert!(line.starts_with(r#"{"type":"uptime_reply","seconds":"#), "{line}");
}

#[tokio::test]
async fn missing_entry_fails_to_launch() {
	let config = SupervisorConfig {
		entry: PathBuf::from("/nonexistent/pair-worker"),
		argv: Vec::new(),
		watch_interval: Duration::from_millis(50),
	};

	let err = SessionSupervisor::new(config, ProcessLauncher).run(None).await.unwrap_err();

	assert!(matches!(err, pair_runtime::Error::Launch(_)));
}
