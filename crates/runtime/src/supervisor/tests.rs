use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pair_protocol::ControlMessage;
use tokio::sync::{mpsc, oneshot};

use super::*;
use crate::launcher::{WorkerEvent, WorkerEvents, WorkerHandle, WorkerLauncher};

/// One launched fake worker.
struct FakeWorker {
	argv: Vec<String>,
	events: WorkerEvents,
	control: mpsc::UnboundedReceiver<ControlMessage>,
	killed: oneshot::Receiver<()>,
}

#[derive(Clone, Default)]
struct FakeLauncher {
	workers: Arc<Mutex<Vec<FakeWorker>>>,
}

impl FakeLauncher {
	fn launches(&self) -> usize {
		self.workers.lock().unwrap().len()
	}

	fn argv(&self, index: usize) -> Vec<String> {
		self.workers.lock().unwrap()[index].argv.clone()
	}

	/// Reports `event` as coming from worker `index`.
	fn emit(&self, index: usize, event: WorkerEvent) {
		self.workers.lock().unwrap()[index].events.send(event);
	}

	fn was_killed(&self, index: usize) -> bool {
		let mut workers = self.workers.lock().unwrap();
		!matches!(workers[index].killed.try_recv(), Err(oneshot::error::TryRecvError::Empty))
	}

	fn take_control(&self, index: usize) -> mpsc::UnboundedReceiver<ControlMessage> {
		let (_, empty) = mpsc::unbounded_channel();
		std::mem::replace(&mut self.workers.lock().unwrap()[index].control, empty)
	}
}

impl WorkerLauncher for FakeLauncher {
	fn launch(&mut self, _entry: &Path, argv: &[String], events: WorkerEvents) -> crate::error::Result<WorkerHandle> {
		let (control_tx, control) = mpsc::unbounded_channel();
		let (kill_tx, killed) = oneshot::channel();
		let mut workers = self.workers.lock().unwrap();
		let pid = 1000 + workers.len() as u32;
		workers.push(FakeWorker {
			argv: argv.to_vec(),
			events,
			control,
			killed,
		});
		Ok(WorkerHandle::new(Some(pid), control_tx, kill_tx))
	}
}

fn config(entry: PathBuf) -> SupervisorConfig {
	SupervisorConfig {
		entry,
		argv: vec!["serve".into(), "--supervised".into(), "--port".into(), "9000".into()],
		watch_interval: Duration::from_millis(20),
	}
}

async fn wait_for(mut check: impl FnMut() -> bool) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while !check() {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.expect("condition not reached");
}

#[test]
fn second_start_while_running_is_a_no_op() {
	let launcher = FakeLauncher::default();
	let mut supervisor = SessionSupervisor::new(config(PathBuf::from("/bin/true")), launcher.clone());

	assert!(supervisor.start().unwrap());
	assert!(!supervisor.start().unwrap());

	assert_eq!(launcher.launches(), 1);
	let process = supervisor.process();
	assert!(process.is_running);
	assert_eq!(process.pid, Some(1000));
	assert_eq!(process.argv, config(PathBuf::new()).argv);
}

#[test]
fn terminate_allows_a_new_start() {
	let launcher = FakeLauncher::default();
	let mut supervisor = SessionSupervisor::new(config(PathBuf::from("/bin/true")), launcher.clone());

	supervisor.start().unwrap();
	supervisor.terminate();

	assert!(launcher.was_killed(0));
	assert!(!supervisor.process().is_running);
	assert!(supervisor.start().unwrap());
	assert_eq!(launcher.launches(), 2);
}

#[tokio::test]
async fn reset_replaces_worker_with_same_argv() {
	let launcher = FakeLauncher::default();
	let supervisor = SessionSupervisor::new(config(PathBuf::from("/bin/true")), launcher.clone());
	let task = tokio::spawn(supervisor.run(None));
	wait_for(|| launcher.launches() == 1).await;

	launcher.emit(0, WorkerEvent::Control(ControlMessage::Reset));
	wait_for(|| launcher.launches() == 2).await;

	assert!(launcher.was_killed(0));
	assert_eq!(launcher.argv(1), launcher.argv(0));

	// The killed worker's exit belongs to a replaced generation.
	launcher.emit(0, WorkerEvent::Exited(None));
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(launcher.launches(), 2);
	assert!(!task.is_finished());

	launcher.emit(1, WorkerEvent::Exited(Some(0)));
	task.await.unwrap().unwrap();
}

#[tokio::test]
async fn crash_waits_for_entry_change_before_respawn() {
	let dir = tempfile::tempdir().unwrap();
	let entry = dir.path().join("worker");
	std::fs::write(&entry, "broken build").unwrap();

	let launcher = FakeLauncher::default();
	let supervisor = SessionSupervisor::new(config(entry.clone()), launcher.clone());
	let task = tokio::spawn(supervisor.run(None));
	wait_for(|| launcher.launches() == 1).await;

	launcher.emit(0, WorkerEvent::Exited(Some(1)));
	tokio::time::sleep(Duration::from_millis(200)).await;
	assert_eq!(launcher.launches(), 1);

	std::fs::write(&entry, "fixed build, longer").unwrap();
	wait_for(|| launcher.launches() == 2).await;
	assert_eq!(launcher.argv(1), launcher.argv(0));

	launcher.emit(1, WorkerEvent::Exited(Some(0)));
	task.await.unwrap().unwrap();
}

#[tokio::test]
async fn uptime_query_gets_elapsed_seconds() {
	let launcher = FakeLauncher::default();
	let supervisor = SessionSupervisor::new(config(PathBuf::from("/bin/true")), launcher.clone());
	let task = tokio::spawn(supervisor.run(None));
	wait_for(|| launcher.launches() == 1).await;
	let mut control = launcher.take_control(0);

	tokio::time::sleep(Duration::from_millis(30)).await;
	launcher.emit(0, WorkerEvent::Control(ControlMessage::Uptime));

	match control.recv().await {
		Some(ControlMessage::UptimeReply { seconds }) => assert!(seconds >= 0.03),
		other => panic!("unexpected reply {other:?}"),
	}

	launcher.emit(0, WorkerEvent::Exited(Some(0)));
	task.await.unwrap().unwrap();
}

#[tokio::test]
async fn operator_lines_are_forwarded_verbatim() {
	let launcher = FakeLauncher::default();
	let supervisor = SessionSupervisor::new(config(PathBuf::from("/bin/true")), launcher.clone());
	let (operator_tx, operator_rx) = mpsc::unbounded_channel();
	let task = tokio::spawn(supervisor.run(Some(operator_rx)));
	wait_for(|| launcher.launches() == 1).await;
	let mut control = launcher.take_control(0);

	operator_tx.send("uptime".to_string()).unwrap();

	assert_eq!(
		control.recv().await,
		Some(ControlMessage::Operator {
			line: "uptime".into()
		})
	);

	drop(operator_tx);
	launcher.emit(0, WorkerEvent::Exited(Some(0)));
	task.await.unwrap().unwrap();
}
