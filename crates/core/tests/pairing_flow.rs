use std::sync::Arc;
use std::time::Duration;

use pair::store::{DocumentStore, MemoryCollection};
use pair::testing::{MockConnector, RecordingRestart, Step};
use pair::{
	CredentialStore, Error, LifecycleConfig, OpenAction, PairingCoordinator, Result, StoreFactory,
};
use pair_protocol::{DisconnectReason, DocumentBackend, Node, PairRequest, PushMessage};
use tokio::time::Instant;

const SETTLE: Duration = Duration::from_secs(3);

struct MemoryStores {
	collection: Arc<MemoryCollection>,
}

impl StoreFactory for MemoryStores {
	fn open(&self, session: &str, _document: Option<&DocumentBackend>) -> Result<Arc<dyn CredentialStore>> {
		Ok(Arc::new(DocumentStore::new(session, self.collection.clone())))
	}
}

fn coordinator(connector: &MockConnector) -> PairingCoordinator {
	let stores = MemoryStores {
		collection: Arc::new(MemoryCollection::new()),
	};
	PairingCoordinator::new(
		Arc::new(stores),
		Arc::new(connector.clone()),
		Arc::new(RecordingRestart::new()),
		LifecycleConfig {
			settle_delay: SETTLE,
			on_open: OpenAction::Broadcast,
		},
	)
}

fn request(phone: &str) -> PairRequest {
	PairRequest {
		phone: Some(phone.to_string()),
		backend: None,
	}
}

#[tokio::test(start_paused = true)]
async fn fresh_number_gets_code_within_settle_delay() {
	let connector = MockConnector::new("ABCD-1234");
	let pairing = coordinator(&connector);
	let started = Instant::now();

	let code = pairing.request_code(request("917788861848")).await.unwrap();

	assert!(!code.is_empty());
	assert!(started.elapsed() <= SETTLE + Duration::from_millis(1));
	assert_eq!(connector.requested_phones(), vec!["917788861848"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_one_connection() {
	let connector = MockConnector::new("ABCD-1234");
	let pairing = coordinator(&connector);

	let first = pairing.request_code(request("917788861848"));
	let second = pairing.request_code(request("+91 77888 61848"));
	let (first, second) = tokio::join!(first, second);

	assert_eq!(first.unwrap(), "ABCD-1234");
	assert_eq!(second.unwrap(), "ABCD-1234");
	assert_eq!(connector.connect_count(), 1);
	assert_eq!(connector.requested_phones().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn shared_failure_reaches_every_waiter() {
	let connector = MockConnector::new("ABCD-1234");
	connector.fail_pairing("rate limited");
	let pairing = coordinator(&connector);

	let (first, second) = tokio::join!(
		pairing.request_code(request("917788861848")),
		pairing.request_code(request("917788861848"))
	);

	for result in [first, second] {
		let err = result.unwrap_err();
		assert!(matches!(*err, Error::PairingRequest(_)));
		assert_eq!(err.status_code(), 502);
	}
	assert_eq!(connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_pairing_releases_number_for_retry() {
	let connector = MockConnector::new("ABCD-1234");
	connector.fail_pairing("rate limited");
	let pairing = coordinator(&connector);

	let err = pairing.request_code(request("917788861848")).await.unwrap_err();
	assert!(matches!(*err, Error::PairingRequest(_)));

	tokio::time::sleep(Duration::from_secs(1)).await;
	assert_eq!(pairing.active_sessions(), 0);

	connector.heal_pairing();
	let code = pairing.request_code(request("917788861848")).await.unwrap();
	assert_eq!(code, "ABCD-1234");
	assert_eq!(connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn paired_number_reconnects_on_later_request() {
	let connector = MockConnector::new("ABCD-1234");
	let mut registered = Node::map();
	registered.insert("registered", true);
	connector.push_script(vec![
		Step::Wait(Duration::from_secs(5)),
		Step::Creds(registered),
		Step::Open,
		Step::Wait(Duration::from_secs(5)),
		Step::Close(DisconnectReason::ConnectionLost),
	]);
	connector.push_script(vec![Step::Wait(Duration::from_secs(1)), Step::Open]);
	let pairing = coordinator(&connector);
	let mut push = pairing.subscribe();

	pairing.request_code(request("917788861848")).await.unwrap();
	push.recv().await.unwrap();
	tokio::time::sleep(Duration::from_secs(15)).await;
	assert_eq!(pairing.active_sessions(), 0);

	let err = pairing.request_code(request("917788861848")).await.unwrap_err();

	assert!(matches!(*err, Error::AlreadyRegistered));
	assert_eq!(err.status_code(), 409);
	assert_eq!(connector.connect_count(), 2);
	assert_eq!(connector.requested_phones().len(), 1);
	assert_eq!(
		push.recv().await.unwrap(),
		PushMessage {
			session_id: "917788861848".into()
		}
	);
}

#[tokio::test(start_paused = true)]
async fn running_session_refuses_second_pairing() {
	let connector = MockConnector::new("ABCD-1234");
	let pairing = coordinator(&connector);

	pairing.request_code(request("917788861848")).await.unwrap();
	let err = pairing.request_code(request("917788861848")).await.unwrap_err();

	assert!(matches!(*err, Error::SessionActive));
	assert_eq!(pairing.active_sessions(), 1);
	assert_eq!(connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_numbers_never_connect() {
	let connector = MockConnector::new("ABCD-1234");
	let pairing = coordinator(&connector);

	let err = pairing.request_code(request("12345")).await.unwrap_err();
	assert!(err.is_validation());
	let err = pairing.request_code(PairRequest::default()).await.unwrap_err();
	assert_eq!(err.to_string(), "Please provide a phone number");

	assert_eq!(connector.connect_count(), 0);
	assert_eq!(pairing.active_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn open_session_is_announced_and_ended_session_is_released() {
	let connector = MockConnector::new("ABCD-1234");
	connector.push_script(vec![
		Step::Wait(Duration::from_secs(5)),
		Step::Open,
		Step::Wait(Duration::from_secs(5)),
		Step::Close(DisconnectReason::LoggedOut),
	]);
	let pairing = coordinator(&connector);
	let mut push = pairing.subscribe();

	pairing.request_code(request("917788861848")).await.unwrap();

	assert_eq!(
		push.recv().await.unwrap(),
		PushMessage {
			session_id: "917788861848".into()
		}
	);

	tokio::time::sleep(Duration::from_secs(10)).await;
	assert_eq!(pairing.active_sessions(), 0);
}
