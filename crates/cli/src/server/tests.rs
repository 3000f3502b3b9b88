use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use pair::testing::{MockConnector, RecordingRestart, Step};
use pair::{BackendConfig, BackendFactory, LifecycleConfig, OpenAction, PairingCoordinator};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use super::*;

struct Fixture {
	coordinator: PairingCoordinator,
	connector: MockConnector,
	_sessions: TempDir,
}

fn fixture(settle_delay: Duration) -> Fixture {
	let sessions = tempfile::tempdir().unwrap();
	let connector = MockConnector::new("ABCD-1234");
	let stores = BackendFactory::new(BackendConfig::File {
		root: sessions.path().to_path_buf(),
	});
	let coordinator = PairingCoordinator::new(
		Arc::new(stores),
		Arc::new(connector.clone()),
		Arc::new(RecordingRestart::new()),
		LifecycleConfig {
			settle_delay,
			on_open: OpenAction::Broadcast,
		},
	);
	Fixture {
		coordinator,
		connector,
		_sessions: sessions,
	}
}

async fn call(coordinator: &PairingCoordinator, request: Request<Body>) -> (StatusCode, Value) {
	let response = router(coordinator.clone()).oneshot(request).await.unwrap();
	let status = response.status();
	let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	(status, serde_json::from_slice(&body).unwrap())
}

fn post_json(body: &str) -> Request<Body> {
	Request::post("/pair")
		.header("content-type", "application/json")
		.body(Body::from(body.to_string()))
		.unwrap()
}

#[tokio::test(start_paused = true)]
async fn post_pair_returns_code() {
	let fx = fixture(Duration::from_secs(3));

	let (status, body) = call(&fx.coordinator, post_json(r#"{"phone":"+91 77888 61848"}"#)).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({"code": "ABCD-1234"}));
	assert_eq!(fx.connector.requested_phones(), vec!["917788861848"]);
}

#[tokio::test(start_paused = true)]
async fn get_pair_reads_phone_from_query() {
	let fx = fixture(Duration::from_secs(3));
	let request = Request::get("/pair?phone=917788861848").body(Body::empty()).unwrap();

	let (status, body) = call(&fx.coordinator, request).await;

	assert_eq!(status, StatusCode::OK);
	assert_eq!(body, json!({"code": "ABCD-1234"}));
}

#[tokio::test]
async fn missing_phone_is_a_bad_request() {
	let fx = fixture(Duration::from_secs(3));

	let (status, body) = call(&fx.coordinator, post_json("{}")).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body, json!({"error": "Please provide a phone number"}));
	assert_eq!(fx.connector.connect_count(), 0);
}

#[tokio::test]
async fn short_number_is_a_bad_request() {
	let fx = fixture(Duration::from_secs(3));
	let request = Request::get("/pair?phone=12345").body(Body::empty()).unwrap();

	let (status, body) = call(&fx.coordinator, request).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert_eq!(body, json!({"error": "Please enter your number with country code"}));
}

#[tokio::test]
async fn malformed_json_gets_error_body() {
	let fx = fixture(Duration::from_secs(3));

	let (status, body) = call(&fx.coordinator, post_json("{phone")).await;

	assert_eq!(status, StatusCode::BAD_REQUEST);
	assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
}

#[tokio::test(start_paused = true)]
async fn pairing_failure_maps_to_bad_gateway() {
	let fx = fixture(Duration::from_secs(3));
	fx.connector.fail_pairing("rate limited");

	let (status, body) = call(&fx.coordinator, post_json(r#"{"phone":"917788861848"}"#)).await;

	assert_eq!(status, StatusCode::BAD_GATEWAY);
	assert!(body["error"].as_str().unwrap().contains("rate limited"));
}

#[tokio::test(start_paused = true)]
async fn close_before_code_is_service_unavailable() {
	let fx = fixture(Duration::from_secs(3));
	fx.connector.push_script(vec![
		Step::Wait(Duration::from_secs(1)),
		Step::Close(pair_protocol::DisconnectReason::LoggedOut),
	]);

	let (status, body) = call(&fx.coordinator, post_json(r#"{"phone":"917788861848"}"#)).await;

	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert!(body.get("error").is_some());
}

#[tokio::test]
async fn root_answers_liveness_check() {
	let fx = fixture(Duration::from_secs(3));

	let response = router(fx.coordinator.clone())
		.oneshot(Request::get("/").body(Body::empty()).unwrap())
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::OK);
	let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
	assert_eq!(&body[..], b"OK");
}

#[tokio::test]
async fn push_channel_announces_opened_sessions() {
	let fx = fixture(Duration::from_millis(20));
	fx.connector.push_script(vec![Step::Wait(Duration::from_millis(100)), Step::Open]);

	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(axum::serve(listener, router(fx.coordinator.clone()).into_make_service()).into_future());

	let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();

	let (status, _) = call(&fx.coordinator, post_json(r#"{"phone":"917788861848"}"#)).await;
	assert_eq!(status, StatusCode::OK);

	let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
		.await
		.expect("no push message")
		.unwrap()
		.unwrap();
	let push: Value = serde_json::from_str(frame.to_text().unwrap()).unwrap();
	assert_eq!(push, json!({"sessionId": "917788861848"}));
}
