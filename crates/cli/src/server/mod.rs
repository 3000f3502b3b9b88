//! HTTP surface of a worker.
//!
//! - `POST /pair` with `{"phone": ..}` or `GET /pair?phone=..` answers
//!   `{"code": ..}` or `{"error": ..}` with the error's status
//! - `GET /ws` pushes `{"sessionId": ..}` for every session that opens
//! - `GET /` is a liveness check

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{Json, Router};
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use pair::PairingCoordinator;
use pair_protocol::{PairRequest, PairResponse, PushMessage};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, info, warn};

pub fn router(coordinator: PairingCoordinator) -> Router {
	Router::new()
		.route("/", get(|| async { "OK" }))
		.route("/pair", get(pair_query).post(pair_json))
		.route("/ws", get(push_channel))
		.with_state(coordinator)
}

/// Serves `coordinator` on `addr` until `shutdown` resolves.
pub async fn serve(
	addr: SocketAddr,
	coordinator: PairingCoordinator,
	shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind pairing server to {addr}"))?;
	info!(target = "pair.http", %addr, "listening for pairing requests");

	axum::serve(listener, router(coordinator).into_make_service())
		.with_graceful_shutdown(shutdown)
		.await
		.context("Pairing server error")
}

#[derive(Debug, Deserialize)]
struct PairQuery {
	phone: Option<String>,
}

async fn pair_query(State(coordinator): State<PairingCoordinator>, Query(query): Query<PairQuery>) -> Response {
	let request = PairRequest {
		phone: query.phone,
		backend: None,
	};
	answer(&coordinator, request).await
}

async fn pair_json(
	State(coordinator): State<PairingCoordinator>,
	payload: std::result::Result<Json<PairRequest>, JsonRejection>,
) -> Response {
	match payload {
		Ok(Json(request)) => answer(&coordinator, request).await,
		Err(rejection) => {
			debug!(target = "pair.http", error = %rejection, "malformed pairing request");
			(StatusCode::BAD_REQUEST, Json(PairResponse::error(rejection.body_text()))).into_response()
		}
	}
}

async fn answer(coordinator: &PairingCoordinator, request: PairRequest) -> Response {
	match coordinator.request_code(request).await {
		Ok(code) => (StatusCode::OK, Json(PairResponse::code(code))).into_response(),
		Err(err) => {
			let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
			if status.is_server_error() {
				warn!(target = "pair.http", status = status.as_u16(), error = %err, "pairing request failed");
			} else {
				debug!(target = "pair.http", status = status.as_u16(), error = %err, "pairing request refused");
			}
			(status, Json(PairResponse::error(err.to_string()))).into_response()
		}
	}
}

async fn push_channel(ws: WebSocketUpgrade, State(coordinator): State<PairingCoordinator>) -> Response {
	// Subscribe before the handshake completes so no announcement is missed.
	let updates = coordinator.subscribe();
	ws.on_upgrade(move |socket| push_socket(socket, updates))
}

async fn push_socket(socket: WebSocket, updates: broadcast::Receiver<PushMessage>) {
	debug!(target = "pair.http", "push subscriber connected");
	let (mut ws_tx, mut ws_rx) = socket.split();
	let mut updates = BroadcastStream::new(updates);

	let send_task = tokio::spawn(async move {
		while let Some(update) = updates.next().await {
			let message = match update {
				Ok(message) => message,
				Err(BroadcastStreamRecvError::Lagged(skipped)) => {
					warn!(target = "pair.http", skipped, "push subscriber lagged");
					continue;
				}
			};
			let text = match serde_json::to_string(&message) {
				Ok(text) => text,
				Err(err) => {
					warn!(target = "pair.http", error = %err, "failed to encode push message");
					continue;
				}
			};
			if ws_tx.send(Message::Text(text.into())).await.is_err() {
				break;
			}
		}
	});

	while let Some(msg) = ws_rx.next().await {
		match msg {
			Ok(Message::Close(_)) => break,
			Ok(_) => {}
			Err(err) => {
				debug!(target = "pair.http", error = %err, "push subscriber websocket error");
				break;
			}
		}
	}

	send_task.abort();
	debug!(target = "pair.http", "push subscriber disconnected");
}

#[cfg(test)]
mod tests;
