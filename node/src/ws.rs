//! WebSocket listener. Every text frame carries one JSON-RPC request or batch and is
//! dispatched against the same methods as the HTTP listener. A frame that does not
//! decode into a request is answered with an error object, then the connection is closed.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use jsonrpsee::types::ErrorCode;
use jsonrpsee::Methods;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::MAX_REQUEST_BODY_SIZE;

/// Capacity of the outbound queue of one connection.
const OUTBOUND_CAPACITY: usize = 64;

#[derive(Clone)]
struct WsState {
    methods: Methods,
    stop: watch::Receiver<bool>,
}

/// Router upgrading `GET /` to a JSON-RPC WebSocket session.
pub fn router(methods: Methods, stop: watch::Receiver<bool>) -> Router {
    Router::new().route("/", get(upgrade)).with_state(WsState { methods, stop })
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<WsState>) -> Response {
    ws.max_message_size(MAX_REQUEST_BODY_SIZE as usize)
        .on_upgrade(move |socket| connection(socket, state))
}

/// Error object sent before closing on an undecodable frame.
pub fn error_response(code: ErrorCode) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": code.code(), "message": code.message() },
    })
    .to_string()
}

async fn connection(mut socket: WebSocket, state: WsState) {
    let WsState { methods, mut stop } = state;
    let (outbound, mut notifications) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    debug!("WebSocket connection opened");

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("Closing WebSocket after a non UTF-8 frame");
                            let reply = error_response(ErrorCode::ParseError);
                            let _ = socket.send(Message::Text(reply)).await;
                            break;
                        },
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("WebSocket receive error: {e}");
                        break;
                    },
                };
                match dispatch(&methods, &text, &outbound).await {
                    Ok(Some(reply)) => {
                        if socket.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    },
                    Ok(None) => {},
                    Err(code) => {
                        warn!("Closing WebSocket after an undecodable frame: {}", code.message());
                        let _ = socket.send(Message::Text(error_response(code))).await;
                        break;
                    },
                }
            }
            Some(notification) = notifications.recv() => {
                if socket.send(Message::Text(notification)).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = socket.close().await;
    debug!("WebSocket connection closed");
}

/// Runs one frame. `Ok(None)` means nothing is owed to the client (notifications only).
pub async fn dispatch(
    methods: &Methods, text: &str, outbound: &mpsc::Sender<String>,
) -> Result<Option<String>, ErrorCode> {
    let envelope: Value = serde_json::from_str(text).map_err(|_| ErrorCode::ParseError)?;
    match envelope {
        Value::Array(calls) if !calls.is_empty() => {
            let mut replies = Vec::with_capacity(calls.len());
            for call in calls {
                if let Some(reply) = dispatch_call(methods, call, outbound).await? {
                    replies.push(reply);
                }
            }
            Ok((!replies.is_empty()).then(|| format!("[{}]", replies.join(","))))
        },
        Value::Object(fields) => dispatch_call(methods, Value::Object(fields), outbound).await,
        _ => Err(ErrorCode::InvalidRequest),
    }
}

async fn dispatch_call(
    methods: &Methods, call: Value, outbound: &mpsc::Sender<String>,
) -> Result<Option<String>, ErrorCode> {
    let Value::Object(fields) = &call else {
        return Err(ErrorCode::InvalidRequest);
    };
    if !fields.contains_key("id") {
        return Ok(None);
    }
    let (reply, notifications) = methods
        .raw_json_request(&call.to_string(), OUTBOUND_CAPACITY)
        .await
        .map_err(|_| ErrorCode::InvalidRequest)?;
    forward(notifications, outbound.clone());
    Ok(Some(reply))
}

/// Moves subscription notifications onto the connection's outbound queue until either
/// side goes away.
fn forward(mut notifications: mpsc::Receiver<String>, outbound: mpsc::Sender<String>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = outbound.closed() => break,
                next = notifications.recv() => match next {
                    Some(notification) => {
                        if outbound.send(notification).await.is_err() {
                            break;
                        }
                    },
                    None => break,
                },
            }
        }
    });
}
