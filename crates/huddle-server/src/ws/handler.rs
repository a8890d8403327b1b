use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();

    // Outbound queue owned by the coordinator; dropping the sender there
    // (eviction) ends the send task, which closes the socket
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.hub.attach(connection_id, tx);

    tracing::debug!("Connection {} attached", connection_id);

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                state.hub.frame(connection_id, text.to_string());
            }
            // Transport-level ping/pong counts as activity too
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                state.hub.touch(connection_id);
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::debug!("WebSocket error on {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    state.hub.closed(connection_id);
    send_task.abort();

    tracing::debug!("Connection {} closed", connection_id);
}
