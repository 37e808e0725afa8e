//! Run websocket.
//!
//! Each accepted connection starts one provisioning run and receives every
//! progress event as a text message. Incoming data is ignored; the socket
//! closing is the only signal read from the client. Once it closes the run
//! stops before its next stage, and tier processes already started keep
//! running.

use super::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use rr_core::progress::{ProgressChannel, DEFAULT_CAPACITY};
use rr_core::state::RunManager;
use rr_protocol::ipc::ProgressEvent;

/// GET /ws/run-repo
pub async fn run_repo(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_run(socket, state.manager))
}

enum Next {
    Forward(ProgressEvent),
    Ignore,
    Stop,
}

async fn stream_run(mut socket: WebSocket, manager: RunManager) {
    let (progress, mut rx) = ProgressChannel::new(DEFAULT_CAPACITY);
    let _run = manager.start_run(progress);
    tracing::info!("Observer connected, run started");

    loop {
        let next = tokio::select! {
            event = rx.recv() => event.map_or(Next::Stop, Next::Forward),
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => Next::Stop,
                Some(Ok(_)) => Next::Ignore,
            },
        };

        match next {
            Next::Forward(event) => {
                let line = event.render();
                if socket.send(Message::Text(line.into())).await.is_err() {
                    break;
                }
            }
            Next::Ignore => {}
            Next::Stop => break,
        }
    }

    // Dropping the receiver is what the engine sees as a disconnect
    drop(rx);
    tracing::info!("Observer disconnected");
}
