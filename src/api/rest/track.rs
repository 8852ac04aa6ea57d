use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::SinkExt;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::tracking::TrackingEvent;

/// Live tracking channel for one order. On connect the client immediately
/// gets the current status and the last-known driver position, so a
/// reconnect after network loss is never blind until the next tick. The
/// stream ends with a terminal event and the socket is closed server-side.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(order_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    if !state.orders.contains_key(&order_id) {
        return Err(AppError::NotFound(format!("order {order_id} not found")));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, order_id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, order_id: Uuid) {
    state.metrics.tracking_subscribers.inc();
    info!(order_id = %order_id, "tracking client connected");

    let (mut sender, mut receiver) = socket.split();

    let snapshot_status = state.orders.get(&order_id).map(|order| order.status);
    let Some(status) = snapshot_status else {
        let _ = sender.close().await;
        state.metrics.tracking_subscribers.dec();
        return;
    };

    if send_event(
        &mut sender,
        &TrackingEvent::Status {
            status,
            terminal: status.is_terminal(),
        },
    )
    .await
    .is_err()
        || status.is_terminal()
    {
        let _ = sender.close().await;
        state.metrics.tracking_subscribers.dec();
        info!(order_id = %order_id, "tracking client disconnected");
        return;
    }

    let (last, mut events) = state.rooms.subscribe(order_id);

    // The order may have gone terminal between the snapshot and the
    // subscription; the freshly created room would never hear about it.
    let now_terminal = state
        .orders
        .get(&order_id)
        .map(|order| order.status.is_terminal())
        .unwrap_or(true);
    if now_terminal {
        let _ = sender.close().await;
        state.metrics.tracking_subscribers.dec();
        return;
    }

    if let Some(tick) = last {
        if send_event(&mut sender, &TrackingEvent::Position(tick)).await.is_err() {
            let _ = sender.close().await;
            state.metrics.tracking_subscribers.dec();
            return;
        }
    }

    let send_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let terminal =
                        matches!(event, TrackingEvent::Status { terminal: true, .. });
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                    if terminal {
                        let _ = sender.close().await;
                        break;
                    }
                }
                // Lagging just means missed ticks; the next one carries the
                // current position anyway.
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    let _ = sender.close().await;
                    break;
                }
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.metrics.tracking_subscribers.dec();
    info!(order_id = %order_id, "tracking client disconnected");
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &TrackingEvent,
) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize tracking event");
            return Ok(());
        }
    };

    sender.send(Message::Text(json.into())).await.map_err(|_| ())
}
