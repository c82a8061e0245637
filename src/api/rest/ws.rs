use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use chrono::Utc;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::api::rest::auth::{authorize, session_for_token, STAFF};
use crate::engine::runtime::{read_feed, watch_feed};
use crate::error::AppError;
use crate::state::{AppState, FeedEvent};

#[derive(Deserialize)]
pub struct WsParams {
    pub token: String,
}

/// Browsers cannot set headers on a websocket upgrade, so the session token
/// comes in the query string.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(tenant): Path<String>,
    Query(params): Query<WsParams>,
) -> Result<impl IntoResponse, AppError> {
    let session = session_for_token(&state, &params.token)?;
    authorize(&session, &tenant, STAFF)?;
    if !state.store.has_tenant(&tenant) {
        return Err(AppError::NotFound(format!("unknown business {tenant}")));
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, tenant)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, tenant: String) {
    let _watch = watch_feed(&state, &tenant);
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.feed_events_tx.subscribe());

    info!(tenant = %tenant, "websocket client connected");

    let initial = FeedEvent::FeedUpdated {
        tenant: tenant.clone(),
        feed: read_feed(&state, &tenant, |feed| feed.view(&tenant, Utc::now())),
    };

    let send_task = tokio::spawn(async move {
        if send_event(&mut sender, &initial).await.is_err() {
            return;
        }

        while let Some(received) = events.next().await {
            let event = match received {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket client lagged behind feed events");
                    continue;
                }
            };

            if event.tenant() != initial.tenant() {
                continue;
            }

            if send_event(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    first_to_finish(send_task, recv_task).await;

    info!(tenant = %tenant, "websocket client disconnected");
}

/// Waits for either task and aborts the other.
async fn first_to_finish(mut a: JoinHandle<()>, mut b: JoinHandle<()>) {
    tokio::select! {
        _ = &mut a => b.abort(),
        _ = &mut b => a.abort(),
    }
}

async fn send_event<S>(sender: &mut S, event: &FeedEvent) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize feed event for ws");
            return Ok(());
        }
    };

    sender.send(Message::Text(json)).await.map_err(|_| ())
}
