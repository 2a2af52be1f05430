use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use tokio::sync::broadcast;
use tokio_stream::Stream;

use crate::api::error::ApiError;
use crate::api::state::AppState;

pub async fn event_stream(
    State(state): State<AppState>,
    Path(order_code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let mut inner = state.inner.write().await;
    let channel = inner
        .order_events
        .entry(order_code.clone())
        .or_insert_with(|| {
            let (tx, _) = broadcast::channel(256);
            crate::api::state::OrderEventChannel {
                tx,
                log: std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new())),
            }
        });

    // Grab the replay buffer before subscribing so events aren't double-sent.
    let replay = {
        let log = channel.log.lock().await;
        log.clone()
    };
    let mut rx = channel.tx.subscribe();
    drop(inner);

    let stream = async_stream::stream! {
        for event in replay {
            let json = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(json));
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().data(json));
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    let msg = format!("{{\"type\":\"lagged\",\"missed\":{n}}}");
                    yield Ok(Event::default().data(msg));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream))
}
