//! API Routes

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::event_hub::EventHub;
use crate::models::LightTriggerBody;
use crate::state::AppState;

/// Keep-alive comment interval for idle stream clients
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(relay_status))
        // Push channel
        .route("/stream", get(stream_events))
        // Side-effect trigger
        .route("/light/on", post(light_on))
        .with_state(state)
}

// ========================================
// Push Channel Handler
// ========================================

/// Removes the hub subscription when the SSE stream is dropped, so a
/// disconnected client never receives further delivery attempts.
struct SubscriptionGuard {
    hub: Arc<EventHub>,
    id: Uuid,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.hub.unregister(&self.id);
    }
}

/// Stream every published event as `data: <json>` frames.
async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (id, rx) = state.hub.register();
    let guard = SubscriptionGuard {
        hub: state.hub.clone(),
        id,
    };

    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        // owned by the closure; dropped (and deregistered) with the stream
        let _guard = &guard;
        match Event::default().json_data(&event) {
            Ok(frame) => Ok(frame),
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "Failed to serialize event frame");
                Ok(Event::default().comment("serialization error"))
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

// ========================================
// Light Trigger Handler
// ========================================

/// Acknowledge a light trigger.
///
/// The caller treats this as fire-and-forget; the device integration
/// point is here when one exists.
async fn light_on(Json(req): Json<LightTriggerBody>) -> Result<StatusCode> {
    if req.event != LightTriggerBody::FRAME_CLEARED {
        return Err(Error::Validation(format!(
            "Unknown trigger event: {}",
            req.event
        )));
    }

    tracing::info!(count = req.count, at = %req.at, "Light trigger received");
    Ok(StatusCode::NO_CONTENT)
}

// ========================================
// Status Handler
// ========================================

async fn relay_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "subscribers": state.hub.subscriber_count(),
        "topics": state.config.mqtt_topics,
        "batch_size": state.config.batch_size,
    }))
}
