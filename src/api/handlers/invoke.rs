use axum::extract::State;

use crate::api::handlers::AppState;
use crate::models::InvocationOutcome;

/// Handle an object storage notification.
/// The body is taken as raw text so that malformed payloads are reported in
/// the outcome instead of being rejected by the extractor.
pub async fn ingest(State(state): State<AppState>, body: String) -> InvocationOutcome {
    state.ingest.handle_payload(&body).await
}

/// Run the retention sweep; the payload is only logged
pub async fn sweep(State(state): State<AppState>, body: String) -> InvocationOutcome {
    state.sweeper.handle_payload(&body).await
}
