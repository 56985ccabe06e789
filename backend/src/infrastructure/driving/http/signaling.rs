use axum::{body::Bytes, extract::State, response::Json};
use shared::SessionDescription;
use tracing::info;

use crate::application::signaling::parse_offer;
use crate::domain::errors::BridgeError;
use crate::infrastructure::AppState;

/// `POST /offer`: exchange a viewer's offer for the bridge's answer.
///
/// The raw body is parsed here so every malformed payload maps to
/// `InvalidOffer` instead of axum's own rejection.
pub async fn offer(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SessionDescription>, BridgeError> {
    let offer = parse_offer(&body)?;
    info!("Received SDP offer ({} bytes)", offer.sdp.len());

    let answer = state.signaling.handle_offer(offer).await?;
    Ok(Json(answer))
}
