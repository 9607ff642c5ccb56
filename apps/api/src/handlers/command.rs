//! Signed slash command intake.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use ephemera_application::{SignatureHeaders, parse_command, verify_request};
use ephemera_core::AppError;
use tracing::{debug, error, info, warn};

use crate::client_ip::resolve_client_ip;
use crate::error::ApiResult;
use crate::state::AppState;

const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_HEADER: &str = "x-slack-signature";

/// Verifies and parses a slash command, then provisions in the background.
///
/// The response only acknowledges receipt; the outcome reaches the requester
/// through chat. Malformed commands are answered with a readable reply body
/// instead of an error status, so the chat client shows the reason.
pub async fn slash_command_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<(StatusCode, String)> {
    let config = state.config_service.get().await.map_err(|config_error| {
        error!(error = %config_error, "configuration unavailable");
        config_error
    })?;

    let signature_headers = SignatureHeaders {
        timestamp: header_value(&headers, TIMESTAMP_HEADER),
        signature: header_value(&headers, SIGNATURE_HEADER),
    };
    if !verify_request(
        &signature_headers,
        body.as_str(),
        config.signing_secret(),
        Utc::now(),
    ) {
        warn!(peer = %peer, "rejected command with invalid signature");
        return Err(AppError::Unauthorized("invalid request signature".to_owned()).into());
    }

    let source_ip = resolve_client_ip(peer.ip(), &headers, state.trusted_proxies.as_slice());
    let request = match parse_command(body.as_str(), source_ip) {
        Ok(request) => request,
        Err(AppError::Validation(reason)) => {
            info!(peer = %peer, reason = %reason, "rejected malformed command");
            return Ok((StatusCode::OK, malformed_command_text(reason.as_str())));
        }
        Err(parse_error) => return Err(parse_error.into()),
    };

    info!(
        user_id = %request.requester().user_id(),
        target = %request.target(),
        duration_minutes = request.duration_minutes(),
        source_ip = %source_ip,
        "access request accepted"
    );

    let provisioning_service = state.provisioning_service.clone();
    tokio::spawn(async move {
        if let Err(provisioning_error) = provisioning_service.handle(request).await {
            debug!(error = %provisioning_error, "background provisioning finished with failure");
        }
    });

    Ok((StatusCode::OK, String::new()))
}

/// Reply shown to the requester in place of the acknowledgement.
fn malformed_command_text(reason: &str) -> String {
    format!(
        "Sorry, I couldn't read that command: {reason}. Usage: `target:<name> duration:<minutes>`"
    )
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
