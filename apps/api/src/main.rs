//! Ephemera API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod client_ip;
mod dto;
mod error;
mod handlers;
mod state;

use std::net::SocketAddr;

use ephemera_core::AppError;
use tracing::info;

use crate::api_config::{ApiConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;
    let app_state = api_services::build_app_state(&config)?;
    let app = api_router::build_router(app_state);

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(
        %address,
        region = %config.aws_region,
        chat_provider = ?config.chat_provider,
        missing_output_policy = ?config.missing_output_policy,
        "ephemera-api listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
