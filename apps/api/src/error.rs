use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ephemera_core::AppError;
use serde::Serialize;

/// API error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    message: String,
}

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            AppError::Unauthorized(_) => (StatusCode::FORBIDDEN, "Verification failed.".to_owned()),
            AppError::Configuration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal configuration error.".to_owned(),
            ),
            AppError::Validation(_) | AppError::UnknownTarget(_) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, self.0.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            AppError::Engine { .. }
            | AppError::MissingOutput(_)
            | AppError::SchedulerRegistration(_)
            | AppError::Delivery(_)
            | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error during provisioning.".to_owned(),
            ),
        };

        (status, Json(ErrorResponse { message })).into_response()
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use ephemera_core::AppError;

    use super::ApiError;

    #[test]
    fn signature_failures_map_to_forbidden() {
        let response = ApiError(AppError::Unauthorized("bad signature".to_owned())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn configuration_failures_map_to_internal_error() {
        let response = ApiError(AppError::Configuration("missing".to_owned())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validation_failures_map_to_bad_request() {
        let response = ApiError(AppError::Validation("bad duration".to_owned())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
