use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use phonebook_core::PhonebookError;
use serde::Serialize;
use tracing::{error, warn};

pub(crate) const MISSING_FIELDS: &str = "name and number are required";
pub(crate) const INTERNAL_ERROR: &str = "internal server error";

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    error: ServiceErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceErrorPayload {
    code: &'static str,
    message: String,
}

/// An error on its way to becoming an HTTP response.
#[derive(Debug, Clone)]
pub(crate) struct ServiceFailure {
    pub(crate) status: StatusCode,
    pub(crate) code: &'static str,
    pub(crate) message: String,
}

impl ServiceFailure {
    pub(crate) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }

    pub(crate) fn invalid_json(rejection: &JsonRejection) -> Self {
        Self::new(rejection.status(), "invalid_json", rejection.body_text())
    }

    pub(crate) fn missing_fields() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_error", MISSING_FIELDS)
    }

    pub(crate) fn unknown_endpoint() -> Self {
        Self::new(StatusCode::NOT_FOUND, "unknown_endpoint", "unknown endpoint")
    }

    pub(crate) fn internal(detail: &str) -> Self {
        error!(detail, "internal failure");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", INTERNAL_ERROR)
    }
}

impl From<PhonebookError> for ServiceFailure {
    fn from(err: PhonebookError) -> Self {
        match err {
            PhonebookError::MalformedId(_) => {
                Self::new(StatusCode::BAD_REQUEST, "malformatted_id", "malformatted id")
            }
            PhonebookError::Validation(message) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_error", message)
            }
            PhonebookError::NotFound(_) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", "person not found")
            }
            PhonebookError::DuplicateName(_) => {
                Self::new(StatusCode::BAD_REQUEST, "duplicate_name", "name must be unique")
            }
            PhonebookError::Storage(detail) => Self::internal(&detail),
        }
    }
}

impl IntoResponse for ServiceFailure {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            warn!(
                status = self.status.as_u16(),
                code = self.code,
                message = %self.message,
                "request rejected"
            );
        }
        let payload = ServiceError {
            error: ServiceErrorPayload { code: self.code, message: self.message },
        };
        (self.status, Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phonebook_core::ContactId;

    #[test]
    fn phonebook_errors_map_to_documented_statuses() {
        let cases = [
            (
                PhonebookError::MalformedId("x".to_string()),
                StatusCode::BAD_REQUEST,
                "malformatted_id",
            ),
            (
                PhonebookError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
                "validation_error",
            ),
            (PhonebookError::NotFound(ContactId::generate()), StatusCode::NOT_FOUND, "not_found"),
            (
                PhonebookError::DuplicateName("Ada".to_string()),
                StatusCode::BAD_REQUEST,
                "duplicate_name",
            ),
            (
                PhonebookError::Storage("disk I/O error".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
        ];
        for (err, status, code) in cases {
            let failure = ServiceFailure::from(err);
            assert_eq!(failure.status, status);
            assert_eq!(failure.code, code);
        }
    }

    #[test]
    fn storage_detail_never_reaches_the_client_message() {
        let failure =
            ServiceFailure::from(PhonebookError::Storage("database is locked".to_string()));
        assert_eq!(failure.message, INTERNAL_ERROR);
    }

    #[test]
    fn validation_message_is_passed_through() {
        let failure = ServiceFailure::from(PhonebookError::Validation(
            phonebook_core::NUMBER_BAD_FORMAT.to_string(),
        ));
        assert_eq!(failure.message, phonebook_core::NUMBER_BAD_FORMAT);
    }
}
