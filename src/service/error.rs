use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::HttpError,
    models::cashbackmodel::CashbackStatus,
    service::stripe_client::StripeError,
};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Cashback request {0} not found")]
    CashbackRequestNotFound(Uuid),

    #[error("Insufficient points balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Cashback request {0} has already been processed ({status})", status = .1.to_str())]
    AlreadyProcessed(Uuid, CashbackStatus),

    #[error("Admin access required")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stripe error: {0}")]
    Stripe(String),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::UserNotFound(_) | ServiceError::CashbackRequestNotFound(_) => "NOT_FOUND",
            ServiceError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::AlreadyProcessed(_, _) => "ALREADY_PROCESSED",
            ServiceError::Forbidden => "FORBIDDEN",
            ServiceError::Database(_) => "INTERNAL",
            ServiceError::Stripe(_) => "UPSTREAM",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::UserNotFound(_) | ServiceError::CashbackRequestNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InsufficientBalance { .. } | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::AlreadyProcessed(_, _) => StatusCode::CONFLICT,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Stripe(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<StripeError> for ServiceError {
    fn from(error: StripeError) -> Self {
        ServiceError::Stripe(error.to_string())
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let message = match &error {
            ServiceError::Database(e) => {
                tracing::error!(error = %e, "database error");
                "Internal server error".to_string()
            }
            _ => error.to_string(),
        };

        HttpError::new(message, error.status_code()).with_code(error.code())
    }
}
