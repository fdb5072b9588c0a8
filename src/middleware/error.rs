use std::fmt;

use axum::{http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::ctx::Ctx;

#[derive(Debug, Clone)]
pub struct CtxError {
    pub error: AppError,
    pub req_id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppError {
    Generic { description: String },
    Validation { source: String },
    AuthenticationFail,
    RegisterFail { description: String },
    Forbidden,
    EntityFailIdNotFound { ident: String },
    AuthFailNoJwtCookie,
    AuthFailJwtInvalid { source: String },
    AuthFailCtxNotInRequestExt,
    ApplicationAlreadyExists,
    ApplicationAlreadyProcessed,
    BookingAlreadyReviewed,
    InvalidState { description: String },
    CreditsTooLow,
    Serde { source: String },
    SurrealDb { source: String },
    SurrealDbNoResult { source: String, id: String },
}

/// CtxError carries the req_id to report to the client and implements IntoResponse.
pub type CtxResult<T> = core::result::Result<T, CtxError>;
/// Any error for storing before composing a response.
pub type AppResult<T> = core::result::Result<T, AppError>;

impl std::error::Error for AppError {}

// for slightly less verbose error mappings
impl CtxError {
    pub fn from<T: Into<AppError>>(ctx: &Ctx) -> impl FnOnce(T) -> CtxError + '_ {
        |err| CtxError {
            req_id: ctx.req_id(),
            error: err.into(),
        }
    }
}

impl From<surrealdb::Error> for CtxError {
    fn from(value: surrealdb::Error) -> Self {
        CtxError {
            req_id: Uuid::new_v4(),
            error: value.into(),
        }
    }
}

impl From<AppError> for CtxError {
    fn from(value: AppError) -> Self {
        CtxError {
            req_id: Uuid::new_v4(),
            error: value,
        }
    }
}

const INTERNAL: &str = "Internal error";

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic { description } => write!(f, "{description}"),
            Self::Validation { source } => write!(f, "{source}"),
            Self::AuthenticationFail => write!(f, "Authentication failed"),
            Self::RegisterFail { description } => write!(f, "{description}"),
            Self::Forbidden => write!(f, "Not authorized"),
            Self::EntityFailIdNotFound { ident } => write!(f, "Record id={ident} not found"),
            Self::AuthFailNoJwtCookie => write!(f, "You are not logged in"),
            Self::AuthFailJwtInvalid { .. } => write!(f, "The provided JWT token is not valid"),
            Self::AuthFailCtxNotInRequestExt => write!(f, "{INTERNAL}"),
            Self::ApplicationAlreadyExists => {
                write!(f, "You already applied to this task")
            }
            Self::ApplicationAlreadyProcessed => write!(f, "Application already processed"),
            Self::BookingAlreadyReviewed => write!(f, "Review already submitted for this side"),
            Self::InvalidState { description } => write!(f, "{description}"),
            Self::CreditsTooLow => write!(f, "Not enough credits"),
            Self::Serde { source } => write!(f, "Serde error - {source}"),
            Self::SurrealDb { .. } => write!(f, "{INTERNAL}"),
            Self::SurrealDbNoResult { id, .. } => write!(f, "No result for id {id}"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponseBody {
    error: String,
    req_id: String,
}

impl ErrorResponseBody {
    pub fn new(error: String, req_id: Option<String>) -> Self {
        ErrorResponseBody {
            error,
            req_id: req_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }

    pub fn get_err(&self) -> String {
        self.error.clone()
    }
}

impl From<ErrorResponseBody> for String {
    fn from(value: ErrorResponseBody) -> Self {
        serde_json::to_string(&value).unwrap_or_else(|_| "{\"error\":\"Internal error\"}".into())
    }
}

// REST error response
impl IntoResponse for CtxError {
    fn into_response(self) -> axum::response::Response {
        tracing::debug!("into_response - {self:?}");
        let status_code = match self.error {
            AppError::EntityFailIdNotFound { .. } | AppError::SurrealDbNoResult { .. } => {
                StatusCode::NOT_FOUND
            }
            AppError::ApplicationAlreadyExists
            | AppError::ApplicationAlreadyProcessed
            | AppError::BookingAlreadyReviewed => StatusCode::CONFLICT,
            AppError::Validation { .. }
            | AppError::InvalidState { .. }
            | AppError::CreditsTooLow
            | AppError::Serde { .. }
            | AppError::Generic { .. }
            | AppError::RegisterFail { .. }
            | AppError::SurrealDb { .. } => StatusCode::BAD_REQUEST,
            AppError::AuthenticationFail
            | AppError::AuthFailNoJwtCookie
            | AppError::AuthFailJwtInvalid { .. }
            | AppError::Forbidden
            | AppError::AuthFailCtxNotInRequestExt => StatusCode::FORBIDDEN,
        };
        let err = self.error.clone();
        let body: String =
            ErrorResponseBody::new(self.error.to_string(), Some(self.req_id.to_string())).into();
        let mut response = (status_code, body).into_response();
        // Insert the real Error into the response - for the logger
        response.extensions_mut().insert(err);
        response
    }
}

// External Errors
impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde {
            source: value.to_string(),
        }
    }
}

impl From<surrealdb::Error> for AppError {
    fn from(value: surrealdb::Error) -> Self {
        Self::SurrealDb {
            source: value.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(value: validator::ValidationErrors) -> Self {
        Self::Validation {
            source: value.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for CtxError {
    fn from(value: validator::ValidationErrors) -> Self {
        CtxError {
            req_id: Uuid::new_v4(),
            error: value.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        Self::AuthFailJwtInvalid {
            source: value.to_string(),
        }
    }
}

impl From<CtxError> for AppError {
    fn from(value: CtxError) -> Self {
        value.error
    }
}
