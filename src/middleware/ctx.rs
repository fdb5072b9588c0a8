use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use surrealdb::sql::Thing;
use uuid::Uuid;

use crate::middleware::error::{AppError, AppResult, CtxError, CtxResult};
use crate::middleware::utils::string_utils::get_string_thing;

#[derive(Clone, Debug)]
pub struct Ctx {
    result_user_id: AppResult<String>,
    req_id: Uuid,
}

impl Ctx {
    pub fn new(result_user_id: AppResult<String>, req_id: Uuid) -> Self {
        Self {
            result_user_id,
            req_id,
        }
    }

    pub fn user_id(&self) -> CtxResult<String> {
        self.result_user_id.clone().map_err(|error| CtxError {
            error,
            req_id: self.req_id,
        })
    }

    pub fn user_thing(&self) -> CtxResult<Thing> {
        let user_id = self.user_id()?;
        get_string_thing(user_id).map_err(|error| CtxError {
            error,
            req_id: self.req_id,
        })
    }

    pub fn req_id(&self) -> Uuid {
        self.req_id
    }

    pub fn to_ctx_error(&self, error: AppError) -> CtxError {
        CtxError {
            req_id: self.req_id,
            error,
        }
    }
}

// Extractor - makes it possible to specify Ctx as a handler param - fetches
// the value the auth middleware stored in the request extensions.
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Ctx {
    type Rejection = CtxError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> CtxResult<Self> {
        parts.extensions.get::<Ctx>().cloned().ok_or(CtxError {
            req_id: Uuid::new_v4(),
            error: AppError::AuthFailCtxNotInRequestExt,
        })
    }
}
