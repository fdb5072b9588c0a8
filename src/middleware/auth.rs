use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, AppResult};
use crate::middleware::mw_ctx::{CtxState, JWT_KEY};

/// Resolves the request user from the jwt cookie and stores a Ctx extension.
/// Handlers decide themselves whether an anonymous Ctx is acceptable by
/// calling ctx.user_id().
pub async fn mw_ctx_constructor(
    State(state): State<Arc<CtxState>>,
    cookies: Cookies,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let result_user_id: AppResult<String> = extract_token(&state, &cookies);

    let ctx = Ctx::new(result_user_id, Uuid::new_v4());
    req.extensions_mut().insert(ctx);

    next.run(req).await
}

fn extract_token(state: &CtxState, cookies: &Cookies) -> AppResult<String> {
    let cookie = cookies.get(JWT_KEY).ok_or(AppError::AuthFailNoJwtCookie)?;
    let claims = state
        .jwt
        .decode(cookie.value())
        .map_err(|source| AppError::AuthFailJwtInvalid { source })?;
    Ok(claims.auth)
}
