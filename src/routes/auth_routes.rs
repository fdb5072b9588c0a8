use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tower_cookies::{Cookie, Cookies};

use crate::middleware::ctx::Ctx;
use crate::middleware::error::CtxResult;
use crate::middleware::mw_ctx::{CtxState, JWT_KEY};
use crate::middleware::utils::extractor_utils::JsonOrFormValidated;
use crate::routes::users::CurrentUserView;
use crate::services::auth_service::{AuthLoginInput, AuthRegisterInput, AuthService};

pub fn routes() -> Router<Arc<CtxState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
}

async fn register(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    cookies: Cookies,
    JsonOrFormValidated(input): JsonOrFormValidated<AuthRegisterInput>,
) -> CtxResult<Json<CurrentUserView>> {
    let auth_service = AuthService::new(
        &state.db.client,
        &ctx,
        &state.jwt,
        state.starting_credits,
    );

    let (user, token) = auth_service.register(input).await?;
    add_jwt_cookie(&cookies, token);

    Ok(Json(CurrentUserView::from(user)))
}

async fn login(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    cookies: Cookies,
    JsonOrFormValidated(input): JsonOrFormValidated<AuthLoginInput>,
) -> CtxResult<Json<CurrentUserView>> {
    let auth_service = AuthService::new(
        &state.db.client,
        &ctx,
        &state.jwt,
        state.starting_credits,
    );

    let (user, token) = auth_service.login(input).await?;
    add_jwt_cookie(&cookies, token);

    Ok(Json(CurrentUserView::from(user)))
}

async fn logout(cookies: Cookies) -> CtxResult<()> {
    cookies.remove(Cookie::build((JWT_KEY, "")).path("/").into());
    Ok(())
}

fn add_jwt_cookie(cookies: &Cookies, token: String) {
    cookies.add(
        Cookie::build((JWT_KEY, token))
            // path must cover the whole api, not the login route only
            .path("/")
            .http_only(true)
            .into(),
    );
}
