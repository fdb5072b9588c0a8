use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::entities::credit_transaction_entity::CreditTransactionDbService;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::mw_ctx::CtxState;
use crate::middleware::utils::string_utils::get_string_thing;

/// Development/test-only helpers. The endow endpoint seeds a user's credit
/// balance so lifecycle flows can be exercised without a payment gateway.
pub fn routes() -> Router<Arc<CtxState>> {
    Router::new().route("/test/api/endow/:user_id/:amount", get(endow_user))
}

async fn endow_user(
    State(state): State<Arc<CtxState>>,
    ctx: Ctx,
    Path((user_id, amount)): Path<(String, i64)>,
) -> CtxResult<Json<Value>> {
    if !state.is_development {
        return Err(ctx.to_ctx_error(AppError::Forbidden));
    }

    let user_thing = get_string_thing(user_id).map_err(|e| ctx.to_ctx_error(e))?;
    CreditTransactionDbService {
        db: &state.db.client,
        ctx: &ctx,
    }
    .endow(&user_thing, amount)
    .await?;

    Ok(Json(json!({ "endowed": amount })))
}
