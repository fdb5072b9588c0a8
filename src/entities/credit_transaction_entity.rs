use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::{to_value, Thing, Value};

use crate::database::client::Db;
use crate::entities::user_entity;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::utils::db_utils::{
    get_entity_list_view, IdentIdName, Pagination, QryBindingsVal, QryOrder, ViewFieldSelector,
};

/// One ledger leg. Every credit movement writes two rows sharing a
/// tx_ident - an amount_out leg for the paying side and an amount_in leg for
/// the receiving side - in the same transaction that mutates the balances.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreditTransactionView {
    pub id: Thing,
    pub with_user: Thing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<Thing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_out: Option<i64>,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

impl ViewFieldSelector for CreditTransactionView {
    fn get_select_query_fields() -> String {
        "id, with_user, booking, title, amount_in, amount_out, balance, created_at".to_string()
    }
}

pub struct CreditTransactionDbService<'a> {
    pub db: &'a Db,
    pub ctx: &'a Ctx,
}

pub const TABLE_NAME: &str = "credit_transaction";
const USER_TABLE: &str = user_entity::TABLE_NAME;

impl<'a> CreditTransactionDbService<'a> {
    pub async fn mutate_db(&self) -> Result<(), AppError> {
        let sql = format!("
    DEFINE TABLE IF NOT EXISTS {TABLE_NAME} SCHEMAFULL;
    DEFINE FIELD IF NOT EXISTS user ON TABLE {TABLE_NAME} TYPE record<{USER_TABLE}>;
    DEFINE INDEX IF NOT EXISTS user_idx ON TABLE {TABLE_NAME} COLUMNS user;
    DEFINE FIELD IF NOT EXISTS with_user ON TABLE {TABLE_NAME} TYPE record<{USER_TABLE}>;
    DEFINE FIELD IF NOT EXISTS booking ON TABLE {TABLE_NAME} TYPE option<record<booking>>;
    DEFINE FIELD IF NOT EXISTS tx_ident ON TABLE {TABLE_NAME} TYPE string;
    DEFINE FIELD IF NOT EXISTS title ON TABLE {TABLE_NAME} TYPE option<string>;
    DEFINE FIELD IF NOT EXISTS amount_in ON TABLE {TABLE_NAME} TYPE option<number>;
    DEFINE FIELD IF NOT EXISTS amount_out ON TABLE {TABLE_NAME} TYPE option<number>;
    DEFINE FIELD IF NOT EXISTS balance ON TABLE {TABLE_NAME} TYPE number;
    DEFINE FIELD IF NOT EXISTS created_at ON TABLE {TABLE_NAME} TYPE datetime DEFAULT time::now() VALUE $before OR time::now();
    DEFINE INDEX IF NOT EXISTS created_at_idx ON TABLE {TABLE_NAME} COLUMNS created_at;
    ");
        let mutation = self.db.query(sql).await?;
        mutation.check().expect("should mutate credit_transaction");

        Ok(())
    }

    /// Development/test helper - credits appear out of thin air, so the
    /// second leg points back at the same user.
    pub async fn endow(&self, user_id: &Thing, amount: i64) -> CtxResult<()> {
        if amount <= 0 {
            return Err(self.ctx.to_ctx_error(AppError::Validation {
                source: "endow amount must be positive".to_string(),
            }));
        }
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $u = SELECT * FROM ONLY $user_id;
            IF $u == NONE {{ THROW \"User not found\"; }};
            LET $new_balance = ($u.credits || 0) + $amt;
            UPDATE $u.id SET credits = $new_balance;
            CREATE {TABLE_NAME} SET user = $u.id, with_user = $u.id, tx_ident = rand::ulid(), title = 'Endowment', amount_in = $amt, balance = $new_balance;
            COMMIT TRANSACTION;"
        );
        let mut bindings: HashMap<String, Value> = HashMap::new();
        bindings.insert(
            "user_id".to_string(),
            to_value(user_id.clone()).map_err(|e| AppError::SurrealDb {
                source: e.to_string(),
            })?,
        );
        bindings.insert(
            "amt".to_string(),
            to_value(amount).map_err(|e| AppError::SurrealDb {
                source: e.to_string(),
            })?,
        );
        let res = QryBindingsVal::new(qry, bindings).into_query(self.db).await?;
        res.check().map_err(|e| {
            let err_str = e.to_string();
            if err_str.contains("User not found") {
                self.ctx.to_ctx_error(AppError::EntityFailIdNotFound {
                    ident: user_id.to_raw(),
                })
            } else {
                self.ctx
                    .to_ctx_error(AppError::SurrealDb { source: err_str })
            }
        })?;
        Ok(())
    }

    pub async fn user_history(
        &self,
        user_id: &Thing,
        pagination: Option<Pagination>,
    ) -> CtxResult<Vec<CreditTransactionView>> {
        let pagination = pagination.unwrap_or(Pagination {
            order_by: Some("created_at".to_string()),
            order_dir: Some(QryOrder::DESC),
            count: 50,
            start: 0,
        });
        get_entity_list_view::<CreditTransactionView>(
            self.db,
            TABLE_NAME.to_string(),
            &IdentIdName::ColumnIdent {
                column: "user".to_string(),
                val: user_id.to_raw(),
                rec: true,
            },
            Some(pagination),
        )
        .await
    }
}
