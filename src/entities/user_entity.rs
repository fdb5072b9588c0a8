use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::database::client::Db;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::AppError::EntityFailIdNotFound;
use crate::middleware::error::{AppError, CtxError, CtxResult};
use crate::middleware::utils::db_utils::{
    exists_entity, get_entity, get_entity_view, with_not_found_err, IdentIdName, ViewFieldSelector,
};
use crate::middleware::utils::string_utils::get_string_thing;

/// Marketplace account. The credit balance, rating and the counters are
/// owned by coordinator transactions - no route writes them directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub username: String,
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub credits: i64,
    pub rating: f64,
    pub total_ratings: i64,
    pub completed_tasks: i64,
    pub tasks_created: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct UserCreate {
    pub username: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub skills: Vec<String>,
    pub credits: i64,
}

/// Public profile - safe to return from any route.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserView {
    pub id: Thing,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub rating: f64,
    pub total_ratings: i64,
    pub completed_tasks: i64,
    pub tasks_created: i64,
}

impl ViewFieldSelector for UserView {
    fn get_select_query_fields() -> String {
        "id, username, full_name, skills, rating, total_ratings, completed_tasks, tasks_created"
            .to_string()
    }
}

pub struct UserDbService<'a> {
    pub db: &'a Db,
    pub ctx: &'a Ctx,
}

pub const TABLE_NAME: &str = "app_user";

impl<'a> UserDbService<'a> {
    pub fn get_table_name() -> &'static str {
        TABLE_NAME
    }

    pub async fn mutate_db(&self) -> Result<(), AppError> {
        let sql = format!("
    DEFINE TABLE IF NOT EXISTS {TABLE_NAME} SCHEMAFULL;
    DEFINE FIELD IF NOT EXISTS username ON TABLE {TABLE_NAME} TYPE string VALUE string::lowercase($value) ASSERT string::len(string::trim($value))>2;
    DEFINE FIELD IF NOT EXISTS password_hash ON TABLE {TABLE_NAME} TYPE string;
    DEFINE FIELD IF NOT EXISTS full_name ON TABLE {TABLE_NAME} TYPE option<string>;
    DEFINE FIELD IF NOT EXISTS skills ON TABLE {TABLE_NAME} TYPE set<string> DEFAULT [];
    DEFINE FIELD IF NOT EXISTS credits ON TABLE {TABLE_NAME} TYPE number DEFAULT 0;
    DEFINE FIELD IF NOT EXISTS rating ON TABLE {TABLE_NAME} TYPE number DEFAULT 0 ASSERT $value >= 0 AND $value <= 5;
    DEFINE FIELD IF NOT EXISTS total_ratings ON TABLE {TABLE_NAME} TYPE number DEFAULT 0;
    DEFINE FIELD IF NOT EXISTS completed_tasks ON TABLE {TABLE_NAME} TYPE number DEFAULT 0;
    DEFINE FIELD IF NOT EXISTS tasks_created ON TABLE {TABLE_NAME} TYPE number DEFAULT 0;
    DEFINE FIELD IF NOT EXISTS created_at ON TABLE {TABLE_NAME} TYPE datetime DEFAULT time::now() VALUE $before OR time::now();
    DEFINE INDEX IF NOT EXISTS {TABLE_NAME}_username_idx ON TABLE {TABLE_NAME} COLUMNS username UNIQUE;
    ");
        let mutation = self.db.query(sql).await?;
        mutation.check().expect("should mutate app_user");

        Ok(())
    }

    pub async fn create(&self, record: UserCreate) -> CtxResult<User> {
        self.db
            .create(TABLE_NAME)
            .content(record)
            .await
            .map_err(|e| {
                let err_str = e.to_string();
                if err_str.contains("already contains") {
                    self.ctx.to_ctx_error(AppError::RegisterFail {
                        description: "Username already taken".to_string(),
                    })
                } else {
                    self.ctx.to_ctx_error(AppError::SurrealDb { source: err_str })
                }
            })
            .map(|v: Option<User>| v.expect("created user"))
    }

    pub async fn get(&self, ident: IdentIdName) -> CtxResult<User> {
        let opt = get_entity::<User>(self.db, TABLE_NAME.to_string(), &ident).await?;
        with_not_found_err(opt, self.ctx, ident.to_string().as_str())
    }

    pub async fn get_view<T: for<'b> Deserialize<'b> + ViewFieldSelector>(
        &self,
        ident: IdentIdName,
    ) -> CtxResult<T> {
        let opt = get_entity_view::<T>(self.db, TABLE_NAME.to_string(), &ident).await?;
        with_not_found_err(opt, self.ctx, ident.to_string().as_str())
    }

    pub async fn get_by_username(&self, username: &str) -> CtxResult<User> {
        self.get(IdentIdName::ColumnIdent {
            column: "username".to_string(),
            val: username.to_lowercase(),
            rec: false,
        })
        .await
    }

    pub async fn exists(&self, ident: IdentIdName) -> CtxResult<Option<String>> {
        exists_entity(self.db, TABLE_NAME.to_string(), &ident)
            .await
            .map(|r| r.map(|o| o.to_raw()))
    }

    pub async fn get_ctx_user(&self) -> CtxResult<User> {
        let created_by = self.ctx.user_id()?;
        let user_id = get_string_thing(created_by).map_err(CtxError::from(self.ctx))?;
        self.get(IdentIdName::Id(user_id)).await
    }

    pub async fn get_ctx_user_thing(&self) -> CtxResult<Thing> {
        let created_by = self.ctx.user_id()?;
        let user_id = get_string_thing(created_by.clone()).map_err(CtxError::from(self.ctx))?;
        let existing_id = self.exists(IdentIdName::Id(user_id.clone())).await?;
        match existing_id {
            None => Err(self
                .ctx
                .to_ctx_error(EntityFailIdNotFound { ident: created_by })),
            Some(_) => Ok(user_id),
        }
    }
}
