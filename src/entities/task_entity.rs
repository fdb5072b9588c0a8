use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use surrealdb::sql::{to_value, Id, Thing, Value};

use crate::database::client::Db;
use crate::entities::user_entity;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::utils::db_utils::{
    get_entity, get_entity_list_view, get_entity_view, with_not_found_err, IdentIdName, Pagination,
    QryBindingsVal, ViewFieldSelector,
};

pub const THROW_TASK_NOT_OPEN: &str = "Task is not open for applications";
pub const THROW_TASK_NOT_ACCEPTING: &str = "Task is not accepting applications";
pub const THROW_TASK_TERMINAL: &str = "Task is already completed or cancelled";
pub const THROW_TASK_NOT_DELETABLE: &str = "Only open tasks can be deleted";

#[derive(Display, EnumString, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    Open,
    InReview,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub from_user: Thing,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub skills_required: Vec<String>,
    pub offer_credits: i64,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_helper: Option<Thing>,
    pub max_applications: i64,
    pub accepts_applications: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Pure application predicate. Skill mismatch is deliberately not part
    /// of this check - it only produces a soft warning (see skills_missing).
    pub fn can_user_apply(&self, user_id: &Thing, active_applications: i64) -> bool {
        self.status == TaskStatus::Open
            && self.accepts_applications
            && &self.from_user != user_id
            && active_applications < self.max_applications
    }

    pub fn skills_missing(&self, user_skills: &[String]) -> Vec<String> {
        self.skills_required
            .iter()
            .filter(|required| !user_skills.contains(required))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct TaskCreate {
    pub from_user: Thing,
    pub title: String,
    pub description: String,
    pub skills_required: Vec<String>,
    pub offer_credits: i64,
    pub status: TaskStatus,
    pub max_applications: i64,
    pub accepts_applications: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
}

pub struct TaskDbService<'a> {
    pub db: &'a Db,
    pub ctx: &'a Ctx,
}

pub const TABLE_NAME: &str = "task";
const TABLE_COL_USER: &str = user_entity::TABLE_NAME;

impl<'a> TaskDbService<'a> {
    pub fn get_table_name() -> &'static str {
        TABLE_NAME
    }

    pub async fn mutate_db(&self) -> Result<(), AppError> {
        let sql = format!("
    DEFINE TABLE IF NOT EXISTS {TABLE_NAME} SCHEMAFULL;
    DEFINE FIELD IF NOT EXISTS from_user ON TABLE {TABLE_NAME} TYPE record<{TABLE_COL_USER}>;
    DEFINE INDEX IF NOT EXISTS from_user_idx ON TABLE {TABLE_NAME} COLUMNS from_user;
    DEFINE FIELD IF NOT EXISTS title ON TABLE {TABLE_NAME} TYPE string ASSERT string::len(string::trim($value))>0;
    DEFINE FIELD IF NOT EXISTS description ON TABLE {TABLE_NAME} TYPE string ASSERT string::len(string::trim($value))>0;
    DEFINE FIELD IF NOT EXISTS skills_required ON TABLE {TABLE_NAME} TYPE set<string> DEFAULT [];
    DEFINE FIELD IF NOT EXISTS offer_credits ON TABLE {TABLE_NAME} TYPE number ASSERT $value >= 1;
    DEFINE FIELD IF NOT EXISTS status ON TABLE {TABLE_NAME} TYPE string ASSERT $value INSIDE ['Open','InReview','Assigned','InProgress','Completed','Cancelled'];
    DEFINE INDEX IF NOT EXISTS status_idx ON TABLE {TABLE_NAME} COLUMNS status;
    DEFINE FIELD IF NOT EXISTS selected_helper ON TABLE {TABLE_NAME} TYPE option<record<{TABLE_COL_USER}>>;
    DEFINE FIELD IF NOT EXISTS max_applications ON TABLE {TABLE_NAME} TYPE number ASSERT $value >= 1;
    DEFINE FIELD IF NOT EXISTS accepts_applications ON TABLE {TABLE_NAME} TYPE bool DEFAULT true;
    DEFINE FIELD IF NOT EXISTS scheduled_at ON TABLE {TABLE_NAME} TYPE option<datetime>;
    DEFINE FIELD IF NOT EXISTS duration_minutes ON TABLE {TABLE_NAME} TYPE option<number>;
    DEFINE FIELD IF NOT EXISTS created_at ON TABLE {TABLE_NAME} TYPE datetime DEFAULT time::now() VALUE $before OR time::now();
    ");
        let mutation = self.db.query(sql).await?;
        mutation.check().expect("should mutate task");

        Ok(())
    }

    pub fn generate_id() -> Thing {
        Thing::from((TABLE_NAME, Id::rand()))
    }

    /// Creating a task also bumps the owner's tasks_created counter - the
    /// counter lives with the collection write, not in a separate hook.
    pub async fn create(&self, record: TaskCreate) -> CtxResult<Task> {
        let task_id = Self::generate_id();
        let owner = record.from_user.clone();
        let qry = "BEGIN TRANSACTION;
            CREATE $task_id CONTENT $data;
            UPDATE $owner SET tasks_created += 1;
            COMMIT TRANSACTION;"
            .to_string();
        let mut bindings: HashMap<String, Value> = HashMap::new();
        bindings.insert("task_id".to_string(), to_sql_value(task_id.clone(), self.ctx)?);
        bindings.insert("data".to_string(), to_sql_value(record, self.ctx)?);
        bindings.insert("owner".to_string(), to_sql_value(owner, self.ctx)?);

        let res = QryBindingsVal::new(qry, bindings)
            .into_query(self.db)
            .await?;
        res.check()
            .map_err(|e| self.ctx.to_ctx_error(map_task_tx_error(e)))?;
        self.get(IdentIdName::Id(task_id)).await
    }

    pub async fn get(&self, ident: IdentIdName) -> CtxResult<Task> {
        let opt = get_entity::<Task>(self.db, TABLE_NAME.to_string(), &ident).await?;
        with_not_found_err(opt, self.ctx, ident.to_string().as_str())
    }

    pub async fn get_view<T: for<'b> Deserialize<'b> + ViewFieldSelector>(
        &self,
        ident: IdentIdName,
    ) -> CtxResult<T> {
        let opt = get_entity_view::<T>(self.db, TABLE_NAME.to_string(), &ident).await?;
        with_not_found_err(opt, self.ctx, ident.to_string().as_str())
    }

    pub async fn list_open<T: for<'b> Deserialize<'b> + ViewFieldSelector>(
        &self,
        pagination: Option<Pagination>,
    ) -> CtxResult<Vec<T>> {
        get_entity_list_view::<T>(
            self.db,
            TABLE_NAME.to_string(),
            &IdentIdName::ColumnIdent {
                column: "status".to_string(),
                val: TaskStatus::Open.to_string(),
                rec: false,
            },
            pagination,
        )
        .await
    }

    pub async fn get_by_creator<T: for<'b> Deserialize<'b> + ViewFieldSelector>(
        &self,
        user: Thing,
        pagination: Option<Pagination>,
    ) -> CtxResult<Vec<T>> {
        get_entity_list_view::<T>(
            self.db,
            TABLE_NAME.to_string(),
            &IdentIdName::ColumnIdent {
                column: "from_user".to_string(),
                val: user.to_raw(),
                rec: true,
            },
            pagination,
        )
        .await
    }

    pub async fn set_in_review(&self, task_id: &Thing) -> CtxResult<()> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $t = SELECT * FROM ONLY $task_id;
            IF $t.status != 'Open' {{ THROW \"{THROW_TASK_NOT_OPEN}\"; }};
            UPDATE $t.id SET status = 'InReview';
            COMMIT TRANSACTION;"
        );
        self.run_guarded(qry, task_id).await
    }

    /// Idempotent guard against double cancel - a second call fails because
    /// the task is already terminal.
    pub async fn cancel(&self, task_id: &Thing) -> CtxResult<()> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $t = SELECT * FROM ONLY $task_id;
            IF $t.status INSIDE ['Completed','Cancelled'] {{ THROW \"{THROW_TASK_TERMINAL}\"; }};
            UPDATE $t.id SET status = 'Cancelled', accepts_applications = false;
            COMMIT TRANSACTION;"
        );
        self.run_guarded(qry, task_id).await
    }

    /// Hard delete, permitted only while the task is still open; pending
    /// applications go with it.
    pub async fn delete(&self, task_id: &Thing) -> CtxResult<()> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $t = SELECT * FROM ONLY $task_id;
            IF $t.status != 'Open' {{ THROW \"{THROW_TASK_NOT_DELETABLE}\"; }};
            DELETE application WHERE task = $t.id;
            DELETE $t.id;
            COMMIT TRANSACTION;"
        );
        self.run_guarded(qry, task_id).await
    }

    async fn run_guarded(&self, qry: String, task_id: &Thing) -> CtxResult<()> {
        let mut bindings: HashMap<String, Value> = HashMap::new();
        bindings.insert("task_id".to_string(), to_sql_value(task_id.clone(), self.ctx)?);
        let res = QryBindingsVal::new(qry, bindings)
            .into_query(self.db)
            .await?;
        res.check()
            .map_err(|e| self.ctx.to_ctx_error(map_task_tx_error(e)))?;
        Ok(())
    }
}

pub(crate) fn to_sql_value<T: Serialize + 'static>(value: T, ctx: &Ctx) -> CtxResult<Value> {
    to_value(value).map_err(|e| {
        ctx.to_ctx_error(AppError::SurrealDb {
            source: e.to_string(),
        })
    })
}

pub(crate) fn map_task_tx_error(e: surrealdb::Error) -> AppError {
    let err_str = e.to_string();
    for thrown in [
        THROW_TASK_NOT_OPEN,
        THROW_TASK_NOT_ACCEPTING,
        THROW_TASK_TERMINAL,
        THROW_TASK_NOT_DELETABLE,
    ] {
        if err_str.contains(thrown) {
            return AppError::InvalidState {
                description: thrown.to_string(),
            };
        }
    }
    AppError::SurrealDb { source: err_str }
}
