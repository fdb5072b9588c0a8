use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use surrealdb::sql::{Id, Thing, Value};

use crate::database::client::Db;
use crate::entities::booking_entity;
use crate::entities::task_entity::{
    self, map_task_tx_error, to_sql_value, THROW_TASK_NOT_ACCEPTING, THROW_TASK_NOT_OPEN,
};
use crate::entities::user_entity;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::utils::db_utils::{
    get_entity, get_entity_list_view, get_entity_view, with_not_found_err, IdentIdName, Pagination,
    QryBindingsVal, ViewFieldSelector,
};

pub const THROW_APPLICATION_PROCESSED: &str = "Application already processed";
pub const THROW_OWN_TASK: &str = "Can not apply to own task";
pub const THROW_APPLICATIONS_FULL: &str = "Task application limit reached";

#[derive(Display, EnumString, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApplicationStatus {
    Pending,
    Interviewed,
    Accepted,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    /// Pending and Interviewed are the only states the provider may still
    /// respond to; everything else is terminal.
    pub fn is_respondable(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Pending | ApplicationStatus::Interviewed
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Application {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub task: Thing,
    pub applicant: Thing,
    pub task_provider: Thing,
    pub proposal: String,
    pub proposed_credits: i64,
    pub status: ApplicationStatus,
    pub match_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreed_credits: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_txt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplicationView {
    pub id: Thing,
    pub task: Thing,
    pub applicant: user_entity::UserView,
    pub proposal: String,
    pub proposed_credits: i64,
    pub status: ApplicationStatus,
    pub match_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_txt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ViewFieldSelector for ApplicationView {
    fn get_select_query_fields() -> String {
        "id, task, applicant.{id, username, full_name, skills, rating, total_ratings, completed_tasks, tasks_created} as applicant, proposal, proposed_credits, status, match_score, response_txt, responded_at, created_at"
            .to_string()
    }
}

#[derive(Debug)]
pub struct ApplicationCreate {
    pub task: Thing,
    pub applicant: Thing,
    pub proposal: String,
    pub proposed_credits: i64,
    pub match_score: f64,
}

pub struct ApplicationDbService<'a> {
    pub db: &'a Db,
    pub ctx: &'a Ctx,
}

pub const TABLE_NAME: &str = "application";
const TASK_TABLE: &str = task_entity::TABLE_NAME;
const USER_TABLE: &str = user_entity::TABLE_NAME;
const BOOKING_TABLE: &str = booking_entity::TABLE_NAME;

impl<'a> ApplicationDbService<'a> {
    pub fn get_table_name() -> &'static str {
        TABLE_NAME
    }

    pub async fn mutate_db(&self) -> Result<(), AppError> {
        let sql = format!("
    DEFINE TABLE IF NOT EXISTS {TABLE_NAME} SCHEMAFULL;
    DEFINE FIELD IF NOT EXISTS task ON TABLE {TABLE_NAME} TYPE record<{TASK_TABLE}>;
    DEFINE INDEX IF NOT EXISTS task_idx ON TABLE {TABLE_NAME} COLUMNS task;
    DEFINE FIELD IF NOT EXISTS applicant ON TABLE {TABLE_NAME} TYPE record<{USER_TABLE}>;
    DEFINE INDEX IF NOT EXISTS applicant_idx ON TABLE {TABLE_NAME} COLUMNS applicant;
    DEFINE FIELD IF NOT EXISTS task_provider ON TABLE {TABLE_NAME} TYPE record<{USER_TABLE}>;
    DEFINE FIELD IF NOT EXISTS proposal ON TABLE {TABLE_NAME} TYPE string ASSERT string::len(string::trim($value))>0;
    DEFINE FIELD IF NOT EXISTS proposed_credits ON TABLE {TABLE_NAME} TYPE number ASSERT $value >= 1;
    DEFINE FIELD IF NOT EXISTS status ON TABLE {TABLE_NAME} TYPE string ASSERT $value INSIDE ['Pending','Interviewed','Accepted','Rejected','Withdrawn'];
    DEFINE FIELD IF NOT EXISTS match_score ON TABLE {TABLE_NAME} TYPE number ASSERT $value >= 0 AND $value <= 100;
    DEFINE FIELD IF NOT EXISTS agreed_credits ON TABLE {TABLE_NAME} TYPE option<number>;
    DEFINE FIELD IF NOT EXISTS response_txt ON TABLE {TABLE_NAME} TYPE option<string>;
    DEFINE FIELD IF NOT EXISTS responded_at ON TABLE {TABLE_NAME} TYPE option<datetime>;
    DEFINE FIELD IF NOT EXISTS created_at ON TABLE {TABLE_NAME} TYPE datetime DEFAULT time::now() VALUE $before OR time::now();
    DEFINE INDEX IF NOT EXISTS task_applicant_idx ON TABLE {TABLE_NAME} COLUMNS task, applicant UNIQUE;
    ");
        let mutation = self.db.query(sql).await?;
        mutation.check().expect("should mutate application");

        Ok(())
    }

    /// Creates the application and maintains the task's acceptance flag in
    /// one transaction. The task-side guards are re-checked inside so a
    /// racing provider response can not slip an application onto a task
    /// that just closed.
    pub async fn create_for_task(&self, record: ApplicationCreate) -> CtxResult<Application> {
        let app_id = Thing::from((TABLE_NAME, Id::rand()));
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $task = SELECT * FROM ONLY $task_id;
            IF $task.status != 'Open' {{ THROW \"{THROW_TASK_NOT_OPEN}\"; }};
            IF !$task.accepts_applications {{ THROW \"{THROW_TASK_NOT_ACCEPTING}\"; }};
            IF $task.from_user == $applicant {{ THROW \"{THROW_OWN_TASK}\"; }};
            LET $active = (SELECT count() FROM {TABLE_NAME} WHERE task = $task.id AND status != 'Withdrawn' GROUP ALL)[0].count || 0;
            IF $active >= $task.max_applications {{ THROW \"{THROW_APPLICATIONS_FULL}\"; }};
            CREATE $app_id SET task = $task.id, applicant = $applicant, task_provider = $task.from_user, proposal = $proposal, proposed_credits = $proposed_credits, status = 'Pending', match_score = $match_score;
            IF $active + 1 >= $task.max_applications {{ UPDATE $task.id SET accepts_applications = false; }};
            COMMIT TRANSACTION;"
        );
        let mut bindings: HashMap<String, Value> = HashMap::new();
        bindings.insert("app_id".to_string(), to_sql_value(app_id.clone(), self.ctx)?);
        bindings.insert("task_id".to_string(), to_sql_value(record.task, self.ctx)?);
        bindings.insert(
            "applicant".to_string(),
            to_sql_value(record.applicant, self.ctx)?,
        );
        bindings.insert(
            "proposal".to_string(),
            to_sql_value(record.proposal, self.ctx)?,
        );
        bindings.insert(
            "proposed_credits".to_string(),
            to_sql_value(record.proposed_credits, self.ctx)?,
        );
        bindings.insert(
            "match_score".to_string(),
            to_sql_value(record.match_score, self.ctx)?,
        );

        let res = QryBindingsVal::new(qry, bindings)
            .into_query(self.db)
            .await?;
        res.check()
            .map_err(|e| self.ctx.to_ctx_error(map_application_tx_error(e)))?;
        self.get(IdentIdName::Id(app_id)).await
    }

    /// The accept cascade. Everything between BEGIN and COMMIT is atomic:
    /// the winning application is re-checked, the task is assigned, the
    /// booking is created and every other still-open sibling is rejected.
    /// A racing second accept loses on the status guard.
    pub async fn accept(
        &self,
        application_id: &Thing,
        agreed_credits: Option<i64>,
        response_txt: Option<String>,
        system_response: &str,
    ) -> CtxResult<()> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $app = SELECT * FROM ONLY $app_id;
            IF !($app.status INSIDE ['Pending','Interviewed']) {{ THROW \"{THROW_APPLICATION_PROCESSED}\"; }};
            LET $task = SELECT * FROM ONLY $app.task;
            IF !($task.status INSIDE ['Open','InReview']) {{ THROW \"{THROW_TASK_NOT_OPEN}\"; }};
            LET $agreed = $agreed_credits OR $app.proposed_credits;
            UPDATE $app.id SET status = 'Accepted', responded_at = time::now(), response_txt = $response_txt, agreed_credits = $agreed;
            UPDATE $task.id SET status = 'Assigned', selected_helper = $app.applicant, accepts_applications = false;
            CREATE {BOOKING_TABLE} SET task = $task.id, application = $app.id, helper = $app.applicant, task_provider = $task.from_user, agreed_credits = $agreed, status = 'Confirmed';
            UPDATE {TABLE_NAME} SET status = 'Rejected', responded_at = time::now(), response_txt = $system_response WHERE task = $task.id AND id != $app.id AND status INSIDE ['Pending','Interviewed'];
            COMMIT TRANSACTION;"
        );
        let mut bindings: HashMap<String, Value> = HashMap::new();
        bindings.insert(
            "app_id".to_string(),
            to_sql_value(application_id.clone(), self.ctx)?,
        );
        bindings.insert(
            "agreed_credits".to_string(),
            to_sql_value(agreed_credits, self.ctx)?,
        );
        bindings.insert(
            "response_txt".to_string(),
            to_sql_value(response_txt, self.ctx)?,
        );
        bindings.insert(
            "system_response".to_string(),
            to_sql_value(system_response.to_string(), self.ctx)?,
        );

        let res = QryBindingsVal::new(qry, bindings)
            .into_query(self.db)
            .await?;
        res.check()
            .map_err(|e| self.ctx.to_ctx_error(map_application_tx_error(e)))?;
        Ok(())
    }

    pub async fn reject(
        &self,
        application_id: &Thing,
        response_txt: Option<String>,
    ) -> CtxResult<Application> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $app = SELECT * FROM ONLY $app_id;
            IF !($app.status INSIDE ['Pending','Interviewed']) {{ THROW \"{THROW_APPLICATION_PROCESSED}\"; }};
            UPDATE $app.id SET status = 'Rejected', responded_at = time::now(), response_txt = $response_txt;
            COMMIT TRANSACTION;"
        );
        self.run_respond(qry, application_id, response_txt).await
    }

    /// Marks the conversation started; the application stays respondable.
    pub async fn interview(
        &self,
        application_id: &Thing,
        response_txt: Option<String>,
    ) -> CtxResult<Application> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $app = SELECT * FROM ONLY $app_id;
            IF $app.status != 'Pending' {{ THROW \"{THROW_APPLICATION_PROCESSED}\"; }};
            UPDATE $app.id SET status = 'Interviewed', responded_at = time::now(), response_txt = $response_txt;
            COMMIT TRANSACTION;"
        );
        self.run_respond(qry, application_id, response_txt).await
    }

    /// Withdrawing frees the applicant's slot again - the task's
    /// acceptance flag is recomputed from the surviving applications.
    pub async fn withdraw(&self, application_id: &Thing) -> CtxResult<Application> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $app = SELECT * FROM ONLY $app_id;
            IF $app.status != 'Pending' {{ THROW \"{THROW_APPLICATION_PROCESSED}\"; }};
            UPDATE $app.id SET status = 'Withdrawn', responded_at = time::now();
            LET $task = SELECT * FROM ONLY $app.task;
            IF $task.status == 'Open' {{
                LET $active = (SELECT count() FROM {TABLE_NAME} WHERE task = $task.id AND status != 'Withdrawn' GROUP ALL)[0].count || 0;
                UPDATE $task.id SET accepts_applications = $active < $task.max_applications;
            }};
            COMMIT TRANSACTION;"
        );
        self.run_respond(qry, application_id, None).await
    }

    async fn run_respond(
        &self,
        qry: String,
        application_id: &Thing,
        response_txt: Option<String>,
    ) -> CtxResult<Application> {
        let mut bindings: HashMap<String, Value> = HashMap::new();
        bindings.insert(
            "app_id".to_string(),
            to_sql_value(application_id.clone(), self.ctx)?,
        );
        bindings.insert(
            "response_txt".to_string(),
            to_sql_value(response_txt, self.ctx)?,
        );
        let res = QryBindingsVal::new(qry, bindings)
            .into_query(self.db)
            .await?;
        res.check()
            .map_err(|e| self.ctx.to_ctx_error(map_application_tx_error(e)))?;
        self.get(IdentIdName::Id(application_id.clone())).await
    }

    pub async fn get(&self, ident: IdentIdName) -> CtxResult<Application> {
        let opt = get_entity::<Application>(self.db, TABLE_NAME.to_string(), &ident).await?;
        with_not_found_err(opt, self.ctx, ident.to_string().as_str())
    }

    pub async fn get_view<T: for<'b> Deserialize<'b> + ViewFieldSelector>(
        &self,
        ident: IdentIdName,
    ) -> CtxResult<T> {
        let opt = get_entity_view::<T>(self.db, TABLE_NAME.to_string(), &ident).await?;
        with_not_found_err(opt, self.ctx, ident.to_string().as_str())
    }

    pub async fn list_by_task<T: for<'b> Deserialize<'b> + ViewFieldSelector>(
        &self,
        task_id: &Thing,
        pagination: Option<Pagination>,
    ) -> CtxResult<Vec<T>> {
        get_entity_list_view::<T>(
            self.db,
            TABLE_NAME.to_string(),
            &IdentIdName::ColumnIdent {
                column: "task".to_string(),
                val: task_id.to_raw(),
                rec: true,
            },
            pagination,
        )
        .await
    }

    pub async fn list_by_applicant<T: for<'b> Deserialize<'b> + ViewFieldSelector>(
        &self,
        applicant: &Thing,
        pagination: Option<Pagination>,
    ) -> CtxResult<Vec<T>> {
        get_entity_list_view::<T>(
            self.db,
            TABLE_NAME.to_string(),
            &IdentIdName::ColumnIdent {
                column: "applicant".to_string(),
                val: applicant.to_raw(),
                rec: true,
            },
            pagination,
        )
        .await
    }

    /// Applications that still occupy a slot on the task (everything not
    /// withdrawn).
    pub async fn count_active_for_task(&self, task_id: &Thing) -> CtxResult<i64> {
        #[derive(Deserialize)]
        struct CountView {
            count: i64,
        }
        let mut res = self
            .db
            .query(format!(
                "SELECT count() FROM {TABLE_NAME} WHERE task = $task_id AND status != 'Withdrawn' GROUP ALL;"
            ))
            .bind(("task_id", to_sql_value(task_id.clone(), self.ctx)?))
            .await?;
        let count = res.take::<Option<CountView>>(0)?;
        Ok(count.map(|c| c.count).unwrap_or(0))
    }
}

pub(crate) fn map_application_tx_error(e: surrealdb::Error) -> AppError {
    let err_str = e.to_string();
    if err_str.contains(THROW_APPLICATION_PROCESSED) {
        return AppError::ApplicationAlreadyProcessed;
    }
    if err_str.contains("already contains") {
        return AppError::ApplicationAlreadyExists;
    }
    for thrown in [THROW_OWN_TASK, THROW_APPLICATIONS_FULL] {
        if err_str.contains(thrown) {
            return AppError::InvalidState {
                description: thrown.to_string(),
            };
        }
    }
    map_task_tx_error(e)
}
