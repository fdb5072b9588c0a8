use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;
use validator::Validate;

use crate::database::client::Db;
use crate::entities::application_entity::ApplicationDbService;
use crate::entities::task_entity::{Task, TaskCreate, TaskDbService, TaskStatus};
use crate::entities::user_entity::UserDbService;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::utils::db_utils::IdentIdName;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct TaskCreateInput {
    #[validate(length(min = 3, message = "Min 3 characters for title"))]
    pub title: String,
    #[validate(length(min = 10, message = "Min 10 characters for description"))]
    pub description: String,
    #[serde(default)]
    pub skills_required: Vec<String>,
    #[validate(range(min = 1))]
    pub offer_credits: i64,
    #[validate(range(min = 1))]
    pub max_applications: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1))]
    pub duration_minutes: Option<i64>,
}

/// The application predicate, exposed so a client can probe before posting
/// an application. Skill mismatch only warns.
#[derive(Debug, Serialize)]
pub struct CanApplyView {
    pub can_apply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_skills: Vec<String>,
}

pub struct TaskService<'a> {
    tasks_repository: TaskDbService<'a>,
    users_repository: UserDbService<'a>,
    applications_repository: ApplicationDbService<'a>,
    ctx: &'a Ctx,
    default_max_applications: u16,
}

impl<'a> TaskService<'a> {
    pub fn new(db: &'a Db, ctx: &'a Ctx, default_max_applications: u16) -> Self {
        Self {
            tasks_repository: TaskDbService { db, ctx },
            users_repository: UserDbService { db, ctx },
            applications_repository: ApplicationDbService { db, ctx },
            ctx,
            default_max_applications,
        }
    }

    pub async fn create(&self, user_id: &Thing, data: TaskCreateInput) -> CtxResult<Task> {
        data.validate().map_err(|e| self.ctx.to_ctx_error(e.into()))?;

        let _ = self
            .users_repository
            .exists(IdentIdName::Id(user_id.clone()))
            .await?;

        self.tasks_repository
            .create(TaskCreate {
                from_user: user_id.clone(),
                title: data.title,
                description: data.description,
                skills_required: data.skills_required,
                offer_credits: data.offer_credits,
                status: TaskStatus::Open,
                max_applications: data
                    .max_applications
                    .unwrap_or(self.default_max_applications as i64),
                accepts_applications: true,
                scheduled_at: data.scheduled_at,
                duration_minutes: data.duration_minutes,
            })
            .await
    }

    pub async fn set_in_review(&self, user_id: &Thing, task_id: &Thing) -> CtxResult<Task> {
        self.owned_task(user_id, task_id).await?;
        self.tasks_repository.set_in_review(task_id).await?;
        self.tasks_repository.get(IdentIdName::Id(task_id.clone())).await
    }

    pub async fn cancel(&self, user_id: &Thing, task_id: &Thing) -> CtxResult<Task> {
        self.owned_task(user_id, task_id).await?;
        self.tasks_repository.cancel(task_id).await?;
        self.tasks_repository.get(IdentIdName::Id(task_id.clone())).await
    }

    pub async fn delete(&self, user_id: &Thing, task_id: &Thing) -> CtxResult<()> {
        self.owned_task(user_id, task_id).await?;
        self.tasks_repository.delete(task_id).await
    }

    pub async fn can_user_apply(&self, user_id: &Thing, task_id: &Thing) -> CtxResult<CanApplyView> {
        let task = self
            .tasks_repository
            .get(IdentIdName::Id(task_id.clone()))
            .await?;
        let user = self
            .users_repository
            .get(IdentIdName::Id(user_id.clone()))
            .await?;

        let active = self
            .applications_repository
            .count_active_for_task(task_id)
            .await?;

        let can_apply = task.can_user_apply(user_id, active);
        let reason = if can_apply {
            None
        } else if task.status != TaskStatus::Open {
            Some("Task is not open for applications".to_string())
        } else if &task.from_user == user_id {
            Some("Can not apply to own task".to_string())
        } else if !task.accepts_applications || active >= task.max_applications {
            Some("Task is not accepting applications".to_string())
        } else {
            Some("Application not possible".to_string())
        };

        Ok(CanApplyView {
            can_apply,
            reason,
            missing_skills: task.skills_missing(&user.skills),
        })
    }

    async fn owned_task(&self, user_id: &Thing, task_id: &Thing) -> CtxResult<Task> {
        let task = self
            .tasks_repository
            .get(IdentIdName::Id(task_id.clone()))
            .await?;
        if &task.from_user != user_id {
            return Err(self.ctx.to_ctx_error(AppError::Forbidden));
        }
        Ok(task)
    }
}
