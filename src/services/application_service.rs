use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use surrealdb::sql::Thing;
use tokio::sync::broadcast::Sender;
use validator::Validate;

use crate::database::client::Db;
use crate::entities::application_entity::{
    Application, ApplicationCreate, ApplicationDbService,
};
use crate::entities::booking_entity::{Booking, BookingDbService};
use crate::entities::task_entity::{Task, TaskDbService, TaskStatus};
use crate::entities::user_entity::{User, UserDbService};
use crate::interfaces::notifications::NotificationsInterface;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::mw_ctx::AppEvent;
use crate::middleware::utils::db_utils::IdentIdName;
use crate::services::notification_service::NotificationService;

const SYSTEM_REJECT_RESPONSE: &str = "Task provider selected another applicant";
const SYSTEM_CANCEL_RESPONSE: &str = "Booking was cancelled before work started";

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ApplicationCreateInput {
    #[validate(length(min = 5, message = "Min 5 characters for proposal"))]
    pub proposal: String,
    #[validate(range(min = 1))]
    pub proposed_credits: i64,
}

#[derive(Display, EnumString, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ApplicationResponse {
    Accepted,
    Rejected,
    Interviewed,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ApplicationRespondInput {
    pub status: ApplicationResponse,
    #[validate(length(max = 2000))]
    pub response_txt: Option<String>,
    #[validate(range(min = 1))]
    pub agreed_credits: Option<i64>,
}

/// What a respond call produced - rejection and interview return the
/// application, acceptance also returns the booking spawned by the cascade.
#[derive(Debug, Serialize)]
pub struct RespondOutcome {
    pub application: Application,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<Booking>,
}

pub struct ApplicationService<'a> {
    applications_repository: ApplicationDbService<'a>,
    bookings_repository: BookingDbService<'a>,
    tasks_repository: TaskDbService<'a>,
    users_repository: UserDbService<'a>,
    notification_service: NotificationService<'a>,
    ctx: &'a Ctx,
}

impl<'a> ApplicationService<'a> {
    pub fn new(
        db: &'a Db,
        ctx: &'a Ctx,
        event_sender: &'a Sender<AppEvent>,
        notifications: &'a std::sync::Arc<dyn NotificationsInterface + Send + Sync>,
    ) -> Self {
        Self {
            applications_repository: ApplicationDbService { db, ctx },
            bookings_repository: BookingDbService { db, ctx },
            tasks_repository: TaskDbService { db, ctx },
            users_repository: UserDbService { db, ctx },
            notification_service: NotificationService::new(event_sender, notifications),
            ctx,
        }
    }

    /// Apply to an open task. The friendly guards run first for precise
    /// errors; the create transaction re-checks all of them against
    /// current state.
    pub async fn apply(
        &self,
        user_id: &Thing,
        task_id: &Thing,
        data: ApplicationCreateInput,
    ) -> CtxResult<Application> {
        data.validate().map_err(|e| self.ctx.to_ctx_error(e.into()))?;

        let task = self
            .tasks_repository
            .get(IdentIdName::Id(task_id.clone()))
            .await?;
        let applicant = self
            .users_repository
            .get(IdentIdName::Id(user_id.clone()))
            .await?;

        if &task.from_user == user_id {
            return Err(self.ctx.to_ctx_error(AppError::InvalidState {
                description: "Can not apply to own task".to_string(),
            }));
        }
        if task.status != TaskStatus::Open {
            return Err(self.ctx.to_ctx_error(AppError::InvalidState {
                description: "Task is not open for applications".to_string(),
            }));
        }
        let active = self
            .applications_repository
            .count_active_for_task(task_id)
            .await?;
        if !task.can_user_apply(user_id, active) {
            return Err(self.ctx.to_ctx_error(AppError::InvalidState {
                description: "Task is not accepting applications".to_string(),
            }));
        }

        let match_score = calculate_match_score(&task, &applicant, &data.proposal, Utc::now());

        let application = self
            .applications_repository
            .create_for_task(ApplicationCreate {
                task: task_id.clone(),
                applicant: user_id.clone(),
                proposal: data.proposal,
                proposed_credits: data.proposed_credits,
                match_score,
            })
            .await?;

        self.notification_service
            .on_application_received(user_id, task_id, &task.from_user)
            .await;

        Ok(application)
    }

    /// Provider response. Acceptance runs the cascade: winner accepted,
    /// task assigned, booking created, remaining siblings rejected with a
    /// system message - atomically, so a concurrent second accept fails
    /// instead of overwriting.
    pub async fn respond(
        &self,
        user_id: &Thing,
        application_id: &Thing,
        data: ApplicationRespondInput,
    ) -> CtxResult<RespondOutcome> {
        data.validate().map_err(|e| self.ctx.to_ctx_error(e.into()))?;

        let application = self
            .applications_repository
            .get(IdentIdName::Id(application_id.clone()))
            .await?;

        if &application.task_provider != user_id {
            return Err(self.ctx.to_ctx_error(AppError::Forbidden));
        }
        if !application.status.is_respondable() {
            return Err(self
                .ctx
                .to_ctx_error(AppError::ApplicationAlreadyProcessed));
        }

        let outcome = match data.status {
            ApplicationResponse::Accepted => {
                self.applications_repository
                    .accept(
                        application_id,
                        data.agreed_credits,
                        data.response_txt.clone(),
                        SYSTEM_REJECT_RESPONSE,
                    )
                    .await?;
                let application = self
                    .applications_repository
                    .get(IdentIdName::Id(application_id.clone()))
                    .await?;
                let booking = self
                    .bookings_repository
                    .get_by_application(application_id)
                    .await?;
                if let Some(ref booking_id) = booking.id {
                    self.notification_service
                        .on_booking_created(
                            user_id,
                            &application.task,
                            booking_id,
                            &application.applicant,
                        )
                        .await;
                }
                RespondOutcome {
                    application,
                    booking: Some(booking),
                }
            }
            ApplicationResponse::Rejected => {
                let application = self
                    .applications_repository
                    .reject(application_id, data.response_txt.clone())
                    .await?;
                RespondOutcome {
                    application,
                    booking: None,
                }
            }
            ApplicationResponse::Interviewed => {
                let application = self
                    .applications_repository
                    .interview(application_id, data.response_txt.clone())
                    .await?;
                RespondOutcome {
                    application,
                    booking: None,
                }
            }
        };

        self.notification_service
            .on_application_responded(
                user_id,
                &outcome.application.task,
                &outcome.application.applicant,
                data.response_txt,
            )
            .await;

        Ok(outcome)
    }

    pub async fn withdraw(&self, user_id: &Thing, application_id: &Thing) -> CtxResult<Application> {
        let application = self
            .applications_repository
            .get(IdentIdName::Id(application_id.clone()))
            .await?;

        if &application.applicant != user_id {
            return Err(self.ctx.to_ctx_error(AppError::Forbidden));
        }

        self.applications_repository.withdraw(application_id).await
    }

    pub fn system_cancel_response() -> &'static str {
        SYSTEM_CANCEL_RESPONSE
    }
}

/// Snapshot score computed once when the application is created; applicant
/// stats changing later do not move it.
pub fn calculate_match_score(
    task: &Task,
    applicant: &User,
    proposal: &str,
    applied_at: DateTime<Utc>,
) -> f64 {
    let skills_score = if task.skills_required.is_empty() {
        100.0
    } else {
        let matching = task
            .skills_required
            .iter()
            .filter(|required| applicant.skills.contains(required))
            .count();
        matching as f64 / task.skills_required.len() as f64 * 100.0
    };

    let experience_score = ((applicant.completed_tasks * 10) as f64).min(100.0);

    let rating_score = applicant.rating / 5.0 * 100.0;

    let response_hours = match task.created_at {
        Some(created_at) => (applied_at - created_at).num_hours(),
        None => 0,
    };
    let response_score = match response_hours {
        h if h < 1 => 100.0,
        h if h < 6 => 80.0,
        h if h < 24 => 60.0,
        h if h < 72 => 40.0,
        _ => 20.0,
    };

    let proposal_score = match proposal.chars().count() {
        n if n >= 200 => 100.0,
        n if n >= 100 => 80.0,
        n if n >= 50 => 60.0,
        _ => 40.0,
    };

    let weighted = skills_score * 0.4
        + experience_score * 0.2
        + rating_score * 0.2
        + response_score * 0.1
        + proposal_score * 0.1;

    weighted.round().clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::task_entity::TaskStatus;
    use crate::entities::{task_entity, user_entity};

    fn task_with_skills(skills: Vec<&str>, created_at: DateTime<Utc>) -> Task {
        Task {
            id: Some(Thing::from((task_entity::TABLE_NAME, "t1"))),
            from_user: Thing::from((user_entity::TABLE_NAME, "provider")),
            title: "Walk the dog".to_string(),
            description: "Afternoon walk, around an hour".to_string(),
            skills_required: skills.into_iter().map(str::to_string).collect(),
            offer_credits: 20,
            status: TaskStatus::Open,
            selected_helper: None,
            max_applications: 10,
            accepts_applications: true,
            scheduled_at: None,
            duration_minutes: Some(60),
            created_at: Some(created_at),
        }
    }

    fn applicant(skills: Vec<&str>, completed_tasks: i64, rating: f64) -> User {
        User {
            id: Some(Thing::from((user_entity::TABLE_NAME, "helper"))),
            username: "helper".to_string(),
            password_hash: "x".to_string(),
            full_name: None,
            skills: skills.into_iter().map(str::to_string).collect(),
            credits: 0,
            rating,
            total_ratings: 4,
            completed_tasks,
            tasks_created: 0,
            created_at: None,
        }
    }

    #[test]
    fn perfect_applicant_scores_hundred() {
        let now = Utc::now();
        let task = task_with_skills(vec!["walking"], now);
        let user = applicant(vec!["walking"], 12, 5.0);
        let proposal = "x".repeat(220);
        assert_eq!(calculate_match_score(&task, &user, &proposal, now), 100.0);
    }

    #[test]
    fn fresh_applicant_gets_floor_components() {
        let now = Utc::now();
        let task = task_with_skills(vec!["plumbing"], now - chrono::Duration::hours(100));
        let user = applicant(vec![], 0, 0.0);
        // skills 0, experience 0, rating 0, response 20 * 0.1, proposal 40 * 0.1
        assert_eq!(calculate_match_score(&task, &user, "short", now), 6.0);
    }

    #[test]
    fn partial_skills_weighting() {
        let now = Utc::now();
        let task = task_with_skills(vec!["a", "b"], now);
        let user = applicant(vec!["a"], 5, 4.0);
        // skills 50*0.4=20, exp 50*0.2=10, rating 80*0.2=16, response 100*0.1=10, proposal 40*0.1=4
        assert_eq!(calculate_match_score(&task, &user, "hi there", now), 60.0);
    }

    #[test]
    fn no_required_skills_is_full_match() {
        let now = Utc::now();
        let task = task_with_skills(vec![], now);
        let user = applicant(vec![], 0, 0.0);
        // skills 100*0.4=40, response 10, proposal 4
        assert_eq!(calculate_match_score(&task, &user, "short", now), 54.0);
    }

    #[test]
    fn score_is_clamped() {
        let now = Utc::now();
        let task = task_with_skills(vec!["a"], now);
        let user = applicant(vec!["a"], 100, 5.0);
        let proposal = "x".repeat(500);
        assert_eq!(calculate_match_score(&task, &user, &proposal, now), 100.0);
    }
}
