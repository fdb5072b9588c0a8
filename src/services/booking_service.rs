use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;
use tokio::sync::broadcast::Sender;
use validator::Validate;

use crate::database::client::Db;
use crate::entities::booking_entity::{
    Booking, BookingActor, BookingDbService, BookingStatus,
};
use crate::interfaces::notifications::NotificationsInterface;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::mw_ctx::AppEvent;
use crate::middleware::utils::db_utils::IdentIdName;
use crate::services::application_service::ApplicationService;
use crate::services::notification_service::NotificationService;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct BookingStatusInput {
    pub status: BookingStatus,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct WorkSubmitInput {
    #[validate(length(min = 1, message = "At least one deliverable required"))]
    pub deliverables: Vec<String>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ReviewInput {
    #[validate(range(min = 1.0, max = 5.0))]
    pub rating: f64,
    #[validate(length(max = 2000))]
    pub text: Option<String>,
}

pub struct BookingService<'a> {
    bookings_repository: BookingDbService<'a>,
    notification_service: NotificationService<'a>,
    ctx: &'a Ctx,
}

impl<'a> BookingService<'a> {
    pub fn new(
        db: &'a Db,
        ctx: &'a Ctx,
        event_sender: &'a Sender<AppEvent>,
        notifications: &'a std::sync::Arc<dyn NotificationsInterface + Send + Sync>,
    ) -> Self {
        Self {
            bookings_repository: BookingDbService { db, ctx },
            notification_service: NotificationService::new(event_sender, notifications),
            ctx,
        }
    }

    /// Actor-gated status transition. The booking is read first to give
    /// precise permission errors; the entity transaction re-checks the
    /// state so racing requests serialize at the database.
    pub async fn update_status(
        &self,
        user_id: &Thing,
        booking_id: &Thing,
        data: BookingStatusInput,
    ) -> CtxResult<Booking> {
        let booking = self
            .bookings_repository
            .get(IdentIdName::Id(booking_id.clone()))
            .await?;

        let actor = booking
            .actor_role(user_id)
            .ok_or_else(|| self.ctx.to_ctx_error(AppError::Forbidden))?;

        if !booking.status.can_transition(&data.status) {
            return Err(self.invalid_transition(&booking.status, &data.status));
        }

        let updated = if booking.status == BookingStatus::Disputed {
            // external resolution: refund, or restore exactly the
            // pre-dispute state
            match data.status {
                BookingStatus::Refunded => {
                    self.bookings_repository
                        .resolve_dispute(booking_id, true)
                        .await?
                }
                target if booking.status_before_dispute == Some(target) => {
                    self.bookings_repository
                        .resolve_dispute(booking_id, false)
                        .await?
                }
                _ => return Err(self.invalid_transition(&booking.status, &data.status)),
            }
        } else {
            match data.status {
                BookingStatus::InProgress => match booking.status {
                    // helper starts the work
                    BookingStatus::Confirmed => {
                        self.require(actor, BookingActor::Helper)?;
                        self.bookings_repository.start_work(booking_id).await?
                    }
                    // provider requests a revision
                    BookingStatus::WorkSubmitted => {
                        self.require(actor, BookingActor::TaskProvider)?;
                        self.bookings_repository.request_revision(booking_id).await?
                    }
                    _ => return Err(self.invalid_transition(&booking.status, &data.status)),
                },
                BookingStatus::Completed => {
                    self.require(actor, BookingActor::TaskProvider)?;
                    let updated = self.bookings_repository.complete(booking_id).await?;
                    self.notification_service
                        .on_credits_transferred(&updated.task_provider, &updated.helper, booking_id)
                        .await;
                    updated
                }
                BookingStatus::Cancelled => {
                    self.bookings_repository
                        .cancel(booking_id, ApplicationService::system_cancel_response())
                        .await?
                }
                BookingStatus::Disputed => self.bookings_repository.dispute(booking_id).await?,
                BookingStatus::WorkSubmitted => {
                    return Err(self.ctx.to_ctx_error(AppError::InvalidState {
                        description: "Submit work with its deliverables instead".to_string(),
                    }))
                }
                _ => return Err(self.invalid_transition(&booking.status, &data.status)),
            }
        };

        self.notification_service
            .on_booking_status(
                user_id,
                booking_id,
                updated.status.to_string(),
                vec![&updated.helper, &updated.task_provider],
            )
            .await;

        Ok(updated)
    }

    pub async fn submit_work(
        &self,
        user_id: &Thing,
        booking_id: &Thing,
        data: WorkSubmitInput,
    ) -> CtxResult<Booking> {
        data.validate().map_err(|e| self.ctx.to_ctx_error(e.into()))?;

        let booking = self
            .bookings_repository
            .get(IdentIdName::Id(booking_id.clone()))
            .await?;
        let actor = booking
            .actor_role(user_id)
            .ok_or_else(|| self.ctx.to_ctx_error(AppError::Forbidden))?;
        self.require(actor, BookingActor::Helper)?;

        let updated = self
            .bookings_repository
            .submit_work(booking_id, data.deliverables, data.note)
            .await?;

        self.notification_service
            .on_booking_status(
                user_id,
                booking_id,
                updated.status.to_string(),
                vec![&updated.task_provider],
            )
            .await;

        Ok(updated)
    }

    pub async fn add_review(
        &self,
        user_id: &Thing,
        booking_id: &Thing,
        data: ReviewInput,
    ) -> CtxResult<Booking> {
        data.validate().map_err(|e| self.ctx.to_ctx_error(e.into()))?;

        let booking = self
            .bookings_repository
            .get(IdentIdName::Id(booking_id.clone()))
            .await?;
        let actor = booking
            .actor_role(user_id)
            .ok_or_else(|| self.ctx.to_ctx_error(AppError::Forbidden))?;

        self.bookings_repository
            .add_review(booking_id, actor, data.rating, data.text)
            .await
    }

    fn require(&self, actor: BookingActor, expected: BookingActor) -> CtxResult<()> {
        if actor != expected {
            return Err(self.ctx.to_ctx_error(AppError::Forbidden));
        }
        Ok(())
    }

    fn invalid_transition(
        &self,
        from: &BookingStatus,
        to: &BookingStatus,
    ) -> crate::middleware::error::CtxError {
        self.ctx.to_ctx_error(AppError::InvalidState {
            description: format!("Booking can not move from {from} to {to}"),
        })
    }
}
