use std::sync::Arc;

use surrealdb::sql::Thing;
use tokio::sync::broadcast::Sender;

use crate::interfaces::notifications::NotificationsInterface;
use crate::middleware::mw_ctx::{AppEvent, AppEventType};

/// Fans lifecycle events out to the in-process broadcast channel and the
/// external notification collaborator. Best effort on both legs - a
/// notification failure never fails the transaction that produced it.
pub struct NotificationService<'a> {
    event_sender: &'a Sender<AppEvent>,
    notifications: &'a Arc<dyn NotificationsInterface + Send + Sync>,
}

impl<'a> NotificationService<'a> {
    pub fn new(
        event_sender: &'a Sender<AppEvent>,
        notifications: &'a Arc<dyn NotificationsInterface + Send + Sync>,
    ) -> Self {
        Self {
            event_sender,
            notifications,
        }
    }

    pub async fn on_application_received(&self, applicant: &Thing, task: &Thing, provider: &Thing) {
        self.emit(AppEvent {
            user_id: applicant.to_raw(),
            task_id: Some(task.clone()),
            booking_id: None,
            content: None,
            event: AppEventType::ApplicationReceived,
            receivers: vec![provider.to_raw()],
        })
        .await;
    }

    pub async fn on_application_responded(
        &self,
        provider: &Thing,
        task: &Thing,
        applicant: &Thing,
        response: Option<String>,
    ) {
        self.emit(AppEvent {
            user_id: provider.to_raw(),
            task_id: Some(task.clone()),
            booking_id: None,
            content: response,
            event: AppEventType::ApplicationResponded,
            receivers: vec![applicant.to_raw()],
        })
        .await;
    }

    pub async fn on_booking_created(
        &self,
        provider: &Thing,
        task: &Thing,
        booking: &Thing,
        helper: &Thing,
    ) {
        self.emit(AppEvent {
            user_id: provider.to_raw(),
            task_id: Some(task.clone()),
            booking_id: Some(booking.clone()),
            content: None,
            event: AppEventType::BookingCreated,
            receivers: vec![helper.to_raw(), provider.to_raw()],
        })
        .await;
    }

    pub async fn on_booking_status(
        &self,
        actor: &Thing,
        booking: &Thing,
        status: String,
        receivers: Vec<&Thing>,
    ) {
        self.emit(AppEvent {
            user_id: actor.to_raw(),
            task_id: None,
            booking_id: Some(booking.clone()),
            content: Some(status),
            event: AppEventType::BookingStatusChanged,
            receivers: receivers.into_iter().map(|r| r.to_raw()).collect(),
        })
        .await;
    }

    pub async fn on_credits_transferred(&self, provider: &Thing, helper: &Thing, booking: &Thing) {
        self.emit(AppEvent {
            user_id: provider.to_raw(),
            task_id: None,
            booking_id: Some(booking.clone()),
            content: None,
            event: AppEventType::CreditsTransferred,
            receivers: vec![provider.to_raw(), helper.to_raw()],
        })
        .await;
    }

    async fn emit(&self, event: AppEvent) {
        let _ = self.notifications.notify(&event).await;
        let _ = self.event_sender.send(event);
    }
}
