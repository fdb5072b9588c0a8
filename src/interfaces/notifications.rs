use async_trait::async_trait;

use crate::middleware::mw_ctx::AppEvent;

/// External notification/chat collaborator. Delivery semantics are outside
/// this crate; implementations only receive the event after the owning
/// transaction committed.
#[async_trait]
pub trait NotificationsInterface {
    async fn notify(&self, event: &AppEvent) -> Result<(), String>;
}

pub struct LoggingNotifications;

#[async_trait]
impl NotificationsInterface for LoggingNotifications {
    async fn notify(&self, event: &AppEvent) -> Result<(), String> {
        tracing::debug!("notify receivers={:?} event={:?}", event.receivers, event.event);
        Ok(())
    }
}
