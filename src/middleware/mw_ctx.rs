use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::Serialize;
use surrealdb::sql::Thing;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::database::client::Database;
use crate::interfaces::notifications::{LoggingNotifications, NotificationsInterface};
use crate::utils::jwt::JWT;

#[derive(Debug, Clone, Serialize)]
pub enum AppEventType {
    ApplicationReceived,
    ApplicationResponded,
    BookingCreated,
    BookingStatusChanged,
    CreditsTransferred,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppEvent {
    pub user_id: String,
    pub task_id: Option<Thing>,
    pub booking_id: Option<Thing>,
    pub content: Option<String>,
    pub event: AppEventType,
    #[serde(skip_serializing)]
    pub receivers: Vec<String>,
}

pub struct CtxState {
    pub db: Database,
    pub jwt: JWT,
    pub is_development: bool,
    pub default_max_applications: u16,
    pub starting_credits: i64,
    pub event_sender: broadcast::Sender<AppEvent>,
    pub notifications: Arc<dyn NotificationsInterface + Send + Sync>,
}

impl Debug for CtxState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("CtxState")
    }
}

pub fn create_ctx_state(db: Database, config: &AppConfig) -> Arc<CtxState> {
    let (event_sender, _) = broadcast::channel(100);
    let ctx_state = CtxState {
        db,
        jwt: JWT::new(config.jwt_secret.clone(), chrono::Duration::days(7)),
        is_development: config.is_development,
        default_max_applications: config.default_max_applications,
        starting_credits: config.starting_credits,
        event_sender,
        notifications: Arc::new(LoggingNotifications {}),
    };
    Arc::new(ctx_state)
}

pub const JWT_KEY: &str = "jwt";
