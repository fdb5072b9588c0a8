use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use surrealdb::sql::{Thing, Value};

use crate::database::client::Db;
use crate::entities::application_entity;
use crate::entities::credit_transaction_entity;
use crate::entities::task_entity::{self, to_sql_value};
use crate::entities::user_entity;
use crate::middleware::ctx::Ctx;
use crate::middleware::error::{AppError, CtxResult};
use crate::middleware::utils::db_utils::{
    get_entity, get_entity_list_view, get_entity_view, with_not_found_err, IdentIdName, Pagination,
    QryBindingsVal, ViewFieldSelector,
};

pub const THROW_BOOKING_STATE: &str = "Booking state does not allow this transition";
pub const THROW_WORK_NOT_SUBMITTED: &str = "Booking work is not submitted";
pub const THROW_NOT_COMPLETED: &str = "Booking is not completed";
pub const THROW_ALREADY_REVIEWED: &str = "Review already submitted";
pub const THROW_CREDITS_TOO_LOW: &str = "Not enough credits";

#[derive(Display, EnumString, Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingStatus {
    Confirmed,
    InProgress,
    WorkSubmitted,
    Completed,
    Cancelled,
    Disputed,
    Refunded,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::Refunded
        )
    }

    /// The full transition graph. Actor permissions are layered on top by
    /// the booking service; this answers only whether the edge exists.
    pub fn can_transition(&self, to: &BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, to) {
            (Confirmed, InProgress) => true,
            (InProgress, WorkSubmitted) => true,
            (WorkSubmitted, Completed) => true,
            // revision request sends the work back
            (WorkSubmitted, InProgress) => true,
            (Confirmed, Cancelled) | (InProgress, Cancelled) => true,
            (from, Disputed) => !from.is_terminal() && *from != Disputed,
            (Disputed, Refunded) => true,
            // external resolution can restore the pre-dispute state
            (Disputed, Confirmed) | (Disputed, InProgress) | (Disputed, WorkSubmitted) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BookingReview {
    pub rating: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Immutable historical record of one accepted application being worked.
/// Never deleted; terminal states end the lifecycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Booking {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub task: Thing,
    pub application: Thing,
    pub helper: Thing,
    pub task_provider: Thing,
    pub agreed_credits: i64,
    pub status: BookingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_before_dispute: Option<BookingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_duration_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliverables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_review: Option<BookingReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_provider_review: Option<BookingReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn actor_role(&self, user_id: &Thing) -> Option<BookingActor> {
        if &self.helper == user_id {
            Some(BookingActor::Helper)
        } else if &self.task_provider == user_id {
            Some(BookingActor::TaskProvider)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookingActor {
    Helper,
    TaskProvider,
}

pub struct BookingDbService<'a> {
    pub db: &'a Db,
    pub ctx: &'a Ctx,
}

pub const TABLE_NAME: &str = "booking";
const TASK_TABLE: &str = task_entity::TABLE_NAME;
const USER_TABLE: &str = user_entity::TABLE_NAME;
const APPLICATION_TABLE: &str = application_entity::TABLE_NAME;
const TX_TABLE: &str = credit_transaction_entity::TABLE_NAME;

impl<'a> BookingDbService<'a> {
    pub fn get_table_name() -> &'static str {
        TABLE_NAME
    }

    pub async fn mutate_db(&self) -> Result<(), AppError> {
        let sql = format!("
    DEFINE TABLE IF NOT EXISTS {TABLE_NAME} SCHEMAFULL;
    DEFINE FIELD IF NOT EXISTS task ON TABLE {TABLE_NAME} TYPE record<{TASK_TABLE}>;
    DEFINE INDEX IF NOT EXISTS task_idx ON TABLE {TABLE_NAME} COLUMNS task;
    DEFINE FIELD IF NOT EXISTS application ON TABLE {TABLE_NAME} TYPE record<{APPLICATION_TABLE}>;
    DEFINE INDEX IF NOT EXISTS application_idx ON TABLE {TABLE_NAME} COLUMNS application UNIQUE;
    DEFINE FIELD IF NOT EXISTS helper ON TABLE {TABLE_NAME} TYPE record<{USER_TABLE}>;
    DEFINE INDEX IF NOT EXISTS helper_idx ON TABLE {TABLE_NAME} COLUMNS helper;
    DEFINE FIELD IF NOT EXISTS task_provider ON TABLE {TABLE_NAME} TYPE record<{USER_TABLE}>;
    DEFINE INDEX IF NOT EXISTS task_provider_idx ON TABLE {TABLE_NAME} COLUMNS task_provider;
    DEFINE FIELD IF NOT EXISTS agreed_credits ON TABLE {TABLE_NAME} TYPE number ASSERT $value >= 1;
    DEFINE FIELD IF NOT EXISTS status ON TABLE {TABLE_NAME} TYPE string ASSERT $value INSIDE ['Confirmed','InProgress','WorkSubmitted','Completed','Cancelled','Disputed','Refunded'];
    DEFINE INDEX IF NOT EXISTS status_idx ON TABLE {TABLE_NAME} COLUMNS status;
    DEFINE FIELD IF NOT EXISTS status_before_dispute ON TABLE {TABLE_NAME} TYPE option<string>;
    DEFINE FIELD IF NOT EXISTS started_at ON TABLE {TABLE_NAME} TYPE option<datetime>;
    DEFINE FIELD IF NOT EXISTS completed_at ON TABLE {TABLE_NAME} TYPE option<datetime>;
    DEFINE FIELD IF NOT EXISTS actual_duration_minutes ON TABLE {TABLE_NAME} TYPE option<number>;
    DEFINE FIELD IF NOT EXISTS deliverables ON TABLE {TABLE_NAME} TYPE option<array<string>>;
    DEFINE FIELD IF NOT EXISTS work_note ON TABLE {TABLE_NAME} TYPE option<string>;
    DEFINE FIELD IF NOT EXISTS helper_review ON TABLE {TABLE_NAME} TYPE option<{{ rating: number, text: option<string>, created_at: datetime }}>;
    DEFINE FIELD IF NOT EXISTS task_provider_review ON TABLE {TABLE_NAME} TYPE option<{{ rating: number, text: option<string>, created_at: datetime }}>;
    DEFINE FIELD IF NOT EXISTS created_at ON TABLE {TABLE_NAME} TYPE datetime DEFAULT time::now() VALUE $before OR time::now();
    ");
        let mutation = self.db.query(sql).await?;
        mutation.check().expect("should mutate booking");

        Ok(())
    }

    /// Helper starts the work: booking and task both move to InProgress and
    /// the clock starts.
    pub async fn start_work(&self, booking_id: &Thing) -> CtxResult<Booking> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $b = SELECT * FROM ONLY $booking_id;
            IF $b.status != 'Confirmed' {{ THROW \"{THROW_BOOKING_STATE}\"; }};
            UPDATE $b.id SET status = 'InProgress', started_at = time::now();
            UPDATE $b.task SET status = 'InProgress';
            COMMIT TRANSACTION;"
        );
        self.run_transition(qry, booking_id, HashMap::new()).await
    }

    pub async fn submit_work(
        &self,
        booking_id: &Thing,
        deliverables: Vec<String>,
        note: Option<String>,
    ) -> CtxResult<Booking> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $b = SELECT * FROM ONLY $booking_id;
            IF $b.status != 'InProgress' {{ THROW \"{THROW_BOOKING_STATE}\"; }};
            UPDATE $b.id SET status = 'WorkSubmitted', deliverables = $deliverables, work_note = $note;
            COMMIT TRANSACTION;"
        );
        let mut extra: HashMap<String, Value> = HashMap::new();
        extra.insert(
            "deliverables".to_string(),
            to_sql_value(deliverables, self.ctx)?,
        );
        extra.insert("note".to_string(), to_sql_value(note, self.ctx)?);
        self.run_transition(qry, booking_id, extra).await
    }

    /// Provider sends the submission back for another round.
    pub async fn request_revision(&self, booking_id: &Thing) -> CtxResult<Booking> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $b = SELECT * FROM ONLY $booking_id;
            IF $b.status != 'WorkSubmitted' {{ THROW \"{THROW_WORK_NOT_SUBMITTED}\"; }};
            UPDATE $b.id SET status = 'InProgress';
            COMMIT TRANSACTION;"
        );
        self.run_transition(qry, booking_id, HashMap::new()).await
    }

    /// The completion transfer. One transaction: status guard, balance
    /// floor guard, both balance mutations, both ledger legs, the helper's
    /// completion counter, and booking + task termination. The credit sum
    /// of the two parties is conserved by construction.
    pub async fn complete(&self, booking_id: &Thing) -> CtxResult<Booking> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $b = SELECT * FROM ONLY $booking_id;
            IF $b.status != 'WorkSubmitted' {{ THROW \"{THROW_WORK_NOT_SUBMITTED}\"; }};
            LET $provider = SELECT * FROM ONLY $b.task_provider;
            LET $helper = SELECT * FROM ONLY $b.helper;
            LET $amount = $b.agreed_credits;
            LET $provider_balance = ($provider.credits || 0) - $amount;
            IF $provider_balance < 0 {{ THROW \"{THROW_CREDITS_TOO_LOW}\"; }};
            LET $helper_balance = ($helper.credits || 0) + $amount;
            UPDATE $provider.id SET credits = $provider_balance;
            UPDATE $helper.id SET credits = $helper_balance, completed_tasks += 1;
            LET $tx_ident = rand::ulid();
            CREATE {TX_TABLE} SET user = $provider.id, with_user = $helper.id, booking = $b.id, tx_ident = $tx_ident, title = 'Booking payout', amount_out = $amount, balance = $provider_balance;
            CREATE {TX_TABLE} SET user = $helper.id, with_user = $provider.id, booking = $b.id, tx_ident = $tx_ident, title = 'Booking payout', amount_in = $amount, balance = $helper_balance;
            LET $duration_mins = IF $b.started_at != NONE {{ duration::mins(time::now() - $b.started_at) }} ELSE {{ NONE }};
            UPDATE $b.id SET status = 'Completed', completed_at = time::now(), actual_duration_minutes = $duration_mins;
            UPDATE $b.task SET status = 'Completed';
            COMMIT TRANSACTION;"
        );
        self.run_transition(qry, booking_id, HashMap::new()).await
    }

    /// Cancelling before any work started reopens the task for
    /// re-matching; the accepted application is closed out so the task can
    /// accept a different applicant. Cancelling mid-work terminates the
    /// task as well.
    pub async fn cancel(&self, booking_id: &Thing, closeout_response: &str) -> CtxResult<Booking> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $b = SELECT * FROM ONLY $booking_id;
            IF !($b.status INSIDE ['Confirmed','InProgress']) {{ THROW \"{THROW_BOOKING_STATE}\"; }};
            UPDATE $b.id SET status = 'Cancelled';
            IF $b.status == 'Confirmed' {{
                UPDATE $b.application SET status = 'Rejected', responded_at = time::now(), response_txt = $closeout_response;
                UPDATE $b.task SET status = 'Open', selected_helper = NONE, accepts_applications = true;
            }} ELSE {{
                UPDATE $b.task SET status = 'Cancelled', accepts_applications = false;
            }};
            COMMIT TRANSACTION;"
        );
        let mut extra: HashMap<String, Value> = HashMap::new();
        extra.insert(
            "closeout_response".to_string(),
            to_sql_value(closeout_response.to_string(), self.ctx)?,
        );
        self.run_transition(qry, booking_id, extra).await
    }

    /// Freezes the booking until the dispute is resolved externally; the
    /// pre-dispute status is kept for the resolution path.
    pub async fn dispute(&self, booking_id: &Thing) -> CtxResult<Booking> {
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $b = SELECT * FROM ONLY $booking_id;
            IF $b.status INSIDE ['Completed','Cancelled','Refunded','Disputed'] {{ THROW \"{THROW_BOOKING_STATE}\"; }};
            UPDATE $b.id SET status = 'Disputed', status_before_dispute = $b.status;
            COMMIT TRANSACTION;"
        );
        self.run_transition(qry, booking_id, HashMap::new()).await
    }

    /// Relays the external dispute outcome: refund terminates booking and
    /// task, otherwise the pre-dispute state is restored.
    pub async fn resolve_dispute(&self, booking_id: &Thing, refund: bool) -> CtxResult<Booking> {
        let qry = if refund {
            format!(
                "BEGIN TRANSACTION;
                LET $b = SELECT * FROM ONLY $booking_id;
                IF $b.status != 'Disputed' {{ THROW \"{THROW_BOOKING_STATE}\"; }};
                UPDATE $b.id SET status = 'Refunded', status_before_dispute = NONE;
                UPDATE $b.task SET status = 'Cancelled', accepts_applications = false;
                COMMIT TRANSACTION;"
            )
        } else {
            format!(
                "BEGIN TRANSACTION;
                LET $b = SELECT * FROM ONLY $booking_id;
                IF $b.status != 'Disputed' {{ THROW \"{THROW_BOOKING_STATE}\"; }};
                UPDATE $b.id SET status = $b.status_before_dispute, status_before_dispute = NONE;
                COMMIT TRANSACTION;"
            )
        };
        self.run_transition(qry, booking_id, HashMap::new()).await
    }

    /// One review per side, enforced inside the transaction; the
    /// counterparty's rating moves by the running average.
    pub async fn add_review(
        &self,
        booking_id: &Thing,
        reviewer: BookingActor,
        rating: f64,
        text: Option<String>,
    ) -> CtxResult<Booking> {
        let (slot, rated_party) = match reviewer {
            BookingActor::Helper => ("helper_review", "task_provider"),
            BookingActor::TaskProvider => ("task_provider_review", "helper"),
        };
        let qry = format!(
            "BEGIN TRANSACTION;
            LET $b = SELECT * FROM ONLY $booking_id;
            IF $b.status != 'Completed' {{ THROW \"{THROW_NOT_COMPLETED}\"; }};
            IF $b.{slot} != NONE {{ THROW \"{THROW_ALREADY_REVIEWED}\"; }};
            UPDATE $b.id SET {slot} = {{ rating: $rating, text: $text, created_at: time::now() }};
            LET $rated = SELECT * FROM ONLY $b.{rated_party};
            LET $count = $rated.total_ratings || 0;
            UPDATE $rated.id SET rating = ((($rated.rating || 0) * $count) + $rating) / ($count + 1), total_ratings = $count + 1;
            COMMIT TRANSACTION;"
        );
        let mut extra: HashMap<String, Value> = HashMap::new();
        extra.insert("rating".to_string(), to_sql_value(rating, self.ctx)?);
        extra.insert("text".to_string(), to_sql_value(text, self.ctx)?);
        self.run_transition(qry, booking_id, extra).await
    }

    async fn run_transition(
        &self,
        qry: String,
        booking_id: &Thing,
        mut bindings: HashMap<String, Value>,
    ) -> CtxResult<Booking> {
        bindings.insert(
            "booking_id".to_string(),
            to_sql_value(booking_id.clone(), self.ctx)?,
        );
        let res = QryBindingsVal::new(qry, bindings)
            .into_query(self.db)
            .await?;
        res.check()
            .map_err(|e| self.ctx.to_ctx_error(map_booking_tx_error(e)))?;
        self.get(IdentIdName::Id(booking_id.clone())).await
    }

    pub async fn get(&self, ident: IdentIdName) -> CtxResult<Booking> {
        let opt = get_entity::<Booking>(self.db, TABLE_NAME.to_string(), &ident).await?;
        with_not_found_err(opt, self.ctx, ident.to_string().as_str())
    }

    pub async fn get_view<T: for<'b> Deserialize<'b> + ViewFieldSelector>(
        &self,
        ident: IdentIdName,
    ) -> CtxResult<T> {
        let opt = get_entity_view::<T>(self.db, TABLE_NAME.to_string(), &ident).await?;
        with_not_found_err(opt, self.ctx, ident.to_string().as_str())
    }

    pub async fn get_by_application(&self, application_id: &Thing) -> CtxResult<Booking> {
        self.get(IdentIdName::ColumnIdent {
            column: "application".to_string(),
            val: application_id.to_raw(),
            rec: true,
        })
        .await
    }

    pub async fn list_by_actor<T: for<'b> Deserialize<'b> + ViewFieldSelector>(
        &self,
        user: &Thing,
        role: BookingActor,
        pagination: Option<Pagination>,
    ) -> CtxResult<Vec<T>> {
        let column = match role {
            BookingActor::Helper => "helper",
            BookingActor::TaskProvider => "task_provider",
        };
        get_entity_list_view::<T>(
            self.db,
            TABLE_NAME.to_string(),
            &IdentIdName::ColumnIdent {
                column: column.to_string(),
                val: user.to_raw(),
                rec: true,
            },
            pagination,
        )
        .await
    }
}

pub(crate) fn map_booking_tx_error(e: surrealdb::Error) -> AppError {
    let err_str = e.to_string();
    if err_str.contains(THROW_CREDITS_TOO_LOW) {
        return AppError::CreditsTooLow;
    }
    if err_str.contains(THROW_ALREADY_REVIEWED) {
        return AppError::BookingAlreadyReviewed;
    }
    for thrown in [THROW_BOOKING_STATE, THROW_WORK_NOT_SUBMITTED, THROW_NOT_COMPLETED] {
        if err_str.contains(thrown) {
            return AppError::InvalidState {
                description: thrown.to_string(),
            };
        }
    }
    AppError::SurrealDb { source: err_str }
}

#[cfg(test)]
mod tests {
    use super::BookingStatus::*;

    #[test]
    fn work_lifecycle_edges() {
        assert!(Confirmed.can_transition(&InProgress));
        assert!(InProgress.can_transition(&WorkSubmitted));
        assert!(WorkSubmitted.can_transition(&Completed));
        assert!(WorkSubmitted.can_transition(&InProgress));
    }

    #[test]
    fn cancel_edges() {
        assert!(Confirmed.can_transition(&Cancelled));
        assert!(InProgress.can_transition(&Cancelled));
        assert!(!WorkSubmitted.can_transition(&Cancelled));
        assert!(!Completed.can_transition(&Cancelled));
    }

    #[test]
    fn no_skipped_or_reversed_edges() {
        assert!(!Confirmed.can_transition(&WorkSubmitted));
        assert!(!Confirmed.can_transition(&Completed));
        assert!(!InProgress.can_transition(&Confirmed));
        assert!(!Completed.can_transition(&InProgress));
        assert!(!Cancelled.can_transition(&InProgress));
        assert!(!Refunded.can_transition(&Confirmed));
    }

    #[test]
    fn dispute_edges() {
        assert!(Confirmed.can_transition(&Disputed));
        assert!(InProgress.can_transition(&Disputed));
        assert!(WorkSubmitted.can_transition(&Disputed));
        assert!(!Completed.can_transition(&Disputed));
        assert!(!Disputed.can_transition(&Disputed));
        assert!(Disputed.can_transition(&Refunded));
        assert!(Disputed.can_transition(&InProgress));
    }

    #[test]
    fn terminal_states() {
        for status in [Completed, Cancelled, Refunded] {
            assert!(status.is_terminal());
            for target in [Confirmed, InProgress, WorkSubmitted, Completed, Cancelled, Disputed, Refunded] {
                assert!(!status.can_transition(&target));
            }
        }
    }
}
