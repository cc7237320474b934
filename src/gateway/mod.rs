//! Remote data gateway: auth and table operations against the backend.
//!
//! Every call either returns the backend's value or surfaces its error
//! unchanged. Nothing is retried or cached here.

pub mod supabase;

use crate::models::{Habit, HabitId, HistoryRow, User};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

pub use supabase::SupabaseGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected backend response: {0}")]
    InvalidResponse(String),

    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What a sign-up produced. Projects with email confirmation return a user
/// without a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    pub user: Option<User>,
    pub confirmation_required: bool,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, GatewayError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, GatewayError>;

    async fn sign_out(&self) -> Result<(), GatewayError>;

    /// The currently authenticated user, if the stored session is still valid.
    async fn get_session(&self) -> Result<Option<User>, GatewayError>;

    /// All habits visible to the session, oldest first.
    async fn list_habits(&self) -> Result<Vec<Habit>, GatewayError>;

    async fn create_habit(&self, name: &str) -> Result<Habit, GatewayError>;

    async fn delete_habit(&self, id: &HabitId) -> Result<(), GatewayError>;

    /// History rows dated within `from..=to`.
    async fn fetch_history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HistoryRow>, GatewayError>;

    /// Inserts or overwrites the single row keyed by `(habit_id, date)`.
    async fn upsert_history_entry(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
        done: bool,
    ) -> Result<(), GatewayError>;
}
