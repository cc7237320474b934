//! Action handlers: validate, call the gateway, then mutate client state.
//!
//! State is locked only around reads and writes, never across a gateway
//! call, so two in-flight actions may interleave at their remote calls. The
//! last write to the history index wins, as it does for the backend upsert.

use crate::dates;
use crate::errors::{ActionError, ValidationError};
use crate::gateway::{Gateway, SignUpOutcome};
use crate::models::{Habit, HabitId, HistoryIndex, User};
use crate::state::ClientState;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub struct Controller {
    gateway: Arc<dyn Gateway>,
    state: Mutex<ClientState>,
    clock: fn() -> NaiveDate,
}

impl Controller {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self::with_clock(gateway, dates::local_today)
    }

    pub fn with_clock(gateway: Arc<dyn Gateway>, clock: fn() -> NaiveDate) -> Self {
        Self {
            gateway,
            state: Mutex::new(ClientState::default()),
            clock,
        }
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    pub async fn snapshot(&self) -> ClientState {
        self.state.lock().await.clone()
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, ActionError> {
        let (email, password) = credentials(email, password)?;
        self.gateway
            .sign_up(email, password)
            .await
            .inspect_err(|err| error!("sign-up failed: {err}"))
            .map_err(ActionError::from)
    }

    /// Signs in and loads the user's habits and history.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, ActionError> {
        let (email, password) = credentials(email, password)?;
        let user = self
            .gateway
            .sign_in(email, password)
            .await
            .inspect_err(|err| error!("sign-in failed: {err}"))?;

        self.state.lock().await.user = Some(user.clone());
        self.full_load().await?;
        Ok(user)
    }

    /// Local state is cleared even when the backend call fails.
    pub async fn sign_out(&self) -> Result<(), ActionError> {
        let outcome = self.gateway.sign_out().await;
        self.state.lock().await.clear();
        outcome.inspect_err(|err| error!("sign-out failed: {err}"))?;
        info!("signed out");
        Ok(())
    }

    /// Resumes a stored session, if the backend still accepts it.
    pub async fn startup(&self) -> Result<Option<User>, ActionError> {
        let user = self
            .gateway
            .get_session()
            .await
            .inspect_err(|err| error!("session check failed: {err}"))?;
        let Some(user) = user else {
            return Ok(None);
        };

        info!("resuming session for user {}", user.id);
        self.state.lock().await.user = Some(user.clone());
        self.full_load().await?;
        Ok(Some(user))
    }

    /// Replaces habits and history with what the backend holds for the
    /// trailing window.
    pub async fn full_load(&self) -> Result<(), ActionError> {
        let Some(user) = self.state.lock().await.user.clone() else {
            return Err(ValidationError::NotSignedIn.into());
        };

        let habits = match self.gateway.list_habits().await {
            Ok(habits) => habits,
            Err(err) => {
                error!("failed to load habits: {err}");
                return Err(err.into());
            }
        };

        let (from, to) = dates::window_bounds(self.today());
        let history = self.gateway.fetch_history(from, to).await;

        let mut state = self.state.lock().await;
        if state.user.as_ref() != Some(&user) {
            info!("discarding load for user {}, session changed meanwhile", user.id);
            return Ok(());
        }

        match history {
            Ok(rows) => {
                state.history = HistoryIndex::rebuild(&habits, &rows);
                state.habits = habits;
                info!(
                    "loaded {} habits and {} history rows from {from} to {to}",
                    state.habits.len(),
                    rows.len()
                );
                Ok(())
            }
            Err(err) => {
                error!("failed to load history: {err}");
                state.habits = habits;
                state.history = HistoryIndex::default();
                Err(err.into())
            }
        }
    }

    pub async fn add_habit(&self, name: &str) -> Result<Habit, ActionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyHabitName.into());
        }
        let user = {
            let state = self.state.lock().await;
            let Some(user) = state.user.clone() else {
                return Err(ValidationError::NotSignedIn.into());
            };
            // Case-sensitive and local only; another client may still race us.
            if state.has_habit_named(name) {
                return Err(ValidationError::DuplicateHabit(name.to_string()).into());
            }
            user
        };

        let habit = self
            .gateway
            .create_habit(name)
            .await
            .inspect_err(|err| error!("failed to create habit '{name}': {err}"))?;

        let mut state = self.state.lock().await;
        if state.user.as_ref() != Some(&user) {
            info!("not adding '{}' locally, user {} is no longer signed in", habit.name, user.id);
            return Ok(habit);
        }
        state.history.reset(&habit.name);
        state.habits.push(habit.clone());
        Ok(habit)
    }

    /// Marks `id` done or not done for today.
    ///
    /// The index is updated before the backend confirms and is not rolled
    /// back if the upsert fails, so a failure leaves the page showing a
    /// value the backend does not hold until the next full load.
    pub async fn toggle_today(&self, id: &HabitId, done: bool) -> Result<(), ActionError> {
        let today = self.today();
        let day = dates::display(today);

        let habit = {
            let mut state = self.state.lock().await;
            let habit = state
                .habit(id)
                .cloned()
                .ok_or_else(|| ValidationError::UnknownHabit(id.to_string()))?;
            state.history.set(&habit.name, &day, done);
            habit
        };

        if let Err(err) = self.gateway.upsert_history_entry(&habit.id, today, done).await {
            error!("failed to save history for '{}': {err}", habit.name);
            warn!(
                "'{}' on {day} shows done={done} locally but the backend did not store it",
                habit.name
            );
            return Err(err.into());
        }
        Ok(())
    }

    /// Removes the habit locally only after the backend delete succeeds.
    pub async fn delete_habit(&self, id: &HabitId) -> Result<(), ActionError> {
        let (user, habit) = {
            let state = self.state.lock().await;
            let habit = state
                .habit(id)
                .cloned()
                .ok_or_else(|| ValidationError::UnknownHabit(id.to_string()))?;
            (state.user.clone(), habit)
        };

        self.gateway
            .delete_habit(&habit.id)
            .await
            .inspect_err(|err| error!("failed to delete habit '{}': {err}", habit.name))?;

        let mut state = self.state.lock().await;
        if state.user != user {
            info!("not removing '{}' locally, session changed meanwhile", habit.name);
            return Ok(());
        }
        state.habits.retain(|existing| existing.id != habit.id);
        state.history.remove(&habit.name);
        Ok(())
    }
}

fn credentials<'a>(email: &'a str, password: &'a str) -> Result<(&'a str, &'a str), ValidationError> {
    let (email, password) = (email.trim(), password.trim());
    if email.is_empty() || password.is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    Ok((email, password))
}
