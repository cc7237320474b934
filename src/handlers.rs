use crate::dates;
use crate::errors::{ActionError, AppError};
use crate::models::{CredentialsForm, Habit, HabitForm, HabitId, Notice, StateResponse, ToggleForm};
use crate::state::AppState;
use crate::ui::render_page;
use axum::{
    extract::{Path, State},
    response::{Html, Redirect},
    Form, Json,
};

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let today = state.controller.today();
    let snapshot = state.controller.snapshot().await;
    let notice = state.take_notice().await;
    Html(render_page(&snapshot, today, notice.as_ref()))
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn get_state(State(state): State<AppState>) -> Json<StateResponse> {
    let today = state.controller.today();
    let snapshot = state.controller.snapshot().await;
    Json(StateResponse {
        user: snapshot.user,
        today: dates::display(today),
        days: dates::last_30_days_at(today)
            .into_iter()
            .map(dates::display)
            .collect(),
        habits: snapshot.habits,
        history: snapshot.history,
    })
}

pub async fn sign_up(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Redirect {
    let notice = match state.controller.sign_up(&form.email, &form.password).await {
        Ok(outcome) if outcome.confirmation_required => {
            Notice::info("Account created. Confirm your email address if asked, then sign in.")
        }
        Ok(_) => Notice::info("Account created. Sign in to start tracking."),
        Err(err) => failure("Sign-up failed", &err),
    };
    state.flash(notice).await;
    Redirect::to("/")
}

pub async fn sign_in(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Redirect {
    if let Err(err) = state.controller.sign_in(&form.email, &form.password).await {
        state.flash(failure("Sign-in failed", &err)).await;
    }
    Redirect::to("/")
}

pub async fn sign_out(State(state): State<AppState>) -> Redirect {
    if let Err(err) = state.controller.sign_out().await {
        state.flash(failure("Sign-out failed", &err)).await;
    }
    Redirect::to("/")
}

pub async fn add_habit(State(state): State<AppState>, Form(form): Form<HabitForm>) -> Redirect {
    if let Err(err) = state.controller.add_habit(&form.name).await {
        state.flash(failure("Could not add habit", &err)).await;
    }
    Redirect::to("/")
}

pub async fn toggle_today(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<ToggleForm>,
) -> Redirect {
    if let Err(err) = state.controller.toggle_today(&habit_id(&id), form.done).await {
        state.flash(failure("Could not save today's entry", &err)).await;
    }
    Redirect::to("/")
}

pub async fn delete_habit(State(state): State<AppState>, Path(id): Path<String>) -> Redirect {
    if let Err(err) = state.controller.delete_habit(&habit_id(&id)).await {
        state.flash(failure("Could not delete habit", &err)).await;
    }
    Redirect::to("/")
}

pub async fn api_add_habit(
    State(state): State<AppState>,
    Json(payload): Json<HabitForm>,
) -> Result<Json<Habit>, AppError> {
    let habit = state.controller.add_habit(&payload.name).await?;
    Ok(Json(habit))
}

pub async fn api_toggle_today(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ToggleForm>,
) -> Result<Json<StateResponse>, AppError> {
    state.controller.toggle_today(&habit_id(&id), payload.done).await?;
    Ok(get_state(State(state)).await)
}

fn habit_id(raw: &str) -> HabitId {
    match raw.parse() {
        Ok(id) => id,
        Err(never) => match never {},
    }
}

fn failure(context: &str, err: &ActionError) -> Notice {
    Notice::error(format!("{context}: {err}"))
}
