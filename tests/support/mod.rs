//! In-process stand-in for the hosted backend: auth plus the two tables,
//! with rows scoped to the caller's user the way row-level security does.
#![allow(dead_code)]

use axum::{
    extract::{Query, RawQuery, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const ANON_KEY: &str = "test-anon-key";

#[derive(Default)]
struct Db {
    users: Vec<FakeUser>,
    habits: Vec<HabitRow>,
    history: Vec<HistoryRow>,
    next_id: i64,
    generation: u32,
    refresh_revoked: bool,
    failing: HashSet<String>,
    signup_reply: SignupReply,
    requests: Vec<String>,
}

/// What a successful sign-up answers with.
#[derive(Clone, Copy, Default)]
pub enum SignupReply {
    #[default]
    Session,
    /// Confirmation pending: `{"user": {..}}` and no tokens.
    BareUser,
    /// Confirmation pending, older servers: the user object at top level.
    TopLevelUser,
}

struct FakeUser {
    id: String,
    email: String,
    password: String,
}

#[derive(Clone)]
struct HabitRow {
    id: i64,
    owner: String,
    name: String,
    created_at: String,
}

#[derive(Clone)]
struct HistoryRow {
    owner: String,
    habit_id: i64,
    date: String,
    done: bool,
}

type Shared = Arc<Mutex<Db>>;

pub struct FakeSupabase {
    pub base_url: String,
    db: Shared,
}

impl FakeSupabase {
    /// Starts the backend on its own runtime thread so it outlives any
    /// single test runtime.
    pub fn spawn() -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind fake backend");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("fake backend addr");
        let db = Shared::default();
        let app = router(db.clone());

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("fake backend runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                axum::serve(listener, app).await.expect("fake backend serve");
            });
        });

        Self {
            base_url: format!("http://{addr}"),
            db,
        }
    }

    /// Invalidates every issued access token; refresh tokens keep working.
    pub fn rotate_tokens(&self) {
        self.db.lock().unwrap().generation += 1;
    }

    pub fn revoke_refresh_tokens(&self) {
        self.db.lock().unwrap().refresh_revoked = true;
    }

    /// The next request routed to `operation` fails with a 500.
    pub fn fail_next(&self, operation: &str) {
        self.db.lock().unwrap().failing.insert(operation.to_string());
    }

    pub fn reply_to_signup_with(&self, reply: SignupReply) {
        self.db.lock().unwrap().signup_reply = reply;
    }

    /// Token grants and table reads in arrival order, e.g.
    /// `token:refresh_token` then `list_habits`.
    pub fn requests(&self) -> Vec<String> {
        self.db.lock().unwrap().requests.clone()
    }

    pub fn count_requests(&self, request: &str) -> usize {
        self.requests().iter().filter(|seen| *seen == request).count()
    }

    pub fn history_len(&self) -> usize {
        self.db.lock().unwrap().history.len()
    }
}

fn router(db: Shared) -> Router {
    Router::new()
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(logout))
        .route("/auth/v1/user", get(user))
        .route(
            "/rest/v1/habits",
            get(list_habits).post(insert_habit).delete(delete_habit),
        )
        .route("/rest/v1/habit_history", get(list_history).post(upsert_history))
        .with_state(db)
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn take_failure(db: &mut Db, operation: &str) -> Option<Response> {
    db.failing.remove(operation).then(|| {
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "message": format!("{operation} exploded") }),
        )
    })
}

fn session_body(db: &Db, user: &FakeUser) -> Value {
    json!({
        "access_token": format!("access-{}-{}", db.generation, user.id),
        "refresh_token": format!("refresh-{}", user.id),
        "token_type": "bearer",
        "expires_in": 3600,
        "user": { "id": user.id, "email": user.email },
    })
}

/// Resolves the caller from the bearer token. `Err` carries the response
/// to send back.
fn caller(db: &Db, headers: &HeaderMap) -> Result<Option<String>, Response> {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some(ANON_KEY) {
        return Err(error(
            StatusCode::UNAUTHORIZED,
            json!({ "message": "No API key found in request" }),
        ));
    }
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();
    if token == ANON_KEY {
        return Ok(None);
    }
    let valid = token
        .strip_prefix("access-")
        .and_then(|rest| rest.split_once('-'))
        .filter(|(generation, _)| *generation == db.generation.to_string())
        .map(|(_, user)| user.to_string())
        .filter(|user| db.users.iter().any(|u| &u.id == user));
    match valid {
        Some(user) => Ok(Some(user)),
        None => Err(error(
            StatusCode::UNAUTHORIZED,
            json!({ "code": 401, "msg": "invalid JWT: token is expired" }),
        )),
    }
}

#[derive(Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

async fn signup(State(db): State<Shared>, Json(body): Json<Credentials>) -> Response {
    let mut db = db.lock().unwrap();
    if let Some(failure) = take_failure(&mut db, "signup") {
        return failure;
    }
    if db.users.iter().any(|u| u.email == body.email) {
        return error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "code": 422, "msg": "User already registered" }),
        );
    }
    db.next_id += 1;
    let user = FakeUser {
        id: format!("u{}", db.next_id),
        email: body.email,
        password: body.password,
    };
    let response = match db.signup_reply {
        SignupReply::Session => session_body(&db, &user),
        SignupReply::BareUser => json!({ "user": { "id": user.id, "email": user.email } }),
        SignupReply::TopLevelUser => json!({
            "id": user.id,
            "email": user.email,
            "confirmation_sent_at": Utc::now().to_rfc3339(),
        }),
    };
    db.users.push(user);
    Json(response).into_response()
}

async fn token(
    State(db): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let mut db = db.lock().unwrap();
    if let Some(failure) = take_failure(&mut db, "token") {
        return failure;
    }
    let grant = params.get("grant_type").map(String::as_str);
    db.requests.push(format!("token:{}", grant.unwrap_or_default()));
    let found = match grant {
        Some("password") => db.users.iter().find(|u| {
            Some(u.email.as_str()) == body["email"].as_str()
                && Some(u.password.as_str()) == body["password"].as_str()
        }),
        Some("refresh_token") if !db.refresh_revoked => db.users.iter().find(|u| {
            body["refresh_token"].as_str() == Some(format!("refresh-{}", u.id).as_str())
        }),
        _ => None,
    };
    match found {
        Some(user) => Json(session_body(&db, user)).into_response(),
        None => error(
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" }),
        ),
    }
}

async fn logout(State(db): State<Shared>, headers: HeaderMap) -> Response {
    let mut db = db.lock().unwrap();
    if let Some(failure) = take_failure(&mut db, "logout") {
        return failure;
    }
    match caller(&db, &headers) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(response) => response,
    }
}

async fn user(State(db): State<Shared>, headers: HeaderMap) -> Response {
    let db = db.lock().unwrap();
    match caller(&db, &headers) {
        Ok(Some(id)) => {
            let user = db.users.iter().find(|u| u.id == id);
            Json(json!({ "id": id, "email": user.map(|u| u.email.clone()) })).into_response()
        }
        Ok(None) => error(StatusCode::UNAUTHORIZED, json!({ "msg": "missing session" })),
        Err(response) => response,
    }
}

fn filters(raw: Option<String>) -> Vec<(String, String)> {
    let raw = raw.unwrap_or_default();
    reqwest::Url::parse(&format!("http://filters/?{raw}"))
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default()
}

fn habit_json(row: &HabitRow) -> Value {
    json!({ "id": row.id, "name": row.name, "created_at": row.created_at, "user_id": row.owner })
}

async fn list_habits(State(db): State<Shared>, headers: HeaderMap, RawQuery(raw): RawQuery) -> Response {
    let mut db = db.lock().unwrap();
    db.requests.push("list_habits".to_string());
    if let Some(failure) = take_failure(&mut db, "list_habits") {
        return failure;
    }
    let owner = match caller(&db, &headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };
    let mut rows: Vec<HabitRow> = db
        .habits
        .iter()
        .filter(|row| Some(&row.owner) == owner.as_ref())
        .cloned()
        .collect();
    if filters(raw).iter().any(|(k, v)| k == "order" && v == "created_at.asc") {
        rows.sort_by(|a, b| (&a.created_at, a.id).cmp(&(&b.created_at, b.id)));
    } else {
        rows.reverse();
    }
    Json(rows.iter().map(habit_json).collect::<Vec<_>>()).into_response()
}

async fn insert_habit(State(db): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let mut db = db.lock().unwrap();
    if let Some(failure) = take_failure(&mut db, "insert_habit") {
        return failure;
    }
    let owner = match caller(&db, &headers) {
        Ok(Some(owner)) => owner,
        Ok(None) => {
            return error(
                StatusCode::FORBIDDEN,
                json!({ "code": "42501", "message": "new row violates row-level security policy" }),
            );
        }
        Err(response) => return response,
    };
    let name = body["name"].as_str().unwrap_or_default().to_string();
    if db.habits.iter().any(|row| row.owner == owner && row.name == name) {
        return error(
            StatusCode::CONFLICT,
            json!({ "code": "23505", "message": "duplicate key value violates unique constraint" }),
        );
    }
    db.next_id += 1;
    let row = HabitRow {
        id: db.next_id,
        owner,
        name,
        created_at: Utc::now().to_rfc3339(),
    };
    db.habits.push(row.clone());
    (StatusCode::CREATED, Json(json!([habit_json(&row)]))).into_response()
}

async fn delete_habit(State(db): State<Shared>, headers: HeaderMap, RawQuery(raw): RawQuery) -> Response {
    let mut db = db.lock().unwrap();
    if let Some(failure) = take_failure(&mut db, "delete_habit") {
        return failure;
    }
    let owner = match caller(&db, &headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };
    let id = filters(raw)
        .into_iter()
        .find(|(k, _)| k == "id")
        .and_then(|(_, v)| v.strip_prefix("eq.").and_then(|id| id.parse::<i64>().ok()));
    if let Some(id) = id {
        db.habits
            .retain(|row| !(row.id == id && Some(&row.owner) == owner.as_ref()));
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_history(State(db): State<Shared>, headers: HeaderMap, RawQuery(raw): RawQuery) -> Response {
    let mut db = db.lock().unwrap();
    if let Some(failure) = take_failure(&mut db, "list_history") {
        return failure;
    }
    let owner = match caller(&db, &headers) {
        Ok(owner) => owner,
        Err(response) => return response,
    };
    let filters = filters(raw);
    let rows: Vec<Value> = db
        .history
        .iter()
        .filter(|row| Some(&row.owner) == owner.as_ref())
        .filter(|row| {
            filters.iter().filter(|(k, _)| k == "date").all(|(_, v)| {
                match v.split_once('.') {
                    Some(("gte", bound)) => row.date.as_str() >= bound,
                    Some(("lte", bound)) => row.date.as_str() <= bound,
                    _ => false,
                }
            })
        })
        .map(|row| json!({ "habit_id": row.habit_id, "date": row.date, "done": row.done }))
        .collect();
    Json(rows).into_response()
}

async fn upsert_history(
    State(db): State<Shared>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
    Json(body): Json<Value>,
) -> Response {
    let mut db = db.lock().unwrap();
    if let Some(failure) = take_failure(&mut db, "upsert_history") {
        return failure;
    }
    let owner = match caller(&db, &headers) {
        Ok(Some(owner)) => owner,
        Ok(None) => {
            return error(
                StatusCode::FORBIDDEN,
                json!({ "message": "new row violates row-level security policy" }),
            );
        }
        Err(response) => return response,
    };
    let merges = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("resolution=merge-duplicates"));
    let keyed = filters(raw)
        .iter()
        .any(|(k, v)| k == "on_conflict" && v == "habit_id,date");

    let habit_id = body["habit_id"].as_i64().unwrap_or_default();
    let date = body["date"].as_str().unwrap_or_default().to_string();
    let done = body["done"].as_bool().unwrap_or_default();

    let existing = db
        .history
        .iter()
        .position(|row| row.habit_id == habit_id && row.date == date);
    match existing {
        Some(index) if merges && keyed => db.history[index].done = done,
        Some(_) => {
            return error(
                StatusCode::CONFLICT,
                json!({ "code": "23505", "message": "duplicate key value violates unique constraint" }),
            );
        }
        None => db.history.push(HistoryRow {
            owner,
            habit_id,
            date,
            done,
        }),
    }
    StatusCode::CREATED.into_response()
}
