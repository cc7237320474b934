use super::{Gateway, GatewayError, SignUpOutcome};
use crate::config::AppConfig;
use crate::dates;
use crate::models::{Habit, HabitId, HistoryRow, Session, User};
use crate::storage::SessionStore;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Sessions this close to expiry are refreshed before the next table call.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Gateway speaking the Supabase auth (GoTrue) and PostgREST wire formats.
pub struct SupabaseGateway {
    client: Client,
    base_url: String,
    anon_key: String,
    store: SessionStore,
    session: RwLock<Option<Session>>,
    /// Held for the whole refresh round trip so one refresh token is spent
    /// once.
    refreshing: Mutex<()>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct NewHabit<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up answers with a full session, or with a bare user while email
/// confirmation is pending.
#[derive(Deserialize)]
struct SignUpResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl SupabaseGateway {
    /// Builds the gateway and restores any session left in `store`.
    pub async fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        store: SessionStore,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().build()?;
        let session = store.load().await;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            store,
            session: RwLock::new(session),
            refreshing: Mutex::new(()),
        })
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        Self::new(
            config.supabase_url.clone(),
            config.supabase_anon_key.clone(),
            SessionStore::new(config.session_path.clone()),
        )
        .await
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn request(&self, method: Method, url: String, token: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    /// Token for table calls: the session's access token, or the anon key
    /// when signed out.
    async fn bearer(&self) -> Result<String, GatewayError> {
        let expiring = self.session.read().await.as_ref().is_some_and(expires_soon);
        if expiring {
            self.refresh_if(expires_soon).await?;
        }

        Ok(self
            .session
            .read()
            .await
            .as_ref()
            .map(|session| session.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone()))
    }

    /// Refreshes the current session if `stale` still holds once no other
    /// refresh is in flight. A caller that lost the race gets the session
    /// the winner stored.
    async fn refresh_if(
        &self,
        stale: impl Fn(&Session) -> bool,
    ) -> Result<Option<Session>, GatewayError> {
        let _guard = self.refreshing.lock().await;
        let Some(current) = self.current_session().await else {
            return Ok(None);
        };
        if !stale(&current) {
            return Ok(Some(current));
        }
        self.refresh(&current.refresh_token).await.map(Some)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, GatewayError> {
        let response = self
            .request(
                Method::POST,
                self.auth_url("token?grant_type=refresh_token"),
                &self.anon_key,
            )
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        let tokens: TokenResponse = check(response).await?.json().await?;
        let session = tokens.into_session();
        self.store_session(session.clone()).await?;
        info!("refreshed session for user {}", session.user.id);
        Ok(session)
    }

    async fn store_session(&self, session: Session) -> Result<(), GatewayError> {
        self.store.persist(&session).await?;
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), GatewayError> {
        *self.session.write().await = None;
        self.store.clear().await?;
        Ok(())
    }
}

fn expires_soon(session: &Session) -> bool {
    session
        .expires_at
        .is_some_and(|expires_at| expires_at - Utc::now().timestamp() <= REFRESH_MARGIN_SECS)
}

#[async_trait]
impl Gateway for SupabaseGateway {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, GatewayError> {
        let response = self
            .request(Method::POST, self.auth_url("signup"), &self.anon_key)
            .json(&Credentials { email, password })
            .send()
            .await?;
        let body: SignUpResponse = check(response).await?.json().await?;

        match body {
            SignUpResponse {
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
                user: Some(user),
                expires_in,
                expires_at,
                ..
            } => {
                let session = TokenResponse {
                    access_token,
                    refresh_token,
                    expires_in,
                    expires_at,
                    user: user.clone(),
                }
                .into_session();
                self.store_session(session).await?;
                Ok(SignUpOutcome {
                    user: Some(user),
                    confirmation_required: false,
                })
            }
            SignUpResponse { user: Some(user), .. } => Ok(SignUpOutcome {
                user: Some(user),
                confirmation_required: true,
            }),
            SignUpResponse {
                id: Some(id), email, ..
            } => Ok(SignUpOutcome {
                user: Some(User { id, email }),
                confirmation_required: true,
            }),
            _ => Err(GatewayError::InvalidResponse(
                "sign-up returned neither a session nor a user".to_string(),
            )),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User, GatewayError> {
        let response = self
            .request(
                Method::POST,
                self.auth_url("token?grant_type=password"),
                &self.anon_key,
            )
            .json(&Credentials { email, password })
            .send()
            .await?;
        let tokens: TokenResponse = check(response).await?.json().await?;
        let session = tokens.into_session();
        let user = session.user.clone();
        self.store_session(session).await?;
        info!("signed in as user {}", user.id);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        let Some(session) = self.current_session().await else {
            return Ok(());
        };
        let outcome = match self
            .request(Method::POST, self.auth_url("logout"), &session.access_token)
            .send()
            .await
        {
            Ok(response) => check(response).await.map(drop),
            Err(err) => Err(err.into()),
        };
        // The local session goes away even if the backend refused the logout.
        self.clear_session().await?;
        outcome
    }

    async fn get_session(&self) -> Result<Option<User>, GatewayError> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };

        let response = self
            .request(Method::GET, self.auth_url("user"), &session.access_token)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            let user: User = response.json().await?;
            if user != session.user {
                self.store_session(Session {
                    user: user.clone(),
                    ..session
                })
                .await?;
            }
            return Ok(Some(user));
        }
        if status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN {
            return Err(api_error(response).await);
        }

        let rejected = session.access_token;
        match self
            .refresh_if(|current| current.access_token == rejected)
            .await
        {
            Ok(refreshed) => Ok(refreshed.map(|session| session.user)),
            Err(err) => {
                warn!("stored session rejected and could not be refreshed: {err}");
                self.clear_session().await?;
                Ok(None)
            }
        }
    }

    async fn list_habits(&self) -> Result<Vec<Habit>, GatewayError> {
        let token = self.bearer().await?;
        let response = self
            .request(Method::GET, self.rest_url("habits"), &token)
            .query(&[("select", "*"), ("order", "created_at.asc")])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn create_habit(&self, name: &str) -> Result<Habit, GatewayError> {
        let token = self.bearer().await?;
        let response = self
            .request(Method::POST, self.rest_url("habits"), &token)
            .header("Prefer", "return=representation")
            .json(&NewHabit { name })
            .send()
            .await?;
        let rows: Vec<Habit> = check(response).await?.json().await?;
        rows.into_iter().next().ok_or_else(|| {
            GatewayError::InvalidResponse("insert returned no habit row".to_string())
        })
    }

    async fn delete_habit(&self, id: &HabitId) -> Result<(), GatewayError> {
        let token = self.bearer().await?;
        let response = self
            .request(Method::DELETE, self.rest_url("habits"), &token)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn fetch_history(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<HistoryRow>, GatewayError> {
        let token = self.bearer().await?;
        let response = self
            .request(Method::GET, self.rest_url("habit_history"), &token)
            .query(&[
                ("select", "*".to_string()),
                ("date", format!("gte.{}", dates::storage(from))),
                ("date", format!("lte.{}", dates::storage(to))),
            ])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn upsert_history_entry(
        &self,
        habit_id: &HabitId,
        date: NaiveDate,
        done: bool,
    ) -> Result<(), GatewayError> {
        let token = self.bearer().await?;
        let row = HistoryRow {
            habit_id: habit_id.clone(),
            date,
            done,
        };
        let response = self
            .request(Method::POST, self.rest_url("habit_history"), &token)
            .query(&[("on_conflict", "habit_id,date")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, GatewayError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(api_error(response).await)
    }
}

async fn api_error(response: Response) -> GatewayError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    GatewayError::Api {
        status,
        message: api_message(&body),
    }
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|err| {
            err.msg
                .or(err.message)
                .or(err.error_description)
                .or(err.error)
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "unknown error".to_string()
            } else {
                body.to_string()
            }
        })
}
