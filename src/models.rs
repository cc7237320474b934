use crate::dates;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Row key of a habit. The backend may hand out integer or text keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HabitId {
    Int(i64),
    Text(String),
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl FromStr for HabitId {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(value
            .parse::<i64>()
            .map(Self::Int)
            .unwrap_or_else(|_| Self::Text(value.to_string())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub habit_id: HabitId,
    pub date: NaiveDate,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Authenticated backend session, persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

/// Per-habit, per-day completion flags keyed by habit name and `dd.mm.`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HistoryIndex(BTreeMap<String, BTreeMap<String, bool>>);

impl HistoryIndex {
    /// Rebuilds the index from backend rows. Rows for habits not in `habits`
    /// are dropped.
    pub fn rebuild(habits: &[Habit], rows: &[HistoryRow]) -> Self {
        let mut index = Self::default();
        for row in rows {
            let Some(habit) = habits.iter().find(|habit| habit.id == row.habit_id) else {
                continue;
            };
            index.set(&habit.name, &dates::display(row.date), row.done);
        }
        index
    }

    pub fn is_done(&self, habit: &str, day: &str) -> bool {
        self.0
            .get(habit)
            .and_then(|days| days.get(day))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, habit: &str, day: &str, done: bool) {
        self.0
            .entry(habit.to_string())
            .or_default()
            .insert(day.to_string(), done);
    }

    /// Replaces any entry for `habit` with an empty one.
    pub fn reset(&mut self, habit: &str) {
        self.0.insert(habit.to_string(), BTreeMap::new());
    }

    pub fn remove(&mut self, habit: &str) {
        self.0.remove(habit);
    }

    pub fn days(&self, habit: &str) -> Option<&BTreeMap<String, bool>> {
        self.0.get(habit)
    }

    pub fn contains(&self, habit: &str) -> bool {
        self.0.contains_key(habit)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct HabitForm {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleForm {
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Info,
    Error,
}

/// One-shot message shown on the next page render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub user: Option<User>,
    pub today: String,
    pub days: Vec<String>,
    pub habits: Vec<Habit>,
    pub history: HistoryIndex,
}
