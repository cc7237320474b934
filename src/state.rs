use crate::controller::Controller;
use crate::models::{Habit, HabitId, HistoryIndex, Notice, User};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything the page is rendered from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientState {
    pub user: Option<User>,
    pub habits: Vec<Habit>,
    pub history: HistoryIndex,
}

impl ClientState {
    pub fn habit(&self, id: &HabitId) -> Option<&Habit> {
        self.habits.iter().find(|habit| &habit.id == id)
    }

    pub fn has_habit_named(&self, name: &str) -> bool {
        self.habits.iter().any(|habit| habit.name == name)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub notice: Arc<Mutex<Option<Notice>>>,
}

impl AppState {
    pub fn new(controller: Controller) -> Self {
        Self {
            controller: Arc::new(controller),
            notice: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn flash(&self, notice: Notice) {
        *self.notice.lock().await = Some(notice);
    }

    pub async fn take_notice(&self) -> Option<Notice> {
        self.notice.lock().await.take()
    }
}
