use crate::models::Session;
use std::path::PathBuf;
use tokio::fs;
use tracing::error;

/// JSON file holding the signed-in session between runs.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing or unreadable files count as signed out.
    pub async fn load(&self) -> Option<Session> {
        match fs::read(&self.path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(session) => Some(session),
                Err(err) => {
                    error!("failed to parse session file: {err}");
                    None
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                error!("failed to read session file: {err}");
                None
            }
        }
    }

    pub async fn persist(&self, session: &Session) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(session)?;
        fs::write(&self.path, payload).await
    }

    pub async fn clear(&self) -> std::io::Result<()> {
        match fs::remove_file(&self.path).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
