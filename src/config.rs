use std::{env, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is not valid: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub session_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { name: "PORT", value })?,
            None => 8080,
        };

        let supabase_url = lookup("SUPABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        if !supabase_url.starts_with("http://") && !supabase_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "SUPABASE_URL",
                value: supabase_url,
            });
        }

        let supabase_anon_key = lookup("SUPABASE_ANON_KEY")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;

        let session_path = lookup("APP_SESSION_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/session.json"));

        Ok(Self {
            port,
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            supabase_anon_key,
            session_path,
        })
    }
}
