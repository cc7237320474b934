pub mod app;
pub mod config;
pub mod controller;
pub mod dates;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod state;
pub mod storage;
pub mod ui;

pub use app::router;
pub use config::AppConfig;
pub use controller::Controller;
pub use gateway::{Gateway, GatewayError, SupabaseGateway};
pub use state::AppState;
pub use storage::SessionStore;
