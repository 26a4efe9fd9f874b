pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod handlers;
pub mod password;
pub mod prompt;
pub mod push;
pub mod server;
pub mod session;
pub mod store;

use std::sync::Arc;

use anyhow::Result;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    pub config: Arc<config::Config>,
    pub sessions: session::SessionManager,
    pub auth: auth::AuthFlow,
}

impl AppState {
    pub fn new(store: store::Store, config: Arc<config::Config>) -> Result<Self> {
        Self::with_passwords(store, config, password::Passwords::standard()?)
    }

    pub fn with_passwords(
        store: store::Store,
        config: Arc<config::Config>,
        passwords: password::Passwords,
    ) -> Result<Self> {
        let sessions = session::SessionManager::new(&config.cookie_secret)?;
        let auth = auth::AuthFlow::new(store.clone(), config.clone(), sessions.clone(), passwords);
        Ok(Self {
            store,
            config,
            sessions,
            auth,
        })
    }
}

pub use config::{read_key_file, Config, PushSchedule};
pub use error::AppError;
pub use push::{DispatchReport, PushDispatcher};
pub use server::{router, run};
