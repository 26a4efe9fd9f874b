use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    auth::load_session,
    config::Config,
    handlers::{
        create_note, delete_note, delete_subscription, health, list_notes, me,
        save_subscription, sign_in, sign_out, sign_up, vapid_public_key,
    },
    push::PushDispatcher,
    store::Store,
    AppState,
};

/// Every route, wrapped in session resolution, panic recovery and request tracing.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/sign-up", post(sign_up))
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
        .route("/me", get(me))
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/{id}", delete(delete_note))
        .route("/push/vapid-public-key", get(vapid_public_key))
        .route(
            "/push/subscriptions",
            post(save_subscription).delete(delete_subscription),
        )
        .layer(middleware::from_fn_with_state(state.clone(), load_session))
        .with_state(state)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: Config) -> Result<()> {
    let config = Arc::new(cfg);

    info!(db_path = %config.db_path.display(), "opening database");
    let store = Store::open(&config.db_path).context("open store")?;

    match PushDispatcher::from_config(&config, store.clone())? {
        Some(dispatcher) => {
            info!(
                time_zone = %config.push.time_zone,
                hour = config.push.hour,
                minute = config.push.minute,
                "daily reminders enabled"
            );
            dispatcher.spawn();
        }
        None => warn!("FANKS_VAPID_PRIVATE_KEY_FILE not set; daily reminders disabled"),
    }
    if !config.allow_signup {
        info!("sign up is disabled; set FANKS_ALLOW_SIGNUP=true to enable it");
    }

    let state = AppState::new(store, config.clone())?;
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "fanks server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}
