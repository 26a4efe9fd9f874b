use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{debug, info};

use crate::{
    config::Config,
    email::normalize_email,
    error::AppError,
    password::Passwords,
    session::{SessionManager, SessionUser, SESSION_COOKIE},
    store::{NewUser, Role, Store, UserRecord},
    AppState,
};

/// A successful sign-in: the identity snapshot and the token to hand back.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: SessionUser,
    pub token: String,
}

/// Sign-up, sign-in and sign-out.
#[derive(Clone)]
pub struct AuthFlow {
    store: Store,
    config: Arc<Config>,
    sessions: SessionManager,
    passwords: Passwords,
}

impl AuthFlow {
    pub fn new(
        store: Store,
        config: Arc<Config>,
        sessions: SessionManager,
        passwords: Passwords,
    ) -> Self {
        Self {
            store,
            config,
            sessions,
            passwords,
        }
    }

    /// Register a new account. The first account ever created is an admin.
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: String,
    ) -> Result<UserRecord, AppError> {
        if !self.config.allow_signup {
            return Err(AppError::SignupDisabled);
        }
        let email = normalize_email(email).ok_or(AppError::InvalidEmail)?;
        if !self.config.signup_allowed_for(&email) {
            info!("sign up rejected by allow-list");
            return Err(AppError::EmailNotAllowed);
        }
        if self.store.user_exists(&email)? {
            return Err(AppError::AlreadyRegistered);
        }
        if password.is_empty() {
            return Err(AppError::InvalidPassword);
        }

        let passwords = self.passwords.clone();
        let password_hash = tokio::task::spawn_blocking(move || passwords.hash(&password))
            .await
            .context("join password hasher")??;

        let role = if self.store.count_users()? == 0 {
            Role::Admin
        } else {
            Role::User
        };
        let user = self.store.create_user(NewUser {
            name: name.trim().to_owned(),
            email,
            password_hash,
            role,
        })?;

        info!(user_id = user.id, role = %user.role, "user signed up");
        Ok(user)
    }

    /// Check credentials and issue a session token.
    ///
    /// Unknown addresses still cost one password verification.
    pub async fn sign_in(&self, email: &str, password: String) -> Result<SignedIn, AppError> {
        let email = normalize_email(email).ok_or(AppError::InvalidEmail)?;
        let user = self.store.find_user_by_email(&email)?;

        let passwords = self.passwords.clone();
        let stored = user.as_ref().map(|u| u.password_hash.clone());
        let matched = tokio::task::spawn_blocking(move || {
            passwords.verify(&password, stored.as_deref())
        })
        .await
        .context("join password verifier")?;

        let user = match user {
            Some(u) if matched => u,
            _ => {
                debug!("sign in failed");
                return Err(AppError::InvalidCredentials);
            }
        };

        let identity = SessionUser::from(&user);
        let token = self.sessions.create(&identity)?;
        info!(user_id = user.id, "user signed in");
        Ok(SignedIn {
            user: identity,
            token,
        })
    }

    /// The cookie that ends the browser's session.
    pub fn sign_out(&self) -> Cookie<'static> {
        self.sessions.invalidate()
    }
}

/// Identity resolved from the session cookie, attached to every request.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<SessionUser>);

/// Axum middleware that resolves the `session` cookie into [`CurrentUser`].
/// A bad cookie, or one whose account is gone or soft-deleted, degrades to an
/// anonymous request.
pub async fn load_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let mut user = state.sessions.resolve_jar(&jar);
    if user.is_none() && jar.get(SESSION_COOKIE).is_some_and(|c| !c.value().is_empty()) {
        debug!("ignoring invalid session cookie");
    }
    if let Some(u) = &user {
        match state.store.get_user(u.id) {
            Ok(Some(record)) if !record.is_deleted() => {}
            Ok(_) => {
                debug!(user_id = u.id, "ignoring session of a deleted account");
                user = None;
            }
            Err(e) => return AppError::from(e).into_response(),
        }
    }
    request.extensions_mut().insert(CurrentUser(user));
    next.run(request).await
}

/// Extractor for handlers that require a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub SessionUser);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .and_then(|c| c.0.clone())
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}
