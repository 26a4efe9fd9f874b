use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    auth::AuthUser,
    error::{AppError, AppJson},
    prompt::prompt_or_random,
    session::SessionUser,
    store::{FeedEntry, NewSubscription},
    AppState,
};

pub const MAX_NOTE_CHARS: usize = 1000;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Auth ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub async fn sign_up(
    State(state): State<AppState>,
    AppJson(body): AppJson<SignUpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .auth
        .sign_up(&body.name, &body.email, body.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"user": SessionUser::from(&user)})),
    ))
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(body): AppJson<SignInRequest>,
) -> Result<impl IntoResponse, AppError> {
    let signed_in = state.auth.sign_in(&body.email, body.password).await?;
    let jar = jar.add(state.sessions.cookie(signed_in.token));
    Ok((jar, Json(json!({"user": signed_in.user}))))
}

pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (jar.add(state.auth.sign_out()), Json(json!({"signedOut": true})))
}

pub async fn me(AuthUser(user): AuthUser) -> impl IntoResponse {
    Json(json!({"user": user}))
}

// ── Notes ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteView {
    pub id: u64,
    pub content: String,
    pub author_name: String,
    pub created_at: i64,
    /// True when the signed-in user wrote the note.
    pub is_user_note: bool,
}

impl NoteView {
    fn from_feed(entry: FeedEntry, viewer_id: u64) -> Self {
        Self {
            id: entry.note.id,
            is_user_note: entry.note.user_id == viewer_id,
            content: entry.note.content,
            author_name: entry.author_name,
            created_at: entry.note.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    /// Overrides the random writing prompt.
    pub prompt: Option<String>,
}

pub async fn list_notes(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, AppError> {
    let notes: Vec<NoteView> = state
        .store
        .feed()?
        .into_iter()
        .map(|entry| NoteView::from_feed(entry, user.id))
        .collect();
    let prompt = prompt_or_random(query.prompt.as_deref());
    Ok(Json(json!({"notes": notes, "prompt": prompt})))
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub content: String,
}

pub async fn create_note(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<CreateNoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(AppError::InvalidNote("note must not be empty"));
    }
    if content.chars().count() > MAX_NOTE_CHARS {
        return Err(AppError::InvalidNote("note must be at most 1000 characters"));
    }

    let note = state.store.create_note(user.id, content)?;
    info!(note_id = note.id, user_id = user.id, "note created");

    let view = NoteView {
        id: note.id,
        content: note.content,
        author_name: user.name,
        created_at: note.created_at,
        is_user_note: true,
    };
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn delete_note(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let note = match state.store.get_note(id)? {
        Some(n) if !n.is_deleted() => n,
        _ => return Err(AppError::NotFound),
    };
    if note.user_id != user.id {
        return Err(AppError::Forbidden);
    }
    state.store.delete_note(id)?;
    info!(note_id = id, user_id = user.id, "note deleted");
    Ok(Json(json!({"deleted": true})))
}

// ── Push ──────────────────────────────────────────────────────────────────────

pub async fn vapid_public_key(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let key = state
        .config
        .vapid_public_key
        .clone()
        .ok_or(AppError::NotFound)?;
    Ok(Json(json!({"publicKey": key})))
}

/// Browser `PushSubscription.toJSON()` shape. `keys` is kept verbatim.
#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub endpoint: String,
    pub keys: serde_json::Value,
}

pub async fn save_subscription(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<SubscriptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = body.endpoint.trim();
    if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
        return Err(AppError::InvalidSubscription(
            "subscription endpoint must be an http(s) URL",
        ));
    }
    let key = |name: &str| {
        body.keys
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };
    let (Some(p256dh), Some(auth)) = (key("p256dh"), key("auth")) else {
        return Err(AppError::InvalidSubscription(
            "subscription keys must include p256dh and auth",
        ));
    };

    let sub = state.store.save_subscription(
        user.id,
        NewSubscription {
            endpoint: endpoint.to_owned(),
            p256dh,
            auth,
            keys: body.keys.to_string(),
        },
    )?;
    info!(subscription_id = sub.id, user_id = user.id, "push subscription saved");
    Ok((StatusCode::CREATED, Json(json!({"id": sub.id}))))
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: String,
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<UnsubscribeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let endpoint = body.endpoint.trim();
    let removed = state
        .store
        .delete_subscriptions_where(|s| s.user_id == user.id && s.endpoint == endpoint)?;
    if removed == 0 {
        return Err(AppError::NotFound);
    }
    info!(user_id = user.id, removed, "push subscription removed");
    Ok(Json(json!({"removed": removed})))
}
