use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Errors surfaced to HTTP clients.
///
/// Storage and other internal failures collapse into [`AppError::Persistence`],
/// whose message never reveals the cause; the cause is logged instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("that email address appears to be invalid")]
    InvalidEmail,
    #[error("that email address is not allowed to sign up")]
    EmailNotAllowed,
    #[error("that email address is already registered")]
    AlreadyRegistered,
    #[error("email address or password is incorrect")]
    InvalidCredentials,
    #[error("password must not be empty")]
    InvalidPassword,
    #[error("sign up is disabled")]
    SignupDisabled,
    #[error("{0}")]
    InvalidNote(&'static str),
    #[error("{0}")]
    InvalidSubscription(&'static str),
    #[error("you must be signed in")]
    Unauthorized,
    #[error("you can only change your own notes")]
    Forbidden,
    #[error("not found")]
    NotFound,
    /// The request body was not the JSON the endpoint expects.
    #[error("{message}")]
    InvalidBody { status: StatusCode, message: String },
    #[error("internal server error")]
    Persistence(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Persistence(e)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// `Json` extractor whose rejections render as `{"error": ...}`.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidEmail
            | AppError::EmailNotAllowed
            | AppError::InvalidPassword
            | AppError::InvalidNote(_)
            | AppError::InvalidSubscription(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AlreadyRegistered => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::SignupDisabled | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InvalidBody { status, .. } => *status,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Persistence(ref cause) = self {
            tracing::error!(error = %format!("{cause:#}"), "internal error");
        }
        (self.status(), Json(json!({"error": self.to_string()}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn persistence_hides_cause() {
        let err: AppError = anyhow::anyhow!("redb: table users is corrupt").into();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "internal server error"}));
    }

    #[tokio::test]
    async fn validation_and_auth_statuses() {
        assert_eq!(AppError::InvalidEmail.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::AlreadyRegistered.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::SignupDisabled.status(), StatusCode::FORBIDDEN);

        let (status, body) = body_of(AppError::InvalidNote("note must not be empty")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "note must not be empty");
    }

    #[tokio::test]
    async fn json_rejections_keep_status_and_use_error_body() {
        use axum::{body::Body, extract::FromRequest, http::Request};

        #[derive(Debug, serde::Deserialize)]
        struct Payload {
            #[allow(dead_code)]
            content: String,
        }

        let req = Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from("{\"content\":"))
            .unwrap();
        let err = AppJson::<Payload>::from_request(req, &()).await.unwrap_err();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("JSON"));

        let req = Request::post("/")
            .header("content-type", "text/plain")
            .body(Body::from("{}"))
            .unwrap();
        let err = AppJson::<Payload>::from_request(req, &()).await.unwrap_err();
        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body["error"].is_string());
    }
}
