//! JSON HTTP API.
//!
//! Every endpoint answers with the same envelope: `{"success": true, ...}`
//! on success, or `{"success": false, "message": "..."}` with status 400,
//! 401 or 403 on failure. Callers authenticate with an
//! `Authorization: Bearer <access_token>` header obtained from
//! `POST /api/login`.

mod admin;
mod auth;
mod observations;
mod plants;
mod storage;

use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::backend::{AuthEvent, Backend};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::stats::MissingValues;

pub use auth::AccessToken;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Backend capabilities.
    pub backend: Backend,
    /// Default missing-value policy for correlations.
    pub missing_values: MissingValues,
}

impl AppState {
    /// Create handler state from a backend and the loaded configuration.
    #[must_use]
    pub fn new(backend: Backend, config: &Config) -> Self {
        Self {
            backend,
            missing_values: config.stats.missing_values,
        }
    }
}

/// Build the API router.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/login", post(auth::login))
        .route("/api/register", post(auth::register))
        .route("/api/logout", post(auth::logout))
        .route("/api/session", get(auth::session))
        .route("/api/observations/add", post(observations::add))
        .route("/api/observations/fetch", get(observations::fetch))
        .route("/api/observations/stats", get(observations::stats))
        .route("/api/plants/fetch", get(plants::fetch))
        .route("/api/plants/assigned", get(plants::assigned))
        .route("/api/plants/assign", post(plants::assign))
        .route("/api/students", get(plants::students))
        .route("/api/admin/users", get(admin::users))
        .route("/api/admin/plants", get(admin::plants))
        .route("/api/admin/users/{id}/role", post(admin::set_role))
        .route("/storage/{bucket}/{name}", get(storage::download))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the API server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(config: &Config, backend: Backend, listen: SocketAddr) -> Result<()> {
    let mut events = backend.auth.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AuthEvent::SignedUp { user_id }) => info!("user {} signed up", user_id),
                Ok(AuthEvent::SignedIn { user_id }) => info!("user {} signed in", user_id),
                Ok(AuthEvent::SignedOut { user_id }) => info!("user {} signed out", user_id),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("auth event log skipped {} events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let app = router(AppState::new(backend, config), config.server.max_body_bytes);
    let listener = TcpListener::bind(listen).await?;
    info!("API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}

/// Successful response envelope; `data` is flattened next to `success`.
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

impl<T: Serialize> Success<T> {
    /// Wrap a response body.
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Serialize)]
struct Failure {
    success: bool,
    message: String,
}

impl Error {
    /// HTTP status used when this error is returned by the API.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Self::DatabaseOpen { .. }
            | Self::DatabaseQuery(_)
            | Self::DatabaseMigration { .. }
            | Self::Io(_)
            | Self::BlobUpload { .. }
            | Self::Internal(_) => error!("request failed: {}", self),
            _ => warn!("request rejected: {}", self),
        }

        let body = Failure {
            success: false,
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Unwrap a JSON body, turning extractor rejections into envelope errors.
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::validation(rejection.body_text()))
}

/// Accept an integer id sent either as a number or as a numeric string,
/// as HTML `<select>` values arrive.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Int(i64),
        Text(String),
    }

    match Id::deserialize(deserializer)? {
        Id::Int(id) => Ok(id),
        Id::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {text:?}"))),
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use serde_json::json;
    use tokio::sync::broadcast;
    use uuid::Uuid;

    use super::test_support::{app, send};
    use super::*;
    use crate::backend::{Auth, ObservationQuery, PlantQuery, ProfileQuery, Records};
    use crate::model::{
        CurrentUser, NewObservation, NewPlant, Observation, Plant, Profile, Role, Session, SignUp,
        User,
    };
    use crate::storage::FsBlobs;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::forbidden("x", "admin").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::internal("bug").status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_success_envelope_flattens() {
        #[derive(Serialize)]
        struct Body {
            plants: Vec<i32>,
        }
        let value = serde_json::to_value(Success::new(Body { plants: vec![1] })).unwrap();
        assert_eq!(value, json!({"success": true, "plants": [1]}));
    }

    #[test]
    fn test_lenient_id() {
        #[derive(Deserialize)]
        struct IdBody {
            #[serde(deserialize_with = "lenient_id")]
            id: i64,
        }
        let a: IdBody = serde_json::from_value(json!({"id": 7})).unwrap();
        let b: IdBody = serde_json::from_value(json!({"id": " 8 "})).unwrap();
        assert_eq!((a.id, b.id), (7, 8));
        assert!(serde_json::from_value::<IdBody>(json!({"id": "seven"})).is_err());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = app("unknown_route");
        let (status, _) = send(&app, "GET", "/api/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_json_uses_envelope() {
        let app = app("malformed");
        let body = json!({"email": 5});
        let (status, body) = send(&app, "POST", "/api/login", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
        assert!(body["message"].is_string());
    }

    /// Backend whose record store is unreachable.
    struct Unavailable;

    #[async_trait::async_trait]
    impl Auth for Unavailable {
        async fn sign_up(&self, _: SignUp) -> Result<User> {
            Err(Error::internal("backend unavailable"))
        }
        async fn sign_in(&self, _: &str, _: &str) -> Result<Session> {
            Err(Error::internal("backend unavailable"))
        }
        async fn sign_out(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn current_user(&self, token: &str) -> Result<CurrentUser> {
            if token == "valid" {
                Ok(CurrentUser {
                    id: Uuid::nil(),
                    email: "s@example.com".to_string(),
                    role: Role::Student,
                })
            } else {
                Err(Error::Unauthorized)
            }
        }
        fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
            broadcast::channel(1).1
        }
    }

    #[async_trait::async_trait]
    impl Records for Unavailable {
        async fn create_plant(&self, _: NewPlant) -> Result<Plant> {
            Err(Error::internal("backend unavailable"))
        }
        async fn create_observation(&self, _: NewObservation) -> Result<Observation> {
            Err(Error::internal("backend unavailable"))
        }
        async fn query_plants(&self, _: PlantQuery) -> Result<Vec<Plant>> {
            Err(Error::internal("backend unavailable"))
        }
        async fn query_observations(&self, _: ObservationQuery) -> Result<Vec<Observation>> {
            Err(Error::internal("backend unavailable"))
        }
        async fn query_profiles(&self, _: ProfileQuery) -> Result<Vec<Profile>> {
            Err(Error::internal("backend unavailable"))
        }
        async fn update_role(&self, _: Uuid, _: Role) -> Result<Profile> {
            Err(Error::internal("backend unavailable"))
        }
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_message() {
        let unavailable = Arc::new(Unavailable);
        let blobs = Arc::new(FsBlobs::new(std::env::temp_dir(), "http://localhost"));
        let backend = Backend::new(unavailable.clone(), unavailable, blobs);
        let app = router(AppState::new(backend, &Config::default()), 1024 * 1024);

        let (status, body) =
            send(&app, "GET", "/api/observations/fetch", Some("valid"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"success": false, "message": "internal error: backend unavailable"})
        );

        let (status, body) = send(&app, "GET", "/api/plants/fetch", Some("stale"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"success": false, "message": "Unauthorized"}));
    }
}
