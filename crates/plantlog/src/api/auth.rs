//! Sign-up, sign-in and session endpoints, plus the bearer-token extractors.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequestParts, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{json_body, AppState, Success};
use crate::error::{Error, Result};
use crate::model::{CurrentUser, Session, SignUp, User};

/// The raw bearer token from the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for AccessToken {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(Error::Unauthorized)?;

        let (scheme, token) = header.trim().split_once(' ').ok_or(Error::Unauthorized)?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return Err(Error::Unauthorized);
        }
        Ok(Self(token.to_string()))
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let AccessToken(token) = AccessToken::from_request_parts(parts, state).await?;
        state.backend.auth.current_user(&token).await
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub(super) struct LoggedIn {
    user: User,
    session: Session,
}

pub(super) async fn login(
    State(state): State<AppState>,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Success<LoggedIn>> {
    let request = json_body(payload)?;
    let session = state
        .backend
        .auth
        .sign_in(request.email.trim(), &request.password)
        .await?;
    Ok(Success::new(LoggedIn {
        user: session.user.clone(),
        session,
    }))
}

#[derive(Debug, Serialize)]
pub(super) struct Registered {
    user: User,
}

pub(super) async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SignUp>, JsonRejection>,
) -> Result<Success<Registered>> {
    let request = json_body(payload)?;
    let user = state.backend.auth.sign_up(request).await?;
    Ok(Success::new(Registered { user }))
}

#[derive(Debug, Serialize)]
pub(super) struct Empty {}

pub(super) async fn logout(
    State(state): State<AppState>,
    AccessToken(token): AccessToken,
) -> Result<Success<Empty>> {
    state.backend.auth.sign_out(&token).await?;
    Ok(Success::new(Empty {}))
}

#[derive(Debug, Serialize)]
pub(super) struct SessionInfo {
    user: CurrentUser,
}

pub(super) async fn session(user: CurrentUser) -> Success<SessionInfo> {
    Success::new(SessionInfo { user })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::api::test_support::{app, send, signed_in};

    #[tokio::test]
    async fn test_register_and_login() {
        let app = app("auth_login");
        let (status, body) = send(
            &app,
            "POST",
            "/api/register",
            None,
            Some(json!({"email": "ana@example.com", "password": "secret-pass", "name": "Ana"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["user"]["email"], json!("ana@example.com"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({"email": "ana@example.com", "password": "secret-pass"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["session"]["token_type"], json!("bearer"));
        assert_eq!(body["user"]["id"], body["session"]["user"]["id"]);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let app = app("auth_wrong_password");
        signed_in(&app, "ben@example.com", "student").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({"email": "ben@example.com", "password": "nope-nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"success": false, "message": "Invalid login credentials"})
        );
    }

    #[tokio::test]
    async fn test_register_rejects_admin_role() {
        let app = app("auth_admin_role");
        let (status, body) = send(
            &app,
            "POST",
            "/api/register",
            None,
            Some(json!({"email": "eve@example.com", "password": "secret-pass", "role": "admin"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let app = app("auth_duplicate");
        signed_in(&app, "dup@example.com", "student").await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/register",
            None,
            Some(json!({"email": "dup@example.com", "password": "secret-pass"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], json!("User already registered"));
    }

    #[tokio::test]
    async fn test_session_and_logout() {
        let app = app("auth_session");
        let (user_id, token) = signed_in(&app, "cy@example.com", "teacher").await;

        let (status, body) = send(&app, "GET", "/api/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], json!(user_id));
        assert_eq!(body["user"]["role"], json!("teacher"));

        let (status, body) = send(&app, "POST", "/api/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));

        let (status, _) = send(&app, "GET", "/api/session", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_or_malformed_token() {
        let app = app("auth_token");
        let (status, body) = send(&app, "GET", "/api/session", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], json!("Unauthorized"));

        let (status, _) = send(&app, "GET", "/api/session", Some("   "), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
