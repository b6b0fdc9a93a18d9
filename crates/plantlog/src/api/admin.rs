//! Administration endpoints. Every handler here requires the admin role.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{json_body, AppState, Success};
use crate::backend::{PlantQuery, ProfileQuery};
use crate::error::Result;
use crate::model::{CurrentUser, Plant, Profile, Role};

#[derive(Debug, Serialize)]
pub(super) struct Users {
    users: Vec<Profile>,
}

pub(super) async fn users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Success<Users>> {
    user.require("listing users", &[Role::Admin])?;
    let users = state
        .backend
        .records
        .query_profiles(ProfileQuery::default())
        .await?;
    Ok(Success::new(Users { users }))
}

#[derive(Debug, Serialize)]
pub(super) struct Plants {
    plants: Vec<Plant>,
}

pub(super) async fn plants(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Success<Plants>> {
    user.require("listing all plants", &[Role::Admin])?;
    let plants = state
        .backend
        .records
        .query_plants(PlantQuery::default())
        .await?;
    Ok(Success::new(Plants { plants }))
}

#[derive(Debug, Deserialize)]
pub(super) struct SetRole {
    role: Role,
}

#[derive(Debug, Serialize)]
pub(super) struct Updated {
    profile: Profile,
}

pub(super) async fn set_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    payload: std::result::Result<Json<SetRole>, JsonRejection>,
) -> Result<Success<Updated>> {
    user.require("changing roles", &[Role::Admin])?;
    let request = json_body(payload)?;
    let profile = state.backend.records.update_role(id, request.role).await?;
    info!("{} set role of {} to {}", user.id, id, profile.role);
    Ok(Success::new(Updated { profile }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::Router;
    use serde_json::json;
    use uuid::Uuid;

    use crate::api::test_support::{app_with_backend, send, signed_in};
    use crate::backend::Records;
    use crate::model::Role;

    async fn admin_token(app: &Router, local: &crate::storage::LocalBackend) -> String {
        let (id, token) = signed_in(app, "root@example.com", "teacher").await;
        local
            .update_role(id.parse::<Uuid>().unwrap(), Role::Admin)
            .await
            .unwrap();
        token
    }

    #[tokio::test]
    async fn test_admin_lists_users_and_plants() {
        let (app, local) = app_with_backend("admin_lists");
        let admin = admin_token(&app, &local).await;
        let (_, teacher) = signed_in(&app, "t@example.com", "teacher").await;
        let (student_id, _) = signed_in(&app, "s@example.com", "student").await;
        send(
            &app,
            "POST",
            "/api/plants/assign",
            Some(&teacher),
            Some(json!({"name": "Fern", "species": "Pteridium", "assigned_to": student_id})),
        )
        .await;

        let (status, body) = send(&app, "GET", "/api/admin/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["users"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["full_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["root", "s", "t"]);

        let (status, body) = send(&app, "GET", "/api/admin/plants", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let plant = &body["plants"][0];
        assert_eq!(plant["assigned_to_name"], json!("s"));
        assert_eq!(plant["assigned_by_name"], json!("t"));
    }

    #[tokio::test]
    async fn test_admin_changes_role() {
        let (app, local) = app_with_backend("admin_role");
        let admin = admin_token(&app, &local).await;
        let (student_id, student) = signed_in(&app, "s@example.com", "student").await;

        let uri = format!("/api/admin/users/{student_id}/role");
        let role = json!({"role": "teacher"});
        let (status, body) = send(&app, "POST", &uri, Some(&admin), Some(role)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["role"], json!("teacher"));

        // the promoted user's live session sees the new role
        let (_, body) = send(&app, "GET", "/api/session", Some(&student), None).await;
        assert_eq!(body["user"]["role"], json!("teacher"));
    }

    #[tokio::test]
    async fn test_admin_role_errors() {
        let (app, local) = app_with_backend("admin_role_errors");
        let admin = admin_token(&app, &local).await;

        let uri = format!("/api/admin/users/{}/role", Uuid::new_v4());
        let role = json!({"role": "teacher"});
        let (status, body) = send(&app, "POST", &uri, Some(&admin), Some(role)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("profile not found"));

        let role = json!({"role": "gardener"});
        let (status, _) = send(&app, "POST", &uri, Some(&admin), Some(role)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_admin_forbidden() {
        let (app, _) = app_with_backend("admin_forbidden");
        let (teacher_id, teacher) = signed_in(&app, "t@example.com", "teacher").await;

        let (status, body) = send(&app, "GET", "/api/admin/users", Some(&teacher), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body["message"],
            json!("forbidden: listing users requires the admin role")
        );

        let uri = format!("/api/admin/users/{teacher_id}/role");
        let role = json!({"role": "admin"});
        let (status, _) = send(&app, "POST", &uri, Some(&teacher), Some(role)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
