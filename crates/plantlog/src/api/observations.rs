//! Observation endpoints.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{json_body, lenient_id, AppState, Success};
use crate::backend::{ObservationQuery, PlantQuery};
use crate::error::{Error, Result};
use crate::model::{CurrentUser, Field, Measurements, NewObservation, Observation};
use crate::stats::{self, MissingValues, Report};

/// Bucket that observation photos are uploaded to.
pub const PHOTO_BUCKET: &str = "observations";

#[derive(Debug, Deserialize)]
pub(super) struct AddObservation {
    #[serde(deserialize_with = "lenient_id")]
    plant_id: i64,
    #[serde(default)]
    flower_color: Option<String>,
    #[serde(default)]
    flower_size: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    /// PNG image, base64 or as a `data:` URL.
    #[serde(default)]
    photo_base64: Option<String>,
    #[serde(flatten)]
    measurements: Measurements,
}

#[derive(Debug, Serialize)]
pub(super) struct Added {
    observation: Observation,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Blob name for a new photo; the random part keeps same-millisecond uploads apart.
fn photo_name() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}_photo.png", Utc::now().timestamp_millis(), &suffix[..8])
}

/// Decode an inline photo, tolerating a `data:image/...;base64,` prefix.
fn decode_photo(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    Ok(base64::engine::general_purpose::STANDARD.decode(payload.trim())?)
}

pub(super) async fn add(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: std::result::Result<Json<AddObservation>, JsonRejection>,
) -> Result<Success<Added>> {
    let request = json_body(payload)?;

    let assigned = state
        .backend
        .records
        .query_plants(PlantQuery {
            assigned_to: Some(user.id),
            ..PlantQuery::default()
        })
        .await?;
    if !assigned.iter().any(|plant| plant.id == request.plant_id) {
        return Err(Error::validation(format!(
            "plant {} is not assigned to you",
            request.plant_id
        )));
    }

    let photo_url = match non_blank(request.photo_base64) {
        Some(encoded) => {
            let bytes = decode_photo(&encoded)?;
            let name = photo_name();
            let blobs = &state.backend.blobs;
            blobs.upload(PHOTO_BUCKET, &name, &bytes, "image/png").await?;
            Some(blobs.public_url(PHOTO_BUCKET, &name))
        }
        None => None,
    };

    let observation = state
        .backend
        .records
        .create_observation(NewObservation {
            plant_id: request.plant_id,
            student_id: user.id,
            flower_color: non_blank(request.flower_color),
            flower_size: non_blank(request.flower_size),
            notes: non_blank(request.notes),
            photo_url,
            measurements: request.measurements,
        })
        .await?;

    info!(
        "Observation {} recorded for plant {} by {}",
        observation.id, observation.plant_id, user.id
    );
    Ok(Success::new(Added { observation }))
}

#[derive(Debug, Serialize)]
pub(super) struct Observations {
    observations: Vec<Observation>,
}

async fn own_observations(state: &AppState, user: &CurrentUser) -> Result<Vec<Observation>> {
    state
        .backend
        .records
        .query_observations(ObservationQuery {
            student_id: Some(user.id),
            ..ObservationQuery::default()
        })
        .await
}

pub(super) async fn fetch(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Success<Observations>> {
    let observations = own_observations(&state, &user).await?;
    Ok(Success::new(Observations { observations }))
}

/// Query string of `GET /api/observations/stats`.
///
/// `fields` and `pairs` are comma-separated, e.g.
/// `?fields=plant_height,leaf_area&pairs=plant_height:leaf_area`.
#[derive(Debug, Default, Deserialize)]
pub(super) struct StatsParams {
    #[serde(default)]
    fields: Option<String>,
    #[serde(default)]
    pairs: Option<String>,
    #[serde(default)]
    missing: Option<MissingValues>,
}

fn split_list(list: Option<&str>) -> impl Iterator<Item = &str> {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
}

#[derive(Debug, Serialize)]
pub(super) struct Stats {
    report: Report,
}

pub(super) async fn stats(
    State(state): State<AppState>,
    user: CurrentUser,
    params: std::result::Result<Query<StatsParams>, QueryRejection>,
) -> Result<Success<Stats>> {
    let Query(params) = params.map_err(|rejection| Error::validation(rejection.body_text()))?;
    let fields = split_list(params.fields.as_deref())
        .map(str::parse::<Field>)
        .collect::<Result<Vec<_>>>()?;
    let pairs = split_list(params.pairs.as_deref())
        .map(stats::parse_pair)
        .collect::<Result<Vec<_>>>()?;
    let missing = params.missing.unwrap_or(state.missing_values);

    let observations = own_observations(&state, &user).await?;
    let report = stats::report(&observations, &fields, &pairs, missing);
    Ok(Success::new(Stats { report }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::Router;
    use serde_json::{json, Value};

    use super::*;
    use crate::api::test_support::{app, send, signed_in};

    /// Teacher assigns one plant to a fresh student; returns the student's
    /// token and the plant id.
    async fn student_with_plant(app: &Router) -> (String, i64) {
        let (_, teacher) = signed_in(app, "teach@example.com", "teacher").await;
        let (student_id, student) = signed_in(app, "stu@example.com", "student").await;
        let (status, body) = send(
            app,
            "POST",
            "/api/plants/assign",
            Some(&teacher),
            Some(json!({"name": "Rose", "species": "Rosa", "assigned_to": student_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (student, body["plant"]["id"].as_i64().unwrap())
    }

    async fn add(app: &Router, token: &str, body: Value) -> (StatusCode, Value) {
        send(app, "POST", "/api/observations/add", Some(token), Some(body)).await
    }

    #[test]
    fn test_decode_photo_accepts_data_url() {
        assert_eq!(decode_photo("aGk=").unwrap(), b"hi");
        assert_eq!(decode_photo("data:image/png;base64,aGk=").unwrap(), b"hi");
        assert!(decode_photo("not base64!").is_err());
    }

    #[tokio::test]
    async fn test_add_and_fetch() {
        let app = app("obs_add_fetch");
        let (token, plant_id) = student_with_plant(&app).await;

        let (status, body) = add(
            &app,
            &token,
            json!({
                "plant_id": plant_id.to_string(),
                "plant_height": "12.5",
                "leaf_area": 30,
                "plant_spread": "",
                "flower_color": "  ",
                "notes": "first bud",
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let observation = &body["observation"];
        assert_eq!(observation["plant_height"], json!(12.5));
        assert_eq!(observation["leaf_area"], json!(30.0));
        assert_eq!(observation["plant_spread"], Value::Null);
        assert_eq!(observation["flower_color"], Value::Null);
        assert_eq!(observation["notes"], json!("first bud"));

        add(&app, &token, json!({"plant_id": plant_id, "plant_height": 14})).await;

        let (status, body) = send(&app, "GET", "/api/observations/fetch", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let list = body["observations"].as_array().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["plant_height"], json!(14.0));
    }

    #[tokio::test]
    async fn test_add_with_photo() {
        let app = app("obs_photo");
        let (token, plant_id) = student_with_plant(&app).await;

        let (status, body) = add(
            &app,
            &token,
            json!({"plant_id": plant_id, "photo_base64": "data:image/png;base64,iVBORw0KGgo="}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let url = body["observation"]["photo_url"].as_str().unwrap();
        assert!(url.starts_with("http://localhost:3000/storage/observations/"));
        assert!(url.ends_with("_photo.png"));

        let path = url.trim_start_matches("http://localhost:3000");
        let (status, _) = send(&app, "GET", path, None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_photo_names_are_unique() {
        let first = photo_name();
        let second = photo_name();
        assert_ne!(first, second);
        let parts: Vec<&str> = first.split('_').collect();
        assert_eq!(parts.len(), 3, "{first}");
        assert!(parts[0].parse::<i64>().is_ok());
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(parts[2], "photo.png");
    }

    #[tokio::test]
    async fn test_add_two_photos_keeps_both() {
        let app = app("obs_two_photos");
        let (token, plant_id) = student_with_plant(&app).await;
        let photo = json!({"plant_id": plant_id, "photo_base64": "iVBORw0KGgo="});

        let (_, first) = add(&app, &token, photo.clone()).await;
        let (_, second) = add(&app, &token, photo).await;
        let first = first["observation"]["photo_url"].as_str().unwrap().to_string();
        let second = second["observation"]["photo_url"].as_str().unwrap().to_string();
        assert_ne!(first, second);

        for url in [first, second] {
            let path = url.trim_start_matches("http://localhost:3000");
            let (status, _) = send(&app, "GET", path, None, None).await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_add_rejects_bad_photo() {
        let app = app("obs_bad_photo");
        let (token, plant_id) = student_with_plant(&app).await;
        let (status, body) = add(
            &app,
            &token,
            json!({"plant_id": plant_id, "photo_base64": "%%%"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_add_rejects_unassigned_plant() {
        let app = app("obs_unassigned");
        let (token, plant_id) = student_with_plant(&app).await;
        let (status, body) = add(&app, &token, json!({"plant_id": plant_id + 100})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("not assigned"));
    }

    #[tokio::test]
    async fn test_add_requires_session() {
        let app = app("obs_unauthorized");
        let (status, _) = send(
            &app,
            "POST",
            "/api/observations/add",
            None,
            Some(json!({"plant_id": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stats_defaults_and_overrides() {
        let app = app("obs_stats");
        let (token, plant_id) = student_with_plant(&app).await;
        for (h, s) in [(1, 2), (2, 4), (3, 6)] {
            add(
                &app,
                &token,
                json!({"plant_id": plant_id, "plant_height": h, "plant_spread": s}),
            )
            .await;
        }

        let (status, body) = send(&app, "GET", "/api/observations/stats", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let report = &body["report"];
        assert_eq!(report["observations"], json!(3));
        assert_eq!(report["missing_values"], json!("zero_fill"));
        assert_eq!(report["summaries"][0]["field"], json!("plant_height"));
        assert_eq!(report["summaries"][0]["summary"]["average"], json!(2.0));
        // leaf_area was never recorded
        assert_eq!(report["summaries"][1]["summary"], Value::Null);
        let r = report["correlations"][0]["coefficient"].as_f64().unwrap();
        assert!((r - 1.0).abs() < 1e-9);
        // zero-filled leaf_area is constant, so the coefficient is undefined
        assert_eq!(report["correlations"][1]["coefficient"], Value::Null);

        let (status, body) = send(
            &app,
            "GET",
            "/api/observations/stats?fields=plant_spread\
             &pairs=plant_spread:plant_height&missing=exclude_pairwise",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let report = &body["report"];
        assert_eq!(report["missing_values"], json!("exclude_pairwise"));
        assert_eq!(report["summaries"].as_array().unwrap().len(), 1);
        assert_eq!(report["summaries"][0]["summary"]["max"], json!(6.0));
        assert_eq!(report["correlations"][0]["x"], json!("plant_spread"));
    }

    #[tokio::test]
    async fn test_stats_unknown_field() {
        let app = app("obs_stats_unknown");
        let (_, token) = signed_in(&app, "solo@example.com", "student").await;
        let (status, body) = send(
            &app,
            "GET",
            "/api/observations/stats?fields=height",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("unknown field"));

        let (status, body) = send(
            &app,
            "GET",
            "/api/observations/stats?missing=drop",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], json!(false));
    }
}
