//! Plant assignment endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{json_body, AppState, Success};
use crate::backend::{PlantQuery, ProfileQuery};
use crate::error::{Error, Result};
use crate::model::{CurrentUser, NewPlant, Plant, Profile, Role};

const STAFF: &[Role] = &[Role::Teacher, Role::Admin];

#[derive(Debug, Serialize)]
pub(super) struct Plants {
    plants: Vec<Plant>,
}

/// Plants assigned to the caller.
pub(super) async fn fetch(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Success<Plants>> {
    let plants = state
        .backend
        .records
        .query_plants(PlantQuery {
            assigned_to: Some(user.id),
            ..PlantQuery::default()
        })
        .await?;
    Ok(Success::new(Plants { plants }))
}

/// Plants the calling teacher has handed out.
pub(super) async fn assigned(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Success<Plants>> {
    user.require("listing assigned plants", STAFF)?;
    let plants = state
        .backend
        .records
        .query_plants(PlantQuery {
            assigned_by: Some(user.id),
            ..PlantQuery::default()
        })
        .await?;
    Ok(Success::new(Plants { plants }))
}

#[derive(Debug, Deserialize)]
pub(super) struct AssignPlant {
    #[serde(default)]
    name: String,
    #[serde(default)]
    species: String,
    #[serde(default)]
    assigned_to: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub(super) struct Assigned {
    plant: Plant,
}

pub(super) async fn assign(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: std::result::Result<Json<AssignPlant>, JsonRejection>,
) -> Result<Success<Assigned>> {
    user.require("assigning plants", STAFF)?;
    let request = json_body(payload)?;

    let name = request.name.trim();
    let species = request.species.trim();
    let assigned_to = match request.assigned_to {
        Some(id) if !name.is_empty() && !species.is_empty() => id,
        _ => return Err(Error::validation("Please fill all fields.")),
    };

    let students = state
        .backend
        .records
        .query_profiles(ProfileQuery {
            role: Some(Role::Student),
        })
        .await?;
    if !students.iter().any(|profile| profile.id == assigned_to) {
        return Err(Error::validation(format!(
            "{assigned_to} is not a registered student"
        )));
    }

    let plant = state
        .backend
        .records
        .create_plant(NewPlant {
            name: name.to_string(),
            species: species.to_string(),
            assigned_to,
            assigned_by: user.id,
        })
        .await?;

    info!(
        "Plant {} ({}) assigned to {} by {}",
        plant.id, plant.species, assigned_to, user.id
    );
    Ok(Success::new(Assigned { plant }))
}

#[derive(Debug, Serialize)]
pub(super) struct Students {
    students: Vec<Profile>,
}

/// Profiles a teacher can assign plants to.
pub(super) async fn students(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Success<Students>> {
    user.require("listing students", STAFF)?;
    let students = state
        .backend
        .records
        .query_profiles(ProfileQuery {
            role: Some(Role::Student),
        })
        .await?;
    Ok(Success::new(Students { students }))
}
