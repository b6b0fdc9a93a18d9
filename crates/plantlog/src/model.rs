//! Core domain types for plantlog.
//!
//! This module defines the records exchanged with the backend: user
//! profiles and roles, plants and their assignments, and observations with
//! their numeric growth measurements.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// The role a profile holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Records observations for assigned plants.
    #[default]
    Student,
    /// Assigns plants to students.
    Teacher,
    /// Manages roles.
    Admin,
}

impl Role {
    /// All roles, in privilege order.
    pub const ALL: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

    /// The lowercase name used in storage and on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    /// Whether this role may be chosen at self-registration.
    #[must_use]
    pub fn is_self_assignable(self) -> bool {
        matches!(self, Self::Student | Self::Teacher)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            other => Err(Error::validation(format!("unknown role: {other}"))),
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Account identifier, shared with the profile.
    pub id: Uuid,
    /// Sign-in email.
    pub email: String,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

/// Public profile of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Same identifier as the owning [`User`].
    pub id: Uuid,
    /// Display name given at registration.
    pub full_name: Option<String>,
    /// Current role.
    pub role: Role,
}

/// An authenticated session handed out at sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token.
    pub access_token: String,
    /// Always `"bearer"`.
    pub token_type: String,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// The signed-in account.
    pub user: User,
}

/// The caller of an operation, resolved from a session token.
///
/// Every backend operation that depends on "who is asking" receives this
/// value explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    /// Account identifier.
    pub id: Uuid,
    /// Sign-in email.
    pub email: String,
    /// Role from the user's profile.
    pub role: Role,
}

impl CurrentUser {
    /// Require one of the given roles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] if the caller holds none of `allowed`.
    pub fn require(&self, action: &'static str, allowed: &[Role]) -> crate::Result<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            let required = allowed.first().map_or("admin", |r| r.as_str());
            Err(Error::forbidden(action, required))
        }
    }
}

/// Registration request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignUp {
    /// Sign-in email.
    pub email: String,
    /// Plain-text password; only its digest is stored.
    pub password: String,
    /// Display name for the profile.
    #[serde(default)]
    pub name: Option<String>,
    /// Requested role.
    #[serde(default)]
    pub role: Role,
}

/// A plant assigned to a student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plant {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Plant name.
    pub name: String,
    /// Species.
    pub species: String,
    /// Student the plant is assigned to.
    pub assigned_to: Uuid,
    /// Teacher who made the assignment.
    pub assigned_by: Option<Uuid>,
    /// When the assignment was made.
    pub created_at: DateTime<Utc>,
    /// Full name of the assigned student, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assigned_to_name: Option<String>,
    /// Full name of the assigning teacher, when known.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assigned_by_name: Option<String>,
}

/// A plant assignment to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlant {
    /// Plant name.
    pub name: String,
    /// Species.
    pub species: String,
    /// Student receiving the plant.
    pub assigned_to: Uuid,
    /// Teacher making the assignment.
    pub assigned_by: Uuid,
}

/// A numeric growth parameter recorded with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Plant height.
    PlantHeight,
    /// Plant spread.
    PlantSpread,
    /// Number of branches.
    BranchNumber,
    /// Number of nodes.
    NodeNumber,
    /// Number of leaves.
    LeafNumber,
    /// Leaf area.
    LeafArea,
    /// Number of flowers.
    FlowerCount,
    /// Flower diameter.
    FlowerDiameter,
    /// Plant age.
    PlantAge,
    /// Number of petals.
    PetalsCount,
}

impl Field {
    /// All numeric fields, in column order.
    pub const ALL: [Field; 10] = [
        Field::PlantHeight,
        Field::PlantSpread,
        Field::BranchNumber,
        Field::NodeNumber,
        Field::LeafNumber,
        Field::LeafArea,
        Field::FlowerCount,
        Field::FlowerDiameter,
        Field::PlantAge,
        Field::PetalsCount,
    ];

    /// Column / JSON key name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PlantHeight => "plant_height",
            Self::PlantSpread => "plant_spread",
            Self::BranchNumber => "branch_number",
            Self::NodeNumber => "node_number",
            Self::LeafNumber => "leaf_number",
            Self::LeafArea => "leaf_area",
            Self::FlowerCount => "flower_count",
            Self::FlowerDiameter => "flower_diameter",
            Self::PlantAge => "plant_age",
            Self::PetalsCount => "petals_count",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.name() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|f| f.name()).collect();
                Error::validation(format!(
                    "unknown field '{s}', expected one of: {}",
                    known.join(", ")
                ))
            })
    }
}

/// The numeric growth parameters of an observation.
///
/// Each value is optional: form input may leave any of them empty. On
/// input, numbers and numeric strings are accepted; anything else becomes
/// `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// Plant height.
    #[serde(default, deserialize_with = "lenient_number")]
    pub plant_height: Option<f64>,
    /// Plant spread.
    #[serde(default, deserialize_with = "lenient_number")]
    pub plant_spread: Option<f64>,
    /// Number of branches.
    #[serde(default, deserialize_with = "lenient_number")]
    pub branch_number: Option<f64>,
    /// Number of nodes.
    #[serde(default, deserialize_with = "lenient_number")]
    pub node_number: Option<f64>,
    /// Number of leaves.
    #[serde(default, deserialize_with = "lenient_number")]
    pub leaf_number: Option<f64>,
    /// Leaf area.
    #[serde(default, deserialize_with = "lenient_number")]
    pub leaf_area: Option<f64>,
    /// Number of flowers.
    #[serde(default, deserialize_with = "lenient_number")]
    pub flower_count: Option<f64>,
    /// Flower diameter.
    #[serde(default, deserialize_with = "lenient_number")]
    pub flower_diameter: Option<f64>,
    /// Plant age.
    #[serde(default, deserialize_with = "lenient_number")]
    pub plant_age: Option<f64>,
    /// Number of petals.
    #[serde(default, deserialize_with = "lenient_number")]
    pub petals_count: Option<f64>,
}

impl Measurements {
    /// Get the value recorded for `field`.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::PlantHeight => self.plant_height,
            Field::PlantSpread => self.plant_spread,
            Field::BranchNumber => self.branch_number,
            Field::NodeNumber => self.node_number,
            Field::LeafNumber => self.leaf_number,
            Field::LeafArea => self.leaf_area,
            Field::FlowerCount => self.flower_count,
            Field::FlowerDiameter => self.flower_diameter,
            Field::PlantAge => self.plant_age,
            Field::PetalsCount => self.petals_count,
        }
    }
}

/// Interpret a JSON value as a measurement.
///
/// Numbers and strings that parse as numbers yield a value; empty strings,
/// other text, `null`, booleans and containers yield `None`, as do
/// non-finite results.
#[must_use]
pub fn parse_measurement(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_measurement))
}

/// A recorded observation of one plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Storage-assigned identifier.
    pub id: i64,
    /// Observed plant.
    pub plant_id: i64,
    /// Student who recorded it.
    pub student_id: Uuid,
    /// Observed flower color, free text.
    pub flower_color: Option<String>,
    /// Observed flower size, free text.
    pub flower_size: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Public URL of the uploaded photo.
    pub photo_url: Option<String>,
    /// Numeric growth parameters.
    #[serde(flatten)]
    pub measurements: Measurements,
    /// When the observation was recorded.
    pub created_at: DateTime<Utc>,
}

impl Observation {
    /// Get a measurement by field name; unknown names yield `None`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        name.parse::<Field>()
            .ok()
            .and_then(|field| self.measurements.get(field))
    }
}

/// An observation to be stored. Fields mirror [`Observation`].
#[derive(Debug, Clone, Default, PartialEq)]
#[allow(missing_docs)]
pub struct NewObservation {
    pub plant_id: i64,
    pub student_id: Uuid,
    pub flower_color: Option<String>,
    pub flower_size: Option<String>,
    pub notes: Option<String>,
    pub photo_url: Option<String>,
    pub measurements: Measurements,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_round_trip_names() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            assert_eq!(role.to_string(), role.as_str());
        }
    }

    #[test]
    fn test_role_unknown() {
        let err = "gardener".parse::<Role>().unwrap_err();
        assert!(err.to_string().contains("gardener"));
    }

    #[test]
    fn test_role_self_assignable() {
        assert!(Role::Student.is_self_assignable());
        assert!(Role::Teacher.is_self_assignable());
        assert!(!Role::Admin.is_self_assignable());
    }

    #[test]
    fn test_role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Teacher).unwrap(), "\"teacher\"");
        let role: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_current_user_require() {
        let user = CurrentUser {
            id: Uuid::new_v4(),
            email: "t@example.com".to_string(),
            role: Role::Teacher,
        };
        assert!(user.require("assign plants", &[Role::Teacher, Role::Admin]).is_ok());

        let err = user.require("change roles", &[Role::Admin]).unwrap_err();
        assert!(err.is_forbidden());
        assert!(err.to_string().contains("admin"));
    }

    #[test]
    fn test_field_parse() {
        assert_eq!("leaf_area".parse::<Field>().unwrap(), Field::LeafArea);
        let err = "height".parse::<Field>().unwrap_err();
        assert!(err.to_string().contains("plant_height"));
    }

    #[test]
    fn test_field_names_unique() {
        let mut names: Vec<&str> = Field::ALL.iter().map(|f| f.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Field::ALL.len());
    }

    #[test]
    fn test_parse_measurement() {
        assert_eq!(parse_measurement(&json!(3)), Some(3.0));
        assert_eq!(parse_measurement(&json!(2.5)), Some(2.5));
        assert_eq!(parse_measurement(&json!("2.5")), Some(2.5));
        assert_eq!(parse_measurement(&json!(" 7 ")), Some(7.0));
        assert_eq!(parse_measurement(&json!(0)), Some(0.0));
        assert_eq!(parse_measurement(&json!("")), None);
        assert_eq!(parse_measurement(&json!("abc")), None);
        assert_eq!(parse_measurement(&json!("NaN")), None);
        assert_eq!(parse_measurement(&json!("inf")), None);
        assert_eq!(parse_measurement(&json!(null)), None);
        assert_eq!(parse_measurement(&json!(true)), None);
    }

    #[test]
    fn test_measurements_lenient_deserialize() {
        let m: Measurements = serde_json::from_value(json!({
            "plant_height": "12.5",
            "plant_spread": "",
            "leaf_area": 4,
            "flower_count": null,
            "plant_age": "old"
        }))
        .unwrap();

        assert_eq!(m.plant_height, Some(12.5));
        assert_eq!(m.plant_spread, None);
        assert_eq!(m.leaf_area, Some(4.0));
        assert_eq!(m.flower_count, None);
        assert_eq!(m.plant_age, None);
        assert_eq!(m.node_number, None);
    }

    #[test]
    fn test_observation_flattened_json() {
        let obs = Observation {
            id: 1,
            plant_id: 2,
            student_id: Uuid::nil(),
            flower_color: Some("red".to_string()),
            flower_size: None,
            notes: None,
            photo_url: None,
            measurements: Measurements {
                plant_height: Some(10.0),
                ..Measurements::default()
            },
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&obs).unwrap();
        assert_eq!(value["plant_height"], json!(10.0));
        assert_eq!(value["leaf_area"], json!(null));
        assert_eq!(obs.value("plant_height"), Some(10.0));
        assert_eq!(obs.value("not_a_field"), None);
    }
}
