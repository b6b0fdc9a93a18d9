//! Abstract backend interface.
//!
//! Authentication, relational records and object storage are separate
//! capabilities behind the [`Auth`], [`Records`] and [`Blobs`] traits. The
//! HTTP layer only ever talks to a [`Backend`] bundle, so any of the three
//! can be swapped for another implementation or a test double.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    CurrentUser, NewObservation, NewPlant, Observation, Plant, Profile, Role, Session, SignUp,
    User,
};

/// A change in authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A new account was registered.
    SignedUp {
        /// The new account.
        user_id: Uuid,
    },
    /// A session was created.
    SignedIn {
        /// The signed-in account.
        user_id: Uuid,
    },
    /// A session was revoked.
    SignedOut {
        /// The account whose session ended.
        user_id: Uuid,
    },
}

/// Account and session management.
#[async_trait::async_trait]
pub trait Auth: Send + Sync {
    /// Register a new account and its profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid or the email is taken.
    async fn sign_up(&self, request: SignUp) -> Result<User>;

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidCredentials`] if they don't match.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Revoke a session. Unknown tokens are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    async fn sign_out(&self, access_token: &str) -> Result<()>;

    /// Resolve a session token to its caller.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Unauthorized`] for unknown or expired tokens.
    async fn current_user(&self, access_token: &str) -> Result<CurrentUser>;

    /// Subscribe to sign-up, sign-in and sign-out events.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Filter for [`Records::query_plants`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlantQuery {
    /// Only plants assigned to this student.
    pub assigned_to: Option<Uuid>,
    /// Only plants assigned by this teacher.
    pub assigned_by: Option<Uuid>,
}

/// Filter for [`Records::query_observations`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservationQuery {
    /// Only observations recorded by this student.
    pub student_id: Option<Uuid>,
    /// Only observations of this plant.
    pub plant_id: Option<i64>,
}

/// Filter for [`Records::query_profiles`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileQuery {
    /// Only profiles holding this role.
    pub role: Option<Role>,
}

/// Relational record storage.
///
/// Query results are ordered: plants and observations newest first,
/// profiles by full name.
#[async_trait::async_trait]
pub trait Records: Send + Sync {
    /// Store a plant assignment.
    ///
    /// # Errors
    ///
    /// Returns an error if the referenced profiles don't exist or the
    /// backend request fails.
    async fn create_plant(&self, plant: NewPlant) -> Result<Plant>;

    /// Store an observation.
    ///
    /// # Errors
    ///
    /// Returns an error if the referenced plant doesn't exist or the
    /// backend request fails.
    async fn create_observation(&self, observation: NewObservation) -> Result<Observation>;

    /// List plants matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    async fn query_plants(&self, query: PlantQuery) -> Result<Vec<Plant>>;

    /// List observations matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    async fn query_observations(&self, query: ObservationQuery) -> Result<Vec<Observation>>;

    /// List profiles matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    async fn query_profiles(&self, query: ProfileQuery) -> Result<Vec<Profile>>;

    /// Change a profile's role.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if no such profile exists.
    async fn update_role(&self, id: Uuid, role: Role) -> Result<Profile>;
}

/// Object storage for photos.
#[async_trait::async_trait]
pub trait Blobs: Send + Sync {
    /// Store `bytes` as `name` in `bucket`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be written.
    async fn upload(&self, bucket: &str, name: &str, bytes: &[u8], content_type: &str)
        -> Result<()>;

    /// Read an object back.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the object does not exist.
    async fn download(&self, bucket: &str, name: &str) -> Result<Vec<u8>>;

    /// Public URL for an object.
    fn public_url(&self, bucket: &str, name: &str) -> String;
}

/// The three backend capabilities, shared across request handlers.
#[derive(Clone)]
pub struct Backend {
    /// Accounts and sessions.
    pub auth: Arc<dyn Auth>,
    /// Relational records.
    pub records: Arc<dyn Records>,
    /// Photo storage.
    pub blobs: Arc<dyn Blobs>,
}

impl Backend {
    /// Bundle the given capabilities.
    #[must_use]
    pub fn new(auth: Arc<dyn Auth>, records: Arc<dyn Records>, blobs: Arc<dyn Blobs>) -> Self {
        Self {
            auth,
            records,
            blobs,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}
