//! Local auth and record backend over [`Storage`].
//!
//! Passwords are stored as salted BLAKE3 digests and sessions as random
//! bearer tokens with a fixed lifetime. The single `SQLite` connection is
//! shared behind a mutex; every call holds it only for one short query.

use std::sync::{Mutex, MutexGuard, OnceLock};

use chrono::{Duration, Utc};
use regex::Regex;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Storage, StorageStats};
use crate::backend::{Auth, AuthEvent, ObservationQuery, PlantQuery, ProfileQuery, Records};
use crate::config::{AuthConfig, Config};
use crate::error::{Error, Result};
use crate::model::{
    CurrentUser, NewObservation, NewPlant, Observation, Plant, Profile, Role, Session, SignUp,
    User,
};

/// Capacity of the auth event channel; slow subscribers miss older events.
const EVENT_CAPACITY: usize = 64;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex is valid")
    })
}

fn digest(salt: &str, password: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize()
}

/// [`Auth`] and [`Records`] backed by a local `SQLite` database.
#[derive(Debug)]
pub struct LocalBackend {
    storage: Mutex<Storage>,
    events: broadcast::Sender<AuthEvent>,
    session_ttl: Duration,
    min_password_length: usize,
}

impl LocalBackend {
    /// Wrap an open storage.
    #[must_use]
    pub fn new(storage: Storage, auth: &AuthConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            storage: Mutex::new(storage),
            events,
            session_ttl: auth.session_ttl(),
            min_password_length: auth.min_password_length,
        }
    }

    /// Open the database named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Storage::open(config.database_path())?;
        Ok(Self::new(storage, &config.auth))
    }

    /// Create a backend over an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Storage::open_in_memory()?, &AuthConfig::default()))
    }

    fn storage(&self) -> Result<MutexGuard<'_, Storage>> {
        self.storage
            .lock()
            .map_err(|_| Error::internal("storage lock poisoned"))
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage()?.stats()
    }

    /// Delete expired sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn prune_expired_sessions(&self) -> Result<usize> {
        self.storage()?.prune_expired_sessions(Utc::now())
    }

    fn publish(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn validate_sign_up(&self, request: &SignUp) -> Result<()> {
        if !email_pattern().is_match(request.email.trim()) {
            return Err(Error::validation("Unable to validate email address: invalid format"));
        }
        if request.password.chars().count() < self.min_password_length {
            return Err(Error::validation(format!(
                "Password should be at least {} characters.",
                self.min_password_length
            )));
        }
        if !request.role.is_self_assignable() {
            return Err(Error::validation(format!(
                "role '{}' cannot be chosen at registration",
                request.role
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Auth for LocalBackend {
    async fn sign_up(&self, request: SignUp) -> Result<User> {
        self.validate_sign_up(&request)?;

        let salt = Uuid::new_v4().simple().to_string();
        let hash = digest(&salt, &request.password).to_hex().to_string();
        let full_name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let user = self.storage()?.create_user(
            request.email.trim(),
            &salt,
            &hash,
            full_name,
            request.role,
        )?;

        info!("Registered {} as {}", user.id, request.role);
        self.publish(AuthEvent::SignedUp { user_id: user.id });
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let storage = self.storage()?;
        let credentials = storage
            .credentials(email.trim())?
            .ok_or(Error::InvalidCredentials)?;

        let stored =
            blake3::Hash::from_hex(&credentials.hash).map_err(|_| Error::InvalidCredentials)?;
        // blake3::Hash equality is constant-time
        if digest(&credentials.salt, password) != stored {
            debug!("Password mismatch for {}", credentials.user.id);
            return Err(Error::InvalidCredentials);
        }

        let access_token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + self.session_ttl;
        storage.create_session(&access_token, credentials.user.id, expires_at)?;
        drop(storage);

        self.publish(AuthEvent::SignedIn {
            user_id: credentials.user.id,
        });
        Ok(Session {
            access_token,
            token_type: "bearer".to_string(),
            expires_at,
            user: credentials.user,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let user_id = self.storage()?.delete_session(access_token)?;
        if let Some(user_id) = user_id {
            self.publish(AuthEvent::SignedOut { user_id });
        }
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<CurrentUser> {
        self.storage()?
            .session_user(access_token, Utc::now())?
            .ok_or(Error::Unauthorized)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait::async_trait]
impl Records for LocalBackend {
    async fn create_plant(&self, plant: NewPlant) -> Result<Plant> {
        self.storage()?.insert_plant(&plant)
    }

    async fn create_observation(&self, observation: NewObservation) -> Result<Observation> {
        self.storage()?.insert_observation(&observation)
    }

    async fn query_plants(&self, query: PlantQuery) -> Result<Vec<Plant>> {
        self.storage()?.plants(query)
    }

    async fn query_observations(&self, query: ObservationQuery) -> Result<Vec<Observation>> {
        self.storage()?.observations(query)
    }

    async fn query_profiles(&self, query: ProfileQuery) -> Result<Vec<Profile>> {
        self.storage()?.profiles(query)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Profile> {
        self.storage()?
            .set_role(id, role)?
            .ok_or_else(|| Error::not_found("profile", id))
    }
}
