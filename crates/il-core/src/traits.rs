//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Activity, ActivityChoice, CasAccount, Participant, SiteSettings, Slot, User};

/// Read/write contract for the planning data (slot store and registration store).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PlanningRepo: Send + Sync {
    // Read side, consumed by the admin report
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;
    async fn list_activities(&self) -> anyhow::Result<Vec<Activity>>;
    async fn list_slots(&self) -> anyhow::Result<Vec<Slot>>;
    async fn list_participants(&self) -> anyhow::Result<Vec<Participant>>;
    async fn list_choices(&self) -> anyhow::Result<Vec<ActivityChoice>>;
    /// Returns the defaults when nothing was saved yet.
    async fn load_settings(&self) -> anyhow::Result<SiteSettings>;

    // Write side
    async fn save_settings(&self, settings: SiteSettings) -> anyhow::Result<()>;
    async fn save_user(&self, user: User) -> anyhow::Result<()>;
    async fn save_activity(&self, activity: Activity) -> anyhow::Result<()>;
    async fn save_slot(&self, slot: Slot) -> anyhow::Result<()>;
    async fn save_participant(&self, participant: Participant) -> anyhow::Result<()>;
    /// Replaces every choice of a participant with a new ranked list.
    async fn replace_choices(&self, participant_id: Uuid, choices: Vec<ActivityChoice>) -> anyhow::Result<()>;
    /// Records an allocation decision for one choice.
    async fn set_accepted(&self, participant_id: Uuid, slot_id: Uuid, accepted: bool) -> anyhow::Result<()>;
}

/// Account lookups needed by the CAS login flow.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AccountRepo: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn find_cas_account(&self, user_id: Uuid) -> anyhow::Result<Option<CasAccount>>;
    /// Creates a user together with its CAS account.
    async fn create_cas_user(&self, email: &str, cas_login: &str, unique_id: &str) -> anyhow::Result<User>;
    /// Deletes a stale user and creates the CAS user in its place, atomically.
    async fn replace_with_cas_user(
        &self,
        stale_id: Uuid,
        email: &str,
        cas_login: &str,
        unique_id: &str,
    ) -> anyhow::Result<User>;
    async fn delete_user(&self, user_id: Uuid) -> anyhow::Result<()>;
    async fn touch_login(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()>;
}

/// What a CAS server tells us about a validated ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasIdentity {
    pub login: String,
    pub home_directory: String,
    pub email: String,
}

/// Identity contract for the CAS SSO path.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CasVerifier: Send + Sync {
    /// Validates a service ticket. `Ok(None)` means the CAS server refused it
    /// or left out a required attribute.
    async fn verify_ticket(&self, ticket: &str, service_url: &str) -> anyhow::Result<Option<CasIdentity>>;
}

/// Staff authentication for the admin pages.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AdminAuth: Send + Sync {
    /// Verifies a password against a stored Argon2 hash.
    async fn verify_admin_password(&self, password: &str, hash: &str) -> bool;
}
