use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

// ============================================================================
// Actors & authorization
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guardian,
    Driver,
    Admin,
}

/// The authenticated principal behind a request, as established by the
/// transport layer (JWT middleware).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }
}

/// Single authorization gate evaluated before any state machine entry point.
pub fn require_role(actor: &Actor, role: Role) -> Result<(), EngineError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(EngineError::Authorization(format!(
            "requires {:?} role",
            role
        )))
    }
}

// ============================================================================
// Identity / profile collaborator
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverProfile {
    pub id: Uuid,
    pub full_name: String,
    pub approved: bool,
    /// Set while the driver holds at least one accepted assignment.
    pub engaged: bool,
}

/// Lookup surface over guardian/child/driver/admin records, which live in an
/// external profile service. The engine only reads existence, ownership and
/// approval, and writes the driver engaged flag.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Owning guardian of a child profile, if the child exists.
    async fn child_guardian(&self, child_id: Uuid) -> Result<Option<Uuid>, EngineError>;

    async fn driver(&self, driver_id: Uuid) -> Result<Option<DriverProfile>, EngineError>;

    async fn set_driver_engaged(&self, driver_id: Uuid, engaged: bool) -> Result<(), EngineError>;

    /// Push tokens for the guardian's devices.
    async fn guardian_tokens(&self, guardian_id: Uuid) -> Result<Vec<String>, EngineError>;

    async fn driver_tokens(&self, driver_id: Uuid) -> Result<Vec<String>, EngineError>;

    /// Push tokens across all administrator accounts.
    async fn admin_tokens(&self) -> Result<Vec<String>, EngineError>;
}

// ============================================================================
// In-memory directory
// ============================================================================

/// Directory backed by process-local maps. Serves the dev binary and every
/// test; a deployment would put the profile service behind the same trait.
#[derive(Default)]
pub struct InMemoryDirectory {
    children: RwLock<HashMap<Uuid, Uuid>>,
    drivers: RwLock<HashMap<Uuid, DriverProfile>>,
    guardian_tokens: RwLock<HashMap<Uuid, Vec<String>>>,
    driver_tokens: RwLock<HashMap<Uuid, Vec<String>>>,
    admin_tokens: RwLock<Vec<String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_child(&self, child_id: Uuid, guardian_id: Uuid) {
        self.children.write().unwrap().insert(child_id, guardian_id);
    }

    pub fn register_guardian(&self, guardian_id: Uuid, tokens: Vec<String>) {
        self.guardian_tokens
            .write()
            .unwrap()
            .insert(guardian_id, tokens);
    }

    pub fn register_driver(&self, profile: DriverProfile, tokens: Vec<String>) {
        self.driver_tokens
            .write()
            .unwrap()
            .insert(profile.id, tokens);
        self.drivers.write().unwrap().insert(profile.id, profile);
    }

    pub fn register_admin_tokens(&self, tokens: Vec<String>) {
        self.admin_tokens.write().unwrap().extend(tokens);
    }

    pub fn set_driver_approved(&self, driver_id: Uuid, approved: bool) {
        if let Some(profile) = self.drivers.write().unwrap().get_mut(&driver_id) {
            profile.approved = approved;
        }
    }

    pub fn driver_engaged(&self, driver_id: Uuid) -> bool {
        self.drivers
            .read()
            .unwrap()
            .get(&driver_id)
            .map(|p| p.engaged)
            .unwrap_or(false)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryDirectory {
    async fn child_guardian(&self, child_id: Uuid) -> Result<Option<Uuid>, EngineError> {
        Ok(self.children.read().unwrap().get(&child_id).copied())
    }

    async fn driver(&self, driver_id: Uuid) -> Result<Option<DriverProfile>, EngineError> {
        Ok(self.drivers.read().unwrap().get(&driver_id).cloned())
    }

    async fn set_driver_engaged(&self, driver_id: Uuid, engaged: bool) -> Result<(), EngineError> {
        match self.drivers.write().unwrap().get_mut(&driver_id) {
            Some(profile) => {
                profile.engaged = engaged;
                Ok(())
            }
            None => Err(EngineError::not_found("driver not found")),
        }
    }

    async fn guardian_tokens(&self, guardian_id: Uuid) -> Result<Vec<String>, EngineError> {
        Ok(self
            .guardian_tokens
            .read()
            .unwrap()
            .get(&guardian_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn driver_tokens(&self, driver_id: Uuid) -> Result<Vec<String>, EngineError> {
        Ok(self
            .driver_tokens
            .read()
            .unwrap()
            .get(&driver_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn admin_tokens(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.admin_tokens.read().unwrap().clone())
    }
}
