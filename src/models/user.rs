use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Driver,
    Employee,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Role::Admin),
            "driver" => Some(Role::Driver),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Driver => "driver",
            Role::Employee => "employee",
        }
    }
}

/// Custom claims attached to an account by the provisioning tools.
///
/// A missing `businessIds` claim marks a legacy single-tenant account that
/// may act on every tenant. A present but empty list grants none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_ids: Option<Vec<String>>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub uid: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Option<Role>,
    pub claims: Claims,
    pub created_at: DateTime<Utc>,
}

impl Claims {
    pub fn scoped_to(business_id: &str) -> Self {
        Self {
            business_ids: Some(vec![business_id.to_string()]),
            roles: Vec::new(),
        }
    }
}

impl UserRecord {
    /// The explicit role, else the first recognised role claim.
    pub fn effective_role(&self) -> Option<Role> {
        self.role
            .or_else(|| self.claims.roles.iter().find_map(|raw| Role::parse(raw)))
    }
}

/// An authenticated console session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: Uuid,
    pub uid: Uuid,
    pub email: String,
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_ids: Option<Vec<String>>,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    /// Accounts without a `businessIds` claim predate multi-tenancy and may
    /// act on every tenant.
    pub fn can_access(&self, tenant: &str) -> bool {
        match &self.business_ids {
            None => true,
            Some(ids) => ids.iter().any(|id| id == tenant),
        }
    }
}
