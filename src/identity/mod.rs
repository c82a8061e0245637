//! Email/password identity with role claims.
//!
//! Password hashes use bcrypt. Sessions are bearer tokens kept in memory;
//! changing an account's claims revokes its sessions so the next sign-in
//! picks the new claims up.

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::user::{Claims, Role, Session, UserRecord};

pub struct IdentityProvider {
    users: DashMap<String, UserRecord>,
    sessions: DashMap<Uuid, Session>,
    bcrypt_cost: u32,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl IdentityProvider {
    pub fn new(bcrypt_cost: u32) -> Self {
        Self {
            users: DashMap::new(),
            sessions: DashMap::new(),
            bcrypt_cost,
        }
    }

    /// Creates a legacy account without a `businessIds` claim.
    pub fn create_user(
        &self,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> Result<UserRecord, AppError> {
        self.create_user_with_claims(email, password, role, Claims::default())
    }

    pub fn create_user_with_claims(
        &self,
        email: &str,
        password: &str,
        role: Option<Role>,
        claims: Claims,
    ) -> Result<UserRecord, AppError> {
        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::BadRequest("a valid email is required".to_string()));
        }
        if password.len() < 6 {
            return Err(AppError::BadRequest(
                "password must be at least 6 characters".to_string(),
            ));
        }

        let password_hash = bcrypt::hash(password, self.bcrypt_cost)
            .map_err(|err| AppError::Internal(format!("failed to hash password: {err}")))?;

        let record = UserRecord {
            uid: Uuid::new_v4(),
            email: email.clone(),
            password_hash,
            role,
            claims,
            created_at: Utc::now(),
        };

        match self.users.entry(email) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Err(AppError::Conflict(format!(
                "user {} already exists",
                entry.key()
            ))),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(record.clone());
                info!(uid = %record.uid, role = ?record.role, "user created");
                Ok(record)
            }
        }
    }

    /// Verifies credentials and opens a session.
    pub fn sign_in(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let email = normalize_email(email);
        let invalid = || AppError::Unauthorized("invalid email or password".to_string());

        let user = self
            .users
            .get(&email)
            .map(|entry| entry.value().clone())
            .ok_or_else(invalid)?;
        if !bcrypt::verify(password, &user.password_hash).unwrap_or(false) {
            warn!(uid = %user.uid, "sign-in rejected");
            return Err(invalid());
        }

        let session = Session {
            token: Uuid::new_v4(),
            uid: user.uid,
            email: user.email.clone(),
            role: user.effective_role(),
            business_ids: user.claims.business_ids.clone(),
            issued_at: Utc::now(),
        };
        self.sessions.insert(session.token, session.clone());

        info!(uid = %user.uid, role = ?session.role, "signed in");
        Ok(session)
    }

    pub fn sign_out(&self, token: &Uuid) -> bool {
        self.sessions.remove(token).is_some()
    }

    pub fn session(&self, token: &Uuid) -> Option<Session> {
        self.sessions.get(token).map(|entry| entry.value().clone())
    }

    /// Adds a business and roles to the account's claims (set union).
    pub fn set_custom_claims(
        &self,
        email: &str,
        business_id: &str,
        roles: &[String],
    ) -> Result<Claims, AppError> {
        if let Some(unknown) = roles.iter().find(|raw| Role::parse(raw).is_none()) {
            return Err(AppError::BadRequest(format!("unknown role: {unknown}")));
        }

        let claims = self.update_claims(email, |claims| {
            let business_ids = claims.business_ids.get_or_insert_with(Vec::new);
            if !business_ids.iter().any(|id| id == business_id) {
                business_ids.push(business_id.to_string());
            }
            for role in roles {
                if !claims.roles.contains(role) {
                    claims.roles.push(role.clone());
                }
            }
            Ok(())
        })?;

        info!(business_id, roles = ?claims.roles, "claims updated");
        Ok(claims)
    }

    /// Drops one business from the account's claims; roles are kept for the
    /// account's other businesses. Removing the last business leaves the
    /// account with access to none.
    pub fn remove_business_claims(&self, email: &str, business_id: &str) -> Result<Claims, AppError> {
        let claims = self.update_claims(email, |claims| match claims.business_ids.as_mut() {
            Some(business_ids) => {
                business_ids.retain(|id| id != business_id);
                Ok(())
            }
            None => Err(AppError::Conflict(
                "account is not scoped to any business; grant a business first".to_string(),
            )),
        })?;

        info!(business_id, "business removed from claims");
        Ok(claims)
    }

    fn update_claims<F>(&self, email: &str, edit: F) -> Result<Claims, AppError>
    where
        F: FnOnce(&mut Claims) -> Result<(), AppError>,
    {
        let email = normalize_email(email);
        let (uid, claims) = {
            let mut user = self
                .users
                .get_mut(&email)
                .ok_or_else(|| AppError::NotFound(format!("user {email} not found")))?;
            let mut claims = user.claims.clone();
            edit(&mut claims)?;
            user.claims = claims.clone();
            (user.uid, claims)
        };

        self.revoke_sessions(uid);
        Ok(claims)
    }

    pub fn revoke_sessions(&self, uid: Uuid) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.uid != uid);
        before.saturating_sub(self.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::IdentityProvider;
    use crate::error::AppError;
    use crate::models::user::{Claims, Role};

    fn provider() -> IdentityProvider {
        IdentityProvider::new(4)
    }

    #[test]
    fn sign_in_returns_role_claim() {
        let identity = provider();
        identity
            .create_user("Chef@Example.com", "secret-pass", Some(Role::Admin))
            .unwrap();

        let session = identity.sign_in("chef@example.com ", "secret-pass").unwrap();
        assert_eq!(session.role, Some(Role::Admin));
        assert!(identity.session(&session.token).is_some());

        assert!(identity.sign_out(&session.token));
        assert!(identity.session(&session.token).is_none());
    }

    #[test]
    fn wrong_password_is_unauthorized() {
        let identity = provider();
        identity
            .create_user("driver@example.com", "secret-pass", Some(Role::Driver))
            .unwrap();

        assert!(matches!(
            identity.sign_in("driver@example.com", "guess"),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            identity.sign_in("nobody@example.com", "secret-pass"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn duplicate_accounts_conflict() {
        let identity = provider();
        identity.create_user("a@example.com", "secret-pass", None).unwrap();

        assert!(matches!(
            identity.create_user("A@example.com", "other-pass", None),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn claims_merge_and_revoke_sessions() {
        let identity = provider();
        identity.create_user("new@example.com", "secret-pass", None).unwrap();
        let before = identity.sign_in("new@example.com", "secret-pass").unwrap();
        assert_eq!(before.role, None);

        identity
            .set_custom_claims("new@example.com", "luqma", &["driver".to_string()])
            .unwrap();
        let claims = identity
            .set_custom_claims("new@example.com", "jeeb", &["driver".to_string()])
            .unwrap();

        assert_eq!(
            claims.business_ids,
            Some(vec!["luqma".to_string(), "jeeb".to_string()])
        );
        assert_eq!(claims.roles, vec!["driver"]);
        assert!(identity.session(&before.token).is_none());

        let after = identity.sign_in("new@example.com", "secret-pass").unwrap();
        assert_eq!(after.role, Some(Role::Driver));
        assert!(after.can_access("jeeb"));
        assert!(!after.can_access("elsewhere"));

        let claims = identity
            .remove_business_claims("new@example.com", "luqma")
            .unwrap();
        assert_eq!(claims.business_ids, Some(vec!["jeeb".to_string()]));
        assert_eq!(claims.roles, vec!["driver"]);
    }

    #[test]
    fn removing_the_last_business_revokes_all_access() {
        let identity = provider();
        identity.create_user("e@example.com", "secret-pass", None).unwrap();
        identity
            .set_custom_claims("e@example.com", "luqma", &["employee".to_string()])
            .unwrap();

        let scoped = identity.sign_in("e@example.com", "secret-pass").unwrap();
        assert!(scoped.can_access("luqma"));
        assert!(!scoped.can_access("jeeb"));

        let claims = identity
            .remove_business_claims("e@example.com", "luqma")
            .unwrap();
        assert_eq!(claims.business_ids, Some(Vec::new()));
        assert!(identity.session(&scoped.token).is_none());

        let after = identity.sign_in("e@example.com", "secret-pass").unwrap();
        assert!(!after.can_access("luqma"));
        assert!(!after.can_access("jeeb"));
    }

    #[test]
    fn legacy_accounts_cannot_lose_a_business() {
        let identity = provider();
        identity
            .create_user("owner@example.com", "secret-pass", Some(Role::Admin))
            .unwrap();

        assert!(matches!(
            identity.remove_business_claims("owner@example.com", "luqma"),
            Err(AppError::Conflict(_))
        ));
        let session = identity.sign_in("owner@example.com", "secret-pass").unwrap();
        assert!(session.can_access("luqma"));
    }

    #[test]
    fn scoped_accounts_start_with_one_business() {
        let identity = provider();
        identity
            .create_user_with_claims(
                "chef@example.com",
                "secret-pass",
                Some(Role::Admin),
                Claims::scoped_to("luqma"),
            )
            .unwrap();

        let session = identity.sign_in("chef@example.com", "secret-pass").unwrap();
        assert!(session.can_access("luqma"));
        assert!(!session.can_access("jeeb"));
    }

    #[test]
    fn unknown_roles_are_rejected() {
        let identity = provider();
        identity.create_user("x@example.com", "secret-pass", None).unwrap();

        assert!(matches!(
            identity.set_custom_claims("x@example.com", "luqma", &["owner".to_string()]),
            Err(AppError::BadRequest(_))
        ));
    }
}
