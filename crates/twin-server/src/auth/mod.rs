//! Caller identity
//!
//! Authentication happens upstream (an API gateway or auth proxy). This module
//! reads the verified identity the gateway forwards, maps it to a local user
//! row, and decides admin status. Whether a caller may touch a given asset is
//! the job of [`access`].

use axum::http::HeaderMap;
use std::sync::Arc;

use crate::db::UserStore;
use crate::error::AppError;

pub mod access;

pub use access::{authorize, is_visible, AccessDenied, Operation};

/// Header carrying the authenticated subject.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Comma separated role list.
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Subject and role every request maps to when authentication is disabled.
pub const ANONYMOUS_SUBJECT: &str = "anonymous";

/// Identity asserted by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

pub trait IdentityProvider: Send + Sync {
    /// `None` when the request carries no identity.
    fn identify(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Reads `x-user-id` / `x-user-roles` as set by the gateway.
#[derive(Debug, Clone, Default)]
pub struct GatewayHeaderProvider;

impl IdentityProvider for GatewayHeaderProvider {
    fn identify(&self, headers: &HeaderMap) -> Option<Identity> {
        let subject = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())?;

        let roles = headers
            .get(USER_ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(Identity::new(subject, roles))
    }
}

/// How requests are authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Identity comes from the provider; `admin_role` grants write access to everything.
    Enforced { admin_role: String },
    /// Every request is the shared anonymous user.
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub subject: String,
    pub roles: Vec<String>,
    pub is_admin: bool,
}

/// Who is making a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(AuthenticatedUser),
}

impl Caller {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Caller::Anonymous => None,
            Caller::User(user) => Some(user.id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Caller::User(user) if user.is_admin)
    }
}

/// Turns request headers into a [`Caller`]
#[derive(Clone)]
pub struct CallerResolver {
    policy: AuthPolicy,
    provider: Arc<dyn IdentityProvider>,
    users: Arc<dyn UserStore>,
}

impl CallerResolver {
    pub fn new(
        policy: AuthPolicy,
        provider: Arc<dyn IdentityProvider>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            policy,
            provider,
            users,
        }
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    fn identity(&self, headers: &HeaderMap) -> Option<Identity> {
        match self.policy {
            AuthPolicy::Anonymous => Some(Identity::new(
                ANONYMOUS_SUBJECT,
                vec![ANONYMOUS_SUBJECT.to_string()],
            )),
            AuthPolicy::Enforced { .. } => self.provider.identify(headers),
        }
    }

    /// Strict resolution for write paths: a user store failure is a 500.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Caller, AppError> {
        let Some(identity) = self.identity(headers) else {
            return Ok(Caller::Anonymous);
        };

        let id = self.users.find_or_create(&identity).await.map_err(|e| {
            tracing::error!(subject = %identity.subject, error = %e, "Failed to resolve user");
            AppError::Internal("Failed to resolve user".to_string())
        })?;

        let is_admin = match self.policy {
            AuthPolicy::Enforced { ref admin_role } => identity.has_role(admin_role),
            AuthPolicy::Anonymous => false,
        };

        Ok(Caller::User(AuthenticatedUser {
            id,
            subject: identity.subject,
            roles: identity.roles,
            is_admin,
        }))
    }

    /// Lenient resolution for read paths: any failure degrades to anonymous,
    /// so public assets stay readable when the user store is down.
    pub async fn resolve_lenient(&self, headers: &HeaderMap) -> Caller {
        match self.resolve(headers).await {
            Ok(caller) => caller,
            Err(e) => {
                tracing::warn!(error = %e, "Falling back to anonymous caller");
                Caller::Anonymous
            },
        }
    }

    /// Strict resolution that also rejects anonymous callers.
    pub async fn require_user(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AppError> {
        match self.resolve(headers).await? {
            Caller::User(user) => Ok(user),
            Caller::Anonymous => Err(AccessDenied::Unauthenticated.into()),
        }
    }
}
