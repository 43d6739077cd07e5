use chrono::{DateTime, Utc};
use serde::Serialize;

use crudforge_auth::JwtClaims;

/// Authenticated identity attached to a request by the bearer guard.
///
/// Handlers behind the guard read it with `Extension<Identity>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    subject: String,
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self {
            subject: claims.sub.clone(),
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}
