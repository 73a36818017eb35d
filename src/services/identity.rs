use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, StatusCode};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use strum::Display;
use uuid::Uuid;

use crate::app_state::AppState;

/// Coarse role carried by the identity token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Owner,
    Reviewer,
    Admin,
}

/// The authenticated caller, as far as the pipeline cares: an id for
/// ownership and a coarse role for the two precondition checks.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
}

impl CurrentUser {
    pub fn can_review(&self) -> bool {
        matches!(self.role, Role::Reviewer | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Owners see their own documents; reviewers and admins see all.
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.id == owner_id || self.can_review()
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Uuid,
    role: Role,
    #[allow(dead_code)]
    exp: usize,
}

/// Verifies bearer tokens issued by the identity provider.
pub struct AuthKeys {
    decoding: DecodingKey,
}

impl AuthKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let data = decode::<Claims>(token, &state.auth.decoding, &Validation::default())
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(CurrentUser {
            id: data.claims.sub,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_reviewers_and_admins_can_review() {
        let owner = CurrentUser {
            id: Uuid::new_v4(),
            role: Role::Owner,
        };
        let reviewer = CurrentUser {
            id: Uuid::new_v4(),
            role: Role::Reviewer,
        };
        let admin = CurrentUser {
            id: Uuid::new_v4(),
            role: Role::Admin,
        };

        assert!(!owner.can_review());
        assert!(reviewer.can_review());
        assert!(admin.can_review());
        assert!(!reviewer.is_admin());
        assert!(admin.is_admin());
    }

    #[test]
    fn owners_only_access_their_own_documents() {
        let id = Uuid::new_v4();
        let owner = CurrentUser {
            id,
            role: Role::Owner,
        };

        assert!(owner.can_access(id));
        assert!(!owner.can_access(Uuid::new_v4()));
    }
}
