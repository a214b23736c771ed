//! User directory projection used to populate records for display.

use serde::Serialize;
use workplanner_core::{Identity, Role};

/// Embedded summary of a referenced user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub role: Role,
}

impl UserSummary {
    /// Placeholder for a reference whose directory row is missing.
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "Unknown user".into(),
            email: String::new(),
            department: String::new(),
            role: Role::Worker,
        }
    }
}

impl From<&Identity> for UserSummary {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.user_id.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            department: identity.department.clone(),
            role: identity.role,
        }
    }
}
