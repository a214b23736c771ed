//! Caller identity and role-based authorization.
//!
//! Authentication happens upstream; the gateway only receives a verified
//! user id, department and role. Every protected operation has exactly one
//! predicate here so route handlers never compare role strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Worker,
    Manager,
    /// Also accepted as `hr`.
    #[serde(alias = "hr")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "worker" => Ok(Role::Worker),
            "manager" => Ok(Role::Manager),
            "admin" | "hr" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(rename = "id")]
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub department: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: &str, department: &str, role: Role) -> Self {
        Self {
            user_id: user_id.to_string(),
            name: user_id.to_string(),
            email: String::new(),
            department: department.to_string(),
            role,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn is_approver(&self) -> bool {
        matches!(self.role, Role::Manager | Role::Admin)
    }

    /// Approvers act on records of their own department; admins on any.
    fn approves_department(&self, department: &str) -> bool {
        self.is_admin() || (self.is_approver() && self.department == department)
    }

    pub fn can_create_poll(&self) -> bool {
        self.is_approver()
    }

    pub fn can_view_team(&self) -> bool {
        self.is_approver()
    }

    pub fn can_read_feedback(&self) -> bool {
        self.is_approver()
    }

    /// Whether this caller may approve or reject a schedule owned by someone in `owner_department`.
    pub fn can_decide_schedule(&self, owner_department: &str) -> bool {
        self.approves_department(owner_department)
    }

    pub fn can_lock_schedule(&self, owner_department: &str) -> bool {
        self.approves_department(owner_department)
    }

    pub fn can_delete_poll(&self, creator_id: &str) -> bool {
        self.is_admin() || self.user_id == creator_id
    }

    pub fn can_close_poll(&self, creator_id: &str) -> bool {
        self.can_delete_poll(creator_id)
    }

    pub fn can_pin_post(&self, post_department: &str) -> bool {
        self.approves_department(post_department)
    }

    /// Department the caller is allowed to list team data for.
    /// Non-admins are pinned to their own department whatever they ask for.
    pub fn team_scope(&self, requested: Option<&str>) -> Option<String> {
        if self.is_admin() {
            requested.filter(|d| !d.is_empty()).map(str::to_string)
        } else {
            Some(self.department.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("worker".parse::<Role>().unwrap(), Role::Worker);
        assert_eq!("Manager".parse::<Role>().unwrap(), Role::Manager);
        assert_eq!("hr".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" admin ".parse::<Role>().unwrap(), Role::Admin);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_accepts_hr_alias() {
        let role: Role = serde_json::from_str("\"hr\"").unwrap();
        assert_eq!(role, Role::Admin);
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
    }

    #[test]
    fn test_decide_requires_same_department_unless_admin() {
        let manager = Identity::new("m1", "engineering", Role::Manager);
        assert!(manager.can_decide_schedule("engineering"));
        assert!(!manager.can_decide_schedule("sales"));

        let admin = Identity::new("a1", "hr", Role::Admin);
        assert!(admin.can_decide_schedule("sales"));

        let worker = Identity::new("w1", "engineering", Role::Worker);
        assert!(!worker.can_decide_schedule("engineering"));
    }

    #[test]
    fn test_poll_permissions() {
        let worker = Identity::new("w1", "eng", Role::Worker);
        let manager = Identity::new("m1", "eng", Role::Manager);
        let admin = Identity::new("a1", "eng", Role::Admin);

        assert!(!worker.can_create_poll());
        assert!(manager.can_create_poll());
        assert!(admin.can_create_poll());

        assert!(manager.can_delete_poll("m1"));
        assert!(!manager.can_delete_poll("m2"));
        assert!(admin.can_delete_poll("m2"));
        assert!(worker.can_delete_poll("w1"));
    }

    #[test]
    fn test_team_scope() {
        let manager = Identity::new("m1", "eng", Role::Manager);
        assert_eq!(manager.team_scope(Some("sales")).as_deref(), Some("eng"));
        assert_eq!(manager.team_scope(None).as_deref(), Some("eng"));

        let admin = Identity::new("a1", "eng", Role::Admin);
        assert_eq!(admin.team_scope(Some("sales")).as_deref(), Some("sales"));
        assert_eq!(admin.team_scope(Some("")), None);
        assert_eq!(admin.team_scope(None), None);
    }
}
