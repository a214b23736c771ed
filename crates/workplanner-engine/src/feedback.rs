//! Anonymous feedback box. Only the sender's department is kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use workplanner_core::{FieldError, Identity, PlannerError, Result};

use crate::persistence::PlannerDb;

pub const MIN_MESSAGE_LEN: usize = 10;
pub const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackCategory {
    Suggestion,
    Concern,
    Praise,
}

impl FeedbackCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCategory::Suggestion => "suggestion",
            FeedbackCategory::Concern => "concern",
            FeedbackCategory::Praise => "praise",
        }
    }
}

impl FromStr for FeedbackCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "suggestion" => Ok(FeedbackCategory::Suggestion),
            "concern" => Ok(FeedbackCategory::Concern),
            "praise" => Ok(FeedbackCategory::Praise),
            other => Err(format!("Invalid category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    New,
    Reviewed,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::New => "new",
            FeedbackStatus::Reviewed => "reviewed",
        }
    }
}

impl FromStr for FeedbackStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(FeedbackStatus::New),
            "reviewed" => Ok(FeedbackStatus::Reviewed),
            other => Err(format!("Invalid feedback status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: String,
    pub message: String,
    pub category: FeedbackCategory,
    pub department: String,
    pub status: FeedbackStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedback {
    pub message: String,
    pub category: FeedbackCategory,
}

pub struct FeedbackBox {
    db: Arc<PlannerDb>,
}

impl FeedbackBox {
    pub fn new(db: Arc<PlannerDb>) -> Self {
        Self { db }
    }

    /// Store feedback without any reference to its author.
    pub async fn submit(&self, caller: &Identity, input: NewFeedback) -> Result<Feedback> {
        let message = input.message.trim();
        let len = message.chars().count();
        if len < MIN_MESSAGE_LEN {
            return Err(PlannerError::Validation(vec![FieldError::new(
                "message",
                "Feedback must be at least 10 characters",
            )]));
        }
        if len > MAX_MESSAGE_LEN {
            return Err(PlannerError::invalid(
                "message",
                "Feedback cannot exceed 2000 characters",
            ));
        }
        let feedback = Feedback {
            id: uuid::Uuid::new_v4().to_string(),
            message: message.to_string(),
            category: input.category,
            department: caller.department.clone(),
            status: FeedbackStatus::New,
            created_at: Utc::now(),
        };
        self.db.insert_feedback(&feedback)?;
        tracing::info!(
            category = feedback.category.as_str(),
            department = %feedback.department,
            "anonymous feedback received"
        );
        Ok(feedback)
    }

    /// Managers read their department's feedback, admins read everything.
    pub async fn list(&self, caller: &Identity) -> Result<Vec<Feedback>> {
        if !caller.can_read_feedback() {
            return Err(PlannerError::Forbidden(
                "Not authorized to read feedback".into(),
            ));
        }
        let department = (!caller.is_admin()).then_some(caller.department.as_str());
        self.db.list_feedback(department)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workplanner_core::Role;

    fn setup() -> FeedbackBox {
        FeedbackBox::new(Arc::new(PlannerDb::open_in_memory().unwrap()))
    }

    fn note(message: &str) -> NewFeedback {
        NewFeedback {
            message: message.into(),
            category: FeedbackCategory::Suggestion,
        }
    }

    #[tokio::test]
    async fn test_message_length_rules() {
        let feedback = setup();
        let worker = Identity::new("w1", "eng", Role::Worker);
        let err = feedback.submit(&worker, note("   too short   ")).await.unwrap_err();
        assert!(matches!(err, PlannerError::Validation(_)));
        let err = feedback.submit(&worker, note(&"x".repeat(2001))).await.unwrap_err();
        assert!(matches!(err, PlannerError::Validation(_)));

        let saved = feedback
            .submit(&worker, note("  More quiet rooms, please  "))
            .await
            .unwrap();
        assert_eq!(saved.message, "More quiet rooms, please");
        assert_eq!(saved.status, FeedbackStatus::New);
        assert_eq!(saved.department, "eng");
    }

    #[tokio::test]
    async fn test_listing_scope() {
        let feedback = setup();
        let eng = Identity::new("w1", "eng", Role::Worker);
        let sales = Identity::new("w2", "sales", Role::Worker);
        feedback.submit(&eng, note("The new desks are great")).await.unwrap();
        feedback.submit(&sales, note("Parking is always full")).await.unwrap();

        let err = feedback.list(&eng).await.unwrap_err();
        assert!(matches!(err, PlannerError::Forbidden(_)));

        let manager = Identity::new("m1", "eng", Role::Manager);
        let items = feedback.list(&manager).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].department, "eng");

        let admin = Identity::new("a1", "hr", Role::Admin);
        assert_eq!(feedback.list(&admin).await.unwrap().len(), 2);
    }

    #[test]
    fn test_serialized_feedback_has_no_author() {
        let item = Feedback {
            id: "f1".into(),
            message: "Coffee machine is broken".into(),
            category: FeedbackCategory::Concern,
            department: "eng".into(),
            status: FeedbackStatus::New,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["category"], "concern");
        assert_eq!(json["status"], "new");
        assert!(json.get("userId").is_none());
    }
}
