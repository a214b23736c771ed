//! Team polls: options, votes and the voting rules.
//!
//! A poll is *votable* while `is_active` and `expires_at` is in the future.
//! Each voter holds at most one vote across the whole poll. With
//! `allow_multiple_votes` a new vote replaces the previous one (change your
//! vote freely); without it a second vote is a conflict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use workplanner_core::{FieldError, PlannerError, Result};

use crate::users::UserSummary;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;
pub const TITLE_LEN: (usize, usize) = (5, 200);
pub const DESCRIPTION_LEN: (usize, usize) = (10, 1000);
pub const OPTION_LEN: (usize, usize) = (1, 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollCategory {
    #[default]
    General,
    Work,
    TeamBuilding,
    Feedback,
    Scheduling,
}

impl PollCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollCategory::General => "general",
            PollCategory::Work => "work",
            PollCategory::TeamBuilding => "team-building",
            PollCategory::Feedback => "feedback",
            PollCategory::Scheduling => "scheduling",
        }
    }
}

impl FromStr for PollCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "general" => Ok(PollCategory::General),
            "work" => Ok(PollCategory::Work),
            "team-building" => Ok(PollCategory::TeamBuilding),
            "feedback" => Ok(PollCategory::Feedback),
            "scheduling" => Ok(PollCategory::Scheduling),
            other => Err(format!("Invalid category: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub user_id: String,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOption {
    pub text: String,
    pub votes: Vec<Vote>,
}

/// A stored poll with its embedded options and votes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub id: String,
    pub title: String,
    pub description: String,
    pub options: Vec<PollOption>,
    pub created_by: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub allow_multiple_votes: bool,
    pub is_anonymous: bool,
    pub category: PollCategory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a successful vote did to the poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    /// Prior votes by the same voter that were purged before appending.
    pub replaced: usize,
}

impl Poll {
    pub fn is_votable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }

    pub fn total_votes(&self) -> usize {
        self.options.iter().map(|o| o.votes.len()).sum()
    }

    pub fn has_user_voted(&self, user_id: &str) -> bool {
        self.options
            .iter()
            .any(|o| o.votes.iter().any(|v| v.user_id == user_id))
    }

    /// Apply a vote to this snapshot.
    ///
    /// Checks run in order: votable, option index, duplicate voter. On
    /// success in multiple-vote mode all prior votes by `user_id` are removed
    /// from every option before the new one is appended.
    pub fn cast_vote(
        &mut self,
        user_id: &str,
        option_index: usize,
        now: DateTime<Utc>,
    ) -> Result<VoteOutcome> {
        if !self.is_votable(now) {
            return Err(PlannerError::InvalidState("Poll is no longer active".into()));
        }
        if option_index >= self.options.len() {
            return Err(PlannerError::invalid("optionIndex", "Invalid option"));
        }
        let mut replaced = 0;
        if self.has_user_voted(user_id) {
            if !self.allow_multiple_votes {
                return Err(PlannerError::Conflict(
                    "You have already voted on this poll".into(),
                ));
            }
            for option in &mut self.options {
                let before = option.votes.len();
                option.votes.retain(|v| v.user_id != user_id);
                replaced += before - option.votes.len();
            }
        }
        self.options[option_index].votes.push(Vote {
            user_id: user_id.to_string(),
            voted_at: now,
        });
        self.updated_at = now;
        Ok(VoteOutcome { replaced })
    }
}

/// Input for creating a poll.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPoll {
    pub title: String,
    pub description: String,
    pub options: Vec<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub allow_multiple_votes: bool,
    #[serde(default)]
    pub is_anonymous: bool,
    #[serde(default)]
    pub category: PollCategory,
}

fn check_len(errors: &mut Vec<FieldError>, field: &str, value: &str, (min, max): (usize, usize), message: &str) {
    let len = value.chars().count();
    if len < min || len > max {
        errors.push(FieldError::new(field, message));
    }
}

impl NewPoll {
    /// Validate all fields, reporting every failing field at once.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        let mut errors = Vec::new();
        check_len(&mut errors, "title", self.title.trim(), TITLE_LEN, "Title must be 5-200 characters");
        check_len(
            &mut errors,
            "description",
            self.description.trim(),
            DESCRIPTION_LEN,
            "Description must be 10-1000 characters",
        );
        if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&self.options.len()) {
            errors.push(FieldError::new("options", "Must have 2-10 options"));
        }
        for (i, option) in self.options.iter().enumerate() {
            check_len(
                &mut errors,
                &format!("options[{i}]"),
                option.trim(),
                OPTION_LEN,
                "Each option must be 1-100 characters",
            );
        }
        if self.expires_at <= now {
            errors.push(FieldError::new("expiresAt", "Expiration date must be in the future"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PlannerError::Validation(errors))
        }
    }

    pub fn into_poll(self, creator_id: &str, now: DateTime<Utc>) -> Poll {
        Poll {
            id: uuid::Uuid::new_v4().to_string(),
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            options: self
                .options
                .iter()
                .map(|text| PollOption {
                    text: text.trim().to_string(),
                    votes: Vec::new(),
                })
                .collect(),
            created_by: creator_id.to_string(),
            expires_at: self.expires_at,
            is_active: true,
            allow_multiple_votes: self.allow_multiple_votes,
            is_anonymous: self.is_anonymous,
            category: self.category,
            created_at: now,
            updated_at: now,
        }
    }
}

/// List filters for polls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PollFilter {
    pub category: Option<PollCategory>,
    pub active: Option<bool>,
}

// ── Populated views ─────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteView {
    pub user: VoterRef,
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoterRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    pub index: usize,
    pub text: String,
    pub vote_count: usize,
    /// Empty for anonymous polls.
    pub votes: Vec<VoteView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub options: Vec<OptionView>,
    pub created_by: UserSummary,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_votable: bool,
    pub allow_multiple_votes: bool,
    pub is_anonymous: bool,
    pub category: PollCategory,
    pub total_votes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_voted: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PollView {
    /// Expand references. `names` maps user ids to display names; `viewer`
    /// is the caller when the view is built for a specific request.
    pub fn populate(
        poll: &Poll,
        creator: UserSummary,
        names: &HashMap<String, String>,
        viewer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let options = poll
            .options
            .iter()
            .enumerate()
            .map(|(index, o)| OptionView {
                index,
                text: o.text.clone(),
                vote_count: o.votes.len(),
                votes: if poll.is_anonymous {
                    Vec::new()
                } else {
                    o.votes
                        .iter()
                        .map(|v| VoteView {
                            user: VoterRef {
                                id: v.user_id.clone(),
                                name: names
                                    .get(&v.user_id)
                                    .cloned()
                                    .unwrap_or_else(|| "Unknown user".into()),
                            },
                            voted_at: v.voted_at,
                        })
                        .collect()
                },
            })
            .collect();
        Self {
            id: poll.id.clone(),
            title: poll.title.clone(),
            description: poll.description.clone(),
            options,
            created_by: creator,
            expires_at: poll.expires_at,
            is_active: poll.is_active,
            is_votable: poll.is_votable(now),
            allow_multiple_votes: poll.allow_multiple_votes,
            is_anonymous: poll.is_anonymous,
            category: poll.category,
            total_votes: poll.total_votes(),
            has_voted: viewer.map(|v| poll.has_user_voted(v)),
            created_at: poll.created_at,
            updated_at: poll.updated_at,
        }
    }
}
