//! Poll Engine: creation, voting, closing and deletion of team polls.
//!
//! Creating a poll announces `new-poll`; votes and closing announce
//! `poll-updated`. Both carry the populated poll without viewer state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use workplanner_core::{Identity, PlannerError, Result};

use crate::notify::{EVENT_NEW_POLL, EVENT_POLL_UPDATED, EventPublisher, emit_best_effort};
use crate::persistence::PlannerDb;
use crate::poll::{NewPoll, Poll, PollFilter, PollView};
use crate::users::UserSummary;

pub struct PollEngine {
    db: Arc<PlannerDb>,
    publisher: Arc<dyn EventPublisher>,
}

impl PollEngine {
    pub fn new(db: Arc<PlannerDb>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { db, publisher }
    }

    pub async fn create(&self, caller: &Identity, input: NewPoll) -> Result<PollView> {
        if !caller.can_create_poll() {
            return Err(PlannerError::Forbidden(
                "Only managers and admins can create polls".into(),
            ));
        }
        let now = Utc::now();
        input.validate(now)?;
        let poll = input.into_poll(&caller.user_id, now);
        self.db.insert_poll(&poll)?;
        tracing::info!(poll_id = %poll.id, creator = %caller.user_id, options = poll.options.len(), "poll created");

        let mut views = self.populate(std::slice::from_ref(&poll), None, now)?;
        let broadcast = views.remove(0);
        emit_best_effort(self.publisher.as_ref(), EVENT_NEW_POLL, &broadcast).await;
        Ok(PollView {
            has_voted: Some(false),
            ..broadcast
        })
    }

    /// Cast a vote. Check order: exists, votable, option index, duplicate.
    pub async fn vote(&self, caller: &Identity, poll_id: &str, option_index: usize) -> Result<PollView> {
        let mut poll = self.load(poll_id)?;
        let now = Utc::now();
        let outcome = poll.cast_vote(&caller.user_id, option_index, now)?;

        if poll.allow_multiple_votes {
            self.db
                .replace_vote(poll_id, &caller.user_id, option_index, now)?;
        } else {
            self.db
                .insert_vote(poll_id, &caller.user_id, option_index, now)?;
        }
        tracing::info!(
            poll_id,
            user_id = %caller.user_id,
            option_index,
            replaced = outcome.replaced,
            "vote recorded"
        );

        // The vote is committed; nothing below may fail the request.
        let stored = match self.db.get_poll(poll_id) {
            Ok(Some(stored)) => stored,
            Ok(None) => poll,
            Err(e) => {
                tracing::warn!(poll_id, "reload after vote failed, using snapshot: {e}");
                poll
            }
        };
        self.announce_update(&stored, now).await;
        Ok(self.committed_view(&stored, Some(&caller.user_id), now))
    }

    /// Stop accepting votes. Creator or admin.
    pub async fn close(&self, caller: &Identity, poll_id: &str) -> Result<PollView> {
        let mut poll = self.load(poll_id)?;
        if !caller.can_close_poll(&poll.created_by) {
            return Err(PlannerError::Forbidden(
                "You can only close your own polls".into(),
            ));
        }
        let now = Utc::now();
        if poll.is_active {
            self.db.set_poll_active(poll_id, false, now)?;
            poll.is_active = false;
            poll.updated_at = now;
            tracing::info!(poll_id, by = %caller.user_id, "poll closed");
            self.announce_update(&poll, now).await;
            return Ok(self.committed_view(&poll, Some(&caller.user_id), now));
        }
        self.view(&poll, Some(&caller.user_id), now)
    }

    /// Irreversibly remove a poll. Creator or admin.
    pub async fn delete(&self, caller: &Identity, poll_id: &str) -> Result<()> {
        let poll = self.load(poll_id)?;
        if !caller.can_delete_poll(&poll.created_by) {
            return Err(PlannerError::Forbidden(
                "You can only delete your own polls".into(),
            ));
        }
        if !self.db.delete_poll(poll_id)? {
            return Err(PlannerError::NotFound("Poll".into()));
        }
        tracing::info!(poll_id, by = %caller.user_id, "poll deleted");
        Ok(())
    }

    pub async fn list(&self, caller: &Identity, filter: &PollFilter) -> Result<Vec<PollView>> {
        let now = Utc::now();
        let polls = self.db.list_polls(filter, now)?;
        self.populate(&polls, Some(&caller.user_id), now)
    }

    fn load(&self, poll_id: &str) -> Result<Poll> {
        self.db
            .get_poll(poll_id)?
            .ok_or_else(|| PlannerError::NotFound("Poll".into()))
    }

    async fn announce_update(&self, poll: &Poll, now: DateTime<Utc>) {
        let view = self.committed_view(poll, None, now);
        emit_best_effort(self.publisher.as_ref(), EVENT_POLL_UPDATED, &view).await;
    }

    fn view(&self, poll: &Poll, viewer: Option<&str>, now: DateTime<Utc>) -> Result<PollView> {
        Ok(self.populate(std::slice::from_ref(poll), viewer, now)?.remove(0))
    }

    /// View of a poll whose change is already stored. A failed user lookup
    /// degrades to unknown users instead of failing.
    fn committed_view(&self, poll: &Poll, viewer: Option<&str>, now: DateTime<Utc>) -> PollView {
        let polls = std::slice::from_ref(poll);
        let users = self.directory(polls).unwrap_or_else(|e| {
            tracing::warn!(poll_id = %poll.id, "user lookup failed: {e}");
            HashMap::new()
        });
        Self::render(polls, &users, viewer, now).remove(0)
    }

    fn populate(&self, polls: &[Poll], viewer: Option<&str>, now: DateTime<Utc>) -> Result<Vec<PollView>> {
        let users = self.directory(polls)?;
        Ok(Self::render(polls, &users, viewer, now))
    }

    fn directory(&self, polls: &[Poll]) -> Result<HashMap<String, UserSummary>> {
        let ids = polls.iter().flat_map(|p| {
            let voters: Vec<&str> = if p.is_anonymous {
                Vec::new()
            } else {
                p.options
                    .iter()
                    .flat_map(|o| o.votes.iter().map(|v| v.user_id.as_str()))
                    .collect()
            };
            std::iter::once(p.created_by.as_str()).chain(voters)
        });
        self.db.users_by_ids(ids)
    }

    fn render(
        polls: &[Poll],
        users: &HashMap<String, UserSummary>,
        viewer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<PollView> {
        let names: HashMap<String, String> = users
            .iter()
            .map(|(id, u)| (id.clone(), u.name.clone()))
            .collect();
        polls
            .iter()
            .map(|p| {
                let creator = users
                    .get(&p.created_by)
                    .cloned()
                    .unwrap_or_else(|| UserSummary::unknown(&p.created_by));
                PollView::populate(p, creator, &names, viewer, now)
            })
            .collect()
    }
}
