//! Schedule Record Manager: upsert, day cycling, submission, approval and
//! locking of weekly schedules, plus the read projections.
//!
//! Schedule transitions do not emit realtime events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use workplanner_core::{Identity, PlannerError, Result, WeekKey};

use crate::persistence::PlannerDb;
use crate::schedule::{
    Decision, MAX_FEEDBACK_LEN, MAX_NOTES_LEN, Schedule, ScheduleView, WeekSchedule, Weekday,
    validate_text,
};
use crate::users::UserSummary;

/// Body of an upsert: the full day map replaces the stored one.
/// `week` stays raw so a malformed key is reported against its own field.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertSchedule {
    pub week: String,
    #[serde(default)]
    pub schedule: WeekSchedule,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleFilter {
    pub week: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeamFilter {
    pub week: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWeek {
    pub week: WeekKey,
    pub year: i32,
    pub week_number: u32,
}

impl CurrentWeek {
    pub fn at(now: DateTime<Utc>) -> Self {
        let week = WeekKey::containing(now);
        Self {
            week,
            year: week.year,
            week_number: week.week_number,
        }
    }
}

fn parse_week_filter(week: Option<&str>) -> Result<Option<WeekKey>> {
    week.filter(|w| !w.trim().is_empty())
        .map(WeekKey::parse)
        .transpose()
}

fn locked_error() -> PlannerError {
    PlannerError::Locked("Schedule is locked and cannot be modified".into())
}

pub struct ScheduleManager {
    db: Arc<PlannerDb>,
}

impl ScheduleManager {
    pub fn new(db: Arc<PlannerDb>) -> Self {
        Self { db }
    }

    /// Create the caller's record for the week as a draft, or overwrite the
    /// days and notes of the existing one. Status is never changed here.
    /// The flag is `true` when the record was created.
    pub async fn upsert(&self, caller: &Identity, input: UpsertSchedule) -> Result<(ScheduleView, bool)> {
        let week = WeekKey::parse(&input.week)?;
        validate_text("notes", input.notes.as_deref(), MAX_NOTES_LEN)?;
        let now = Utc::now();
        let UpsertSchedule { schedule, notes, .. } = input;
        let (saved, created) = self.write_days(&caller.user_id, week, now, |s| {
            s.edit(schedule, notes.clone(), now)
        })?;
        tracing::info!(schedule_id = %saved.id, user_id = %caller.user_id, week = %week, created, "schedule saved");
        Ok((self.populate(saved)?, created))
    }

    /// Advance one day along the planner's cycle, creating the draft if needed.
    pub async fn cycle_day(&self, caller: &Identity, week: WeekKey, day: Weekday) -> Result<ScheduleView> {
        let now = Utc::now();
        let (saved, _) = self.write_days(&caller.user_id, week, now, |s| {
            s.cycle_day(day, now).map(|_| ())
        })?;
        tracing::debug!(
            schedule_id = %saved.id,
            day = day.as_str(),
            status = %saved.schedule.get(day),
            "day cycled"
        );
        self.populate(saved)
    }

    /// Find-or-create then mutate the day map under the lock gate.
    fn write_days<F>(
        &self,
        user_id: &str,
        week: WeekKey,
        now: DateTime<Utc>,
        mutate: F,
    ) -> Result<(Schedule, bool)>
    where
        F: Fn(&mut Schedule) -> Result<()>,
    {
        if let Some(existing) = self.db.find_schedule(user_id, &week)? {
            return Ok((self.update_days(existing, &mutate)?, false));
        }

        let mut fresh = Schedule::draft(user_id, week, WeekSchedule::default(), None, now);
        mutate(&mut fresh)?;
        match self.db.insert_schedule(&fresh) {
            Ok(()) => Ok((fresh, true)),
            Err(PlannerError::Conflict(_)) => {
                // A concurrent first write created the record; fall back to updating it.
                let existing = self
                    .db
                    .find_schedule(user_id, &week)?
                    .ok_or_else(|| PlannerError::NotFound("Schedule".into()))?;
                Ok((self.update_days(existing, &mutate)?, false))
            }
            Err(e) => Err(e),
        }
    }

    fn update_days<F>(&self, mut schedule: Schedule, mutate: &F) -> Result<Schedule>
    where
        F: Fn(&mut Schedule) -> Result<()>,
    {
        mutate(&mut schedule)?;
        // Locked between read and write.
        if !self.db.update_schedule_days(&schedule)? {
            return Err(locked_error());
        }
        Ok(schedule)
    }

    /// Owner submits a draft for review.
    pub async fn submit(&self, caller: &Identity, schedule_id: &str) -> Result<ScheduleView> {
        let mut schedule = self
            .db
            .get_schedule(schedule_id)?
            .filter(|s| s.user_id == caller.user_id)
            .ok_or_else(|| PlannerError::NotFound("Schedule".into()))?;
        schedule.submit(Utc::now())?;
        self.db.update_schedule_workflow(&schedule)?;
        tracing::info!(schedule_id, user_id = %caller.user_id, "schedule submitted");
        self.populate(schedule)
    }

    /// Approver verdict on a submitted (or previously decided) schedule.
    pub async fn decide(
        &self,
        caller: &Identity,
        schedule_id: &str,
        decision: Decision,
        feedback: Option<String>,
    ) -> Result<ScheduleView> {
        if !caller.can_view_team() {
            return Err(PlannerError::Forbidden(
                "Not authorized to review schedules".into(),
            ));
        }
        validate_text("feedback", feedback.as_deref(), MAX_FEEDBACK_LEN)?;
        let mut schedule = self.load(schedule_id)?;
        let owner_department = self.owner_department(&schedule)?;
        if !caller.can_decide_schedule(&owner_department) {
            return Err(PlannerError::Forbidden(
                "You can only approve schedules from your department".into(),
            ));
        }
        schedule.decide(&caller.user_id, decision, feedback, Utc::now())?;
        self.db.update_schedule_workflow(&schedule)?;
        tracing::info!(
            schedule_id,
            approver = %caller.user_id,
            status = schedule.status.as_str(),
            "schedule reviewed"
        );
        self.populate(schedule)
    }

    /// The only writer of `is_locked`.
    pub async fn set_lock(&self, caller: &Identity, schedule_id: &str, locked: bool) -> Result<ScheduleView> {
        let mut schedule = self.load(schedule_id)?;
        let owner_department = self.owner_department(&schedule)?;
        if !caller.can_lock_schedule(&owner_department) {
            return Err(PlannerError::Forbidden(
                "You can only lock schedules from your department".into(),
            ));
        }
        let now = Utc::now();
        self.db.set_schedule_lock(schedule_id, locked, now)?;
        schedule.is_locked = locked;
        schedule.updated_at = now;
        tracing::info!(schedule_id, locked, by = %caller.user_id, "schedule lock changed");
        self.populate(schedule)
    }

    pub async fn list_for_user(&self, caller: &Identity, filter: &ScheduleFilter) -> Result<Vec<ScheduleView>> {
        let week = parse_week_filter(filter.week.as_deref())?;
        let schedules = self
            .db
            .list_user_schedules(&caller.user_id, week.as_ref(), filter.year)?;
        self.populate_all(schedules)
    }

    /// Team schedules. Non-admins always get their own department.
    pub async fn list_for_team(&self, caller: &Identity, filter: &TeamFilter) -> Result<Vec<ScheduleView>> {
        if !caller.can_view_team() {
            return Err(PlannerError::Forbidden(
                "Not authorized to view team schedules".into(),
            ));
        }
        let week = parse_week_filter(filter.week.as_deref())?;
        let department = caller.team_scope(filter.department.as_deref());
        let schedules = self
            .db
            .list_team_schedules(department.as_deref(), week.as_ref())?;
        self.populate_all(schedules)
    }

    fn load(&self, schedule_id: &str) -> Result<Schedule> {
        self.db
            .get_schedule(schedule_id)?
            .ok_or_else(|| PlannerError::NotFound("Schedule".into()))
    }

    fn owner_department(&self, schedule: &Schedule) -> Result<String> {
        Ok(self
            .db
            .get_user(&schedule.user_id)?
            .map(|u| u.department)
            .unwrap_or_default())
    }

    fn populate(&self, schedule: Schedule) -> Result<ScheduleView> {
        Ok(self.populate_all(vec![schedule])?.remove(0))
    }

    fn populate_all(&self, schedules: Vec<Schedule>) -> Result<Vec<ScheduleView>> {
        let ids = schedules
            .iter()
            .flat_map(|s| std::iter::once(s.user_id.as_str()).chain(s.approved_by.as_deref()));
        let users = self.db.users_by_ids(ids)?;
        let summary = |id: &str| {
            users
                .get(id)
                .cloned()
                .unwrap_or_else(|| UserSummary::unknown(id))
        };
        Ok(schedules
            .into_iter()
            .map(|s| {
                let user = summary(&s.user_id);
                let approver = s.approved_by.as_deref().map(summary);
                ScheduleView::populate(s, user, approver)
            })
            .collect())
    }
}
