//! Weekly schedule records: the per-user, per-week work-location plan and
//! its approval workflow.
//!
//! ```text
//! draft ──submit──▶ submitted ──decide──▶ approved | rejected
//!                        ▲                     │
//!                        └──────decide─────────┘   (re-decision by an approver)
//! ```
//! `is_locked` is an orthogonal gate, checked only when the owner edits days.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use workplanner_core::{PlannerError, Result, WeekKey};

use crate::users::UserSummary;

pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_FEEDBACK_LEN: usize = 500;

/// Where a user works on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    Wfo,
    Wfh,
    Off,
    Holiday,
}

impl DayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayStatus::Wfo => "wfo",
            DayStatus::Wfh => "wfh",
            DayStatus::Off => "off",
            DayStatus::Holiday => "holiday",
        }
    }

    /// Next status in the planner's tap-to-cycle order: wfo → wfh → off → wfo.
    /// `holiday` is not part of the cycle and moves to `wfo`.
    pub fn cycled(self) -> Self {
        match self {
            DayStatus::Wfo => DayStatus::Wfh,
            DayStatus::Wfh => DayStatus::Off,
            DayStatus::Off | DayStatus::Holiday => DayStatus::Wfo,
        }
    }
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "wfo" => Ok(DayStatus::Wfo),
            "wfh" => Ok(DayStatus::Wfh),
            "off" => Ok(DayStatus::Off),
            "holiday" => Ok(DayStatus::Holiday),
            other => Err(format!("Invalid day status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }
}

impl FromStr for Weekday {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Weekday::ALL
            .into_iter()
            .find(|d| d.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("Invalid day: {s}"))
    }
}

fn weekday_default() -> DayStatus { DayStatus::Wfh }
fn weekend_default() -> DayStatus { DayStatus::Off }

/// The seven day statuses of a week. Missing days take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSchedule {
    #[serde(default = "weekday_default")]
    pub monday: DayStatus,
    #[serde(default = "weekday_default")]
    pub tuesday: DayStatus,
    #[serde(default = "weekday_default")]
    pub wednesday: DayStatus,
    #[serde(default = "weekday_default")]
    pub thursday: DayStatus,
    #[serde(default = "weekday_default")]
    pub friday: DayStatus,
    #[serde(default = "weekend_default")]
    pub saturday: DayStatus,
    #[serde(default = "weekend_default")]
    pub sunday: DayStatus,
}

impl Default for WeekSchedule {
    fn default() -> Self {
        Self {
            monday: weekday_default(),
            tuesday: weekday_default(),
            wednesday: weekday_default(),
            thursday: weekday_default(),
            friday: weekday_default(),
            saturday: weekend_default(),
            sunday: weekend_default(),
        }
    }
}

impl WeekSchedule {
    pub fn get(&self, day: Weekday) -> DayStatus {
        match day {
            Weekday::Monday => self.monday,
            Weekday::Tuesday => self.tuesday,
            Weekday::Wednesday => self.wednesday,
            Weekday::Thursday => self.thursday,
            Weekday::Friday => self.friday,
            Weekday::Saturday => self.saturday,
            Weekday::Sunday => self.sunday,
        }
    }

    pub fn set(&mut self, day: Weekday, status: DayStatus) {
        let slot = match day {
            Weekday::Monday => &mut self.monday,
            Weekday::Tuesday => &mut self.tuesday,
            Weekday::Wednesday => &mut self.wednesday,
            Weekday::Thursday => &mut self.thursday,
            Weekday::Friday => &mut self.friday,
            Weekday::Saturday => &mut self.saturday,
            Weekday::Sunday => &mut self.sunday,
        };
        *slot = status;
    }

    pub fn days(&self) -> impl Iterator<Item = (Weekday, DayStatus)> + '_ {
        Weekday::ALL.into_iter().map(|d| (d, self.get(d)))
    }

    pub fn summary(&self) -> DaySummary {
        let mut summary = DaySummary::default();
        for (_, status) in self.days() {
            match status {
                DayStatus::Wfo => summary.wfo += 1,
                DayStatus::Wfh => summary.wfh += 1,
                DayStatus::Off => summary.off += 1,
                DayStatus::Holiday => summary.holiday += 1,
            }
        }
        summary
    }
}

/// Day counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub wfo: u32,
    pub wfh: u32,
    pub off: u32,
    pub holiday: u32,
}

/// Approval workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Draft => "draft",
            ScheduleStatus::Submitted => "submitted",
            ScheduleStatus::Approved => "approved",
            ScheduleStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ScheduleStatus::Draft),
            "submitted" => Ok(ScheduleStatus::Submitted),
            "approved" => Ok(ScheduleStatus::Approved),
            "rejected" => Ok(ScheduleStatus::Rejected),
            other => Err(format!("Invalid schedule status: {other}")),
        }
    }
}

/// An approver's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for ScheduleStatus {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approved => ScheduleStatus::Approved,
            Decision::Rejected => ScheduleStatus::Rejected,
        }
    }
}

/// A stored schedule record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub user_id: String,
    pub week: WeekKey,
    pub schedule: WeekSchedule,
    pub notes: Option<String>,
    pub is_locked: bool,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// A new draft record for (user, week).
    pub fn draft(
        user_id: &str,
        week: WeekKey,
        days: WeekSchedule,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            week,
            schedule: days,
            notes,
            is_locked: false,
            submitted_at: None,
            approved_by: None,
            approved_at: None,
            feedback: None,
            status: ScheduleStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ensure_editable(&self) -> Result<()> {
        if self.is_locked {
            return Err(PlannerError::Locked(
                "Schedule is locked and cannot be modified".into(),
            ));
        }
        Ok(())
    }

    /// Replace the day map and notes (never a merge). Status is left as is.
    pub fn edit(&mut self, days: WeekSchedule, notes: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_editable()?;
        self.schedule = days;
        self.notes = notes;
        self.updated_at = now;
        Ok(())
    }

    pub fn cycle_day(&mut self, day: Weekday, now: DateTime<Utc>) -> Result<DayStatus> {
        self.ensure_editable()?;
        let next = self.schedule.get(day).cycled();
        self.schedule.set(day, next);
        self.updated_at = now;
        Ok(next)
    }

    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != ScheduleStatus::Draft {
            return Err(PlannerError::InvalidState(
                "Only draft schedules can be submitted".into(),
            ));
        }
        self.status = ScheduleStatus::Submitted;
        self.submitted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Record an approver's verdict. `approved_by` and `approved_at` are always set together.
    pub fn decide(
        &mut self,
        approver_id: &str,
        decision: Decision,
        feedback: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status == ScheduleStatus::Draft {
            return Err(PlannerError::InvalidState(
                "Draft schedules must be submitted before review".into(),
            ));
        }
        self.status = decision.into();
        self.approved_by = Some(approver_id.to_string());
        self.approved_at = Some(now);
        if feedback.is_some() {
            self.feedback = feedback;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Check optional free text against a length cap.
pub fn validate_text(field: &str, value: Option<&str>, max: usize) -> Result<()> {
    match value {
        Some(v) if v.chars().count() > max => Err(PlannerError::invalid(
            field,
            format!("{} cannot exceed {max} characters", capitalize(field)),
        )),
        _ => Ok(()),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// A schedule with its owner and approver expanded for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleView {
    pub id: String,
    pub user: UserSummary,
    pub week: WeekKey,
    pub year: i32,
    pub week_number: u32,
    pub schedule: WeekSchedule,
    pub summary: DaySummary,
    pub notes: Option<String>,
    pub is_locked: bool,
    pub status: ScheduleStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserSummary>,
    pub approved_at: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleView {
    pub fn populate(s: Schedule, user: UserSummary, approver: Option<UserSummary>) -> Self {
        Self {
            summary: s.schedule.summary(),
            year: s.week.year,
            week_number: s.week.week_number,
            id: s.id,
            user,
            week: s.week,
            schedule: s.schedule,
            notes: s.notes,
            is_locked: s.is_locked,
            status: s.status,
            submitted_at: s.submitted_at,
            approved_by: approver,
            approved_at: s.approved_at,
            feedback: s.feedback,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}
