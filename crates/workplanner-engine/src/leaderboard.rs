//! Office presence leaderboard for a department.

use serde::Serialize;
use std::sync::Arc;
use workplanner_core::{Identity, Result, WeekKey};

use crate::persistence::PlannerDb;
use crate::schedule::Schedule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub department: String,
    /// Percentage of working days (wfo + wfh) spent in the office.
    pub office_attendance: u32,
    pub streak: u32,
    pub avatar: String,
    pub rank: usize,
}

/// `round(100 * wfo / (wfo + wfh))` over all schedules, 0 with no working days.
pub fn office_attendance(schedules: &[Schedule]) -> u32 {
    let (wfo, wfh) = schedules.iter().fold((0u32, 0u32), |(wfo, wfh), s| {
        let summary = s.schedule.summary();
        (wfo + summary.wfo, wfh + summary.wfh)
    });
    let worked = wfo + wfh;
    if worked == 0 {
        return 0;
    }
    (100.0 * f64::from(wfo) / f64::from(worked)).round() as u32
}

/// Number of consecutive weeks, counted back from the newest schedule, with
/// at least one office day. A week with no schedule ends the streak.
/// `schedules` must be ordered newest week first.
pub fn office_streak(schedules: &[Schedule]) -> u32 {
    let mut streak = 0;
    let mut expected: Option<WeekKey> = None;
    for s in schedules {
        if expected.is_some_and(|week| week != s.week) || s.schedule.summary().wfo == 0 {
            break;
        }
        streak += 1;
        expected = Some(s.week.previous());
    }
    streak
}

pub fn avatar(name: &str) -> String {
    name.chars().take(2).collect::<String>().to_uppercase()
}

pub struct Leaderboard {
    db: Arc<PlannerDb>,
}

impl Leaderboard {
    pub fn new(db: Arc<PlannerDb>) -> Self {
        Self { db }
    }

    /// Ranked entries for the caller's department.
    pub async fn for_department(&self, caller: &Identity) -> Result<Vec<LeaderboardEntry>> {
        let members = self.db.department_members(&caller.department)?;
        let mut entries = Vec::with_capacity(members.len());
        for member in members {
            let schedules = self.db.list_user_schedules(&member.id, None, None)?;
            entries.push(LeaderboardEntry {
                office_attendance: office_attendance(&schedules),
                streak: office_streak(&schedules),
                avatar: avatar(&member.name),
                id: member.id,
                name: member.name,
                department: member.department,
                rank: 0,
            });
        }
        entries.sort_by(|a, b| {
            b.office_attendance
                .cmp(&a.office_attendance)
                .then_with(|| a.name.cmp(&b.name))
        });
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = i + 1;
        }
        tracing::debug!(department = %caller.department, members = entries.len(), "leaderboard computed");
        Ok(entries)
    }
}
