//! # WorkPlanner Engine
//!
//! State engine for weekly work-location schedules and team polls, plus the
//! engagement features around them (motivation board, anonymous feedback,
//! office presence leaderboard).
//!
//! ## Architecture
//! ```text
//! gateway handlers
//!   ├── ScheduleManager ──┐
//!   ├── PollEngine ───────┼── PlannerDb (SQLite)
//!   ├── MotivationBoard ──┤
//!   ├── FeedbackBox ──────┤
//!   └── Leaderboard ──────┘
//!          │
//!          └── EventPublisher ── BroadcastPublisher ── /ws clients
//! ```
//!
//! Every operation is one request-response unit: read a snapshot, apply a
//! pure transition, persist, then announce (polls only).

pub mod feedback;
pub mod leaderboard;
pub mod motivation;
pub mod notify;
pub mod persistence;
pub mod poll;
pub mod poll_engine;
pub mod schedule;
pub mod schedule_manager;
pub mod users;

pub use feedback::{Feedback, FeedbackBox, FeedbackCategory, NewFeedback};
pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use motivation::{MotivationBoard, NewPost, PostType, PostView};
pub use notify::{BroadcastPublisher, EventPublisher, NullPublisher, RealtimeEvent};
pub use persistence::PlannerDb;
pub use poll::{NewPoll, PollCategory, PollFilter, PollView};
pub use poll_engine::PollEngine;
pub use schedule::{DayStatus, Decision, ScheduleStatus, ScheduleView, WeekSchedule, Weekday};
pub use schedule_manager::{CurrentWeek, ScheduleFilter, ScheduleManager, TeamFilter, UpsertSchedule};
pub use users::UserSummary;
