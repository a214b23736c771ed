//! SQLite-backed persistence for users, schedules, polls, motivation posts
//! and feedback.
//!
//! Timestamps are stored as RFC 3339 text with a fixed precision so that
//! lexical order matches chronological order. Poll votes and post likes
//! live in child tables whose primary keys enforce one row per user.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use workplanner_core::{Identity, PlannerError, Result, WeekKey};

use crate::feedback::Feedback;
use crate::motivation::{Comment, Like, Post};
use crate::poll::{Poll, PollFilter, PollOption, Vote};
use crate::schedule::{Schedule, WeekSchedule};
use crate::users::UserSummary;

/// Planner database handle. Cheap to share behind an `Arc`.
pub struct PlannerDb {
    conn: Mutex<Connection>,
}

fn storage(context: &'static str) -> impl FnOnce(rusqlite::Error) -> PlannerError {
    move |e| PlannerError::Storage(format!("{context}: {e}"))
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

pub(crate) fn fmt_ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion(idx: usize, e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| conversion(idx, e))
    })
    .transpose()
}

fn enum_col<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| conversion(idx, e))
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion(idx, e))
}

fn bool_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<bool> {
    Ok(row.get::<_, i32>(idx)? != 0)
}

const USER_COLS: &str = "id, name, email, department, role";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        department: row.get(3)?,
        role: enum_col(row, 4)?,
    })
}

const SCHEDULE_COLS: &str = "s.id, s.user_id, s.week, s.days_json, s.notes, s.is_locked, s.status, \
     s.submitted_at, s.approved_by, s.approved_at, s.feedback, s.created_at, s.updated_at";

fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    let week: String = row.get(2)?;
    Ok(Schedule {
        id: row.get(0)?,
        user_id: row.get(1)?,
        week: WeekKey::parse(&week).map_err(|e| conversion(2, e))?,
        schedule: json_col::<WeekSchedule>(row, 3)?,
        notes: row.get(4)?,
        is_locked: bool_col(row, 5)?,
        status: enum_col(row, 6)?,
        submitted_at: opt_ts_col(row, 7)?,
        approved_by: row.get(8)?,
        approved_at: opt_ts_col(row, 9)?,
        feedback: row.get(10)?,
        created_at: ts_col(row, 11)?,
        updated_at: ts_col(row, 12)?,
    })
}

const POLL_COLS: &str = "id, title, description, created_by, expires_at, is_active, \
     allow_multiple_votes, is_anonymous, category, created_at, updated_at";

const POST_COLS: &str = "id, post_type, title, content, author_id, target_user_id, department, \
     tags_json, is_public, is_pinned, created_at, updated_at";

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        post_type: enum_col(row, 1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        author_id: row.get(4)?,
        target_user_id: row.get(5)?,
        department: row.get(6)?,
        tags: json_col(row, 7)?,
        is_public: bool_col(row, 8)?,
        is_pinned: bool_col(row, 9)?,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: ts_col(row, 10)?,
        updated_at: ts_col(row, 11)?,
    })
}

fn row_to_feedback(row: &Row<'_>) -> rusqlite::Result<Feedback> {
    Ok(Feedback {
        id: row.get(0)?,
        message: row.get(1)?,
        category: enum_col(row, 2)?,
        department: row.get(3)?,
        status: enum_col(row, 4)?,
        created_at: ts_col(row, 5)?,
    })
}

impl PlannerDb {
    /// Open or create the planner database. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage("DB open"))?;

        // WAL is unavailable for in-memory databases; ignore the outcome.
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(storage("Pragma"))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PlannerError::Storage(format!("Lock: {e}")))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL DEFAULT '',
                department TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL DEFAULT 'worker',
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                week TEXT NOT NULL,                 -- YYYY-WW
                year INTEGER NOT NULL,
                week_number INTEGER NOT NULL,
                days_json TEXT NOT NULL,            -- {monday: 'wfo', ...}
                notes TEXT,
                is_locked INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'draft',
                submitted_at TEXT,
                approved_by TEXT,
                approved_at TEXT,
                feedback TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, week)
            );
            CREATE INDEX IF NOT EXISTS idx_schedules_week ON schedules(week);

            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                created_by TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                allow_multiple_votes INTEGER NOT NULL DEFAULT 0,
                is_anonymous INTEGER NOT NULL DEFAULT 0,
                category TEXT NOT NULL DEFAULT 'general',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS poll_options (
                poll_id TEXT NOT NULL,
                idx INTEGER NOT NULL,
                text TEXT NOT NULL,
                PRIMARY KEY (poll_id, idx),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );

            -- One vote per user per poll, whatever the option.
            CREATE TABLE IF NOT EXISTS poll_votes (
                poll_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                option_index INTEGER NOT NULL,
                voted_at TEXT NOT NULL,
                PRIMARY KEY (poll_id, user_id),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                post_type TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                author_id TEXT NOT NULL,
                target_user_id TEXT,
                department TEXT NOT NULL,
                tags_json TEXT NOT NULL DEFAULT '[]',
                is_public INTEGER NOT NULL DEFAULT 1,
                is_pinned INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS post_likes (
                post_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                liked_at TEXT NOT NULL,
                PRIMARY KEY (post_id, user_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS post_comments (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );

            -- Anonymous: no author column.
            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                message TEXT NOT NULL,
                category TEXT NOT NULL,
                department TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                created_at TEXT NOT NULL
            );
            ",
        )
        .map_err(storage("Migration"))?;
        Ok(())
    }

    // ── Users ──────────────────────────────

    /// Refresh the directory row for an authenticated caller.
    pub fn upsert_user(&self, identity: &Identity) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, name, email, department, role, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
               name=?2, email=?3, department=?4, role=?5, updated_at=?6",
            params![
                identity.user_id,
                identity.name,
                identity.email,
                identity.department,
                identity.role.as_str(),
                fmt_ts(&Utc::now()),
            ],
        )
        .map_err(storage("Upsert user"))?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserSummary>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id=?1"),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(storage("Get user"))
    }

    /// Directory rows for a set of ids. Unknown ids are simply absent.
    pub fn users_by_ids<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> Result<HashMap<String, UserSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {USER_COLS} FROM users WHERE id=?1"))
            .map_err(storage("Prepare"))?;
        let mut users = HashMap::new();
        for id in ids {
            if users.contains_key(id) {
                continue;
            }
            if let Some(user) = stmt
                .query_row(params![id], row_to_user)
                .optional()
                .map_err(storage("Get user"))?
            {
                users.insert(id.to_string(), user);
            }
        }
        Ok(users)
    }

    pub fn department_members(&self, department: &str) -> Result<Vec<UserSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLS} FROM users WHERE department=?1 ORDER BY name"
            ))
            .map_err(storage("Prepare"))?;
        let users = stmt
            .query_map(params![department], row_to_user)
            .map_err(storage("Query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("Read users"))?;
        Ok(users)
    }

    // ── Schedules ──────────────────────────────

    /// Insert a new schedule. A second record for the same (user, week) is a `Conflict`.
    pub fn insert_schedule(&self, s: &Schedule) -> Result<()> {
        let conn = self.lock()?;
        let days_json = serde_json::to_string(&s.schedule)
            .map_err(|e| PlannerError::Storage(format!("Encode days: {e}")))?;
        conn.execute(
            "INSERT INTO schedules (id, user_id, week, year, week_number, days_json, notes, is_locked,
                status, submitted_at, approved_by, approved_at, feedback, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                s.id,
                s.user_id,
                s.week.to_string(),
                s.week.year,
                s.week.week_number,
                days_json,
                s.notes,
                s.is_locked as i32,
                s.status.as_str(),
                s.submitted_at.as_ref().map(fmt_ts),
                s.approved_by,
                s.approved_at.as_ref().map(fmt_ts),
                s.feedback,
                fmt_ts(&s.created_at),
                fmt_ts(&s.updated_at),
            ],
        )
        .map_err(|e| {
            if is_constraint(&e) {
                PlannerError::Conflict(format!("Schedule for week {} already exists", s.week))
            } else {
                storage("Insert schedule")(e)
            }
        })?;
        Ok(())
    }

    /// Overwrite days and notes of an unlocked record.
    /// Returns `false` when the row is locked (or gone) at write time.
    pub fn update_schedule_days(&self, s: &Schedule) -> Result<bool> {
        let conn = self.lock()?;
        let days_json = serde_json::to_string(&s.schedule)
            .map_err(|e| PlannerError::Storage(format!("Encode days: {e}")))?;
        let changed = conn
            .execute(
                "UPDATE schedules SET days_json=?2, notes=?3, year=?4, week_number=?5, updated_at=?6
                 WHERE id=?1 AND is_locked=0",
                params![
                    s.id,
                    days_json,
                    s.notes,
                    s.week.year,
                    s.week.week_number,
                    fmt_ts(&s.updated_at),
                ],
            )
            .map_err(storage("Update schedule"))?;
        Ok(changed > 0)
    }

    /// Persist workflow fields (status, submission and approval).
    pub fn update_schedule_workflow(&self, s: &Schedule) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE schedules SET status=?2, submitted_at=?3, approved_by=?4, approved_at=?5,
                feedback=?6, updated_at=?7
             WHERE id=?1",
            params![
                s.id,
                s.status.as_str(),
                s.submitted_at.as_ref().map(fmt_ts),
                s.approved_by,
                s.approved_at.as_ref().map(fmt_ts),
                s.feedback,
                fmt_ts(&s.updated_at),
            ],
        )
        .map_err(storage("Update schedule workflow"))?;
        Ok(())
    }

    pub fn set_schedule_lock(&self, id: &str, locked: bool, now: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE schedules SET is_locked=?2, updated_at=?3 WHERE id=?1",
            params![id, locked as i32, fmt_ts(&now)],
        )
        .map_err(storage("Lock schedule"))?;
        Ok(())
    }

    pub fn get_schedule(&self, id: &str) -> Result<Option<Schedule>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {SCHEDULE_COLS} FROM schedules s WHERE s.id=?1"),
            params![id],
            row_to_schedule,
        )
        .optional()
        .map_err(storage("Get schedule"))
    }

    pub fn find_schedule(&self, user_id: &str, week: &WeekKey) -> Result<Option<Schedule>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {SCHEDULE_COLS} FROM schedules s WHERE s.user_id=?1 AND s.week=?2"),
            params![user_id, week.to_string()],
            row_to_schedule,
        )
        .optional()
        .map_err(storage("Find schedule"))
    }

    /// A user's schedules, newest week first.
    pub fn list_user_schedules(
        &self,
        user_id: &str,
        week: Option<&WeekKey>,
        year: Option<i32>,
    ) -> Result<Vec<Schedule>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SCHEDULE_COLS} FROM schedules s
                 WHERE s.user_id=?1 AND (?2 IS NULL OR s.week=?2) AND (?3 IS NULL OR s.year=?3)
                 ORDER BY s.year DESC, s.week_number DESC"
            ))
            .map_err(storage("Prepare"))?;
        let schedules = stmt
            .query_map(
                params![user_id, week.map(|w| w.to_string()), year],
                row_to_schedule,
            )
            .map_err(storage("Query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("Read schedules"))?;
        Ok(schedules)
    }

    /// Schedules of a department (or every department when `None`).
    pub fn list_team_schedules(
        &self,
        department: Option<&str>,
        week: Option<&WeekKey>,
    ) -> Result<Vec<Schedule>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SCHEDULE_COLS} FROM schedules s
                 LEFT JOIN users u ON u.id = s.user_id
                 WHERE (?1 IS NULL OR u.department=?1) AND (?2 IS NULL OR s.week=?2)
                 ORDER BY s.year DESC, s.week_number DESC, u.name"
            ))
            .map_err(storage("Prepare"))?;
        let schedules = stmt
            .query_map(
                params![department, week.map(|w| w.to_string())],
                row_to_schedule,
            )
            .map_err(storage("Query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("Read schedules"))?;
        Ok(schedules)
    }

    // ── Polls ──────────────────────────────

    pub fn insert_poll(&self, poll: &Poll) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage("Begin"))?;
        tx.execute(
            &format!("INSERT INTO polls ({POLL_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                poll.id,
                poll.title,
                poll.description,
                poll.created_by,
                fmt_ts(&poll.expires_at),
                poll.is_active as i32,
                poll.allow_multiple_votes as i32,
                poll.is_anonymous as i32,
                poll.category.as_str(),
                fmt_ts(&poll.created_at),
                fmt_ts(&poll.updated_at),
            ],
        )
        .map_err(storage("Insert poll"))?;
        for (idx, option) in poll.options.iter().enumerate() {
            tx.execute(
                "INSERT INTO poll_options (poll_id, idx, text) VALUES (?1, ?2, ?3)",
                params![poll.id, idx as i64, option.text],
            )
            .map_err(storage("Insert poll option"))?;
        }
        tx.commit().map_err(storage("Commit"))?;
        Ok(())
    }

    pub fn get_poll(&self, id: &str) -> Result<Option<Poll>> {
        let conn = self.lock()?;
        load_poll(&conn, id)
    }

    /// Polls matching `filter`, newest first. `active=true` also requires
    /// `expires_at > now`; `active=false` selects closed polls.
    pub fn list_polls(&self, filter: &PollFilter, now: DateTime<Utc>) -> Result<Vec<Poll>> {
        let conn = self.lock()?;
        let ids = {
            let mut stmt = conn
                .prepare(
                    "SELECT id FROM polls
                     WHERE (?1 IS NULL OR category=?1)
                       AND (?2 IS NULL
                            OR (?2 = 1 AND is_active = 1 AND expires_at > ?3)
                            OR (?2 = 0 AND is_active = 0))
                     ORDER BY created_at DESC",
                )
                .map_err(storage("Prepare"))?;
            let ids = stmt
                .query_map(
                    params![
                        filter.category.map(|c| c.as_str()),
                        filter.active.map(i32::from),
                        fmt_ts(&now),
                    ],
                    |row| row.get::<_, String>(0),
                )
                .map_err(storage("Query"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage("Read polls"))?;
            ids
        };
        let mut polls = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(poll) = load_poll(&conn, &id)? {
                polls.push(poll);
            }
        }
        Ok(polls)
    }

    /// Record a first vote. An existing vote by the same user is a `Conflict`.
    pub fn insert_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        option_index: usize,
        voted_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO poll_votes (poll_id, user_id, option_index, voted_at) VALUES (?1, ?2, ?3, ?4)",
            params![poll_id, user_id, option_index as i64, fmt_ts(&voted_at)],
        )
        .map_err(|e| {
            if is_constraint(&e) {
                PlannerError::Conflict("You have already voted on this poll".into())
            } else {
                storage("Insert vote")(e)
            }
        })?;
        touch_poll(&conn, poll_id, voted_at)?;
        Ok(())
    }

    /// Purge the user's votes on the poll and insert the new one atomically.
    /// Returns the number of purged votes.
    pub fn replace_vote(
        &self,
        poll_id: &str,
        user_id: &str,
        option_index: usize,
        voted_at: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage("Begin"))?;
        let purged = tx
            .execute(
                "DELETE FROM poll_votes WHERE poll_id=?1 AND user_id=?2",
                params![poll_id, user_id],
            )
            .map_err(storage("Purge votes"))?;
        tx.execute(
            "INSERT INTO poll_votes (poll_id, user_id, option_index, voted_at) VALUES (?1, ?2, ?3, ?4)",
            params![poll_id, user_id, option_index as i64, fmt_ts(&voted_at)],
        )
        .map_err(storage("Insert vote"))?;
        touch_poll(&tx, poll_id, voted_at)?;
        tx.commit().map_err(storage("Commit"))?;
        Ok(purged)
    }

    /// Remove a poll with its options and votes. Returns whether it existed.
    pub fn delete_poll(&self, id: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage("Begin"))?;
        tx.execute("DELETE FROM poll_votes WHERE poll_id=?1", params![id])
            .map_err(storage("Delete votes"))?;
        tx.execute("DELETE FROM poll_options WHERE poll_id=?1", params![id])
            .map_err(storage("Delete options"))?;
        let removed = tx
            .execute("DELETE FROM polls WHERE id=?1", params![id])
            .map_err(storage("Delete poll"))?;
        tx.commit().map_err(storage("Commit"))?;
        Ok(removed > 0)
    }

    pub fn set_poll_active(&self, id: &str, active: bool, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE polls SET is_active=?2, updated_at=?3 WHERE id=?1",
                params![id, active as i32, fmt_ts(&now)],
            )
            .map_err(storage("Update poll"))?;
        Ok(changed > 0)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql).map_err(storage("Raw"))
    }

    #[cfg(test)]
    pub(crate) fn set_poll_expiry(&self, id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE polls SET expires_at=?2 WHERE id=?1",
            params![id, fmt_ts(&expires_at)],
        )
        .map_err(storage("Update poll"))?;
        Ok(())
    }

    // ── Motivation posts ──────────────────────────────

    pub fn insert_post(&self, post: &Post) -> Result<()> {
        let conn = self.lock()?;
        let tags_json = serde_json::to_string(&post.tags).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            &format!(
                "INSERT INTO posts ({POST_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                post.id,
                post.post_type.as_str(),
                post.title,
                post.content,
                post.author_id,
                post.target_user_id,
                post.department,
                tags_json,
                post.is_public as i32,
                post.is_pinned as i32,
                fmt_ts(&post.created_at),
                fmt_ts(&post.updated_at),
            ],
        )
        .map_err(storage("Insert post"))?;
        Ok(())
    }

    pub fn get_post(&self, id: &str) -> Result<Option<Post>> {
        let conn = self.lock()?;
        let post = conn
            .query_row(
                &format!("SELECT {POST_COLS} FROM posts WHERE id=?1"),
                params![id],
                row_to_post,
            )
            .optional()
            .map_err(storage("Get post"))?;
        post.map(|p| load_post_children(&conn, p)).transpose()
    }

    /// Posts visible to a member of `department`: public ones plus the
    /// department's own. Pinned first, then newest.
    pub fn list_visible_posts(&self, department: &str) -> Result<Vec<Post>> {
        let conn = self.lock()?;
        let posts = {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {POST_COLS} FROM posts
                     WHERE is_public = 1 OR department = ?1
                     ORDER BY is_pinned DESC, created_at DESC"
                ))
                .map_err(storage("Prepare"))?;
            let posts = stmt
                .query_map(params![department], row_to_post)
                .map_err(storage("Query"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage("Read posts"))?;
            posts
        };
        posts
            .into_iter()
            .map(|p| load_post_children(&conn, p))
            .collect()
    }

    /// Like when not yet liked, otherwise unlike. Returns the new liked state.
    pub fn toggle_like(&self, post_id: &str, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage("Begin"))?;
        let removed = tx
            .execute(
                "DELETE FROM post_likes WHERE post_id=?1 AND user_id=?2",
                params![post_id, user_id],
            )
            .map_err(storage("Unlike"))?;
        if removed == 0 {
            tx.execute(
                "INSERT INTO post_likes (post_id, user_id, liked_at) VALUES (?1, ?2, ?3)",
                params![post_id, user_id, fmt_ts(&now)],
            )
            .map_err(storage("Like"))?;
        }
        tx.commit().map_err(storage("Commit"))?;
        Ok(removed == 0)
    }

    pub fn insert_comment(&self, post_id: &str, comment: &Comment) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO post_comments (id, post_id, user_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comment.id,
                post_id,
                comment.user_id,
                comment.content,
                fmt_ts(&comment.created_at),
            ],
        )
        .map_err(storage("Insert comment"))?;
        Ok(())
    }

    pub fn set_post_pinned(&self, id: &str, pinned: bool, now: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE posts SET is_pinned=?2, updated_at=?3 WHERE id=?1",
            params![id, pinned as i32, fmt_ts(&now)],
        )
        .map_err(storage("Pin post"))?;
        Ok(())
    }

    // ── Feedback ──────────────────────────────

    pub fn insert_feedback(&self, feedback: &Feedback) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO feedback (id, message, category, department, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                feedback.id,
                feedback.message,
                feedback.category.as_str(),
                feedback.department,
                feedback.status.as_str(),
                fmt_ts(&feedback.created_at),
            ],
        )
        .map_err(storage("Insert feedback"))?;
        Ok(())
    }

    /// Feedback newest first, optionally limited to one department.
    pub fn list_feedback(&self, department: Option<&str>) -> Result<Vec<Feedback>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, message, category, department, status, created_at FROM feedback
                 WHERE ?1 IS NULL OR department=?1
                 ORDER BY created_at DESC",
            )
            .map_err(storage("Prepare"))?;
        let items = stmt
            .query_map(params![department], row_to_feedback)
            .map_err(storage("Query"))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage("Read feedback"))?;
        Ok(items)
    }
}

fn touch_poll(conn: &Connection, poll_id: &str, now: DateTime<Utc>) -> Result<()> {
    conn.execute(
        "UPDATE polls SET updated_at=?2 WHERE id=?1",
        params![poll_id, fmt_ts(&now)],
    )
    .map_err(storage("Touch poll"))?;
    Ok(())
}

fn load_poll(conn: &Connection, id: &str) -> Result<Option<Poll>> {
    let poll = conn
        .query_row(
            &format!("SELECT {POLL_COLS} FROM polls WHERE id=?1"),
            params![id],
            |row| {
                Ok(Poll {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    created_by: row.get(3)?,
                    expires_at: ts_col(row, 4)?,
                    is_active: bool_col(row, 5)?,
                    allow_multiple_votes: bool_col(row, 6)?,
                    is_anonymous: bool_col(row, 7)?,
                    category: enum_col(row, 8)?,
                    created_at: ts_col(row, 9)?,
                    updated_at: ts_col(row, 10)?,
                    options: Vec::new(),
                })
            },
        )
        .optional()
        .map_err(storage("Get poll"))?;
    let Some(mut poll) = poll else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare("SELECT text FROM poll_options WHERE poll_id=?1 ORDER BY idx")
        .map_err(storage("Prepare"))?;
    poll.options = stmt
        .query_map(params![id], |row| {
            Ok(PollOption {
                text: row.get(0)?,
                votes: Vec::new(),
            })
        })
        .map_err(storage("Query"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage("Read poll options"))?;

    let mut stmt = conn
        .prepare(
            "SELECT user_id, option_index, voted_at FROM poll_votes
             WHERE poll_id=?1 ORDER BY voted_at, rowid",
        )
        .map_err(storage("Prepare"))?;
    let votes = stmt
        .query_map(params![id], |row| {
            Ok((
                row.get::<_, i64>(1)?,
                Vote {
                    user_id: row.get(0)?,
                    voted_at: ts_col(row, 2)?,
                },
            ))
        })
        .map_err(storage("Query"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage("Read votes"))?;
    for (idx, vote) in votes {
        if let Some(option) = usize::try_from(idx).ok().and_then(|i| poll.options.get_mut(i)) {
            option.votes.push(vote);
        }
    }
    Ok(Some(poll))
}

fn load_post_children(conn: &Connection, mut post: Post) -> Result<Post> {
    let mut stmt = conn
        .prepare("SELECT user_id, liked_at FROM post_likes WHERE post_id=?1 ORDER BY liked_at")
        .map_err(storage("Prepare"))?;
    post.likes = stmt
        .query_map(params![post.id], |row| {
            Ok(Like {
                user_id: row.get(0)?,
                liked_at: ts_col(row, 1)?,
            })
        })
        .map_err(storage("Query"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage("Read likes"))?;

    let mut stmt = conn
        .prepare(
            "SELECT id, user_id, content, created_at FROM post_comments
             WHERE post_id=?1 ORDER BY created_at, rowid",
        )
        .map_err(storage("Prepare"))?;
    post.comments = stmt
        .query_map(params![post.id], |row| {
            Ok(Comment {
                id: row.get(0)?,
                user_id: row.get(1)?,
                content: row.get(2)?,
                created_at: ts_col(row, 3)?,
            })
        })
        .map_err(storage("Query"))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage("Read comments"))?;
    Ok(post)
}
