//! SQL-based storage for members, submissions, appeals and the audit log

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::{migrations, StoreError, StoreResult};
use crate::config::StoreConfig;
use crate::core_onboarding::appeal::{Appeal, AppealStatus};
use crate::core_onboarding::audit::AuditEntry;
use crate::core_onboarding::member::{ApplicationStatus, Member, ProfileSnapshot};
use crate::core_onboarding::question_graph::AnswerValue;
use crate::core_onboarding::session::{
    Answer, Submission, SubmissionDecision, SubmissionKind, SubmissionStatus,
};
use crate::core_onboarding::types::{
    AppealId, GroupId, MemberKey, OptionId, SubmissionId, Timestamp, UserId,
};

const MEMBER_COLUMNS: &str = "group_id, user_id, status, role_tier, appeal_used, display_name, \
     avatar_ref, nickname, joined_at, approved_at, updated_at";

const SUBMISSION_COLUMNS: &str = "id, group_id, user_id, kind, referral_note, status, flagged, \
     flag_reason, created_at, submitted_at, reviewer_id, decision_reason, granted_tier, reviewed_at";

const APPEAL_COLUMNS: &str = "id, group_id, user_id, reason, status, created_at, reviewer_id, \
     reviewer_note, reviewed_at";

const AUDIT_COLUMNS: &str = "id, group_id, target_id, actor_id, action, submission_id, appeal_id, \
     reason, banned, created_at";

fn configure_connection(conn: &mut Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(busy_timeout)
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqlStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqlStore {
    /// Wrap an existing pool and bring its schema up to date
    pub fn new(pool: Pool<SqliteConnectionManager>) -> StoreResult<Self> {
        {
            let mut conn = pool.get()?;
            migrations::migrate(&mut conn)?;
        }
        Ok(Self { pool })
    }

    /// Open (creating if needed) the database described by `config`
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        Self::open_path(&config.database_path, config.pool_size, config.busy_timeout)
    }

    pub fn open_path(path: impl AsRef<Path>, pool_size: u32, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(format!("{}: {}", parent.display(), e)))?;
        }

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            configure_connection(conn, busy_timeout)?;
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        info!(path = %path.display(), pool_size, "Opened onboarding database");
        Self::new(pool)
    }

    /// Private in-memory database
    ///
    /// Every SQLite `:memory:` connection is its own database, so the pool
    /// holds exactly one connection.
    pub fn memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| configure_connection(conn, Duration::from_secs(5)));
        let pool = Pool::builder().max_size(1).build(manager)?;
        Self::new(pool)
    }

    pub fn schema_version(&self) -> StoreResult<i32> {
        let conn = self.pool.get()?;
        migrations::get_current_version(&conn)
    }

    /// Run `f` in an IMMEDIATE transaction; commits on `Ok`, rolls back on `Err`
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    /// Run `f` in a read transaction for a consistent snapshot
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }

    fn run<T, E, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T, E>
    where
        F: FnOnce(&StoreTx<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.pool.get().map_err(StoreError::from)?;
        let tx = conn.transaction_with_behavior(behavior).map_err(StoreError::from)?;
        let value = f(&StoreTx::new(&tx))?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

/// Statements available inside one transaction
pub struct StoreTx<'a> {
    conn: &'a Connection,
}

fn corrupt(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn member_from_row(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        key: MemberKey { group: row.get(0)?, user: row.get(1)? },
        status: row.get(2)?,
        role_tier: row.get(3)?,
        appeal_used: row.get(4)?,
        profile: ProfileSnapshot {
            display_name: row.get(5)?,
            avatar_ref: row.get(6)?,
            nickname: row.get(7)?,
        },
        joined_at: row.get(8)?,
        approved_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<Submission> {
    let created_at: Timestamp = row.get(8)?;
    let reviewer: Option<UserId> = row.get(10)?;
    let decision = match reviewer {
        Some(reviewer) => Some(SubmissionDecision {
            reviewer,
            reason: row.get(11)?,
            granted_tier: row.get(12)?,
            reviewed_at: row.get::<_, Option<Timestamp>>(13)?.unwrap_or(created_at),
        }),
        None => None,
    };

    Ok(Submission {
        id: row.get(0)?,
        member: MemberKey { group: row.get(1)?, user: row.get(2)? },
        kind: row.get(3)?,
        referral_note: row.get(4)?,
        status: row.get(5)?,
        answers: Vec::new(),
        flagged: row.get(6)?,
        flag_reason: row.get(7)?,
        created_at,
        submitted_at: row.get(9)?,
        decision,
    })
}

fn appeal_from_row(row: &Row<'_>) -> rusqlite::Result<Appeal> {
    Ok(Appeal {
        id: row.get(0)?,
        member: MemberKey { group: row.get(1)?, user: row.get(2)? },
        reason: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        reviewer: row.get(6)?,
        reviewer_note: row.get(7)?,
        reviewed_at: row.get(8)?,
    })
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.get(0)?,
        group: row.get(1)?,
        target: row.get(2)?,
        actor: row.get(3)?,
        action: row.get(4)?,
        submission: row.get(5)?,
        appeal: row.get(6)?,
        reason: row.get(7)?,
        banned: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn answer_from_row(row: &Row<'_>) -> rusqlite::Result<Answer> {
    let kind: String = row.get(1)?;
    let raw: String = row.get(2)?;
    let value = match kind.as_str() {
        "text" => AnswerValue::Text(raw),
        "choice" => AnswerValue::Choice(OptionId(raw)),
        other => return Err(corrupt(1, format!("unknown answer kind '{}'", other))),
    };
    Ok(Answer { question: row.get(0)?, value, answered_at: row.get(3)? })
}

impl<'a> StoreTx<'a> {
    fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ===== Members =====

    pub fn get_member(&self, key: &MemberKey) -> StoreResult<Option<Member>> {
        let member = self
            .conn
            .query_row(
                &format!("SELECT {} FROM members WHERE group_id = ?1 AND user_id = ?2", MEMBER_COLUMNS),
                params![key.group, key.user],
                member_from_row,
            )
            .optional()?;
        Ok(member)
    }

    pub fn insert_member(&self, member: &Member) -> StoreResult<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO members ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                MEMBER_COLUMNS
            ),
            params![
                member.key.group,
                member.key.user,
                member.status,
                member.role_tier,
                member.appeal_used,
                member.profile.display_name,
                member.profile.avatar_ref,
                member.profile.nickname,
                member.joined_at,
                member.approved_at,
                member.updated_at,
            ],
        )?;
        debug!(member = %member.key, status = %member.status, "Inserted member");
        Ok(())
    }

    /// Load the member, inserting a fresh NONE record when unknown; the flag says which
    pub fn ensure_member(&self, key: &MemberKey, now: Timestamp) -> StoreResult<(Member, bool)> {
        if let Some(member) = self.get_member(key)? {
            return Ok((member, false));
        }
        let member = Member::new(key.clone(), now);
        self.insert_member(&member)?;
        Ok((member, true))
    }

    /// Write status, tier, appeal flag and approval time if the stored status
    /// is still `expected`; false means someone else moved it first
    pub fn save_member(&self, member: &Member, expected: ApplicationStatus) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE members
             SET status = ?1, role_tier = ?2, appeal_used = ?3, approved_at = ?4, updated_at = ?5
             WHERE group_id = ?6 AND user_id = ?7 AND status = ?8",
            params![
                member.status,
                member.role_tier,
                member.appeal_used,
                member.approved_at,
                member.updated_at,
                member.key.group,
                member.key.user,
                expected,
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn update_profile(&self, key: &MemberKey, profile: &ProfileSnapshot, now: Timestamp) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE members SET display_name = ?1, avatar_ref = ?2, nickname = ?3, updated_at = ?4
             WHERE group_id = ?5 AND user_id = ?6",
            params![profile.display_name, profile.avatar_ref, profile.nickname, now, key.group, key.user],
        )?;
        Ok(())
    }

    /// Spend the appeal right; false unless the member is REJECTED and has not appealed
    pub fn claim_appeal(&self, key: &MemberKey, now: Timestamp) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE members SET appeal_used = 1, updated_at = ?1
             WHERE group_id = ?2 AND user_id = ?3 AND status = 'REJECTED' AND appeal_used = 0",
            params![now, key.group, key.user],
        )?;
        Ok(changed == 1)
    }

    // ===== Submissions =====

    pub fn insert_submission(
        &self,
        key: &MemberKey,
        kind: SubmissionKind,
        referral_note: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<Submission> {
        self.conn.execute(
            "INSERT INTO submissions (group_id, user_id, kind, referral_note, status, flagged, created_at)
             VALUES (?1, ?2, ?3, ?4, 'IN_PROGRESS', 0, ?5)",
            params![key.group, key.user, kind, referral_note, now],
        )?;
        let id = SubmissionId(self.conn.last_insert_rowid());
        debug!(member = %key, submission = %id, kind = kind.as_str(), "Created submission");

        Ok(Submission {
            id,
            member: key.clone(),
            kind,
            referral_note: referral_note.map(str::to_string),
            status: SubmissionStatus::InProgress,
            answers: Vec::new(),
            flagged: false,
            flag_reason: None,
            created_at: now,
            submitted_at: None,
            decision: None,
        })
    }

    fn load_answers(&self, id: SubmissionId) -> StoreResult<Vec<Answer>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT question_id, value_kind, value, answered_at
             FROM answers WHERE submission_id = ?1 ORDER BY position",
        )?;
        let answers = stmt.query_map(params![id], answer_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(answers)
    }

    fn with_answers(&self, submission: Option<Submission>) -> StoreResult<Option<Submission>> {
        match submission {
            Some(mut submission) => {
                submission.answers = self.load_answers(submission.id)?;
                Ok(Some(submission))
            }
            None => Ok(None),
        }
    }

    pub fn get_submission(&self, id: SubmissionId) -> StoreResult<Option<Submission>> {
        let submission = self
            .conn
            .query_row(
                &format!("SELECT {} FROM submissions WHERE id = ?1", SUBMISSION_COLUMNS),
                params![id],
                submission_from_row,
            )
            .optional()?;
        self.with_answers(submission)
    }

    /// Newest submission of `key` in `status`
    pub fn latest_submission(&self, key: &MemberKey, status: SubmissionStatus) -> StoreResult<Option<Submission>> {
        let submission = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM submissions
                     WHERE group_id = ?1 AND user_id = ?2 AND status = ?3
                     ORDER BY id DESC LIMIT 1",
                    SUBMISSION_COLUMNS
                ),
                params![key.group, key.user, status],
                submission_from_row,
            )
            .optional()?;
        self.with_answers(submission)
    }

    /// Replace the stored answers with `answers`, kept in the given order
    pub fn replace_answers(&self, id: SubmissionId, answers: &[Answer]) -> StoreResult<()> {
        self.conn.execute("DELETE FROM answers WHERE submission_id = ?1", params![id])?;

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO answers (submission_id, question_id, position, value_kind, value, answered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (position, answer) in answers.iter().enumerate() {
            let (kind, value) = match &answer.value {
                AnswerValue::Text(text) => ("text", text.as_str()),
                AnswerValue::Choice(option) => ("choice", option.as_str()),
            };
            stmt.execute(params![id, answer.question, position as i64, kind, value, answer.answered_at])?;
        }
        Ok(())
    }

    /// IN_PROGRESS → PENDING with the computed flag
    pub fn finalize_submission(
        &self,
        id: SubmissionId,
        flagged: bool,
        flag_reason: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE submissions SET status = 'PENDING', flagged = ?1, flag_reason = ?2, submitted_at = ?3
             WHERE id = ?4 AND status = 'IN_PROGRESS'",
            params![flagged, flag_reason, now, id],
        )?;
        Ok(changed == 1)
    }

    /// PENDING → `status` with the reviewer's decision; false if no longer PENDING
    pub fn decide_submission(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
        decision: &SubmissionDecision,
    ) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE submissions
             SET status = ?1, reviewer_id = ?2, decision_reason = ?3, granted_tier = ?4, reviewed_at = ?5
             WHERE id = ?6 AND status = 'PENDING'",
            params![
                status,
                decision.reviewer,
                decision.reason,
                decision.granted_tier,
                decision.reviewed_at,
                id,
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn set_submission_status(
        &self,
        id: SubmissionId,
        from: SubmissionStatus,
        to: SubmissionStatus,
    ) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE submissions SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![to, id, from],
        )?;
        Ok(changed == 1)
    }

    /// Delete every submission (and its answers) of `key`
    pub fn delete_submissions(&self, key: &MemberKey) -> StoreResult<usize> {
        self.conn.execute(
            "DELETE FROM answers WHERE submission_id IN
                 (SELECT id FROM submissions WHERE group_id = ?1 AND user_id = ?2)",
            params![key.group, key.user],
        )?;
        let removed = self.conn.execute(
            "DELETE FROM submissions WHERE group_id = ?1 AND user_id = ?2",
            params![key.group, key.user],
        )?;
        Ok(removed)
    }

    /// PENDING submissions of a group, oldest first
    pub fn pending_submissions(&self, group: &GroupId) -> StoreResult<Vec<Submission>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM submissions WHERE group_id = ?1 AND status = 'PENDING'
             ORDER BY submitted_at, id",
            SUBMISSION_COLUMNS
        ))?;
        let submissions = stmt
            .query_map(params![group], submission_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        submissions
            .into_iter()
            .map(|mut submission| {
                submission.answers = self.load_answers(submission.id)?;
                Ok(submission)
            })
            .collect()
    }

    // ===== Appeals =====

    pub fn insert_appeal(&self, key: &MemberKey, reason: &str, now: Timestamp) -> StoreResult<Appeal> {
        self.conn.execute(
            "INSERT INTO appeals (group_id, user_id, reason, status, created_at)
             VALUES (?1, ?2, ?3, 'PENDING', ?4)",
            params![key.group, key.user, reason, now],
        )?;
        let id = AppealId(self.conn.last_insert_rowid());
        debug!(member = %key, appeal = %id, "Created appeal");

        Ok(Appeal {
            id,
            member: key.clone(),
            reason: reason.to_string(),
            status: AppealStatus::Pending,
            created_at: now,
            reviewer: None,
            reviewer_note: None,
            reviewed_at: None,
        })
    }

    pub fn get_appeal(&self, id: AppealId) -> StoreResult<Option<Appeal>> {
        let appeal = self
            .conn
            .query_row(
                &format!("SELECT {} FROM appeals WHERE id = ?1", APPEAL_COLUMNS),
                params![id],
                appeal_from_row,
            )
            .optional()?;
        Ok(appeal)
    }

    pub fn appeal_for(&self, key: &MemberKey) -> StoreResult<Option<Appeal>> {
        let appeal = self
            .conn
            .query_row(
                &format!("SELECT {} FROM appeals WHERE group_id = ?1 AND user_id = ?2", APPEAL_COLUMNS),
                params![key.group, key.user],
                appeal_from_row,
            )
            .optional()?;
        Ok(appeal)
    }

    /// PENDING → `status`; false if already decided
    pub fn decide_appeal(
        &self,
        id: AppealId,
        status: AppealStatus,
        reviewer: &UserId,
        note: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE appeals SET status = ?1, reviewer_id = ?2, reviewer_note = ?3, reviewed_at = ?4
             WHERE id = ?5 AND status = 'PENDING'",
            params![status, reviewer, note, now, id],
        )?;
        Ok(changed == 1)
    }

    /// Every PENDING appeal of `key` → REJECTED, recorded against `reviewer`
    pub fn close_pending_appeals(
        &self,
        key: &MemberKey,
        reviewer: &UserId,
        note: &str,
        now: Timestamp,
    ) -> StoreResult<usize> {
        let closed = self.conn.execute(
            "UPDATE appeals SET status = 'REJECTED', reviewer_id = ?1, reviewer_note = ?2, reviewed_at = ?3
             WHERE group_id = ?4 AND user_id = ?5 AND status = 'PENDING'",
            params![reviewer, note, now, key.group, key.user],
        )?;
        Ok(closed)
    }

    pub fn delete_appeals(&self, key: &MemberKey) -> StoreResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM appeals WHERE group_id = ?1 AND user_id = ?2",
            params![key.group, key.user],
        )?;
        Ok(removed)
    }

    pub fn pending_appeals(&self, group: &GroupId) -> StoreResult<Vec<Appeal>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM appeals WHERE group_id = ?1 AND status = 'PENDING' ORDER BY created_at, id",
            APPEAL_COLUMNS
        ))?;
        let appeals = stmt.query_map(params![group], appeal_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(appeals)
    }

    // ===== Audit =====

    pub fn append_audit(&self, entry: &AuditEntry) -> StoreResult<i64> {
        self.conn.execute(
            "INSERT INTO audit_log
                 (group_id, target_id, actor_id, action, submission_id, appeal_id, reason, banned, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.group,
                entry.target,
                entry.actor,
                entry.action,
                entry.submission,
                entry.appeal,
                entry.reason,
                entry.banned,
                entry.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Audit entries for a group, optionally narrowed to one target, oldest first
    pub fn audit_entries(&self, group: &GroupId, target: Option<&UserId>) -> StoreResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {} FROM audit_log
             WHERE group_id = ?1 AND (?2 IS NULL OR target_id = ?2)
             ORDER BY id",
            AUDIT_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![group, target], audit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
