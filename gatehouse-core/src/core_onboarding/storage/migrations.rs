//! Database migrations for onboarding state
//!
//! Versioned, forward-only in normal operation. Each migration is applied in
//! its own transaction and recorded in the `schema_version` table; `down_sql`
//! exists for operators rolling back a bad deploy.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use super::StoreResult;
use crate::core_onboarding::types::Timestamp;

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Migration descriptor
pub struct Migration {
    pub version: i32,
    pub description: &'static str,
    pub up_sql: &'static str,
    pub down_sql: Option<&'static str>,
}

/// All available migrations in order
pub fn get_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Members, submissions and answers",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS members (
                    group_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    status TEXT NOT NULL CHECK(status IN ('NONE', 'IN_PROGRESS', 'PENDING', 'APPROVED', 'REJECTED')),
                    role_tier INTEGER NOT NULL CHECK(role_tier BETWEEN 0 AND 4),
                    appeal_used INTEGER NOT NULL DEFAULT 0,
                    display_name TEXT,
                    avatar_ref TEXT,
                    nickname TEXT,
                    joined_at INTEGER NOT NULL,
                    approved_at INTEGER,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (group_id, user_id)
                );

                CREATE INDEX IF NOT EXISTS idx_members_status ON members(group_id, status);

                CREATE TABLE IF NOT EXISTS submissions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    group_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    kind TEXT NOT NULL CHECK(kind IN ('APPLICANT', 'REFERRAL', 'NONE')),
                    referral_note TEXT,
                    status TEXT NOT NULL CHECK(status IN ('IN_PROGRESS', 'PENDING', 'APPROVED', 'REJECTED', 'ABANDONED')),
                    flagged INTEGER NOT NULL DEFAULT 0,
                    flag_reason TEXT,
                    created_at INTEGER NOT NULL,
                    submitted_at INTEGER,
                    reviewer_id TEXT,
                    decision_reason TEXT,
                    granted_tier INTEGER,
                    reviewed_at INTEGER,
                    FOREIGN KEY (group_id, user_id) REFERENCES members(group_id, user_id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_submissions_member ON submissions(group_id, user_id, status);
                CREATE INDEX IF NOT EXISTS idx_submissions_queue
                    ON submissions(group_id, submitted_at)
                    WHERE status = 'PENDING';

                CREATE TABLE IF NOT EXISTS answers (
                    submission_id INTEGER NOT NULL,
                    question_id TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    value_kind TEXT NOT NULL CHECK(value_kind IN ('text', 'choice')),
                    value TEXT NOT NULL,
                    answered_at INTEGER NOT NULL,
                    PRIMARY KEY (submission_id, question_id),
                    FOREIGN KEY (submission_id) REFERENCES submissions(id) ON DELETE CASCADE
                );
            "#,
            down_sql: Some(
                r#"
                DROP TABLE IF EXISTS answers;
                DROP INDEX IF EXISTS idx_submissions_queue;
                DROP INDEX IF EXISTS idx_submissions_member;
                DROP TABLE IF EXISTS submissions;
                DROP INDEX IF EXISTS idx_members_status;
                DROP TABLE IF EXISTS members;
            "#,
            ),
        },
        Migration {
            version: 2,
            description: "Appeals and audit log",
            up_sql: r#"
                CREATE TABLE IF NOT EXISTS appeals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    group_id TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    status TEXT NOT NULL CHECK(status IN ('PENDING', 'APPROVED', 'REJECTED')),
                    created_at INTEGER NOT NULL,
                    reviewer_id TEXT,
                    reviewer_note TEXT,
                    reviewed_at INTEGER,
                    UNIQUE (group_id, user_id),
                    FOREIGN KEY (group_id, user_id) REFERENCES members(group_id, user_id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_appeals_queue
                    ON appeals(group_id, created_at)
                    WHERE status = 'PENDING';

                -- Append-only; outlives member purges
                CREATE TABLE IF NOT EXISTS audit_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    group_id TEXT NOT NULL,
                    target_id TEXT NOT NULL,
                    actor_id TEXT NOT NULL,
                    action TEXT NOT NULL,
                    submission_id INTEGER,
                    appeal_id INTEGER,
                    reason TEXT,
                    banned INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_audit_target ON audit_log(group_id, target_id, created_at);
            "#,
            down_sql: Some(
                r#"
                DROP INDEX IF EXISTS idx_audit_target;
                DROP TABLE IF EXISTS audit_log;
                DROP INDEX IF EXISTS idx_appeals_queue;
                DROP TABLE IF EXISTS appeals;
            "#,
            ),
        },
    ]
}

fn ensure_version_table(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// Highest applied version, 0 for a fresh database
pub fn get_current_version(conn: &Connection) -> StoreResult<i32> {
    ensure_version_table(conn)?;
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get::<_, Option<i32>>(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Run all pending migrations; returns the versions applied
pub fn migrate(conn: &mut Connection) -> StoreResult<Vec<i32>> {
    ensure_version_table(conn)?;
    let mut applied = Vec::new();

    for migration in get_migrations() {
        // Immediate lock so two processes never apply the same version
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if get_current_version(&tx)? >= migration.version {
            continue;
        }

        tx.execute_batch(migration.up_sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            params![migration.version, Timestamp::now()],
        )?;
        tx.commit()?;

        info!(version = migration.version, description = migration.description, "Applied schema migration");
        applied.push(migration.version);
    }

    if applied.is_empty() {
        debug!(version = CURRENT_SCHEMA_VERSION, "Schema up to date");
    }
    Ok(applied)
}

/// Undo migrations above `target`, newest first; returns the versions reverted
pub fn rollback(conn: &mut Connection, target: i32) -> StoreResult<Vec<i32>> {
    let mut reverted = Vec::new();
    let mut migrations = get_migrations();
    migrations.reverse();

    for migration in migrations.into_iter().filter(|m| m.version > target) {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if get_current_version(&tx)? < migration.version {
            continue;
        }
        if let Some(down_sql) = migration.down_sql {
            tx.execute_batch(down_sql)?;
        }
        tx.execute("DELETE FROM schema_version WHERE version = ?1", params![migration.version])?;
        tx.commit()?;

        info!(version = migration.version, "Reverted schema migration");
        reverted.push(migration.version);
    }

    Ok(reverted)
}

/// Get the latest migration version available
pub fn get_latest_version() -> i32 {
    get_migrations().iter().map(|m| m.version).max().unwrap_or(0)
}
