//! SQLite-based challenge storage.
//!
//! Provides persistent storage for:
//! - Challenges and their memberships
//! - Append-only reset history per member
//! - Start reasons per member
//!
//! This layer only reads and writes rows. Permission checks, state-machine
//! rules and the per-challenge locks are applied by the callers in
//! `record_store`, `reset_handler` and `reasons`.
//!
//! The locks only cover one process. Writes that depend on a value the
//! caller read earlier (the streak anchor, the participant count, the start
//! time) re-check it inside an immediate transaction, so several processes
//! sharing one file cannot interleave them.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{data_dir, migrations, ChallengeLocks};
use crate::error::{CoreError, DatabaseError, Result};
use crate::model::{
    Challenge, ChallengeDraft, ChallengeId, MemberId, Membership, ReasonId, ResetRecord,
    StartReason, UserId,
};

/// Aggregated reset history of one member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetStats {
    pub reset_count: u32,
    pub logged_seconds: i64,
}

/// SQLite database for challenge storage.
pub struct ChallengeDb {
    conn: Mutex<Connection>,
    locks: ChallengeLocks,
}

/// How long a connection waits for another process's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CHALLENGE_COLUMNS: &str = "challenge_id, owner_user_id, title, description, category,
     target_days, max_participant_count, is_private, start_date_time, created_at";

const MEMBER_COLUMNS: &str =
    "member_id, challenge_id, user_id, joined_at, recent_reset_date_time";

fn challenge_from_row(row: &Row) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        challenge_id: row.get(0)?,
        owner_user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: row.get(4)?,
        target_days: row.get(5)?,
        max_participant_count: row.get(6)?,
        is_private: row.get(7)?,
        start_date_time: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn member_from_row(row: &Row) -> rusqlite::Result<Membership> {
    Ok(Membership {
        member_id: row.get(0)?,
        challenge_id: row.get(1)?,
        user_id: row.get(2)?,
        joined_at: row.get(3)?,
        recent_reset_date_time: row.get(4)?,
    })
}

fn reset_from_row(row: &Row) -> rusqlite::Result<ResetRecord> {
    Ok(ResetRecord {
        reset_record_id: row.get(0)?,
        member_id: row.get(1)?,
        reset_date_time: row.get(2)?,
        record_in_seconds: row.get(3)?,
        content: row.get(4)?,
    })
}

fn reason_from_row(row: &Row) -> rusqlite::Result<StartReason> {
    Ok(StartReason {
        reason_id: row.get(0)?,
        challenge_id: row.get(1)?,
        member_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl ChallengeDb {
    /// Open the database at `<data_dir>/challenges.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("challenges.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for tests and throwaway sessions).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::migrate(&conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            locks: ChallengeLocks::new(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Per-challenge mutation locks.
    pub fn locks(&self) -> &ChallengeLocks {
        &self.locks
    }

    // ── Challenges ───────────────────────────────────────────────────

    /// Insert a challenge and enroll its owner as the first member.
    pub fn insert_challenge(
        &self,
        draft: &ChallengeDraft,
        owner_user_id: UserId,
        created_at: NaiveDateTime,
    ) -> Result<(ChallengeId, MemberId)> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO challenges (owner_user_id, title, description, category,
                 target_days, max_participant_count, is_private, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                owner_user_id,
                draft.title,
                draft.description,
                draft.category,
                draft.target_days,
                draft.max_participant_count,
                draft.is_private,
                created_at,
            ],
        )?;
        let challenge_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO members (challenge_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![challenge_id, owner_user_id, created_at],
        )?;
        let member_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok((challenge_id, member_id))
    }

    pub fn challenge(&self, challenge_id: ChallengeId) -> Result<Option<Challenge>> {
        let conn = self.conn();
        let challenge = conn
            .query_row(
                &format!("SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE challenge_id = ?1"),
                params![challenge_id],
                challenge_from_row,
            )
            .optional()?;
        Ok(challenge)
    }

    /// Set the start time and point every member's streak anchor at it.
    ///
    /// Returns false if the challenge was already started (or is missing).
    pub fn mark_started(&self, challenge_id: ChallengeId, at: NaiveDateTime) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE challenges SET start_date_time = ?1
             WHERE challenge_id = ?2 AND start_date_time IS NULL",
            params![at, challenge_id],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        tx.execute(
            "UPDATE members SET recent_reset_date_time = ?1 WHERE challenge_id = ?2",
            params![at, challenge_id],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Delete a challenge. Members, reset records and start reasons go with it.
    pub fn delete_challenge(&self, challenge_id: ChallengeId) -> Result<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM challenges WHERE challenge_id = ?1",
            params![challenge_id],
        )?;
        Ok(deleted > 0)
    }

    // ── Members ──────────────────────────────────────────────────────

    /// Enroll a user in a challenge that is still waiting and has a free seat.
    ///
    /// Returns `None` when the challenge is missing, started or full at the
    /// moment of the insert. A second membership for the same user is a
    /// `Conflict`.
    pub fn insert_member(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
        joined_at: NaiveDateTime,
    ) -> Result<Option<MemberId>> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO members (challenge_id, user_id, joined_at)
             SELECT c.challenge_id, ?2, ?3
             FROM challenges c
             WHERE c.challenge_id = ?1
               AND c.start_date_time IS NULL
               AND (SELECT COUNT(*) FROM members m WHERE m.challenge_id = c.challenge_id)
                   < c.max_participant_count",
            params![challenge_id, user_id, joined_at],
        );
        let inserted = match inserted {
            Ok(n) => n,
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(CoreError::conflict(format!(
                    "user {user_id} already participates in challenge {challenge_id}"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if inserted == 0 {
            return Ok(None);
        }
        let member_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Some(member_id))
    }

    pub fn member(&self, member_id: MemberId) -> Result<Option<Membership>> {
        let conn = self.conn();
        let member = conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE member_id = ?1"),
                params![member_id],
                member_from_row,
            )
            .optional()?;
        Ok(member)
    }

    pub fn membership(
        &self,
        challenge_id: ChallengeId,
        user_id: UserId,
    ) -> Result<Option<Membership>> {
        let conn = self.conn();
        let member = conn
            .query_row(
                &format!(
                    "SELECT {MEMBER_COLUMNS} FROM members WHERE challenge_id = ?1 AND user_id = ?2"
                ),
                params![challenge_id, user_id],
                member_from_row,
            )
            .optional()?;
        Ok(member)
    }

    /// All members of a challenge, by ascending member id.
    pub fn members(&self, challenge_id: ChallengeId) -> Result<Vec<Membership>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE challenge_id = ?1 ORDER BY member_id"
        ))?;
        let rows = stmt.query_map(params![challenge_id], member_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn participant_count(&self, challenge_id: ChallengeId) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM members WHERE challenge_id = ?1",
            params![challenge_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Remove a member together with its reset history and reasons.
    pub fn delete_member(&self, member_id: MemberId) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM members WHERE member_id = ?1", params![member_id])?;
        Ok(deleted > 0)
    }

    /// Every challenge the user participates in, with the membership.
    pub fn challenges_for_user(&self, user_id: UserId) -> Result<Vec<(Challenge, Membership)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT c.challenge_id, c.owner_user_id, c.title, c.description, c.category,
                    c.target_days, c.max_participant_count, c.is_private, c.start_date_time,
                    c.created_at,
                    m.member_id, m.challenge_id, m.user_id, m.joined_at, m.recent_reset_date_time
             FROM members m
             JOIN challenges c ON c.challenge_id = m.challenge_id
             WHERE m.user_id = ?1
             ORDER BY c.challenge_id",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let challenge = challenge_from_row(row)?;
            let member = Membership {
                member_id: row.get(10)?,
                challenge_id: row.get(11)?,
                user_id: row.get(12)?,
                joined_at: row.get(13)?,
                recent_reset_date_time: row.get(14)?,
            };
            Ok((challenge, member))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // ── Reset history ────────────────────────────────────────────────

    /// Append a reset record and move the member's anchor in one transaction.
    ///
    /// The anchor only moves if it still equals `expected_anchor`. Returns
    /// `None`, with nothing written, when another writer moved it first.
    pub fn append_reset(
        &self,
        member_id: MemberId,
        expected_anchor: NaiveDateTime,
        reset_date_time: NaiveDateTime,
        record_in_seconds: i64,
        content: &str,
    ) -> Result<Option<ResetRecord>> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !swap_anchor(&tx, member_id, expected_anchor, reset_date_time)? {
            return Ok(None);
        }
        tx.execute(
            "INSERT INTO reset_records (member_id, reset_date_time, record_in_seconds, content)
             VALUES (?1, ?2, ?3, ?4)",
            params![member_id, reset_date_time, record_in_seconds, content],
        )?;
        let reset_record_id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(Some(ResetRecord {
            reset_record_id,
            member_id,
            reset_date_time,
            record_in_seconds,
            content: content.to_string(),
        }))
    }

    /// Move the streak anchor without recording a reset.
    ///
    /// Returns false, with nothing written, when the anchor no longer equals
    /// `expected_anchor`.
    pub fn move_anchor(
        &self,
        member_id: MemberId,
        expected_anchor: NaiveDateTime,
        at: NaiveDateTime,
    ) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !swap_anchor(&tx, member_id, expected_anchor, at)? {
            return Ok(false);
        }
        tx.commit()?;
        Ok(true)
    }

    /// Reset history of one member, newest first.
    pub fn reset_records(&self, member_id: MemberId) -> Result<Vec<ResetRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT reset_record_id, member_id, reset_date_time, record_in_seconds, content
             FROM reset_records
             WHERE member_id = ?1
             ORDER BY reset_date_time DESC, reset_record_id DESC",
        )?;
        let rows = stmt.query_map(params![member_id], reset_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Reset count and logged seconds for every member of a challenge.
    /// Members without resets are absent from the map.
    pub fn reset_stats(&self, challenge_id: ChallengeId) -> Result<HashMap<MemberId, ResetStats>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.member_id, COUNT(*), COALESCE(SUM(r.record_in_seconds), 0)
             FROM reset_records r
             JOIN members m ON m.member_id = r.member_id
             WHERE m.challenge_id = ?1
             GROUP BY r.member_id",
        )?;
        let rows = stmt.query_map(params![challenge_id], |row| {
            Ok((
                row.get::<_, MemberId>(0)?,
                ResetStats {
                    reset_count: row.get(1)?,
                    logged_seconds: row.get(2)?,
                },
            ))
        })?;
        Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
    }

    // ── Start reasons ────────────────────────────────────────────────

    pub fn insert_reason(
        &self,
        member_id: MemberId,
        content: &str,
        created_at: NaiveDateTime,
    ) -> Result<ReasonId> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO start_reasons (member_id, content, created_at) VALUES (?1, ?2, ?3)",
            params![member_id, content, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn reason(&self, reason_id: ReasonId) -> Result<Option<StartReason>> {
        let conn = self.conn();
        let reason = conn
            .query_row(
                "SELECT r.reason_id, m.challenge_id, r.member_id, r.content, r.created_at
                 FROM start_reasons r
                 JOIN members m ON m.member_id = r.member_id
                 WHERE r.reason_id = ?1",
                params![reason_id],
                reason_from_row,
            )
            .optional()?;
        Ok(reason)
    }

    /// Reasons of one member in insertion order.
    pub fn reasons(&self, member_id: MemberId) -> Result<Vec<StartReason>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.reason_id, m.challenge_id, r.member_id, r.content, r.created_at
             FROM start_reasons r
             JOIN members m ON m.member_id = r.member_id
             WHERE r.member_id = ?1
             ORDER BY r.reason_id",
        )?;
        let rows = stmt.query_map(params![member_id], reason_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn delete_reason(&self, reason_id: ReasonId) -> Result<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM start_reasons WHERE reason_id = ?1",
            params![reason_id],
        )?;
        Ok(deleted > 0)
    }
}

/// Compare-and-set on a member's anchor. `NotFound` if the member is gone.
fn swap_anchor(
    tx: &rusqlite::Transaction<'_>,
    member_id: MemberId,
    expected: NaiveDateTime,
    next: NaiveDateTime,
) -> Result<bool> {
    let updated = tx.execute(
        "UPDATE members SET recent_reset_date_time = ?1
         WHERE member_id = ?2 AND recent_reset_date_time = ?3",
        params![next, member_id, expected],
    )?;
    if updated == 1 {
        return Ok(true);
    }
    let exists = tx
        .query_row(
            "SELECT 1 FROM members WHERE member_id = ?1",
            params![member_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        Ok(false)
    } else {
        Err(CoreError::not_found(format!("member {member_id}")))
    }
}
