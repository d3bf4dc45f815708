//! Challenge record store.
//!
//! The authoritative owner of challenges, memberships and their histories.
//! Reads assemble a participant's view of a challenge from stored rows and
//! the injected clock; mutations take the per-challenge lock so that
//! concurrent requests against one challenge apply in arrival order.
//!
//! ## Lifecycle
//!
//! ```text
//! create_challenge -> join* -> start -> (resets, continues) -> delete
//! ```

use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::model::{
    Challenge, ChallengeDraft, ChallengeId, ChallengeStatus, MemberId, Membership, ResetInfo,
    StartedChallenge, UserId,
};
use crate::ranking::{load_participants, rank_participants};
use crate::storage::ChallengeDb;
use crate::streak::{self, Streak};

/// Look up a challenge and the caller's membership in it.
///
/// # Errors
/// `NotFound` when the challenge does not exist, `Forbidden` when the caller
/// does not participate.
pub(crate) fn require_participation(
    db: &ChallengeDb,
    challenge_id: ChallengeId,
    user_id: UserId,
) -> Result<(Challenge, Membership)> {
    let challenge = db
        .challenge(challenge_id)?
        .ok_or_else(|| CoreError::not_found(format!("challenge {challenge_id}")))?;
    let member = db.membership(challenge_id, user_id)?.ok_or_else(|| {
        CoreError::forbidden(format!(
            "user {user_id} does not participate in challenge {challenge_id}"
        ))
    })?;
    Ok((challenge, member))
}

/// The caller's streak anchor, or `Conflict` while the challenge is waiting.
pub(crate) fn require_started(challenge: &Challenge, member: &Membership) -> Result<NaiveDateTime> {
    match (challenge.start_date_time, member.recent_reset_date_time) {
        (Some(_), Some(anchor)) => Ok(anchor),
        _ => Err(CoreError::conflict(format!(
            "challenge {} has not started",
            challenge.challenge_id
        ))),
    }
}

pub struct RecordStore {
    db: Arc<ChallengeDb>,
    clock: Arc<dyn Clock>,
}

impl RecordStore {
    pub fn new(db: Arc<ChallengeDb>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn db(&self) -> &Arc<ChallengeDb> {
        &self.db
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Create a waiting challenge owned (and joined) by `owner`.
    pub fn create_challenge(
        &self,
        draft: &ChallengeDraft,
        owner: UserId,
    ) -> Result<(ChallengeId, MemberId)> {
        draft.validate()?;
        let ids = self.db.insert_challenge(draft, owner, self.clock.now())?;
        info!(challenge_id = ids.0, owner, "challenge created");
        Ok(ids)
    }

    /// Join a waiting challenge.
    ///
    /// # Errors
    /// `NotFound` for an unknown challenge; `Conflict` when the challenge has
    /// started, is full, or the user is already a member.
    pub fn join(&self, challenge_id: ChallengeId, user_id: UserId) -> Result<MemberId> {
        self.db.locks().with_lock(challenge_id, || {
            let challenge = self
                .db
                .challenge(challenge_id)?
                .ok_or_else(|| CoreError::not_found(format!("challenge {challenge_id}")))?;
            if challenge.is_started() {
                return Err(CoreError::conflict(format!(
                    "challenge {challenge_id} has already started"
                )));
            }
            if self.db.membership(challenge_id, user_id)?.is_some() {
                return Err(CoreError::conflict(format!(
                    "user {user_id} already participates in challenge {challenge_id}"
                )));
            }
            let count = self.db.participant_count(challenge_id)?;
            if count >= challenge.max_participant_count {
                return Err(CoreError::conflict(format!(
                    "challenge {challenge_id} is full ({count}/{})",
                    challenge.max_participant_count
                )));
            }
            // Another process may have filled the last seat or started the
            // challenge since the checks above; the insert re-checks both.
            let member_id = self
                .db
                .insert_member(challenge_id, user_id, self.clock.now())?
                .ok_or_else(|| {
                    CoreError::conflict(format!(
                        "challenge {challenge_id} filled up or started while joining"
                    ))
                })?;
            info!(challenge_id, member_id, user_id, "member joined");
            Ok(member_id)
        })
    }

    /// Move a waiting challenge to started. Owner only.
    ///
    /// Returns the start time, which becomes every member's streak anchor.
    pub fn start(&self, challenge_id: ChallengeId, caller: UserId) -> Result<NaiveDateTime> {
        self.db.locks().with_lock(challenge_id, || {
            let (challenge, _) = require_participation(&self.db, challenge_id, caller)?;
            if challenge.owner_user_id != caller {
                return Err(CoreError::forbidden(format!(
                    "only the owner can start challenge {challenge_id}"
                )));
            }
            let now = self.clock.now();
            if !self.db.mark_started(challenge_id, now)? {
                return Err(CoreError::conflict(format!(
                    "challenge {challenge_id} has already started"
                )));
            }
            info!(challenge_id, at = %now, "challenge started");
            Ok(now)
        })
    }

    // ── Reads ────────────────────────────────────────────────────────

    fn started_view(
        &self,
        challenge: &Challenge,
        member: &Membership,
        now: NaiveDateTime,
    ) -> Result<Option<StartedChallenge>> {
        let (Some(start_date_time), Some(anchor)) =
            (challenge.start_date_time, member.recent_reset_date_time)
        else {
            return Ok(None);
        };

        let participants = load_participants(&self.db, challenge.challenge_id)?;
        let ranks = rank_participants(&participants, now);
        let mine = ranks.iter().find(|r| r.member_id == member.member_id);

        Ok(Some(StartedChallenge {
            challenge_id: challenge.challenge_id,
            title: challenge.title.clone(),
            description: challenge.description.clone(),
            category: challenge.category.clone(),
            target_days: challenge.target_days,
            current_participant_count: u32::try_from(participants.len()).unwrap_or(u32::MAX),
            max_participant_count: challenge.max_participant_count,
            recent_reset_date_time: anchor,
            start_date_time,
            is_free_mode: challenge.is_free_mode(),
            is_completed: Streak::new(anchor, challenge.target_days).target_reached(now),
            is_private: challenge.is_private,
            rank: mine.map_or(0, |r| r.rank),
            score_rank: mine.map_or(0, |r| r.score_rank),
        }))
    }

    /// The caller's view of a started challenge.
    ///
    /// # Errors
    /// `NotFound`, `Forbidden` (not a participant) or `Conflict` (waiting).
    pub fn get(&self, challenge_id: ChallengeId, caller: UserId) -> Result<StartedChallenge> {
        let (challenge, member) = require_participation(&self.db, challenge_id, caller)?;
        let view = self.started_view(&challenge, &member, self.clock.now())?;
        debug!(challenge_id, caller, "challenge detail read");
        view.ok_or_else(|| CoreError::conflict(format!("challenge {challenge_id} has not started")))
    }

    fn list_with_status(&self, user_id: UserId, status: ChallengeStatus) -> Result<Vec<StartedChallenge>> {
        let now = self.clock.now();
        let mut out = Vec::new();
        for (challenge, member) in self.db.challenges_for_user(user_id)? {
            if let Some(view) = self.started_view(&challenge, &member, now)? {
                if view.status() == status {
                    out.push(view);
                }
            }
        }
        Ok(out)
    }

    /// Started (running, not yet completed) challenges of a user.
    pub fn list_started(&self, user_id: UserId) -> Result<Vec<StartedChallenge>> {
        self.list_with_status(user_id, ChallengeStatus::Started)
    }

    /// Challenges whose target the user has reached without a reset.
    pub fn list_completed(&self, user_id: UserId) -> Result<Vec<StartedChallenge>> {
        self.list_with_status(user_id, ChallengeStatus::Completed)
    }

    /// The caller's reset history for a challenge, newest first.
    pub fn reset_info(&self, challenge_id: ChallengeId, caller: UserId) -> Result<ResetInfo> {
        let (challenge, member) = require_participation(&self.db, challenge_id, caller)?;
        let anchor = require_started(&challenge, &member)?;
        let start_date_time = challenge.start_date_time.unwrap_or(anchor);
        let records = self.db.reset_records(member.member_id)?;
        let current = Streak::new(anchor, challenge.target_days).current_seconds(self.clock.now());
        Ok(ResetInfo {
            challenge_id,
            member_id: member.member_id,
            start_date_time,
            recent_reset_date_time: anchor,
            best_record_in_seconds: streak::best_record_seconds(&records, current),
            records,
        })
    }

    // ── Deletion ─────────────────────────────────────────────────────

    /// Delete a challenge with all of its members, resets and reasons.
    ///
    /// # Errors
    /// `NotFound` for an unknown challenge, `Forbidden` if the caller does
    /// not participate.
    pub fn delete(&self, challenge_id: ChallengeId, caller: UserId) -> Result<()> {
        self.db.locks().with_lock(challenge_id, || {
            require_participation(&self.db, challenge_id, caller)?;
            if !self.db.delete_challenge(challenge_id)? {
                return Err(CoreError::not_found(format!("challenge {challenge_id}")));
            }
            Ok(())
        })?;
        self.db.locks().forget(challenge_id);
        info!(challenge_id, caller, "challenge deleted");
        Ok(())
    }

    /// Forcibly remove a member. Only the challenge owner may do this, and
    /// the owner cannot remove themselves.
    pub fn remove_member(&self, member_id: MemberId, caller: UserId) -> Result<()> {
        let target = self
            .db
            .member(member_id)?
            .ok_or_else(|| CoreError::not_found(format!("member {member_id}")))?;
        let challenge_id = target.challenge_id;

        self.db.locks().with_lock(challenge_id, || {
            // Re-read under the lock; a concurrent removal may have won.
            let target = self
                .db
                .member(member_id)?
                .ok_or_else(|| CoreError::not_found(format!("member {member_id}")))?;
            let challenge = self
                .db
                .challenge(challenge_id)?
                .ok_or_else(|| CoreError::not_found(format!("challenge {challenge_id}")))?;
            if challenge.owner_user_id != caller {
                warn!(member_id, caller, "member removal refused");
                return Err(CoreError::forbidden(format!(
                    "only the owner of challenge {challenge_id} can remove members"
                )));
            }
            if target.user_id == challenge.owner_user_id {
                return Err(CoreError::conflict("the owner cannot remove their own membership"));
            }
            self.db.delete_member(member_id)?;
            info!(challenge_id, member_id, "member removed");
            Ok(())
        })
    }
}
