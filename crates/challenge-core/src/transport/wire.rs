//! Payloads as the external API names them.
//!
//! Date-times travel as `YYYY-MM-DDTHH:MM:SS` strings. Encoding from domain
//! types is infallible; decoding fails with [`TransportError::Unknown`] when
//! a timestamp cannot be parsed.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::TransportError;
use crate::clock::{format_datetime, parse_datetime};
use crate::model::{
    ChallengeId, ChallengeRank, MemberId, ReasonId, ResetInfo, ResetRecord, ResetRecordId,
    StartReason, StartedChallenge, UserId,
};

fn decode_datetime(field: &str, value: &str) -> Result<NaiveDateTime, TransportError> {
    parse_datetime(value)
        .ok_or_else(|| TransportError::Unknown(format!("malformed {field}: '{value}'")))
}

fn decode_count(field: &str, value: i64) -> Result<u32, TransportError> {
    u32::try_from(value)
        .map_err(|_| TransportError::Unknown(format!("{field} out of range: {value}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedChallengeResponse {
    #[serde(rename = "ROOM_IDX")]
    pub challenge_id: ChallengeId,
    #[serde(rename = "TITLE")]
    pub title: String,
    #[serde(rename = "CONTENT")]
    pub description: String,
    #[serde(rename = "CHALLENGETYPE")]
    pub category: String,
    #[serde(rename = "ENDTIME")]
    pub target_days: i64,
    #[serde(rename = "CURRENTUSERNUM")]
    pub current_participant_count: i64,
    #[serde(rename = "MAXUSERNUM")]
    pub max_participant_count: i64,
    #[serde(rename = "RECENTSTARTTIME")]
    pub recent_reset_date_time: String,
    #[serde(rename = "STARTTIME")]
    pub start_date_time: String,
    #[serde(rename = "ISFREEMODE")]
    pub is_free_mode: bool,
    #[serde(rename = "ISCOMPLETE")]
    pub is_completed: bool,
    #[serde(rename = "ISPRIVATE")]
    pub is_private: bool,
    #[serde(rename = "RANK")]
    pub rank: i64,
    #[serde(rename = "SCORERANK")]
    pub score_rank: i64,
}

impl From<&StartedChallenge> for StartedChallengeResponse {
    fn from(c: &StartedChallenge) -> Self {
        Self {
            challenge_id: c.challenge_id,
            title: c.title.clone(),
            description: c.description.clone(),
            category: c.category.clone(),
            target_days: i64::from(c.target_days),
            current_participant_count: i64::from(c.current_participant_count),
            max_participant_count: i64::from(c.max_participant_count),
            recent_reset_date_time: format_datetime(&c.recent_reset_date_time),
            start_date_time: format_datetime(&c.start_date_time),
            is_free_mode: c.is_free_mode,
            is_completed: c.is_completed,
            is_private: c.is_private,
            rank: i64::from(c.rank),
            score_rank: i64::from(c.score_rank),
        }
    }
}

impl TryFrom<StartedChallengeResponse> for StartedChallenge {
    type Error = TransportError;

    fn try_from(r: StartedChallengeResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            challenge_id: r.challenge_id,
            recent_reset_date_time: decode_datetime("RECENTSTARTTIME", &r.recent_reset_date_time)?,
            start_date_time: decode_datetime("STARTTIME", &r.start_date_time)?,
            target_days: decode_count("ENDTIME", r.target_days)?,
            current_participant_count: decode_count("CURRENTUSERNUM", r.current_participant_count)?,
            max_participant_count: decode_count("MAXUSERNUM", r.max_participant_count)?,
            rank: decode_count("RANK", r.rank)?,
            score_rank: decode_count("SCORERANK", r.score_rank)?,
            title: r.title,
            description: r.description,
            category: r.category,
            is_free_mode: r.is_free_mode,
            is_completed: r.is_completed,
            is_private: r.is_private,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetRecordResponse {
    #[serde(rename = "ROOMMEMRESET_IDX")]
    pub reset_record_id: ResetRecordId,
    #[serde(rename = "RESETDATE")]
    pub reset_date_time: String,
    #[serde(rename = "ABSTINENCETIME")]
    pub record_in_seconds: i64,
    #[serde(rename = "RESETMEMO")]
    pub content: String,
}

impl From<&ResetRecord> for ResetRecordResponse {
    fn from(r: &ResetRecord) -> Self {
        Self {
            reset_record_id: r.reset_record_id,
            reset_date_time: format_datetime(&r.reset_date_time),
            record_in_seconds: r.record_in_seconds,
            content: r.content.clone(),
        }
    }
}

impl ResetRecordResponse {
    /// The record payload omits its owner; the envelope supplies it.
    pub fn into_record(self, member_id: MemberId) -> Result<ResetRecord, TransportError> {
        if self.record_in_seconds < 0 {
            return Err(TransportError::Unknown(format!(
                "negative ABSTINENCETIME: {}",
                self.record_in_seconds
            )));
        }
        Ok(ResetRecord {
            reset_record_id: self.reset_record_id,
            member_id,
            reset_date_time: decode_datetime("RESETDATE", &self.reset_date_time)?,
            record_in_seconds: self.record_in_seconds,
            content: self.content,
        })
    }
}

/// Reply to a reset: the new record and whose history it joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostResetResponse {
    #[serde(rename = "ROOMMEM_IDX")]
    pub member_id: MemberId,
    #[serde(flatten)]
    pub record: ResetRecordResponse,
}

impl From<&ResetRecord> for PostResetResponse {
    fn from(r: &ResetRecord) -> Self {
        Self {
            member_id: r.member_id,
            record: ResetRecordResponse::from(r),
        }
    }
}

impl TryFrom<PostResetResponse> for ResetRecord {
    type Error = TransportError;

    fn try_from(r: PostResetResponse) -> Result<Self, Self::Error> {
        r.record.into_record(r.member_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetInfoResponse {
    #[serde(rename = "ROOM_IDX")]
    pub challenge_id: ChallengeId,
    #[serde(rename = "ROOMMEM_IDX")]
    pub member_id: MemberId,
    #[serde(rename = "STARTTIME")]
    pub start_date_time: String,
    #[serde(rename = "RECENTSTARTTIME")]
    pub recent_reset_date_time: String,
    #[serde(rename = "BESTRECORD")]
    pub best_record_in_seconds: i64,
    #[serde(rename = "RESETLIST", default)]
    pub records: Vec<ResetRecordResponse>,
}

impl From<&ResetInfo> for ResetInfoResponse {
    fn from(info: &ResetInfo) -> Self {
        Self {
            challenge_id: info.challenge_id,
            member_id: info.member_id,
            start_date_time: format_datetime(&info.start_date_time),
            recent_reset_date_time: format_datetime(&info.recent_reset_date_time),
            best_record_in_seconds: info.best_record_in_seconds,
            records: info.records.iter().map(ResetRecordResponse::from).collect(),
        }
    }
}

impl TryFrom<ResetInfoResponse> for ResetInfo {
    type Error = TransportError;

    fn try_from(r: ResetInfoResponse) -> Result<Self, Self::Error> {
        let member_id = r.member_id;
        Ok(Self {
            challenge_id: r.challenge_id,
            member_id,
            start_date_time: decode_datetime("STARTTIME", &r.start_date_time)?,
            recent_reset_date_time: decode_datetime("RECENTSTARTTIME", &r.recent_reset_date_time)?,
            best_record_in_seconds: r.best_record_in_seconds,
            records: r
                .records
                .into_iter()
                .map(|rec| rec.into_record(member_id))
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReasonResponse {
    #[serde(rename = "REASON_IDX")]
    pub reason_id: ReasonId,
    #[serde(rename = "ROOM_IDX")]
    pub challenge_id: ChallengeId,
    #[serde(rename = "ROOMMEM_IDX")]
    pub member_id: MemberId,
    #[serde(rename = "REASON")]
    pub content: String,
    #[serde(rename = "CREATEDATE")]
    pub created_at: String,
}

impl From<&StartReason> for StartReasonResponse {
    fn from(r: &StartReason) -> Self {
        Self {
            reason_id: r.reason_id,
            challenge_id: r.challenge_id,
            member_id: r.member_id,
            content: r.content.clone(),
            created_at: format_datetime(&r.created_at),
        }
    }
}

impl TryFrom<StartReasonResponse> for StartReason {
    type Error = TransportError;

    fn try_from(r: StartReasonResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            reason_id: r.reason_id,
            challenge_id: r.challenge_id,
            member_id: r.member_id,
            created_at: decode_datetime("CREATEDATE", &r.created_at)?,
            content: r.content,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankResponse {
    #[serde(rename = "ROOMMEM_IDX")]
    pub member_id: MemberId,
    #[serde(rename = "USER_IDX")]
    pub user_id: UserId,
    #[serde(rename = "RANK")]
    pub rank: i64,
    #[serde(rename = "ABSTINENCETIME")]
    pub current_streak_seconds: i64,
    #[serde(rename = "RESETCOUNT")]
    pub reset_count: i64,
    #[serde(rename = "SCORE")]
    pub score_seconds: i64,
    #[serde(rename = "SCORERANK")]
    pub score_rank: i64,
}

impl From<&ChallengeRank> for RankResponse {
    fn from(r: &ChallengeRank) -> Self {
        Self {
            member_id: r.member_id,
            user_id: r.user_id,
            rank: i64::from(r.rank),
            current_streak_seconds: r.current_streak_seconds,
            reset_count: i64::from(r.reset_count),
            score_seconds: r.score_seconds,
            score_rank: i64::from(r.score_rank),
        }
    }
}

impl TryFrom<RankResponse> for ChallengeRank {
    type Error = TransportError;

    fn try_from(r: RankResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            member_id: r.member_id,
            user_id: r.user_id,
            rank: decode_count("RANK", r.rank)?,
            current_streak_seconds: r.current_streak_seconds,
            reset_count: decode_count("RESETCOUNT", r.reset_count)?,
            score_seconds: r.score_seconds,
            score_rank: decode_count("SCORERANK", r.score_rank)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostResetRequest {
    #[serde(rename = "ROOM_IDX")]
    pub challenge_id: ChallengeId,
    #[serde(rename = "RESETDATE")]
    pub reset_date_time: String,
    #[serde(rename = "RESETMEMO", default)]
    pub memo: String,
}

impl PostResetRequest {
    pub fn new(challenge_id: ChallengeId, reset_date_time: &NaiveDateTime, memo: &str) -> Self {
        Self {
            challenge_id,
            reset_date_time: format_datetime(reset_date_time),
            memo: memo.to_string(),
        }
    }

    pub(crate) fn reset_at(&self) -> Result<NaiveDateTime, TransportError> {
        decode_datetime("RESETDATE", &self.reset_date_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReasonRequest {
    #[serde(rename = "ROOM_IDX")]
    pub challenge_id: ChallengeId,
    #[serde(rename = "REASON")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostReasonResponse {
    #[serde(rename = "REASON_IDX")]
    pub reason_id: ReasonId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueResponse {
    #[serde(rename = "RECENTSTARTTIME")]
    pub recent_reset_date_time: String,
}

impl ContinueResponse {
    pub fn anchor(&self) -> Result<NaiveDateTime, TransportError> {
        decode_datetime("RECENTSTARTTIME", &self.recent_reset_date_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_detail_payload() {
        let payload = json!({
            "ROOM_IDX": 12,
            "TITLE": "No smoking",
            "CONTENT": "together",
            "CHALLENGETYPE": "SMOKE",
            "ENDTIME": 30,
            "CURRENTUSERNUM": 3,
            "MAXUSERNUM": 5,
            "RECENTSTARTTIME": "2026-03-05T08:00:00",
            "STARTTIME": "2026-03-01 08:00:00.000",
            "ISFREEMODE": false,
            "ISCOMPLETE": false,
            "ISPRIVATE": true,
            "RANK": 2,
            "SCORERANK": 1
        });
        let response: StartedChallengeResponse = serde_json::from_value(payload).unwrap();
        let detail = StartedChallenge::try_from(response).unwrap();
        assert_eq!(detail.challenge_id, 12);
        assert_eq!(detail.target_days, 30);
        assert_eq!(
            format_datetime(&detail.start_date_time),
            "2026-03-01T08:00:00"
        );
        assert_eq!((detail.rank, detail.score_rank), (2, 1));
    }

    #[test]
    fn malformed_timestamp_is_unknown_error() {
        let response = ResetRecordResponse {
            reset_record_id: 1,
            reset_date_time: "yesterday".into(),
            record_in_seconds: 10,
            content: String::new(),
        };
        assert!(matches!(
            response.into_record(4),
            Err(TransportError::Unknown(msg)) if msg.contains("RESETDATE")
        ));
    }

    #[test]
    fn negative_count_is_rejected() {
        let response = RankResponse {
            member_id: 1,
            user_id: 1,
            rank: -1,
            current_streak_seconds: 0,
            reset_count: 0,
            score_seconds: 0,
            score_rank: 1,
        };
        assert!(ChallengeRank::try_from(response).is_err());
    }

    #[test]
    fn reset_info_uses_external_names() {
        let info = ResetInfoResponse {
            challenge_id: 3,
            member_id: 8,
            start_date_time: "2026-01-01T00:00:00".into(),
            recent_reset_date_time: "2026-01-06T00:00:00".into(),
            best_record_in_seconds: 432_000,
            records: vec![ResetRecordResponse {
                reset_record_id: 5,
                reset_date_time: "2026-01-06T00:00:00".into(),
                record_in_seconds: 432_000,
                content: "slipped".into(),
            }],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["RESETLIST"][0]["ABSTINENCETIME"], 432_000);
        assert_eq!(json["RESETLIST"][0]["RESETMEMO"], "slipped");

        let decoded = ResetInfo::try_from(info).unwrap();
        assert_eq!(decoded.records[0].member_id, 8);
    }
}
