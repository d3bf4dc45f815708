use async_trait::async_trait;
use std::sync::Arc;

use super::status::{
    BAD_REQUEST, CONFLICT, FORBIDDEN, INTERNAL_SERVER_ERROR, NOT_FOUND, UNPROCESSABLE_ENTITY,
};
use super::wire::{
    ContinueResponse, PostReasonRequest, PostReasonResponse, PostResetRequest, PostResetResponse,
    RankResponse, ResetInfoResponse, StartReasonResponse, StartedChallengeResponse,
};
use super::{NetworkResult, Transport, TransportError};
use crate::clock::format_datetime;
use crate::error::{CoreError, Result};
use crate::model::{ChallengeId, MemberId, ReasonId, UserId};
use crate::service::ChallengeCore;

/// Serves the endpoints in-process for one user.
///
/// Store calls are blocking, so each one runs on the blocking pool.
#[derive(Clone)]
pub struct LocalTransport {
    core: Arc<ChallengeCore>,
    user_id: UserId,
}

impl LocalTransport {
    pub fn new(core: Arc<ChallengeCore>, user_id: UserId) -> Self {
        Self { core, user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    async fn call<R, F>(&self, endpoint: &'static str, f: F) -> NetworkResult<R>
    where
        F: FnOnce(&ChallengeCore, UserId) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let core = Arc::clone(&self.core);
        let user_id = self.user_id;
        let outcome = tokio::task::spawn_blocking(move || f(&*core, user_id))
            .await
            .map_err(|e| TransportError::Unknown(format!("{endpoint}: {e}")))?;
        outcome.map_err(|e| {
            tracing::debug!(endpoint, user_id, error = %e, "endpoint failed");
            to_transport_error(e)
        })
    }
}

/// Status code a `CoreError` is reported with.
pub(crate) fn to_transport_error(err: CoreError) -> TransportError {
    match err {
        CoreError::NotFound(msg) => TransportError::http(NOT_FOUND, msg),
        CoreError::Forbidden(msg) => TransportError::http(FORBIDDEN, msg),
        CoreError::Conflict(msg) => TransportError::http(CONFLICT, msg),
        CoreError::InvalidTimestamp(msg) => TransportError::http(UNPROCESSABLE_ENTITY, msg),
        CoreError::Validation(v) => TransportError::http(BAD_REQUEST, v.to_string()),
        CoreError::Network(msg) => TransportError::Network(msg),
        CoreError::Unknown(msg) => TransportError::Unknown(msg),
        timeout @ CoreError::Timeout { .. } => TransportError::Network(timeout.to_string()),
        other => TransportError::http(INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn get_started_challenge_detail(
        &self,
        challenge_id: ChallengeId,
    ) -> NetworkResult<StartedChallengeResponse> {
        self.call("get_started_challenge_detail", move |core, user| {
            let detail = core.store.get(challenge_id, user)?;
            Ok(StartedChallengeResponse::from(&detail))
        })
        .await
    }

    async fn get_started_challenges(&self) -> NetworkResult<Vec<StartedChallengeResponse>> {
        self.call("get_started_challenges", |core, user| {
            let list = core.store.list_started(user)?;
            Ok(list.iter().map(StartedChallengeResponse::from).collect())
        })
        .await
    }

    async fn get_completed_challenges(&self) -> NetworkResult<Vec<StartedChallengeResponse>> {
        self.call("get_completed_challenges", |core, user| {
            let list = core.store.list_completed(user)?;
            Ok(list.iter().map(StartedChallengeResponse::from).collect())
        })
        .await
    }

    async fn get_reset_info(&self, challenge_id: ChallengeId) -> NetworkResult<ResetInfoResponse> {
        self.call("get_reset_info", move |core, user| {
            let info = core.store.reset_info(challenge_id, user)?;
            Ok(ResetInfoResponse::from(&info))
        })
        .await
    }

    async fn get_start_reasons(
        &self,
        challenge_id: ChallengeId,
    ) -> NetworkResult<Vec<StartReasonResponse>> {
        self.call("get_start_reasons", move |core, user| {
            let reasons = core.reasons.list(challenge_id, user)?;
            Ok(reasons.iter().map(StartReasonResponse::from).collect())
        })
        .await
    }

    async fn post_reset(&self, request: PostResetRequest) -> NetworkResult<PostResetResponse> {
        let at = request
            .reset_at()
            .map_err(|e| TransportError::http(BAD_REQUEST, e.to_string()))?;
        self.call("post_reset", move |core, user| {
            let record = core
                .resets
                .reset(request.challenge_id, user, at, &request.memo)?;
            Ok(PostResetResponse::from(&record))
        })
        .await
    }

    async fn post_reason(&self, request: PostReasonRequest) -> NetworkResult<PostReasonResponse> {
        self.call("post_reason", move |core, user| {
            let reason_id = core.reasons.add(request.challenge_id, user, &request.content)?;
            Ok(PostReasonResponse { reason_id })
        })
        .await
    }

    async fn delete_reason(&self, reason_id: ReasonId) -> NetworkResult<()> {
        self.call("delete_reason", move |core, user| core.reasons.delete(reason_id, user))
            .await
    }

    async fn delete_challenge(&self, challenge_id: ChallengeId) -> NetworkResult<()> {
        self.call("delete_challenge", move |core, user| core.store.delete(challenge_id, user))
            .await
    }

    async fn post_continue(&self, challenge_id: ChallengeId) -> NetworkResult<ContinueResponse> {
        self.call("post_continue", move |core, user| {
            let anchor = core.resets.continue_started_challenge(challenge_id, user)?;
            Ok(ContinueResponse {
                recent_reset_date_time: format_datetime(&anchor),
            })
        })
        .await
    }

    async fn delete_member(&self, member_id: MemberId) -> NetworkResult<()> {
        self.call("delete_member", move |core, user| core.store.remove_member(member_id, user))
            .await
    }

    async fn get_ranking(&self, challenge_id: ChallengeId) -> NetworkResult<Vec<RankResponse>> {
        self.call("get_ranking", move |core, _user| {
            let ranks = core.ranking.rank(challenge_id)?;
            Ok(ranks.iter().map(RankResponse::from).collect())
        })
        .await
    }
}
