//! Downstream collaborator performing the actual round-trip.
//!
//! Every endpoint yields a [`NetworkResult`]: the payload, a typed HTTP error
//! carrying its status code, a network failure, or an unclassified error.
//! Payloads use the external field names defined in [`wire`].
//!
//! [`LocalTransport`] serves the endpoints in-process from the record store.

mod local;
pub mod wire;

pub use local::LocalTransport;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ChallengeId, MemberId, ReasonId};
use wire::{
    ContinueResponse, PostReasonRequest, PostReasonResponse, PostResetRequest, PostResetResponse,
    RankResponse, ResetInfoResponse, StartReasonResponse, StartedChallengeResponse,
};

/// Status codes the core distinguishes.
pub mod status {
    pub const BAD_REQUEST: u16 = 400;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const UNPROCESSABLE_ENTITY: u16 = 422;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP {code}: {message}")]
    Http { code: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl TransportError {
    pub fn http(code: u16, message: impl Into<String>) -> Self {
        Self::Http {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Http { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type NetworkResult<T> = Result<T, TransportError>;

/// The endpoints the started-challenge screens depend on.
///
/// Implementations act on behalf of one authenticated user.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_started_challenge_detail(
        &self,
        challenge_id: ChallengeId,
    ) -> NetworkResult<StartedChallengeResponse>;

    async fn get_started_challenges(&self) -> NetworkResult<Vec<StartedChallengeResponse>>;

    async fn get_completed_challenges(&self) -> NetworkResult<Vec<StartedChallengeResponse>>;

    async fn get_reset_info(&self, challenge_id: ChallengeId) -> NetworkResult<ResetInfoResponse>;

    async fn get_start_reasons(
        &self,
        challenge_id: ChallengeId,
    ) -> NetworkResult<Vec<StartReasonResponse>>;

    async fn post_reset(&self, request: PostResetRequest) -> NetworkResult<PostResetResponse>;

    async fn post_reason(&self, request: PostReasonRequest) -> NetworkResult<PostReasonResponse>;

    async fn delete_reason(&self, reason_id: ReasonId) -> NetworkResult<()>;

    async fn delete_challenge(&self, challenge_id: ChallengeId) -> NetworkResult<()>;

    async fn post_continue(&self, challenge_id: ChallengeId) -> NetworkResult<ContinueResponse>;

    async fn delete_member(&self, member_id: MemberId) -> NetworkResult<()>;

    async fn get_ranking(&self, challenge_id: ChallengeId) -> NetworkResult<Vec<RankResponse>>;
}
