//! Started-challenge repository.
//!
//! The facade a presentation layer talks to. It sits on top of a
//! [`Transport`] and adds what screens need around each call:
//!
//! - every call is bounded by the configured timeout
//! - transport errors are classified into [`CoreError`] without retries
//! - mutating calls raise an [`Operation`] flag for their duration
//! - accepted mutations are published on the [`EventBus`]
//! - reads can be watched through a [`Subscription`]

mod state;
mod subscription;

pub use state::{FlagSnapshot, LoadFailure, LoadState, Operation, OperationFlags};
pub use subscription::Subscription;

use chrono::NaiveDateTime;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{CoreError, Result, ValidationError};
use crate::events::{ChallengeEvent, EventBus};
use crate::model::{
    ChallengeId, ChallengeRank, MemberId, ReasonId, RecoveryProgress, ResetInfo, ResetRecord,
    StartReason, StartedChallenge,
};
use crate::streak::Streak;
use crate::transport::wire::{PostReasonRequest, PostResetRequest, StartedChallengeResponse};
use crate::transport::{status, NetworkResult, Transport, TransportError};

/// Classify a transport failure. Codes the core does not know become
/// `Unknown`.
pub fn classify(err: TransportError) -> CoreError {
    match err {
        TransportError::Http { code, message } => match code {
            status::NOT_FOUND => CoreError::NotFound(message),
            status::FORBIDDEN => CoreError::Forbidden(message),
            status::CONFLICT => CoreError::Conflict(message),
            status::UNPROCESSABLE_ENTITY => CoreError::InvalidTimestamp(message),
            status::BAD_REQUEST => CoreError::Validation(ValidationError::InvalidValue {
                field: "request".into(),
                message,
            }),
            other => CoreError::Unknown(format!("HTTP {other}: {message}")),
        },
        TransportError::Network(msg) => CoreError::Network(msg),
        TransportError::Unknown(msg) => CoreError::Unknown(msg),
    }
}

fn decode_challenges(list: Vec<StartedChallengeResponse>) -> Result<Vec<StartedChallenge>> {
    list.into_iter()
        .map(|r| StartedChallenge::try_from(r).map_err(classify))
        .collect()
}

/// The read side of the repository: a transport bounded by a timeout.
///
/// Subscriptions hold one of these instead of the whole repository, so
/// they never keep the event bus alive on their own.
struct Reader<T> {
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl<T> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            clock: Arc::clone(&self.clock),
            timeout: self.timeout,
        }
    }
}

impl<T: Transport + 'static> Reader<T> {
    async fn run<R>(
        &self,
        endpoint: &'static str,
        call: impl Future<Output = NetworkResult<R>>,
    ) -> Result<R> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                debug!(endpoint, error = %err, "transport call failed");
                Err(classify(err))
            }
            Err(_) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(endpoint, timeout_ms, "transport call timed out");
                Err(CoreError::Timeout { timeout_ms })
            }
        }
    }

    async fn detail(&self, challenge_id: ChallengeId) -> Result<StartedChallenge> {
        let response = self
            .run(
                "get_started_challenge_detail",
                self.transport.get_started_challenge_detail(challenge_id),
            )
            .await?;
        StartedChallenge::try_from(response).map_err(classify)
    }

    async fn started_challenges(&self) -> Result<Vec<StartedChallenge>> {
        let list = self
            .run("get_started_challenges", self.transport.get_started_challenges())
            .await?;
        decode_challenges(list)
    }

    async fn completed_challenges(&self) -> Result<Vec<StartedChallenge>> {
        let list = self
            .run("get_completed_challenges", self.transport.get_completed_challenges())
            .await?;
        decode_challenges(list)
    }

    async fn reset_info(&self, challenge_id: ChallengeId) -> Result<ResetInfo> {
        let response = self
            .run("get_reset_info", self.transport.get_reset_info(challenge_id))
            .await?;
        ResetInfo::try_from(response).map_err(classify)
    }

    async fn start_reasons(&self, challenge_id: ChallengeId) -> Result<Vec<StartReason>> {
        let list = self
            .run("get_start_reasons", self.transport.get_start_reasons(challenge_id))
            .await?;
        list.into_iter()
            .map(|r| StartReason::try_from(r).map_err(classify))
            .collect()
    }

    async fn ranking(&self, challenge_id: ChallengeId) -> Result<Vec<ChallengeRank>> {
        let list = self
            .run("get_ranking", self.transport.get_ranking(challenge_id))
            .await?;
        list.into_iter()
            .map(|r| ChallengeRank::try_from(r).map_err(classify))
            .collect()
    }
}

pub struct StartedChallengeRepository<T> {
    reader: Reader<T>,
    events: EventBus,
    flags: Arc<OperationFlags>,
}

impl<T> Clone for StartedChallengeRepository<T> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            events: self.events.clone(),
            flags: Arc::clone(&self.flags),
        }
    }
}

impl<T: Transport + 'static> StartedChallengeRepository<T> {
    pub fn new(transport: Arc<T>, events: EventBus, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self {
            reader: Reader {
                transport,
                clock,
                timeout,
            },
            events,
            flags: Arc::new(OperationFlags::default()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn flags(&self) -> &OperationFlags {
        &self.flags
    }

    fn transport(&self) -> &T {
        &self.reader.transport
    }

    /// Run a mutating call against `challenge_id`.
    ///
    /// A timed-out call may still be applied downstream, so watchers of the
    /// challenge are asked to re-fetch.
    async fn mutate<R>(
        &self,
        challenge_id: ChallengeId,
        endpoint: &'static str,
        call: impl Future<Output = NetworkResult<R>>,
    ) -> Result<R> {
        let result = self.reader.run(endpoint, call).await;
        if matches!(result, Err(CoreError::Timeout { .. })) {
            self.events.request_refresh(Some(challenge_id));
        }
        result
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn detail(&self, challenge_id: ChallengeId) -> Result<StartedChallenge> {
        self.reader.detail(challenge_id).await
    }

    pub async fn started_challenges(&self) -> Result<Vec<StartedChallenge>> {
        self.reader.started_challenges().await
    }

    pub async fn completed_challenges(&self) -> Result<Vec<StartedChallenge>> {
        self.reader.completed_challenges().await
    }

    pub async fn reset_info(&self, challenge_id: ChallengeId) -> Result<ResetInfo> {
        self.reader.reset_info(challenge_id).await
    }

    pub async fn start_reasons(&self, challenge_id: ChallengeId) -> Result<Vec<StartReason>> {
        self.reader.start_reasons(challenge_id).await
    }

    /// Recovery progress at the current time, derived from the detail.
    pub async fn progress(&self, challenge_id: ChallengeId) -> Result<RecoveryProgress> {
        let detail = self.reader.detail(challenge_id).await?;
        Ok(Streak::of(&detail).recovery_progress(self.reader.clock.now()))
    }

    pub async fn ranking(&self, challenge_id: ChallengeId) -> Result<Vec<ChallengeRank>> {
        self.reader.ranking(challenge_id).await
    }

    // ── Mutations ────────────────────────────────────────────────────

    pub async fn reset(
        &self,
        challenge_id: ChallengeId,
        reset_date_time: NaiveDateTime,
        memo: &str,
    ) -> Result<ResetRecord> {
        let _flag = self.flags.begin(Operation::Resetting);
        let request = PostResetRequest::new(challenge_id, &reset_date_time, memo);
        let response = self
            .mutate(challenge_id, "post_reset", self.transport().post_reset(request))
            .await?;
        let record = ResetRecord::try_from(response).map_err(classify)?;
        info!(challenge_id, record_in_seconds = record.record_in_seconds, "reset accepted");
        self.events.publish(ChallengeEvent::ResetApplied {
            challenge_id,
            reset_date_time: record.reset_date_time,
            record_in_seconds: record.record_in_seconds,
        });
        Ok(record)
    }

    /// Restart a completed challenge. Returns the new streak anchor.
    pub async fn continue_challenge(&self, challenge_id: ChallengeId) -> Result<NaiveDateTime> {
        let _flag = self.flags.begin(Operation::Continuing);
        let response = self
            .mutate(challenge_id, "post_continue", self.transport().post_continue(challenge_id))
            .await?;
        let at = response.anchor().map_err(classify)?;
        self.events
            .publish(ChallengeEvent::Continued { challenge_id, at });
        Ok(at)
    }

    pub async fn add_reason(&self, challenge_id: ChallengeId, content: &str) -> Result<ReasonId> {
        let _flag = self.flags.begin(Operation::EditingReasons);
        let request = PostReasonRequest {
            challenge_id,
            content: content.to_string(),
        };
        let response = self
            .mutate(challenge_id, "post_reason", self.transport().post_reason(request))
            .await?;
        self.events.publish(ChallengeEvent::ReasonAdded {
            challenge_id,
            reason_id: response.reason_id,
        });
        Ok(response.reason_id)
    }

    /// `challenge_id` scopes the change notification; the endpoint itself
    /// only needs the reason id.
    pub async fn delete_reason(&self, challenge_id: ChallengeId, reason_id: ReasonId) -> Result<()> {
        let _flag = self.flags.begin(Operation::EditingReasons);
        self.mutate(challenge_id, "delete_reason", self.transport().delete_reason(reason_id))
            .await?;
        self.events.publish(ChallengeEvent::ReasonDeleted {
            challenge_id,
            reason_id,
        });
        Ok(())
    }

    pub async fn delete_challenge(&self, challenge_id: ChallengeId) -> Result<()> {
        let _flag = self.flags.begin(Operation::Deleting);
        self.mutate(
            challenge_id,
            "delete_challenge",
            self.transport().delete_challenge(challenge_id),
        )
        .await?;
        self.events
            .publish(ChallengeEvent::ChallengeDeleted { challenge_id });
        Ok(())
    }

    pub async fn remove_member(&self, challenge_id: ChallengeId, member_id: MemberId) -> Result<()> {
        let _flag = self.flags.begin(Operation::RemovingMember);
        self.mutate(challenge_id, "delete_member", self.transport().delete_member(member_id))
            .await?;
        self.events.publish(ChallengeEvent::MemberRemoved {
            challenge_id,
            member_id,
        });
        Ok(())
    }

    // ── Signals ──────────────────────────────────────────────────────

    /// Forward an external clock-adjustment signal to every subscription.
    pub fn notify_time_changed(&self) {
        self.events.notify_time_changed();
    }

    /// Ask subscriptions for `challenge_id` (all of them for `None`) to
    /// re-fetch.
    pub fn refresh(&self, challenge_id: Option<ChallengeId>) {
        self.events.request_refresh(challenge_id);
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// The stream ends once every handle on the event bus is dropped.
    fn watch<V, F, Fut>(&self, scope: Option<ChallengeId>, fetch: F) -> Subscription<V>
    where
        V: Clone,
        F: Fn(Reader<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let reader = self.reader.clone();
        Subscription::new(self.events.subscribe(), scope, move || fetch(reader.clone()))
    }

    pub fn watch_detail(&self, challenge_id: ChallengeId) -> Subscription<StartedChallenge> {
        self.watch(Some(challenge_id), move |reader| async move {
            reader.detail(challenge_id).await
        })
    }

    pub fn watch_reset_info(&self, challenge_id: ChallengeId) -> Subscription<ResetInfo> {
        self.watch(Some(challenge_id), move |reader| async move {
            reader.reset_info(challenge_id).await
        })
    }

    pub fn watch_reasons(&self, challenge_id: ChallengeId) -> Subscription<Vec<StartReason>> {
        self.watch(Some(challenge_id), move |reader| async move {
            reader.start_reasons(challenge_id).await
        })
    }

    pub fn watch_ranking(&self, challenge_id: ChallengeId) -> Subscription<Vec<ChallengeRank>> {
        self.watch(Some(challenge_id), move |reader| async move {
            reader.ranking(challenge_id).await
        })
    }

    pub fn watch_started(&self) -> Subscription<Vec<StartedChallenge>> {
        self.watch(None, |reader| async move { reader.started_challenges().await })
    }

    pub fn watch_completed(&self) -> Subscription<Vec<StartedChallenge>> {
        self.watch(None, |reader| async move { reader.completed_challenges().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::ChallengeDraft;
    use crate::service::ChallengeCore;
    use crate::storage::{ChallengeDb, LimitsConfig};
    use crate::transport::wire::{
        ContinueResponse, PostReasonResponse, PostResetResponse, RankResponse, ResetInfoResponse,
        StartReasonResponse,
    };
    use crate::transport::LocalTransport;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tokio::sync::Notify;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 7, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    /// Fails every endpoint after an optional wait.
    struct StubTransport {
        error: TransportError,
        delay: Duration,
        gate: Option<Arc<Notify>>,
    }

    impl StubTransport {
        fn failing(error: TransportError) -> Self {
            Self {
                error,
                delay: Duration::ZERO,
                gate: None,
            }
        }

        async fn respond<R>(&self) -> NetworkResult<R> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            tokio::time::sleep(self.delay).await;
            Err(self.error.clone())
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn get_started_challenge_detail(
            &self,
            _: ChallengeId,
        ) -> NetworkResult<StartedChallengeResponse> {
            self.respond().await
        }
        async fn get_started_challenges(&self) -> NetworkResult<Vec<StartedChallengeResponse>> {
            self.respond().await
        }
        async fn get_completed_challenges(&self) -> NetworkResult<Vec<StartedChallengeResponse>> {
            self.respond().await
        }
        async fn get_reset_info(&self, _: ChallengeId) -> NetworkResult<ResetInfoResponse> {
            self.respond().await
        }
        async fn get_start_reasons(&self, _: ChallengeId) -> NetworkResult<Vec<StartReasonResponse>> {
            self.respond().await
        }
        async fn post_reset(&self, _: PostResetRequest) -> NetworkResult<PostResetResponse> {
            self.respond().await
        }
        async fn post_reason(&self, _: PostReasonRequest) -> NetworkResult<PostReasonResponse> {
            self.respond().await
        }
        async fn delete_reason(&self, _: ReasonId) -> NetworkResult<()> {
            self.respond().await
        }
        async fn delete_challenge(&self, _: ChallengeId) -> NetworkResult<()> {
            self.respond().await
        }
        async fn post_continue(&self, _: ChallengeId) -> NetworkResult<ContinueResponse> {
            self.respond().await
        }
        async fn delete_member(&self, _: MemberId) -> NetworkResult<()> {
            self.respond().await
        }
        async fn get_ranking(&self, _: ChallengeId) -> NetworkResult<Vec<RankResponse>> {
            self.respond().await
        }
    }

    fn stub_repo(stub: StubTransport, timeout: Duration) -> StartedChallengeRepository<StubTransport> {
        StartedChallengeRepository::new(
            Arc::new(stub),
            EventBus::new(),
            Arc::new(ManualClock::new(t0())),
            timeout,
        )
    }

    #[test]
    fn classify_maps_codes() {
        assert!(matches!(
            classify(TransportError::http(404, "gone")),
            CoreError::NotFound(m) if m == "gone"
        ));
        assert!(matches!(classify(TransportError::http(403, "")), CoreError::Forbidden(_)));
        assert!(matches!(classify(TransportError::http(409, "")), CoreError::Conflict(_)));
        assert!(matches!(
            classify(TransportError::http(422, "")),
            CoreError::InvalidTimestamp(_)
        ));
        assert!(matches!(classify(TransportError::http(400, "")), CoreError::Validation(_)));
        assert!(matches!(classify(TransportError::http(503, "")), CoreError::Unknown(_)));
        assert!(matches!(
            classify(TransportError::Network("offline".into())),
            CoreError::Network(_)
        ));
    }

    #[tokio::test]
    async fn slow_transport_times_out() {
        let stub = StubTransport {
            error: TransportError::Unknown("late".into()),
            delay: Duration::from_secs(5),
            gate: None,
        };
        let repo = stub_repo(stub, Duration::from_millis(20));
        let err = repo.detail(1).await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout { timeout_ms: 20 }));
    }

    #[tokio::test]
    async fn timed_out_mutation_requests_refresh() {
        let stub = StubTransport {
            error: TransportError::Unknown("late".into()),
            delay: Duration::from_secs(5),
            gate: None,
        };
        let repo = stub_repo(stub, Duration::from_millis(20));
        let mut events = repo.events().subscribe();

        let err = repo.reset(7, t0(), "").await.unwrap_err();
        assert!(matches!(err, CoreError::Timeout { .. }));
        assert!(!repo.flags().is_active(Operation::Resetting));
        assert_eq!(
            events.try_recv().unwrap(),
            ChallengeEvent::RefreshRequested {
                challenge_id: Some(7)
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn watchers_end_with_the_repository() {
        let repo = stub_repo(
            StubTransport::failing(TransportError::http(404, "gone")),
            Duration::from_secs(1),
        );
        let mut detail = repo.watch_detail(3);
        let first = detail.next().await.unwrap();
        assert_eq!(first.failure(), Some(LoadFailure::NotFound));

        drop(repo);
        assert!(detail.next().await.is_none());
    }

    #[tokio::test]
    async fn network_errors_pass_through() {
        let repo = stub_repo(
            StubTransport::failing(TransportError::Network("offline".into())),
            Duration::from_secs(1),
        );
        assert!(matches!(repo.ranking(1).await, Err(CoreError::Network(m)) if m == "offline"));
    }

    #[tokio::test]
    async fn failed_mutation_lowers_flag_and_publishes_nothing() {
        let gate = Arc::new(Notify::new());
        let stub = StubTransport {
            error: TransportError::http(409, "not completed"),
            delay: Duration::ZERO,
            gate: Some(gate.clone()),
        };
        let repo = stub_repo(stub, Duration::from_secs(5));
        let mut events = repo.events().subscribe();

        let task = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.continue_challenge(7).await })
        };
        for _ in 0..100 {
            if repo.flags().is_active(Operation::Continuing) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(repo.flags().snapshot().is_continuing);

        gate.notify_one();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(CoreError::Conflict(_))));
        assert!(!repo.flags().is_active(Operation::Continuing));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn mutations_refresh_watchers() {
        let db = Arc::new(ChallengeDb::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let core = Arc::new(ChallengeCore::new(db, clock.clone(), &LimitsConfig::default()));
        let draft = ChallengeDraft {
            title: "No snacks".into(),
            description: String::new(),
            category: "DIET".into(),
            target_days: 10,
            max_participant_count: 2,
            is_private: false,
        };
        let (id, _) = core.store.create_challenge(&draft, 1).unwrap();
        core.store.start(id, 1).unwrap();

        let repo = StartedChallengeRepository::new(
            Arc::new(LocalTransport::new(core, 1)),
            EventBus::new(),
            clock.clone(),
            Duration::from_secs(5),
        );
        let mut detail = repo.watch_detail(id);
        let first = detail.next().await.unwrap();
        assert_eq!(first.success().map(|d| d.recent_reset_date_time), Some(t0()));

        clock.advance(chrono::Duration::days(2));
        let at = t0() + chrono::Duration::days(1);
        repo.reset(id, at, "slipped").await.unwrap();
        let second = detail.next().await.unwrap();
        assert_eq!(second.success().map(|d| d.recent_reset_date_time), Some(at));
        assert!(!repo.flags().is_active(Operation::Resetting));

        repo.delete_challenge(id).await.unwrap();
        let third = detail.next().await.unwrap();
        assert_eq!(third.failure(), Some(LoadFailure::NotFound));
    }

    #[tokio::test]
    async fn time_change_redelivers_progress() {
        let db = Arc::new(ChallengeDb::open_memory().unwrap());
        let clock = Arc::new(ManualClock::new(t0()));
        let core = Arc::new(ChallengeCore::new(db, clock.clone(), &LimitsConfig::default()));
        let draft = ChallengeDraft {
            title: "Early nights".into(),
            description: String::new(),
            category: "SLEEP".into(),
            target_days: 4,
            max_participant_count: 1,
            is_private: true,
        };
        let (id, _) = core.store.create_challenge(&draft, 1).unwrap();
        core.store.start(id, 1).unwrap();
        let repo = StartedChallengeRepository::new(
            Arc::new(LocalTransport::new(core, 1)),
            EventBus::new(),
            clock.clone(),
            Duration::from_secs(5),
        );

        let mut completed = repo.watch_completed();
        assert_eq!(completed.next().await.unwrap().success().map(Vec::len), Some(0));

        clock.advance(chrono::Duration::days(5));
        repo.notify_time_changed();
        assert_eq!(completed.next().await.unwrap().success().map(Vec::len), Some(1));
        assert_eq!(repo.progress(id).await.unwrap().percent(), Some(100.0));
    }
}
