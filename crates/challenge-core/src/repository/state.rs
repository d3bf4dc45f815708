use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{CoreError, Result};

/// Why a read could not be delivered, as a screen would report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadFailure {
    NotFound,
    /// The challenge exists but is still waiting.
    NotStarted,
    NotParticipant,
    Network,
    Timeout,
    Unknown,
}

impl LoadFailure {
    pub fn classify(err: &CoreError) -> Self {
        match err {
            CoreError::NotFound(_) => Self::NotFound,
            CoreError::Conflict(_) => Self::NotStarted,
            CoreError::Forbidden(_) => Self::NotParticipant,
            CoreError::Network(_) => Self::Network,
            CoreError::Timeout { .. } => Self::Timeout,
            _ => Self::Unknown,
        }
    }
}

/// Pending-or-result value handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Loading,
    Success(T),
    Failed(LoadFailure),
}

impl<T> LoadState<T> {
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failed(LoadFailure::classify(&err)),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<LoadFailure> {
        match self {
            Self::Failed(failure) => Some(*failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Resetting,
    Deleting,
    Continuing,
    EditingReasons,
    RemovingMember,
}

impl Operation {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        match self {
            Self::Resetting => 0,
            Self::Deleting => 1,
            Self::Continuing => 2,
            Self::EditingReasons => 3,
            Self::RemovingMember => 4,
        }
    }
}

/// In-progress markers for mutating operations.
///
/// Counted rather than boolean so overlapping calls of the same kind keep
/// the flag raised until the last one finishes.
#[derive(Debug, Default)]
pub struct OperationFlags {
    in_flight: [AtomicUsize; Operation::COUNT],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FlagSnapshot {
    pub is_resetting: bool,
    pub is_deleting: bool,
    pub is_continuing: bool,
    pub is_editing_reasons: bool,
    pub is_removing_member: bool,
}

impl OperationFlags {
    pub fn is_active(&self, op: Operation) -> bool {
        self.in_flight[op.index()].load(Ordering::Acquire) > 0
    }

    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            is_resetting: self.is_active(Operation::Resetting),
            is_deleting: self.is_active(Operation::Deleting),
            is_continuing: self.is_active(Operation::Continuing),
            is_editing_reasons: self.is_active(Operation::EditingReasons),
            is_removing_member: self.is_active(Operation::RemovingMember),
        }
    }

    /// Raise `op` until the returned guard drops.
    pub(crate) fn begin(&self, op: Operation) -> OperationGuard<'_> {
        self.in_flight[op.index()].fetch_add(1, Ordering::AcqRel);
        OperationGuard { flags: self, op }
    }
}

/// Lowers its flag on drop, whether the operation succeeded, failed or was
/// cancelled.
#[must_use]
pub(crate) struct OperationGuard<'a> {
    flags: &'a OperationFlags,
    op: Operation,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.flags.in_flight[self.op.index()].fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_classify_like_screens() {
        assert_eq!(
            LoadFailure::classify(&CoreError::conflict("waiting")),
            LoadFailure::NotStarted
        );
        assert_eq!(
            LoadFailure::classify(&CoreError::forbidden("x")),
            LoadFailure::NotParticipant
        );
        assert_eq!(
            LoadFailure::classify(&CoreError::Timeout { timeout_ms: 5 }),
            LoadFailure::Timeout
        );
        assert_eq!(
            LoadFailure::classify(&CoreError::invalid_timestamp("x")),
            LoadFailure::Unknown
        );
    }

    #[test]
    fn guard_lowers_flag() {
        let flags = OperationFlags::default();
        {
            let _outer = flags.begin(Operation::Resetting);
            {
                let _inner = flags.begin(Operation::Resetting);
                assert!(flags.snapshot().is_resetting);
            }
            assert!(flags.is_active(Operation::Resetting));
            assert!(!flags.is_active(Operation::Deleting));
        }
        assert_eq!(flags.snapshot(), FlagSnapshot::default());
    }

    #[test]
    fn load_state_accessors() {
        let ok: LoadState<u8> = LoadState::from_result(Ok(3));
        assert_eq!(ok.success(), Some(&3));
        let failed: LoadState<u8> = LoadState::from_result(Err(CoreError::not_found("x")));
        assert_eq!(failed.failure(), Some(LoadFailure::NotFound));
        assert!(LoadState::<u8>::Loading.is_loading());
    }
}
