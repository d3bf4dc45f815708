use serde::{Deserialize, Serialize};

/// Streak expressed against the challenge target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RecoveryProgress {
    /// The challenge has a target; `percent` is clamped to `0.0..=100.0`.
    Targeted {
        percent: f64,
        elapsed_seconds: i64,
        target_seconds: i64,
    },
    /// Free mode: there is no target, only elapsed time.
    FreeMode { elapsed_seconds: i64 },
}

impl RecoveryProgress {
    pub fn elapsed_seconds(&self) -> i64 {
        match self {
            RecoveryProgress::Targeted {
                elapsed_seconds, ..
            }
            | RecoveryProgress::FreeMode { elapsed_seconds } => *elapsed_seconds,
        }
    }

    pub fn percent(&self) -> Option<f64> {
        match self {
            RecoveryProgress::Targeted { percent, .. } => Some(*percent),
            RecoveryProgress::FreeMode { .. } => None,
        }
    }
}
