// crates/types/src/status.rs
//! Remote job lifecycle status and its forward-only transition order.

use serde::{Deserialize, Serialize};

/// Status of one remote translation job.
///
/// Discriminants are the service's wire codes: 1 queueing, 2 processing,
/// 3 completed, 4 failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued = 1,
    Processing = 2,
    Completed = 3,
    Failed = 4,
}

/// A status code outside the documented 1–4 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown video status code {0}")]
pub struct UnknownStatusCode(pub u8);

impl JobStatus {
    /// The service's numeric code for this status.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Completed and Failed are terminal: no transition ever leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a job currently in `self` may take on `next`.
    ///
    /// Legal transitions move forward in the partial order
    /// `Queued < Processing < {Completed, Failed}`; re-asserting the current
    /// status is allowed (progress-only updates). Terminal states accept
    /// nothing, and Processing never regresses to Queued.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (JobStatus::Processing, JobStatus::Queued) => false,
            _ => true,
        }
    }
}

impl TryFrom<u8> for JobStatus {
    type Error = UnknownStatusCode;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(JobStatus::Queued),
            2 => Ok(JobStatus::Processing),
            3 => Ok(JobStatus::Completed),
            4 => Ok(JobStatus::Failed),
            other => Err(UnknownStatusCode(other)),
        }
    }
}
