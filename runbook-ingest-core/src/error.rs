//! Run-level halts: the expected early exit ([`Halt::Bail`]) and the
//! unexpected one ([`Halt::Abort`]).

use tracing::{error, info};

use crate::contract::CollaboratorError;
use crate::summarise::plural;

/// Why a run stopped before producing a verdict. Never a system fault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BailReason {
    #[error("runbook checks disabled")]
    Disabled,
    #[error("head commit data missing")]
    MissingHeadCommit,
    #[error("repository missing from trigger")]
    MissingRepository,
    #[error("no candidates")]
    NoCandidates,
    #[error("0/{} ingested", runbooks(.attempted))]
    NothingIngested { attempted: usize },
    #[error("failed to store results")]
    StoreFailed,
}

fn runbooks(count: &usize) -> String {
    plural(*count, "runbook")
}

/// Early termination of a run.
#[derive(Debug, thiserror::Error)]
pub enum Halt {
    #[error("run bailed: {0}")]
    Bail(BailReason),
    #[error("run aborted: {0}")]
    Abort(#[source] CollaboratorError),
}

impl Halt {
    /// Log an expected early exit and wrap it.
    pub fn bail(reason: BailReason) -> Self {
        info!(event = "BAILED", reason = %reason, "[RUN] Bailing out of run");
        Halt::Bail(reason)
    }

    /// Log an unexpected collaborator failure and wrap it untouched.
    pub fn abort(error: CollaboratorError, event: &'static str) -> Self {
        error!(event, error = %error, "[RUN][ERROR] Aborting run");
        Halt::Abort(error)
    }

    pub fn bail_reason(&self) -> Option<&BailReason> {
        match self {
            Halt::Bail(reason) => Some(reason),
            Halt::Abort(_) => None,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Halt::Abort(_))
    }
}
