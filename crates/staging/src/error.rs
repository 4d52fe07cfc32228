use crate::api::RemoteError;
use common::error::diagnostics::DiagnosticMessage;
use thiserror::Error;

/// Failure of a staging run.
///
/// `InvalidSpecification`, `BackendUnsupported` and `BranchResolutionFailure`
/// are raised before anything is submitted. `RemoteJobFailure` and `Timeout`
/// come out of polling and always fail the whole run.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("invalid input specification: {context}")]
    InvalidSpecification { context: DiagnosticMessage },
    #[error("backend unsupported: {context}")]
    BackendUnsupported { context: DiagnosticMessage },
    #[error("branch resolution failed: {context}")]
    BranchResolutionFailure { context: DiagnosticMessage },
    #[error("remote job {job_id} failed: {context}")]
    RemoteJobFailure {
        job_id: String,
        context: DiagnosticMessage,
    },
    #[error("state inconsistency: {context}")]
    StateInconsistency { context: DiagnosticMessage },
    #[error("timed out: {context}")]
    Timeout { context: DiagnosticMessage },
    #[error("storage API error: {context}")]
    Remote {
        context: DiagnosticMessage,
        #[source]
        source: Option<RemoteError>,
    },
}

impl StagingError {
    #[track_caller]
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpecification {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn backend_unsupported(message: impl Into<String>) -> Self {
        Self::BackendUnsupported {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn branch_resolution(message: impl Into<String>) -> Self {
        Self::BranchResolutionFailure {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn remote_job_failure(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RemoteJobFailure {
            job_id: job_id.into(),
            context: DiagnosticMessage::new(reason.into()),
        }
    }

    #[track_caller]
    pub fn state_inconsistency(message: impl Into<String>) -> Self {
        Self::StateInconsistency {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            context: DiagnosticMessage::new(message.into()),
        }
    }

    #[track_caller]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            context: DiagnosticMessage::new(message.into()),
            source: None,
        }
    }

    /// Raised locally, before any remote job existed.
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self,
            Self::InvalidSpecification { .. }
                | Self::BackendUnsupported { .. }
                | Self::BranchResolutionFailure { .. }
        )
    }
}

impl From<RemoteError> for StagingError {
    #[track_caller]
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::InvalidMarker { context } => StagingError::StateInconsistency { context },
            other => StagingError::Remote {
                context: DiagnosticMessage::new(other.to_string()),
                source: Some(other),
            },
        }
    }
}
