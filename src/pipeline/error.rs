use thiserror::Error;

/// Failure modes of a single pipeline invocation.
///
/// An unreadable image or an unusable face region aborts the invocation.
/// A missing sub-model degrades the matching report field instead, except
/// for the face localizer, which is required before anything downstream
/// can run. "No face detected" is an expected outcome and is carried in
/// the report status, not here.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not read image")]
    ImageRead,

    #[error("invalid face region: {0}")]
    InvalidRegion(String),

    #[error("{0} model is not loaded")]
    CapabilityUnavailable(&'static str),

    #[error("{capability} inference failed: {message}")]
    CapabilityFailure {
        capability: &'static str,
        message: String,
    },
}

impl PipelineError {
    pub fn capability_failure(capability: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::CapabilityFailure {
            capability,
            message: err.to_string(),
        }
    }
}
