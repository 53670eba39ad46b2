use bytes::Bytes;

/// Raw upload carried from the HTTP boundary to the analysis service. The
/// bytes live only for the duration of one invocation and are released on
/// every exit path.
#[derive(Clone)]
pub struct AnalysisInput {
    pub im_bytes: Bytes,
}
