use crate::device::ShaderStage;

/// Reasons the background degrades to an empty surface.
///
/// None of these are retried: they stem from the host's capabilities or from
/// the embedded shader sources, so a second attempt cannot succeed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackgroundError {
    #[error("graphics context is not supported by this host")]
    ContextUnsupported,
    #[error("{stage} shader failed to compile: {message}")]
    ShaderCompile { stage: ShaderStage, message: String },
    #[error("shader program failed to link: {message}")]
    ProgramLink { message: String },
    #[error("linked program does not expose `{name}`")]
    MissingInput { name: String },
    #[error("surface failure: {0}")]
    Surface(String),
}
