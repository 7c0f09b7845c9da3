use std::fmt;

/// Errors that abort mounting or signal caller misuse.
///
/// Everything else that can go wrong after construction (compile failures,
/// unknown uniforms, GL upload errors) is logged and degraded instead.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("shader mount host is not usable: {0}")]
    InvalidHost(String),
    #[error("graphics context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("image for uniform '{uniform}' is not loaded yet; await its load before passing it")]
    ImageNotLoaded { uniform: String },
}

/// Pipeline stage a shader compile error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to create shader object: {0}")]
    Create(String),
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("shader program failed to link: {0}")]
    Link(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to create GPU object: {0}")]
    Create(String),
    #[error("GL error 0x{code:04x} while uploading texture")]
    Upload { code: u32 },
    #[error("full-screen quad setup failed: {0}")]
    Geometry(String),
}
