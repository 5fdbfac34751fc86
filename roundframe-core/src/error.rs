//! Error type shared by every drawing path.
//!
//! All variants are terminal for the call that produced them: nothing in the
//! drawer retries or falls back to a degraded rendering mode.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("Program link failed: {0}")]
    ProgramLink(String),
    #[error("Uniform not found: {0}")]
    UniformNotFound(String),
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),
    #[error("GL error 0x{code:04X} during: {op}")]
    Gl { op: String, code: u32 },
    #[error("GL object creation failed: {0}")]
    Resource(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Pipeline stage a shader belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "Vertex"),
            ShaderStage::Fragment => write!(f, "Fragment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = RenderError::Gl {
            op: "initialize fragment shader uniform values".into(),
            code: 0x0502,
        };
        assert_eq!(
            err.to_string(),
            "GL error 0x0502 during: initialize fragment shader uniform values"
        );

        let err = RenderError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "syntax error".into(),
        };
        assert_eq!(err.to_string(), "Fragment shader failed to compile: syntax error");
    }
}
