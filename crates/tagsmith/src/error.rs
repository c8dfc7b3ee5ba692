//! Error types for compiling and rendering templates.
//!
//! Compilation failures are reported as [`CompileError`]; failures while
//! executing a compiled artifact are reported as [`RenderError`], which wraps
//! any compile failure hit along the way (a render compiles on a cache miss).

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning template source into a compiled artifact.
#[derive(Debug, Error)]
pub enum CompileError {
    /// A source, layout, or included sub-template could not be read.
    #[error("failed to read template file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The compiled artifact could not be persisted.
    #[error("failed to write compiled artifact {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An operation needed a template identity but none was set.
    #[error("no template name has been set on this engine")]
    NoTemplate,

    /// Static includes kept producing new include tags.
    #[error("include of \"{name}\" did not settle after {limit} passes (recursive include?)")]
    IncludeCycle { name: String, limit: usize },

    /// A tag pattern failed to compile.
    #[error("invalid tag pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A registered tag extension failed.
    #[error("tag extension '{name}' failed: {message}")]
    Extension { name: String, message: String },

    /// The engine configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_yaml::Error> for CompileError {
    fn from(err: serde_yaml::Error) -> Self {
        CompileError::Config(err.to_string())
    }
}

/// Errors raised while executing a compiled artifact.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The artifact's directive code could not be parsed.
    #[error("syntax error at byte {offset}: {message}")]
    Syntax { message: String, offset: usize },

    /// A directive failed while executing.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// A directive called a function the runtime does not provide.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// Dynamic template inclusion nested too deeply.
    #[error("dynamic template \"{name}\" exceeds the include depth limit of {limit}")]
    IncludeDepth { name: String, limit: usize },

    /// Compiling the artifact (or a dynamically included one) failed.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Bindings could not be converted into runtime values.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Writing rendered output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RenderError {
    fn from(err: serde_json::Error) -> Self {
        RenderError::Serialization(err.to_string())
    }
}

/// Result type for compile operations.
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_error_display_names_path() {
        let err = CompileError::Read {
            path: PathBuf::from("/tpl/src/home.tpl"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let msg = err.to_string();
        assert!(msg.contains("failed to read"));
        assert!(msg.contains("/tpl/src/home.tpl"));
    }

    #[test]
    fn test_compile_error_wraps_into_render_error() {
        let err: RenderError = CompileError::NoTemplate.into();
        assert!(matches!(err, RenderError::Compile(CompileError::NoTemplate)));
        assert_eq!(err.to_string(), "no template name has been set on this engine");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let err: RenderError = io_err.into();
        assert!(matches!(err, RenderError::Io(_)));
    }
}
