use std::path::PathBuf;

/// Errors that can occur across the quill pipeline.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate renders it through `miette` at the boundary.
///
/// # Examples
///
/// ```
/// use quill_core::QuillError;
///
/// let err = QuillError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum QuillError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(quill::config), help("check your .quill.toml and environment"))]
    Config(String),

    /// Change host (GitHub) call failed or returned a non-success status.
    #[error("change host error: {0}")]
    #[diagnostic(code(quill::host))]
    Host(String),

    /// Ticket tracker call failed or returned a non-success status.
    #[error("ticket tracker error: {0}")]
    #[diagnostic(code(quill::tracker))]
    Tracker(String),

    /// LLM API or response error.
    #[error("LLM error: {0}")]
    #[diagnostic(code(quill::llm))]
    Llm(String),

    /// Model output did not match the declared shape.
    #[error("validation error: {0}")]
    #[diagnostic(code(quill::validation))]
    Validation(String),

    /// A stage read an artifact that no earlier stage wrote.
    #[error("missing workflow artifact `{0}`")]
    MissingArtifact(&'static str),

    /// A workflow stage failed; wraps the originating error.
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// The error the stage returned.
        #[source]
        source: Box<QuillError>,
    },

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl QuillError {
    /// Returns `true` for failures of an external collaborator (host, tracker, model).
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::QuillError;
    ///
    /// assert!(QuillError::Host("502".into()).is_external());
    /// assert!(!QuillError::Config("bad".into()).is_external());
    /// ```
    pub fn is_external(&self) -> bool {
        match self {
            QuillError::Host(_) | QuillError::Tracker(_) | QuillError::Llm(_) => true,
            QuillError::Stage { source, .. } => source.is_external(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: QuillError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = QuillError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn stage_error_names_stage_and_cause() {
        let err = QuillError::Stage {
            stage: "fetch-metadata".into(),
            source: Box::new(QuillError::Host("GitHub API error 404".into())),
        };
        let text = err.to_string();
        assert!(text.contains("fetch-metadata"));
        assert!(text.contains("404"));
        assert!(err.is_external());
    }

    #[test]
    fn missing_artifact_names_key() {
        let err = QuillError::MissingArtifact("diff");
        assert_eq!(err.to_string(), "missing workflow artifact `diff`");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = QuillError::FileNotFound(PathBuf::from("/tmp/.quill.toml"));
        assert!(err.to_string().contains("/tmp/.quill.toml"));
    }
}
