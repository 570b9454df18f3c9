//! Interfaces to the systems the pipeline talks to.
//!
//! Every call is fail-fast: implementations return an error and the run
//! aborts. Callers that want retries or rate limiting wrap these traits.

use async_trait::async_trait;
use quill_core::{ChangeMetadata, Comment, QuillError, TicketContext};

/// The code host holding the change under review (e.g. a GitHub pull request).
#[async_trait]
pub trait ChangeHost: Send + Sync {
    /// Branch, title, current description and condensed commit log.
    async fn fetch_metadata(&self) -> Result<ChangeMetadata, QuillError>;

    /// Current description only. Hosts where the commit log is costly to
    /// fetch override this.
    async fn fetch_description(&self) -> Result<String, QuillError> {
        Ok(self.fetch_metadata().await?.description)
    }

    /// Raw unified diff. `exclude` is a hint; hosts that cannot filter
    /// server-side return the full diff.
    async fn fetch_diff(&self, exclude: &[String]) -> Result<String, QuillError>;

    /// Login of the identity this client acts as.
    async fn current_user(&self) -> Result<String, QuillError>;

    /// All comments on the change's discussion stream, oldest first.
    async fn list_comments(&self) -> Result<Vec<Comment>, QuillError>;

    /// Append a comment and return it as stored.
    async fn create_comment(&self, body: &str) -> Result<Comment, QuillError>;

    /// Replace the body of an existing comment.
    async fn edit_comment(&self, id: u64, body: &str) -> Result<(), QuillError>;

    /// Replace the change's description.
    async fn update_description(&self, body: &str) -> Result<(), QuillError>;
}

/// External ticket tracker (e.g. Jira).
#[async_trait]
pub trait TicketTracker: Send + Sync {
    /// Summary and description of ticket `id`.
    async fn fetch_ticket(&self, id: &str) -> Result<TicketContext, QuillError>;
}

/// A structured-output generation request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// System instructions.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    /// Name of the expected output shape, for logs and errors.
    pub shape: &'static str,
    /// JSON schema the response must follow.
    pub schema: serde_json::Value,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Generative model, treated as an opaque request/response service.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Return a JSON object intended to match `request.schema`.
    async fn generate(&self, request: GenerateRequest) -> Result<serde_json::Value, QuillError>;
}
