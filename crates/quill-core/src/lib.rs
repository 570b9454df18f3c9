//! Core types, configuration, and error handling for quill.
//!
//! This crate provides the shared foundation used by the other quill crates:
//! - [`QuillError`]: unified error type using `thiserror`
//! - [`QuillConfig`]: configuration loaded from `.quill.toml`
//! - Shared types: [`ChangeMetadata`], [`TicketContext`], [`GeneratedSummary`],
//!   [`GeneratedReview`], [`Finding`], [`Severity`], [`Comment`], [`Action`]

mod config;
mod error;
mod types;

pub use config::{DiffConfig, GitHubConfig, LlmConfig, PipelineConfig, QuillConfig, TicketConfig};
pub use error::QuillError;
pub use types::{
    Action, ChangeKind, ChangeMetadata, Comment, Finding, GeneratedReview, GeneratedSummary,
    Severity, TicketContext,
};

/// A convenience `Result` type for quill operations.
pub type Result<T> = std::result::Result<T, QuillError>;
