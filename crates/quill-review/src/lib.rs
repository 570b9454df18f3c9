//! PR content pipeline: orchestration, generation, and publication.
//!
//! Provides the workflow engine ([`workflow`]), the concrete pipeline that
//! summarizes and reviews a pull request ([`pipeline`]), the idempotent
//! publication reconciler ([`publish`]), and the clients for GitHub, Jira
//! and OpenAI-compatible models behind the [`services`] traits.

pub mod github;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod publish;
pub mod render;
pub mod services;
pub mod tracker;
pub mod workflow;
