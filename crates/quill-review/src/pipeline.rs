//! The PR content pipeline: stages and their wiring.
//!
//! ```text
//! fetch-metadata
//! ticket-integration? fetch-ticket          : skip-ticket
//! prepare-diff
//! summary?            generate-summary,
//!                     publish-description   : skip-summary
//! review?             generate-review,
//!                     publish-review        : skip-review
//! ```
//!
//! Branch decisions come from configuration and are fixed before the run
//! starts. Generation stages write nothing when the processed diff is empty,
//! and the matching publish stage then reports [`Publication::Skipped`].

use std::sync::Arc;

use async_trait::async_trait;
use quill_core::{
    Action, ChangeMetadata, GeneratedReview, GeneratedSummary, QuillConfig, QuillError,
    TicketContext,
};
use quill_difflens::filter::IgnoreFilter;
use quill_difflens::{process, ProcessedDiff};
use regex::Regex;

use crate::prompt::{generate_structured, OutputShape, PromptContext};
use crate::publish::{publish, Publication, Target};
use crate::render::{render_review, render_summary};
use crate::services::{ChangeHost, ModelService, TicketTracker};
use crate::workflow::{
    Branch, NoopStage, Stage, StageContext, StageOutput, StateKey, Step, Workflow, WorkflowState,
};

/// Change metadata, written by `fetch-metadata`.
pub const METADATA: StateKey<ChangeMetadata> = StateKey::new("metadata");
/// Linked ticket, written by `fetch-ticket`. Absent when the branch is skipped.
pub const TICKET: StateKey<TicketContext> = StateKey::new("ticket");
/// Filtered and truncated diff, written by `prepare-diff`.
pub const DIFF: StateKey<ProcessedDiff> = StateKey::new("diff");
/// Generated summary.
pub const SUMMARY: StateKey<GeneratedSummary> = StateKey::new("summary");
/// Generated review.
pub const REVIEW: StateKey<GeneratedReview> = StateKey::new("review");
/// Outcome of publishing the summary.
pub const DESCRIPTION_PUBLICATION: StateKey<Publication> =
    StateKey::new("description-publication");
/// Outcome of publishing the review.
pub const REVIEW_PUBLICATION: StateKey<Publication> = StateKey::new("review-publication");

/// External collaborators used by the pipeline.
#[derive(Clone)]
pub struct Services {
    /// Where the change lives and where results are published.
    pub host: Arc<dyn ChangeHost>,
    /// Ticket tracker; required only when ticket integration is enabled.
    pub tracker: Option<Arc<dyn TicketTracker>>,
    /// Model used for generation.
    pub model: Arc<dyn ModelService>,
}

/// Build the pipeline for `config`.
///
/// # Errors
///
/// Returns [`QuillError::Config`] for invalid configuration, including
/// ticket integration enabled without a tracker. Nothing external is
/// contacted.
pub fn build_pipeline(config: &QuillConfig, services: Services) -> Result<Workflow, QuillError> {
    config.validate()?;
    let filter = IgnoreFilter::from_config(&config.diff)?;

    let ticket_enabled = config.ticket.enabled;
    let ticket_arm = if ticket_enabled {
        let tracker = services.tracker.clone().ok_or_else(|| {
            QuillError::Config("ticket integration is enabled but no tracker is configured".into())
        })?;
        vec![Step::unit(FetchTicket {
            tracker,
            pattern: config.ticket.branch_regex()?,
        })]
    } else {
        Vec::new()
    };

    let temperature = config.llm.temperature;
    let workflow = Workflow::new("pr-content")
        .then(FetchMetadata {
            host: Arc::clone(&services.host),
        })
        .branch(Branch::fixed(
            "ticket-integration",
            ticket_enabled,
            ticket_arm,
            vec![Step::unit(NoopStage::new("skip-ticket"))],
        ))
        .then(PrepareDiff {
            host: Arc::clone(&services.host),
            filter,
            exclude: config.diff.ignore_patterns.clone(),
            max_chars: config.diff.max_chars,
        })
        .branch(Branch::fixed(
            "summary",
            config.is_enabled(Action::Summary),
            vec![
                Step::unit(Generate {
                    name: "generate-summary",
                    key: SUMMARY,
                    model: Arc::clone(&services.model),
                    temperature,
                }),
                Step::unit(Publish {
                    name: "publish-description",
                    key: SUMMARY,
                    outcome: DESCRIPTION_PUBLICATION,
                    target: Target::Description,
                    render: render_summary,
                    host: Arc::clone(&services.host),
                }),
            ],
            vec![Step::unit(NoopStage::new("skip-summary"))],
        ))
        .branch(Branch::fixed(
            "review",
            config.is_enabled(Action::Review),
            vec![
                Step::unit(Generate {
                    name: "generate-review",
                    key: REVIEW,
                    model: Arc::clone(&services.model),
                    temperature,
                }),
                Step::unit(Publish {
                    name: "publish-review",
                    key: REVIEW,
                    outcome: REVIEW_PUBLICATION,
                    target: Target::CommentStream,
                    render: render_review,
                    host: Arc::clone(&services.host),
                }),
            ],
            vec![Step::unit(NoopStage::new("skip-review"))],
        ));

    Ok(workflow)
}

/// Publications recorded in a finished run's state, in pipeline order.
pub fn publications(state: &WorkflowState) -> Vec<(Target, &Publication)> {
    [
        (Target::Description, DESCRIPTION_PUBLICATION),
        (Target::CommentStream, REVIEW_PUBLICATION),
    ]
    .into_iter()
    .filter_map(|(target, key)| state.get(&key).map(|p| (target, p)))
    .collect()
}

struct FetchMetadata {
    host: Arc<dyn ChangeHost>,
}

#[async_trait]
impl Stage for FetchMetadata {
    fn name(&self) -> &str {
        "fetch-metadata"
    }

    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutput, QuillError> {
        let metadata = self.host.fetch_metadata().await?;
        tracing::info!(branch = %metadata.branch, title = %metadata.title, "fetched change metadata");
        ctx.insert(&METADATA, metadata.clone());
        Ok(StageOutput::new(metadata))
    }
}

struct FetchTicket {
    tracker: Arc<dyn TicketTracker>,
    pattern: Regex,
}

impl FetchTicket {
    fn ticket_id<'b>(&self, branch: &'b str) -> Option<&'b str> {
        self.pattern
            .captures(branch)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }
}

#[async_trait]
impl Stage for FetchTicket {
    fn name(&self) -> &str {
        "fetch-ticket"
    }

    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutput, QuillError> {
        let id = {
            let metadata = ctx
                .previous::<ChangeMetadata>()
                .map_or_else(|| ctx.require(&METADATA), Ok)?;
            self.ticket_id(&metadata.branch).map(str::to_string)
        };

        let ticket = match id {
            Some(id) => {
                let ticket = self.tracker.fetch_ticket(&id).await?;
                tracing::info!(ticket = %id, "fetched linked ticket");
                ticket
            }
            None => {
                tracing::debug!("branch name carries no ticket id");
                TicketContext::default()
            }
        };
        ctx.insert(&TICKET, ticket.clone());
        Ok(StageOutput::new(ticket))
    }
}

struct PrepareDiff {
    host: Arc<dyn ChangeHost>,
    filter: IgnoreFilter,
    exclude: Vec<String>,
    max_chars: usize,
}

#[async_trait]
impl Stage for PrepareDiff {
    fn name(&self) -> &str {
        "prepare-diff"
    }

    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutput, QuillError> {
        let raw = self.host.fetch_diff(&self.exclude).await?;
        let diff = process(&raw, &self.filter, self.max_chars);
        tracing::info!(
            sections = diff.report.total_sections,
            ignored = diff.report.ignored.len(),
            chars = diff.report.output_chars,
            truncated = diff.was_truncated,
            "prepared diff"
        );
        ctx.insert(&DIFF, diff.clone());
        Ok(StageOutput::new(diff))
    }
}

struct Generate<T> {
    name: &'static str,
    key: StateKey<T>,
    model: Arc<dyn ModelService>,
    temperature: f32,
}

#[async_trait]
impl<T> Stage for Generate<T>
where
    T: OutputShape + Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutput, QuillError> {
        let generated: T = {
            let diff = ctx.require(&DIFF)?;
            if diff.is_empty() {
                tracing::warn!(shape = T::NAME, "diff is empty after filtering, nothing to generate");
                return Ok(StageOutput::empty());
            }
            let metadata = ctx.require(&METADATA)?;
            let no_ticket = TicketContext::default();
            let ticket = ctx.get(&TICKET).unwrap_or(&no_ticket);
            let prompt = PromptContext {
                metadata,
                ticket,
                diff,
            };
            generate_structured(self.model.as_ref(), prompt, self.temperature).await?
        };
        ctx.insert(&self.key, generated.clone());
        Ok(StageOutput::new(generated))
    }
}

struct Publish<T> {
    name: &'static str,
    key: StateKey<T>,
    outcome: StateKey<Publication>,
    target: Target,
    render: fn(&T) -> String,
    host: Arc<dyn ChangeHost>,
}

#[async_trait]
impl<T> Stage for Publish<T>
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutput, QuillError> {
        let rendered = ctx.find(&self.key).map(self.render);
        let publication = match rendered {
            Some(body) => publish(self.host.as_ref(), self.target, &body).await?,
            None => {
                tracing::info!(destination = %self.target, "nothing generated, skipping publication");
                Publication::Skipped {
                    reason: "nothing was generated".into(),
                }
            }
        };
        ctx.insert(&self.outcome, publication.clone());
        Ok(StageOutput::new(publication))
    }
}

#[cfg(test)]
mod tests {
    use quill_core::Comment;

    use super::*;

    struct NullHost;

    #[async_trait]
    impl ChangeHost for NullHost {
        async fn fetch_metadata(&self) -> Result<ChangeMetadata, QuillError> {
            Ok(ChangeMetadata::default())
        }
        async fn fetch_diff(&self, _exclude: &[String]) -> Result<String, QuillError> {
            Ok(String::new())
        }
        async fn current_user(&self) -> Result<String, QuillError> {
            Ok("bot".into())
        }
        async fn list_comments(&self) -> Result<Vec<Comment>, QuillError> {
            Ok(Vec::new())
        }
        async fn create_comment(&self, _body: &str) -> Result<Comment, QuillError> {
            Err(QuillError::Host("read-only".into()))
        }
        async fn edit_comment(&self, _id: u64, _body: &str) -> Result<(), QuillError> {
            Err(QuillError::Host("read-only".into()))
        }
        async fn update_description(&self, _body: &str) -> Result<(), QuillError> {
            Err(QuillError::Host("read-only".into()))
        }
    }

    struct NullModel;

    #[async_trait]
    impl ModelService for NullModel {
        fn model(&self) -> &str {
            "null"
        }
        async fn generate(
            &self,
            _request: crate::services::GenerateRequest,
        ) -> Result<serde_json::Value, QuillError> {
            Err(QuillError::Llm("offline".into()))
        }
    }

    fn services() -> Services {
        Services {
            host: Arc::new(NullHost),
            tracker: None,
            model: Arc::new(NullModel),
        }
    }

    #[test]
    fn outline_matches_declared_pipeline() {
        let workflow = build_pipeline(&QuillConfig::default(), services()).unwrap();
        assert_eq!(
            workflow.outline(),
            vec![
                "fetch-metadata",
                "ticket-integration?",
                "else",
                "  skip-ticket",
                "prepare-diff",
                "summary?",
                "  generate-summary",
                "  publish-description",
                "else",
                "  skip-summary",
                "review?",
                "  generate-review",
                "  publish-review",
                "else",
                "  skip-review",
            ]
        );
    }

    #[test]
    fn ticket_integration_requires_tracker() {
        let mut config = QuillConfig::default();
        config.ticket.enabled = true;
        config.ticket.base_url = Some("https://acme.atlassian.net".into());
        let err = build_pipeline(&config, services()).unwrap_err();
        assert!(matches!(err, QuillError::Config(_)));
    }

    #[test]
    fn invalid_config_rejected_before_run() {
        let mut config = QuillConfig::default();
        config.diff.ignore_patterns.push("[".into());
        assert!(matches!(
            build_pipeline(&config, services()),
            Err(QuillError::Config(_))
        ));
    }

    #[tokio::test]
    async fn empty_diff_skips_generation_and_publication() {
        let workflow = build_pipeline(&QuillConfig::default(), services()).unwrap();
        let report = workflow.run(WorkflowState::new()).await.unwrap();
        assert!(!report.state.contains(&SUMMARY));
        assert!(!report.state.contains(&REVIEW));
        let published = publications(&report.state);
        assert_eq!(published.len(), 2);
        assert!(published
            .iter()
            .all(|(_, p)| matches!(p, Publication::Skipped { .. })));
    }

    #[test]
    fn ticket_id_from_branch() {
        let stage = FetchTicket {
            tracker: Arc::new(NoTracker),
            pattern: Regex::new(r"([A-Z][A-Z0-9]+-\d+)").unwrap(),
        };
        assert_eq!(stage.ticket_id("feature/PAY-12-refunds"), Some("PAY-12"));
        assert_eq!(stage.ticket_id("main"), None);
    }

    struct NoTracker;

    #[async_trait]
    impl TicketTracker for NoTracker {
        async fn fetch_ticket(&self, id: &str) -> Result<TicketContext, QuillError> {
            Err(QuillError::Tracker(format!("unknown {id}")))
        }
    }
}
