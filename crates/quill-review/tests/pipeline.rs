use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use quill_core::{Action, ChangeMetadata, Comment, QuillConfig, QuillError, TicketContext};
use quill_review::pipeline::{
    build_pipeline, publications, Services, DESCRIPTION_PUBLICATION, REVIEW, REVIEW_PUBLICATION,
    SUMMARY, TICKET,
};
use quill_review::publish::{Publication, REVIEW_MARKER, SUMMARY_BEGIN, SUMMARY_END};
use quill_review::services::{ChangeHost, GenerateRequest, ModelService, TicketTracker};
use quill_review::workflow::{RunStatus, StageStatus, WorkflowState};
use serde_json::json;

const DIFF: &str = "\
diff --git a/src/refund.rs b/src/refund.rs
@@ -0,0 +1,2 @@
+pub fn refund() {}
+
diff --git a/Cargo.lock b/Cargo.lock
@@ -1 +1 @@
-old
+new
";

struct FakeHost {
    branch: String,
    diff: String,
    description: Mutex<String>,
    comments: Mutex<Vec<Comment>>,
    writes: Mutex<Vec<String>>,
}

impl FakeHost {
    fn new(branch: &str, description: &str) -> Self {
        Self {
            branch: branch.into(),
            diff: DIFF.into(),
            description: Mutex::new(description.into()),
            comments: Mutex::new(Vec::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    fn description(&self) -> String {
        self.description.lock().unwrap().clone()
    }

    fn comments(&self) -> Vec<Comment> {
        self.comments.lock().unwrap().clone()
    }

    fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChangeHost for FakeHost {
    async fn fetch_metadata(&self) -> Result<ChangeMetadata, QuillError> {
        Ok(ChangeMetadata {
            branch: self.branch.clone(),
            title: "Add refunds".into(),
            description: self.description(),
            commits: "- 0123456 add refund\n".into(),
        })
    }

    async fn fetch_diff(&self, _exclude: &[String]) -> Result<String, QuillError> {
        Ok(self.diff.clone())
    }

    async fn current_user(&self) -> Result<String, QuillError> {
        Ok("quill-bot".into())
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, QuillError> {
        Ok(self.comments())
    }

    async fn create_comment(&self, body: &str) -> Result<Comment, QuillError> {
        let mut comments = self.comments.lock().unwrap();
        let id = 100 + comments.len() as u64;
        let comment = Comment {
            id,
            author: "quill-bot".into(),
            body: body.into(),
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
                + Duration::minutes(id as i64),
        };
        comments.push(comment.clone());
        self.writes.lock().unwrap().push(format!("create-comment {id}"));
        Ok(comment)
    }

    async fn edit_comment(&self, id: u64, body: &str) -> Result<(), QuillError> {
        let mut comments = self.comments.lock().unwrap();
        let comment = comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| QuillError::Host(format!("no comment {id}")))?;
        comment.body = body.into();
        self.writes.lock().unwrap().push(format!("edit-comment {id}"));
        Ok(())
    }

    async fn update_description(&self, body: &str) -> Result<(), QuillError> {
        *self.description.lock().unwrap() = body.into();
        self.writes.lock().unwrap().push("update-description".into());
        Ok(())
    }
}

#[derive(Default)]
struct FakeModel {
    fail_shape: Option<&'static str>,
    review_overview: Mutex<String>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl FakeModel {
    fn prompts_for(&self, shape: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == shape)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl ModelService for FakeModel {
    fn model(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<serde_json::Value, QuillError> {
        self.prompts
            .lock()
            .unwrap()
            .push((request.shape.to_string(), request.prompt.clone()));
        if self.fail_shape == Some(request.shape) {
            return Err(QuillError::Llm("model unavailable".into()));
        }
        match request.shape {
            "summary" => Ok(json!({
                "kind": "feature",
                "title": "Add refunds",
                "overview": "Adds a refund function.",
                "highlights": ["New `refund` function"]
            })),
            _ => Ok(json!({
                "overview": self.review_overview.lock().unwrap().clone(),
                "findings": [{
                    "file": "src/refund.rs",
                    "line": 1,
                    "severity": "suggestion",
                    "message": "Refund does nothing yet."
                }]
            })),
        }
    }
}

#[derive(Default)]
struct FakeTracker {
    requested: Mutex<Vec<String>>,
}

#[async_trait]
impl TicketTracker for FakeTracker {
    async fn fetch_ticket(&self, id: &str) -> Result<TicketContext, QuillError> {
        self.requested.lock().unwrap().push(id.to_string());
        Ok(TicketContext {
            summary: "Customers can request refunds".into(),
            description: "Support asked for this.".into(),
        })
    }
}

struct Harness {
    host: Arc<FakeHost>,
    model: Arc<FakeModel>,
    tracker: Arc<FakeTracker>,
}

impl Harness {
    fn new(host: FakeHost, model: FakeModel) -> Self {
        *model.review_overview.lock().unwrap() = "Small and focused.".into();
        Self {
            host: Arc::new(host),
            model: Arc::new(model),
            tracker: Arc::new(FakeTracker::default()),
        }
    }

    fn services(&self) -> Services {
        Services {
            host: self.host.clone(),
            tracker: Some(self.tracker.clone()),
            model: self.model.clone(),
        }
    }
}

fn config() -> QuillConfig {
    QuillConfig::default()
}

#[tokio::test]
async fn full_run_publishes_summary_and_review() {
    let harness = Harness::new(FakeHost::new("main", "Please review"), FakeModel::default());
    let workflow = build_pipeline(&config(), harness.services()).unwrap();

    let report = workflow.run(WorkflowState::new()).await.unwrap();

    assert_eq!(report.trace.status, RunStatus::Completed);
    assert_eq!(
        report.trace.stage_names(),
        vec![
            "fetch-metadata",
            "skip-ticket",
            "prepare-diff",
            "generate-summary",
            "publish-description",
            "generate-review",
            "publish-review",
        ]
    );
    assert_eq!(report.trace.decision("ticket-integration"), Some(false));
    assert_eq!(report.trace.decision("summary"), Some(true));
    assert!(report.state.contains(&SUMMARY));
    assert!(report.state.contains(&REVIEW));
    assert!(!report.state.contains(&TICKET));

    let description = harness.host.description();
    assert!(description.starts_with("Please review\n\n---\n\n"));
    assert!(description.contains(SUMMARY_BEGIN));
    assert!(description.ends_with(SUMMARY_END));
    assert!(description.contains("## Add refunds"));

    let comments = harness.host.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].body.ends_with(REVIEW_MARKER));
    assert!(comments[0].body.contains("src/refund.rs:1"));

    let published = publications(&report.state);
    assert_eq!(published.len(), 2);
    assert!(published.iter().all(|(_, p)| p.wrote()));
}

#[tokio::test]
async fn ignored_files_never_reach_the_model() {
    let harness = Harness::new(FakeHost::new("main", ""), FakeModel::default());
    let workflow = build_pipeline(&config(), harness.services()).unwrap();
    workflow.run(WorkflowState::new()).await.unwrap();

    let prompts = harness.model.prompts_for("review");
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("+pub fn refund() {}"));
    assert!(!prompts[0].contains("+new"));
    assert!(prompts[0].contains("Cargo.lock"), "exclusion is mentioned by name");
}

#[tokio::test]
async fn disabled_action_takes_skip_branch() {
    let harness = Harness::new(FakeHost::new("main", "Original"), FakeModel::default());
    let mut config = config();
    config.pipeline.actions = vec![Action::Review];
    let workflow = build_pipeline(&config, harness.services()).unwrap();

    let report = workflow.run(WorkflowState::new()).await.unwrap();

    assert_eq!(report.trace.decision("summary"), Some(false));
    assert!(report.trace.stage_names().contains(&"skip-summary"));
    assert!(!report.trace.stage_names().contains(&"generate-summary"));
    assert!(!report.state.contains(&DESCRIPTION_PUBLICATION));
    assert_eq!(harness.host.description(), "Original");
    assert!(harness.model.prompts_for("summary").is_empty());
    assert_eq!(harness.host.comments().len(), 1);
}

#[tokio::test]
async fn ticket_context_flows_into_prompts() {
    let harness = Harness::new(
        FakeHost::new("feature/PAY-12-refunds", ""),
        FakeModel::default(),
    );
    let mut config = config();
    config.ticket.enabled = true;
    config.ticket.base_url = Some("https://acme.atlassian.net".into());
    let workflow = build_pipeline(&config, harness.services()).unwrap();

    let report = workflow.run(WorkflowState::new()).await.unwrap();

    assert_eq!(report.trace.decision("ticket-integration"), Some(true));
    assert_eq!(*harness.tracker.requested.lock().unwrap(), vec!["PAY-12"]);
    let ticket = report.state.get(&TICKET).unwrap();
    assert_eq!(ticket.summary, "Customers can request refunds");
    for prompt in harness.model.prompts_for("summary") {
        assert!(prompt.contains("Customers can request refunds"));
    }
}

#[tokio::test]
async fn branch_without_ticket_id_skips_tracker() {
    let harness = Harness::new(FakeHost::new("fix-typo", ""), FakeModel::default());
    let mut config = config();
    config.ticket.enabled = true;
    config.ticket.base_url = Some("https://acme.atlassian.net".into());
    let workflow = build_pipeline(&config, harness.services()).unwrap();

    let report = workflow.run(WorkflowState::new()).await.unwrap();

    assert!(harness.tracker.requested.lock().unwrap().is_empty());
    assert!(report.state.get(&TICKET).unwrap().is_empty());
}

#[tokio::test]
async fn failure_aborts_run_and_keeps_earlier_publications() {
    let model = FakeModel {
        fail_shape: Some("review"),
        ..FakeModel::default()
    };
    let harness = Harness::new(FakeHost::new("main", ""), model);
    let workflow = build_pipeline(&config(), harness.services()).unwrap();

    let failure = workflow.run(WorkflowState::new()).await.unwrap_err();

    assert_eq!(failure.stage, "generate-review");
    assert!(matches!(failure.error, QuillError::Llm(_)));
    assert_eq!(failure.trace.status, RunStatus::Failed);
    assert_eq!(
        failure.trace.stages().last().map(|s| s.status),
        Some(StageStatus::Failed)
    );
    assert!(!failure.trace.stage_names().contains(&"publish-review"));
    // the summary published before the failure stays
    assert_eq!(harness.host.writes(), vec!["update-description"]);
    assert!(harness.host.comments().is_empty());
}

#[tokio::test]
async fn rerun_is_idempotent() {
    let harness = Harness::new(FakeHost::new("main", "Context from the author"), FakeModel::default());

    for _ in 0..2 {
        let workflow = build_pipeline(&config(), harness.services()).unwrap();
        workflow.run(WorkflowState::new()).await.unwrap();
    }
    let workflow = build_pipeline(&config(), harness.services()).unwrap();
    let report = workflow.run(WorkflowState::new()).await.unwrap();

    assert_eq!(
        report.state.get(&DESCRIPTION_PUBLICATION),
        Some(&Publication::Unchanged)
    );
    assert_eq!(
        report.state.get(&REVIEW_PUBLICATION),
        Some(&Publication::Unchanged)
    );
    assert_eq!(
        harness.host.writes(),
        vec!["update-description", "create-comment 100"]
    );
    assert_eq!(harness.host.comments().len(), 1);
    assert_eq!(
        harness
            .host
            .description()
            .matches(SUMMARY_BEGIN)
            .count(),
        1
    );
}

#[tokio::test]
async fn changed_review_edits_existing_comment() {
    let harness = Harness::new(FakeHost::new("main", ""), FakeModel::default());
    let workflow = build_pipeline(&config(), harness.services()).unwrap();
    workflow.run(WorkflowState::new()).await.unwrap();

    *harness.model.review_overview.lock().unwrap() = "Second look.".into();
    let workflow = build_pipeline(&config(), harness.services()).unwrap();
    let report = workflow.run(WorkflowState::new()).await.unwrap();

    assert_eq!(
        report.state.get(&REVIEW_PUBLICATION),
        Some(&Publication::Updated {
            comment_id: Some(100)
        })
    );
    let comments = harness.host.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].body.contains("Second look."));
}
