//! Prompt construction and structured-output validation.

use quill_core::{ChangeMetadata, GeneratedReview, GeneratedSummary, QuillError, TicketContext};
use quill_difflens::ProcessedDiff;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::publish::user_content;
use crate::services::{GenerateRequest, ModelService};

const SUMMARY_SYSTEM_PROMPT: &str = "\
You are Quill, a senior engineer writing the description of a pull request \
for reviewers who have not seen the code yet.

Rules:
- Describe what the change does and why, based only on the diff and context given
- Classify the change as exactly one of: feature, bugfix, refactor, docs, test, chore
- Keep the title under 80 characters
- Write 2 to 6 short highlight bullets about the most important changes
- Do not invent behavior that is not visible in the diff";

const REVIEW_SYSTEM_PROMPT: &str = "\
You are Quill, an expert code reviewer. Your job is to find genuine bugs, \
security issues, and significant problems in code changes.

Rules:
- Only report issues you are CERTAIN about
- Reference the file path and, where possible, the line number in the new file
- Do not comment on style, formatting, or naming unless it creates a bug
- Focus on: bugs, security vulnerabilities, logic errors, race conditions, resource leaks
- If you find nothing worth reporting, return an empty findings list";

/// A JSON shape the model must return.
pub trait OutputShape: DeserializeOwned {
    /// Shape name, for logs and errors.
    const NAME: &'static str;

    /// Task instructions for the system prompt.
    const INSTRUCTIONS: &'static str;

    /// JSON schema sent along with the request.
    fn schema() -> Value;

    /// Checks beyond what deserialization enforces.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Validation`] describing the first problem.
    fn validate(&self) -> Result<(), QuillError>;
}

impl OutputShape for GeneratedSummary {
    const NAME: &'static str = "summary";
    const INSTRUCTIONS: &'static str = SUMMARY_SYSTEM_PROMPT;

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["kind", "title", "overview", "highlights"],
            "properties": {
                "kind": {
                    "type": "string",
                    "enum": ["feature", "bugfix", "refactor", "docs", "test", "chore"]
                },
                "title": { "type": "string" },
                "overview": { "type": "string" },
                "highlights": { "type": "array", "items": { "type": "string" }, "minItems": 1 }
            }
        })
    }

    fn validate(&self) -> Result<(), QuillError> {
        if self.title.trim().is_empty() {
            return Err(QuillError::Validation("summary title is empty".into()));
        }
        if self.overview.trim().is_empty() {
            return Err(QuillError::Validation("summary overview is empty".into()));
        }
        if !self.highlights.iter().any(|h| !h.trim().is_empty()) {
            return Err(QuillError::Validation("summary has no highlights".into()));
        }
        Ok(())
    }
}

impl OutputShape for GeneratedReview {
    const NAME: &'static str = "review";
    const INSTRUCTIONS: &'static str = REVIEW_SYSTEM_PROMPT;

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["overview", "findings"],
            "properties": {
                "overview": { "type": "string" },
                "findings": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["file", "severity", "message"],
                        "properties": {
                            "file": { "type": "string" },
                            "line": { "type": "integer", "minimum": 1 },
                            "severity": {
                                "type": "string",
                                "enum": ["bug", "warning", "suggestion", "info"]
                            },
                            "message": { "type": "string" },
                            "suggestion": { "type": "string" }
                        }
                    }
                }
            }
        })
    }

    fn validate(&self) -> Result<(), QuillError> {
        for (i, finding) in self.findings.iter().enumerate() {
            if finding.file.trim().is_empty() {
                return Err(QuillError::Validation(format!("finding {i} has no file")));
            }
            if finding.message.trim().is_empty() {
                return Err(QuillError::Validation(format!("finding {i} has no message")));
            }
            if finding.line == Some(0) {
                return Err(QuillError::Validation(format!(
                    "finding {i} in {} has line 0",
                    finding.file
                )));
            }
        }
        Ok(())
    }
}

/// Inputs shared by both prompts.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    /// Change metadata.
    pub metadata: &'a ChangeMetadata,
    /// Linked ticket, possibly empty.
    pub ticket: &'a TicketContext,
    /// Filtered and truncated diff.
    pub diff: &'a ProcessedDiff,
}

/// System prompt for shape `T`, including the schema to follow.
///
/// # Examples
///
/// ```
/// use quill_core::GeneratedReview;
/// use quill_review::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt::<GeneratedReview>();
/// assert!(prompt.contains("CERTAIN"));
/// assert!(prompt.contains("\"findings\""));
/// ```
pub fn build_system_prompt<T: OutputShape>() -> String {
    let schema = serde_json::to_string_pretty(&T::schema()).unwrap_or_default();
    format!(
        "{}\n\nRespond with a single JSON object matching this schema:\n{schema}",
        T::INSTRUCTIONS
    )
}

/// User prompt carrying the change context and diff.
///
/// # Examples
///
/// ```
/// use quill_core::{ChangeMetadata, TicketContext};
/// use quill_difflens::{filter::IgnoreFilter, process};
/// use quill_review::prompt::{build_user_prompt, PromptContext};
///
/// let metadata = ChangeMetadata { title: "Add cache".into(), ..Default::default() };
/// let diff = process("diff --git a/a.rs b/a.rs\n+x\n", &IgnoreFilter::default(), 1000);
/// let prompt = build_user_prompt(PromptContext {
///     metadata: &metadata,
///     ticket: &TicketContext::default(),
///     diff: &diff,
/// });
/// assert!(prompt.contains("Add cache"));
/// assert!(prompt.contains("+x"));
/// ```
pub fn build_user_prompt(ctx: PromptContext<'_>) -> String {
    let PromptContext {
        metadata,
        ticket,
        diff,
    } = ctx;

    let mut prompt = String::from("## Pull request\n\n");
    prompt.push_str(&format!("Title: {}\n", metadata.title));
    if !metadata.branch.is_empty() {
        prompt.push_str(&format!("Branch: {}\n", metadata.branch));
    }
    // earlier generated blocks would only echo back into the new summary
    let description = user_content(&metadata.description).trim();
    if !description.is_empty() {
        prompt.push_str(&format!("\nAuthor's description:\n{description}\n"));
    }
    if !metadata.commits.trim().is_empty() {
        prompt.push_str(&format!("\nCommits:\n{}\n", metadata.commits.trim_end()));
    }

    if !ticket.is_empty() {
        prompt.push_str("\n## Linked ticket\n\n");
        prompt.push_str(&format!("Summary: {}\n", ticket.summary.trim()));
        if !ticket.description.trim().is_empty() {
            prompt.push_str(&format!("\n{}\n", ticket.description.trim()));
        }
    }

    prompt.push_str("\n## Changes\n\n");
    if diff.was_truncated {
        prompt.push_str(&format!(
            "Note: the diff was truncated to fit the size limit ({} of {} characters shown, {} file section(s) omitted). Do not draw conclusions about files you cannot see.\n\n",
            diff.report.output_chars, diff.report.filtered_chars, diff.report.omitted_sections
        ));
    }
    if !diff.report.ignored.is_empty() {
        let paths: Vec<&str> = diff.report.ignored.iter().map(|s| s.path.as_str()).collect();
        prompt.push_str(&format!(
            "Excluded generated or lock files: {}\n\n",
            paths.join(", ")
        ));
    }
    prompt.push_str(&format!("```diff\n{}\n```\n", diff.text.trim_end()));
    prompt
}

/// Request for shape `T` over `ctx`.
pub fn build_request<T: OutputShape>(ctx: PromptContext<'_>, temperature: f32) -> GenerateRequest {
    GenerateRequest {
        system: build_system_prompt::<T>(),
        prompt: build_user_prompt(ctx),
        shape: T::NAME,
        schema: T::schema(),
        temperature,
    }
}

/// Decode and validate a model response as `T`.
///
/// # Errors
///
/// Returns [`QuillError::Validation`] if the value does not deserialize or
/// fails [`OutputShape::validate`].
///
/// # Examples
///
/// ```
/// use quill_core::GeneratedReview;
/// use quill_review::prompt::parse_output;
///
/// let review: GeneratedReview = parse_output(serde_json::json!({
///     "overview": "fine",
///     "findings": []
/// })).unwrap();
/// assert!(review.findings.is_empty());
///
/// assert!(parse_output::<GeneratedReview>(serde_json::json!({"oops": 1})).is_err());
/// ```
pub fn parse_output<T: OutputShape>(value: Value) -> Result<T, QuillError> {
    let parsed: T = serde_json::from_value(value).map_err(|e| {
        QuillError::Validation(format!("model output is not a valid {}: {e}", T::NAME))
    })?;
    parsed.validate()?;
    Ok(parsed)
}

/// Ask `model` for shape `T` and validate the answer.
///
/// # Errors
///
/// Propagates model errors and validation failures.
pub async fn generate_structured<T: OutputShape>(
    model: &dyn ModelService,
    ctx: PromptContext<'_>,
    temperature: f32,
) -> Result<T, QuillError> {
    let request = build_request::<T>(ctx, temperature);
    tracing::debug!(
        shape = T::NAME,
        model = model.model(),
        prompt_chars = request.prompt.chars().count(),
        "requesting structured output"
    );
    let value = model.generate(request).await?;
    parse_output(value)
}

/// Strip a surrounding markdown code fence, if any.
pub(crate) fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}
