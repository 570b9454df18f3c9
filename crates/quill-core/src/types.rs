use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifying facts about the change under review.
///
/// Fetched once at the start of a run and read-only afterwards.
///
/// # Examples
///
/// ```
/// use quill_core::ChangeMetadata;
///
/// let meta = ChangeMetadata {
///     branch: "feature/PAY-42-refunds".into(),
///     title: "Add refunds".into(),
///     description: String::new(),
///     commits: "- 1a2b3c4 add refund endpoint".into(),
/// };
/// assert!(meta.description.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMetadata {
    /// Source (head) branch name.
    pub branch: String,
    /// Pull request title.
    pub title: String,
    /// Current pull request description, as stored on the host.
    pub description: String,
    /// Condensed commit log, one line per commit.
    pub commits: String,
}

/// Context pulled from an external ticket tracker.
///
/// The default value is the empty context used when no ticket applies.
///
/// # Examples
///
/// ```
/// use quill_core::TicketContext;
///
/// assert!(TicketContext::default().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketContext {
    /// Ticket summary line.
    pub summary: String,
    /// Ticket description body.
    pub description: String,
}

impl TicketContext {
    /// Returns `true` if neither field carries any text.
    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty() && self.description.trim().is_empty()
    }
}

/// Classification of a change, as chosen by the model.
///
/// # Examples
///
/// ```
/// use quill_core::ChangeKind;
///
/// let kind: ChangeKind = serde_json::from_str("\"bugfix\"").unwrap();
/// assert_eq!(kind, ChangeKind::Bugfix);
/// assert_eq!(kind.to_string(), "bugfix");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// New user-facing capability.
    Feature,
    /// Defect fix.
    Bugfix,
    /// Behavior-preserving restructuring.
    Refactor,
    /// Documentation only.
    Docs,
    /// Test-only change.
    Test,
    /// Build, CI, dependency or housekeeping change.
    Chore,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Feature => write!(f, "feature"),
            ChangeKind::Bugfix => write!(f, "bugfix"),
            ChangeKind::Refactor => write!(f, "refactor"),
            ChangeKind::Docs => write!(f, "docs"),
            ChangeKind::Test => write!(f, "test"),
            ChangeKind::Chore => write!(f, "chore"),
        }
    }
}

/// Structured change summary produced by the model.
///
/// # Examples
///
/// ```
/// use quill_core::{ChangeKind, GeneratedSummary};
///
/// let summary = GeneratedSummary {
///     kind: ChangeKind::Feature,
///     title: "Refund support".into(),
///     overview: "Adds a refund endpoint.".into(),
///     highlights: vec!["New POST /refunds route".into()],
/// };
/// assert_eq!(summary.highlights.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSummary {
    /// Classification of the change.
    pub kind: ChangeKind,
    /// One-line title.
    pub title: String,
    /// Short prose overview.
    pub overview: String,
    /// Bullet points describing the notable changes.
    pub highlights: Vec<String>,
}

/// Structured review produced by the model.
///
/// # Examples
///
/// ```
/// use quill_core::GeneratedReview;
///
/// let review = GeneratedReview {
///     overview: "Looks good.".into(),
///     findings: vec![],
/// };
/// assert!(review.findings.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedReview {
    /// Overall assessment.
    pub overview: String,
    /// Individual findings, in model order.
    #[serde(default)]
    pub findings: Vec<Finding>,
}

/// A single review finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Path of the file the finding refers to.
    pub file: String,
    /// Line in the new version of the file, if the finding is line-specific.
    #[serde(default)]
    pub line: Option<u32>,
    /// Severity of the finding.
    pub severity: Severity,
    /// Explanation of the issue.
    pub message: String,
    /// Optional fix suggestion.
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Issue severity level for review findings.
///
/// # Examples
///
/// ```
/// use quill_core::Severity;
///
/// let s: Severity = serde_json::from_str("\"bug\"").unwrap();
/// assert_eq!(s, Severity::Bug);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A likely defect that should be fixed.
    Bug,
    /// A potential issue worth investigating.
    Warning,
    /// An optional improvement.
    Suggestion,
    /// Informational observation.
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Bug => write!(f, "bug"),
            Severity::Warning => write!(f, "warning"),
            Severity::Suggestion => write!(f, "suggestion"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bug" => Ok(Severity::Bug),
            "warning" => Ok(Severity::Warning),
            "suggestion" => Ok(Severity::Suggestion),
            "info" => Ok(Severity::Info),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

impl Severity {
    /// Sort rank, most severe first.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::Severity;
    ///
    /// assert!(Severity::Bug.rank() < Severity::Info.rank());
    /// ```
    pub fn rank(self) -> u8 {
        match self {
            Severity::Bug => 0,
            Severity::Warning => 1,
            Severity::Suggestion => 2,
            Severity::Info => 3,
        }
    }
}

/// A comment on the change's discussion stream, as listed by the host.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use quill_core::Comment;
///
/// let comment = Comment {
///     id: 7,
///     author: "quill-bot".into(),
///     body: "hello".into(),
///     created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
/// };
/// assert_eq!(comment.id, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Host-assigned comment identifier.
    pub id: u64,
    /// Login of the comment author.
    pub author: String,
    /// Markdown body.
    pub body: String,
    /// Creation time reported by the host.
    pub created_at: DateTime<Utc>,
}

/// A pipeline action that can be switched on or off in configuration.
///
/// # Examples
///
/// ```
/// use quill_core::Action;
///
/// let action: Action = "review".parse().unwrap();
/// assert_eq!(action, Action::Review);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Generate a summary and publish it into the description.
    Summary,
    /// Generate a review and publish it as a comment.
    Review,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Summary => write!(f, "summary"),
            Action::Review => write!(f, "review"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" | "describe" => Ok(Action::Summary),
            "review" => Ok(Action::Review),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_from_str_roundtrip() {
        for s in [
            Severity::Bug,
            Severity::Warning,
            Severity::Suggestion,
            Severity::Info,
        ] {
            let parsed: Severity = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn action_accepts_describe_alias() {
        assert_eq!("describe".parse::<Action>().unwrap(), Action::Summary);
        assert_eq!("REVIEW".parse::<Action>().unwrap(), Action::Review);
        assert!("lint".parse::<Action>().is_err());
    }

    #[test]
    fn ticket_context_whitespace_is_empty() {
        let ctx = TicketContext {
            summary: "  ".into(),
            description: "\n".into(),
        };
        assert!(ctx.is_empty());
    }

    #[test]
    fn review_deserializes_without_findings() {
        let review: GeneratedReview = serde_json::from_str(r#"{"overview":"ok"}"#).unwrap();
        assert!(review.findings.is_empty());
    }

    #[test]
    fn finding_uses_camel_case_and_optional_fields() {
        let json = r#"{"file":"src/a.rs","severity":"warning","message":"m"}"#;
        let finding: Finding = serde_json::from_str(json).unwrap();
        assert_eq!(finding.line, None);
        assert_eq!(finding.suggestion, None);
        assert_eq!(finding.severity, Severity::Warning);
    }
}
