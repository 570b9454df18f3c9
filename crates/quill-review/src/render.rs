//! Markdown rendering of generated artifacts.

use quill_core::{Finding, GeneratedReview, GeneratedSummary, Severity};

use crate::publish::REVIEW_MARKER;

/// Emoji and label for a severity.
///
/// # Examples
///
/// ```
/// use quill_core::Severity;
/// use quill_review::render::severity_badge;
///
/// assert_eq!(severity_badge(Severity::Warning), "\u{26a0}\u{fe0f} Warning");
/// ```
pub fn severity_badge(severity: Severity) -> &'static str {
    match severity {
        Severity::Bug => "\u{1f41b} Bug",
        Severity::Warning => "\u{26a0}\u{fe0f} Warning",
        Severity::Suggestion => "\u{1f4a1} Suggestion",
        Severity::Info => "\u{2139}\u{fe0f} Info",
    }
}

/// Render a summary as the body of the description block.
///
/// The result starts and ends with a newline so the sentinels sit on
/// their own lines.
///
/// # Examples
///
/// ```
/// use quill_core::{ChangeKind, GeneratedSummary};
/// use quill_review::render::render_summary;
///
/// let md = render_summary(&GeneratedSummary {
///     kind: ChangeKind::Bugfix,
///     title: "Fix token refresh".into(),
///     overview: "Refresh tokens no longer expire early.".into(),
///     highlights: vec!["Compare expiry in UTC".into()],
/// });
/// assert!(md.contains("## Fix token refresh"));
/// assert!(md.contains("- Compare expiry in UTC"));
/// ```
pub fn render_summary(summary: &GeneratedSummary) -> String {
    let mut out = String::from("\n");
    out.push_str(&format!("## {}\n\n", summary.title.trim()));
    out.push_str(&format!("**Type:** {}\n\n", summary.kind));
    out.push_str(summary.overview.trim());
    out.push_str("\n\n### Highlights\n\n");
    for highlight in &summary.highlights {
        out.push_str(&format!("- {}\n", highlight.trim()));
    }
    out
}

/// Render a review as a standalone comment, ending with [`REVIEW_MARKER`].
///
/// Findings are grouped most severe first, keeping model order within a
/// severity.
///
/// # Examples
///
/// ```
/// use quill_core::GeneratedReview;
/// use quill_review::publish::REVIEW_MARKER;
/// use quill_review::render::render_review;
///
/// let md = render_review(&GeneratedReview { overview: "LGTM".into(), findings: vec![] });
/// assert!(md.contains("No issues found."));
/// assert!(md.ends_with(REVIEW_MARKER));
/// ```
pub fn render_review(review: &GeneratedReview) -> String {
    let mut out = String::from("## Automated review\n\n");
    out.push_str(review.overview.trim());
    out.push_str("\n\n");

    if review.findings.is_empty() {
        out.push_str("No issues found.\n\n");
    } else {
        let mut findings: Vec<&Finding> = review.findings.iter().collect();
        findings.sort_by_key(|f| f.severity.rank());

        out.push_str(&format!("### Findings ({})\n\n", findings.len()));
        for finding in findings {
            out.push_str(&render_finding(finding));
            out.push('\n');
        }
    }

    out.push_str(REVIEW_MARKER);
    out
}

fn render_finding(finding: &Finding) -> String {
    let location = match finding.line {
        Some(line) => format!("{}:{line}", finding.file),
        None => finding.file.clone(),
    };
    let mut body = format!(
        "**{}** `{location}`\n\n{}\n",
        severity_badge(finding.severity),
        finding.message.trim()
    );
    if let Some(s) = &finding.suggestion {
        body.push_str(&format!("\n> **Suggestion:** {}\n", s.trim()));
    }
    body
}
