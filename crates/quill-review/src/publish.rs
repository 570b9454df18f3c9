//! Idempotent publication of generated content.
//!
//! Two targets are supported. The change description holds a single block
//! fenced by [`SUMMARY_BEGIN`] / [`SUMMARY_END`]; text outside the block
//! belongs to the user and survives every rewrite. The comment stream holds
//! at most one live review comment, recognized by [`REVIEW_MARKER`] and the
//! agent's identity, which is edited in place on later runs.
//!
//! The sentinel strings are persisted in third-party systems and must not
//! change between releases.

use std::fmt;

use quill_core::{Comment, QuillError};
use serde::Serialize;

use crate::services::ChangeHost;

/// Opens the generated block in the change description.
pub const SUMMARY_BEGIN: &str = "<!-- BEGIN-SUMMARY -->";
/// Closes the generated block in the change description.
pub const SUMMARY_END: &str = "<!-- END-SUMMARY -->";
/// Final line of every review comment written by quill.
pub const REVIEW_MARKER: &str = "<!-- REVIEW-COMMENT -->";

const DIVIDER: &str = "\n\n---\n\n";

/// Where an artifact is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Target {
    /// The change's description field.
    Description,
    /// The change's discussion stream.
    CommentStream,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Description => write!(f, "description"),
            Target::CommentStream => write!(f, "comment stream"),
        }
    }
}

/// What the reconciler did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum Publication {
    /// A new comment was posted.
    Created {
        /// Id of the new comment.
        comment_id: u64,
    },
    /// Existing content was rewritten.
    Updated {
        /// Id of the edited comment; `None` for the description.
        comment_id: Option<u64>,
    },
    /// The target already held exactly this content.
    Unchanged,
    /// Nothing was generated, so nothing was written.
    Skipped {
        /// Why.
        reason: String,
    },
}

impl Publication {
    /// Returns `true` if the host was written to.
    pub fn wrote(&self) -> bool {
        matches!(self, Publication::Created { .. } | Publication::Updated { .. })
    }
}

impl fmt::Display for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Publication::Created { comment_id } => write!(f, "created comment {comment_id}"),
            Publication::Updated {
                comment_id: Some(id),
            } => write!(f, "updated comment {id}"),
            Publication::Updated { comment_id: None } => write!(f, "updated"),
            Publication::Unchanged => write!(f, "unchanged"),
            Publication::Skipped { reason } => write!(f, "skipped ({reason})"),
        }
    }
}

/// Merge a freshly rendered block into the current description text.
///
/// The user-authored part is everything before the existing block (or the
/// whole text when there is no well-formed block), with trailing whitespace
/// and the divider written by an earlier merge removed. Anything after the
/// existing block's end sentinel is discarded.
///
/// # Examples
///
/// ```
/// use quill_review::publish::{merge_document, SUMMARY_BEGIN, SUMMARY_END};
///
/// let current = format!("User note\n{SUMMARY_BEGIN}old\n{SUMMARY_END}");
/// let merged = merge_document(&current, "X");
/// assert_eq!(merged, format!("User note\n\n---\n\n{SUMMARY_BEGIN}X{SUMMARY_END}"));
///
/// // merging again is a no-op
/// assert_eq!(merge_document(&merged, "X"), merged);
/// ```
pub fn merge_document(current: &str, rendered: &str) -> String {
    let user = user_content(current);
    let mut merged = String::with_capacity(
        user.len() + DIVIDER.len() + SUMMARY_BEGIN.len() + rendered.len() + SUMMARY_END.len(),
    );
    if !user.is_empty() {
        merged.push_str(user);
        merged.push_str(DIVIDER);
    }
    merged.push_str(SUMMARY_BEGIN);
    merged.push_str(rendered);
    merged.push_str(SUMMARY_END);
    merged
}

/// The user-authored part of a description.
pub(crate) fn user_content(current: &str) -> &str {
    let Some(begin) = current.find(SUMMARY_BEGIN) else {
        return current.trim_end();
    };
    let after_begin = &current[begin + SUMMARY_BEGIN.len()..];
    if !after_begin.contains(SUMMARY_END) {
        tracing::warn!("summary begin sentinel without end, keeping description as user text");
        return current.trim_end();
    }

    let before = current[..begin].trim_end();
    before
        .strip_suffix(DIVIDER.trim_end())
        .map_or(before, str::trim_end)
}

/// The live comment among `comments`: authored by `agent`, containing
/// `marker`, newest by creation time (ties go to the highest id).
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use quill_core::Comment;
/// use quill_review::publish::{select_live_comment, REVIEW_MARKER};
///
/// let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
/// let comments = vec![
///     Comment { id: 1, author: "bot".into(), body: format!("old\n{REVIEW_MARKER}"), created_at: at },
///     Comment { id: 2, author: "alice".into(), body: format!("quoted\n{REVIEW_MARKER}"), created_at: at },
/// ];
/// let live = select_live_comment(&comments, "bot", REVIEW_MARKER).unwrap();
/// assert_eq!(live.id, 1);
/// ```
pub fn select_live_comment<'a>(
    comments: &'a [Comment],
    agent: &str,
    marker: &str,
) -> Option<&'a Comment> {
    comments
        .iter()
        .filter(|c| c.author == agent && c.body.contains(marker))
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
}

/// Publish `rendered` to `target`.
///
/// # Errors
///
/// Propagates host errors. Returns [`QuillError::Validation`] if a comment
/// body lacks [`REVIEW_MARKER`], since it could never be found again.
pub async fn publish(
    host: &dyn ChangeHost,
    target: Target,
    rendered: &str,
) -> Result<Publication, QuillError> {
    let publication = match target {
        Target::Description => publish_description(host, rendered).await?,
        Target::CommentStream => publish_comment(host, REVIEW_MARKER, rendered).await?,
    };
    tracing::info!(destination = %target, %publication, "publication reconciled");
    Ok(publication)
}

/// Write `rendered` into the description's generated block.
///
/// Reads the description fresh from the host so that user edits made
/// since the run started are kept.
///
/// # Errors
///
/// Propagates host errors.
pub async fn publish_description(
    host: &dyn ChangeHost,
    rendered: &str,
) -> Result<Publication, QuillError> {
    let current = host.fetch_description().await?;
    let merged = merge_document(&current, rendered);
    if merged == current {
        return Ok(Publication::Unchanged);
    }
    host.update_description(&merged).await?;
    Ok(Publication::Updated { comment_id: None })
}

/// Create or edit the agent's single comment carrying `marker`.
///
/// Older marked comments are left as they are.
///
/// # Errors
///
/// Propagates host errors, and rejects a body without `marker`.
pub async fn publish_comment(
    host: &dyn ChangeHost,
    marker: &str,
    body: &str,
) -> Result<Publication, QuillError> {
    if !body.contains(marker) {
        return Err(QuillError::Validation(format!(
            "comment body does not contain marker {marker}"
        )));
    }

    let agent = host.current_user().await?;
    let comments = host.list_comments().await?;
    let live = select_live_comment(&comments, &agent, marker);
    tracing::debug!(
        agent = %agent,
        listed = comments.len(),
        live = ?live.map(|c| c.id),
        "looked up existing comment"
    );

    match live {
        Some(existing) if existing.body == body => Ok(Publication::Unchanged),
        Some(existing) => {
            host.edit_comment(existing.id, body).await?;
            Ok(Publication::Updated {
                comment_id: Some(existing.id),
            })
        }
        None => {
            let created = host.create_comment(body).await?;
            Ok(Publication::Created {
                comment_id: created.id,
            })
        }
    }
}
