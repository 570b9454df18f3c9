//! Diff filtering and size-bounded truncation.
//!
//! Splits a unified diff into per-file sections, drops sections whose path
//! matches an ignore pattern, and trims the result to a character budget on
//! section (or, as a last resort, line) boundaries so the model never sees a
//! half-written line.

pub mod filter;
pub mod parser;
pub mod truncate;

use serde::Serialize;

use crate::filter::{IgnoreFilter, SkippedSection};
use crate::parser::DiffDocument;

/// Output of [`process`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDiff {
    /// Filtered, truncated diff text.
    pub text: String,
    /// `true` iff `text` is shorter than the filtered input.
    pub was_truncated: bool,
    /// Bookkeeping for logs and prompts.
    pub report: ProcessReport,
}

impl ProcessedDiff {
    /// Returns `true` if nothing is left to show the model.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// What happened to the diff on its way through [`process`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    /// Sections in the raw input.
    pub total_sections: usize,
    /// Sections removed by ignore patterns.
    pub ignored: Vec<SkippedSection>,
    /// Sections dropped by truncation.
    pub omitted_sections: usize,
    /// Whether a section was cut on a line boundary.
    pub partial_section: bool,
    /// Characters in the raw input.
    pub input_chars: usize,
    /// Characters after filtering.
    pub filtered_chars: usize,
    /// Characters in the final text.
    pub output_chars: usize,
}

/// Filter and truncate a raw unified diff.
///
/// Pure and deterministic. Pass `usize::MAX` as `max_chars` for no budget.
///
/// # Examples
///
/// ```
/// use quill_difflens::{filter::IgnoreFilter, process};
///
/// let raw = "diff --git a/a.ts b/a.ts\n+x\ndiff --git a/lock.json b/lock.json\n+y\n";
/// let filter = IgnoreFilter::new(&["*.json"]).unwrap();
/// let out = process(raw, &filter, 1000);
/// assert_eq!(out.text, "diff --git a/a.ts b/a.ts\n+x\n");
/// assert!(!out.was_truncated);
/// ```
pub fn process(raw: &str, filter: &IgnoreFilter, max_chars: usize) -> ProcessedDiff {
    let mut doc = DiffDocument::parse(raw);
    let total_sections = doc.sections.len();
    let input_chars = doc.char_len();

    let ignored = filter.apply(&mut doc);
    let filtered_chars = doc.char_len();

    let outcome = truncate::truncate(&mut doc, max_chars);
    let text = doc.to_text();
    let output_chars = text.chars().count();

    if !ignored.is_empty() {
        tracing::debug!(count = ignored.len(), "ignored diff sections");
    }
    if outcome.truncated() {
        tracing::info!(
            filtered_chars,
            output_chars,
            omitted = outcome.omitted_sections,
            partial = outcome.partial_section,
            "diff truncated to fit budget"
        );
    }

    ProcessedDiff {
        text,
        was_truncated: output_chars < filtered_chars,
        report: ProcessReport {
            total_sections,
            ignored,
            omitted_sections: outcome.omitted_sections,
            partial_section: outcome.partial_section,
            input_chars,
            filtered_chars,
            output_chars,
        },
    }
}
