//! Size-bounded truncation on section and line boundaries.

use serde::Serialize;

use crate::parser::DiffDocument;

/// What [`truncate`] removed.
///
/// # Examples
///
/// ```
/// use quill_difflens::parser::DiffDocument;
/// use quill_difflens::truncate::truncate;
///
/// let mut doc = DiffDocument::parse("diff --git a/a b/a\n+1\ndiff --git a/b b/b\n+2\n");
/// let outcome = truncate(&mut doc, 24);
/// assert_eq!(outcome.omitted_sections, 1);
/// assert_eq!(doc.paths(), vec!["a"]);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TruncationOutcome {
    /// Whole sections dropped from the tail.
    pub omitted_sections: usize,
    /// Whether the first section was itself cut on a line boundary.
    pub partial_section: bool,
}

impl TruncationOutcome {
    /// Returns `true` if anything was removed.
    pub fn truncated(&self) -> bool {
        self.omitted_sections > 0 || self.partial_section
    }
}

/// Shrink `doc` in place so its text is at most `max_chars` characters.
///
/// Whole sections are kept in order while the running total fits; the first
/// section that does not fit ends the document. Sections are never split,
/// except when the very first one alone exceeds the budget: it is then cut to
/// its longest prefix of whole lines that fits, which may be empty.
pub fn truncate(doc: &mut DiffDocument, max_chars: usize) -> TruncationOutcome {
    if doc.char_len() <= max_chars {
        return TruncationOutcome::default();
    }

    let mut used = 0;
    let mut kept = 0;
    for section in &doc.sections {
        let len = section.char_len();
        if used + len > max_chars {
            break;
        }
        used += len;
        kept += 1;
    }

    if kept > 0 {
        let omitted = doc.sections.len() - kept;
        doc.sections.truncate(kept);
        return TruncationOutcome {
            omitted_sections: omitted,
            partial_section: false,
        };
    }

    let omitted = doc.sections.len() - 1;
    doc.sections.truncate(1);
    let first_cut = doc.sections[0].truncate_to_lines(max_chars);
    if doc.sections[0].char_len() == 0 {
        doc.sections.clear();
    }
    TruncationOutcome {
        omitted_sections: omitted,
        partial_section: first_cut,
    }
}
