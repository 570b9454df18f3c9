//! Path-based exclusion of diff sections.
//!
//! Drops lock files, generated code, and anything else matching the
//! configured glob patterns before the diff reaches the LLM, saving tokens
//! and reducing noise.

use glob::{MatchOptions, Pattern};
use quill_core::{DiffConfig, QuillError};
use serde::Serialize;

use crate::parser::{DiffDocument, FileSection};

/// Shell-glob matching on the full relative path: case-sensitive, `*` may
/// cross `/`, and dot-files are not special.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled set of ignore patterns.
///
/// # Examples
///
/// ```
/// use quill_difflens::filter::IgnoreFilter;
///
/// let filter = IgnoreFilter::new(&["*.json", ".github/**"]).unwrap();
/// assert!(filter.is_ignored("package-lock.json"));
/// assert!(filter.is_ignored(".github/workflows/ci.yml"));
/// assert!(!filter.is_ignored("src/main.rs"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    patterns: Vec<Pattern>,
}

impl IgnoreFilter {
    /// Compile a list of glob patterns.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] naming the first invalid pattern.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, QuillError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(p).map_err(|e| {
                    QuillError::Config(format!("invalid ignore pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Create a filter from diff configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_core::DiffConfig;
    /// use quill_difflens::filter::IgnoreFilter;
    ///
    /// let filter = IgnoreFilter::from_config(&DiffConfig::default()).unwrap();
    /// assert!(filter.is_ignored("Cargo.lock"));
    /// ```
    pub fn from_config(config: &DiffConfig) -> Result<Self, QuillError> {
        Self::new(&config.ignore_patterns)
    }

    /// Returns `true` if the filter has no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The first pattern matching `path`, if any.
    pub fn matching_pattern(&self, path: &str) -> Option<&Pattern> {
        self.patterns
            .iter()
            .find(|p| p.matches_with(path, MATCH_OPTIONS))
    }

    /// Check if a single path should be dropped.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.matching_pattern(path).is_some()
    }

    /// Remove ignored sections from `doc` in place, preserving order.
    ///
    /// Sections with an unknown path are always kept.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_difflens::filter::IgnoreFilter;
    /// use quill_difflens::parser::DiffDocument;
    ///
    /// let mut doc = DiffDocument::parse(
    ///     "diff --git a/a.ts b/a.ts\n+x\ndiff --git a/lock.json b/lock.json\n+y\n",
    /// );
    /// let filter = IgnoreFilter::new(&["*.json"]).unwrap();
    /// let skipped = filter.apply(&mut doc);
    /// assert_eq!(doc.paths(), vec!["a.ts"]);
    /// assert_eq!(skipped[0].path, "lock.json");
    /// ```
    pub fn apply(&self, doc: &mut DiffDocument) -> Vec<SkippedSection> {
        if self.patterns.is_empty() {
            return Vec::new();
        }

        let mut skipped = Vec::new();
        doc.sections.retain(|section| match self.skip_reason(section) {
            Some(entry) => {
                skipped.push(entry);
                false
            }
            None => true,
        });
        skipped
    }

    fn skip_reason(&self, section: &FileSection) -> Option<SkippedSection> {
        let path = section.path.as_deref()?;
        let pattern = self.matching_pattern(path)?;
        Some(SkippedSection {
            path: path.to_string(),
            pattern: pattern.as_str().to_string(),
        })
    }
}

/// A section removed by the filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSection {
    /// Destination path of the dropped section.
    pub path: String,
    /// Pattern that matched it.
    pub pattern: String,
}
