use std::fmt;

/// One file's worth of a unified diff, kept as raw text.
///
/// `header` holds the `diff --git` line and the extended header lines
/// (`index`, `---`, `+++`, mode and rename lines); `hunks` holds everything
/// from the first `@@` line on. Concatenating the two reproduces the input
/// bytes exactly.
///
/// # Examples
///
/// ```
/// use quill_difflens::parser::DiffDocument;
///
/// let diff = "diff --git a/hello.rs b/hello.rs\n\
///             --- a/hello.rs\n\
///             +++ b/hello.rs\n\
///             @@ -1,3 +1,4 @@\n\
///              fn main() {\n\
///             +    println!(\"hello\");\n\
///              }\n";
/// let doc = DiffDocument::parse(diff);
/// assert_eq!(doc.sections.len(), 1);
/// assert_eq!(doc.sections[0].path.as_deref(), Some("hello.rs"));
/// assert_eq!(doc.to_text(), diff);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSection {
    /// Destination path, or `None` when the header could not be parsed
    /// (or for text preceding the first header).
    pub path: Option<String>,
    /// Header lines, newline terminators included.
    pub header: String,
    /// Hunk lines, newline terminators included.
    pub hunks: String,
}

impl FileSection {
    fn new(path: Option<String>) -> Self {
        Self {
            path,
            header: String::new(),
            hunks: String::new(),
        }
    }

    fn push_line(&mut self, line: &str) {
        if self.hunks.is_empty() && !line.starts_with("@@") {
            self.header.push_str(line);
        } else {
            self.hunks.push_str(line);
        }
    }

    /// Length in characters (Unicode scalar values).
    pub fn char_len(&self) -> usize {
        self.header.chars().count() + self.hunks.chars().count()
    }

    /// Header lines without their terminators.
    pub fn header_lines(&self) -> impl Iterator<Item = &str> {
        self.header.lines()
    }

    /// Hunk lines without their terminators.
    pub fn hunk_lines(&self) -> impl Iterator<Item = &str> {
        self.hunks.lines()
    }

    /// The section's full text.
    pub fn text(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + self.hunks.len());
        out.push_str(&self.header);
        out.push_str(&self.hunks);
        out
    }

    /// Cut the section down to its longest prefix of whole lines that fits
    /// in `max_chars`. Returns `true` if anything was removed.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_difflens::parser::DiffDocument;
    ///
    /// let mut doc = DiffDocument::parse("diff --git a/x b/x\n@@ -1 +1 @@\n+y\n");
    /// let section = &mut doc.sections[0];
    /// assert!(section.truncate_to_lines(25));
    /// assert_eq!(section.text(), "diff --git a/x b/x\n");
    /// ```
    pub fn truncate_to_lines(&mut self, max_chars: usize) -> bool {
        let full = self.text();
        let mut kept = Self::new(self.path.clone());
        let mut used = 0;
        for line in full.split_inclusive('\n') {
            let len = line.chars().count();
            if used + len > max_chars {
                break;
            }
            kept.push_line(line);
            used += len;
        }
        let changed = kept.header.len() + kept.hunks.len() < full.len();
        *self = kept;
        changed
    }
}

impl fmt::Display for FileSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header)?;
        f.write_str(&self.hunks)
    }
}

/// An ordered sequence of file sections parsed from a unified diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffDocument {
    /// Sections in input order.
    pub sections: Vec<FileSection>,
}

impl DiffDocument {
    /// Split a unified diff (as produced by `git diff`) into file sections.
    ///
    /// A section starts at every `diff --git` line. Text before the first
    /// header becomes a section with an unknown path. Headers whose paths
    /// cannot be parsed also yield unknown-path sections; nothing is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use quill_difflens::parser::DiffDocument;
    ///
    /// assert!(DiffDocument::parse("").is_empty());
    /// ```
    pub fn parse(input: &str) -> Self {
        let mut sections: Vec<FileSection> = Vec::new();
        let mut current: Option<FileSection> = None;

        for line in input.split_inclusive('\n') {
            if is_file_header(line) {
                if let Some(section) = current.take() {
                    sections.push(section);
                }
                let path = parse_header_path(line);
                if path.is_none() {
                    tracing::warn!(
                        header = line.trim_end(),
                        "unparseable diff header, keeping section with unknown path"
                    );
                }
                current = Some(FileSection::new(path));
            }
            current
                .get_or_insert_with(|| FileSection::new(None))
                .push_line(line);
        }

        if let Some(section) = current.take() {
            sections.push(section);
        }

        Self { sections }
    }

    /// Returns `true` if there are no sections.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Total length in characters.
    pub fn char_len(&self) -> usize {
        self.sections.iter().map(FileSection::char_len).sum()
    }

    /// Reassemble the document's text.
    pub fn to_text(&self) -> String {
        self.sections.iter().map(FileSection::text).collect()
    }

    /// Destination paths of all sections with a known path.
    pub fn paths(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter_map(|s| s.path.as_deref())
            .collect()
    }
}

impl fmt::Display for DiffDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for section in &self.sections {
            write!(f, "{section}")?;
        }
        Ok(())
    }
}

fn is_file_header(line: &str) -> bool {
    line.strip_prefix("diff --git")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Extract the destination path from a `diff --git a/<src> b/<dst>` line.
fn parse_header_path(line: &str) -> Option<String> {
    let rest = line
        .strip_prefix("diff --git ")?
        .trim_end_matches(['\n', '\r']);

    let dst = if let Some(quoted) = rest.strip_prefix('"') {
        let (_, after) = parse_quoted(quoted)?;
        let after = after.strip_prefix(' ')?;
        match after.strip_prefix('"') {
            Some(q) => parse_quoted(q)?.0,
            None => after.to_string(),
        }
    } else if rest.ends_with('"') {
        let start = rest.rfind(" \"")?;
        parse_quoted(&rest[start + 2..])?.0
    } else {
        split_symmetric(rest)
            .or_else(|| rest.rfind(" b/").map(|i| &rest[i + 1..]))?
            .to_string()
    };

    let path = dst.strip_prefix("b/")?;
    if path.is_empty() {
        return None;
    }
    Some(path.to_string())
}

/// `a/<p> b/<p>` with identical paths: the only split that is unambiguous
/// when the path itself contains spaces.
fn split_symmetric(rest: &str) -> Option<&str> {
    if rest.len() % 2 == 0 {
        return None;
    }
    let half = rest.len() / 2;
    let src = rest.get(..half)?;
    let dst = rest.get(half + 1..)?;
    if rest.as_bytes()[half] != b' ' {
        return None;
    }
    match (src.strip_prefix("a/"), dst.strip_prefix("b/")) {
        (Some(a), Some(b)) if a == b => Some(dst),
        _ => None,
    }
}

/// Parse a git C-style quoted path body (opening quote already consumed).
///
/// Returns the unescaped value and the text after the closing quote.
fn parse_quoted(s: &str) -> Option<(String, &str)> {
    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                let value = String::from_utf8_lossy(&out).into_owned();
                return Some((value, &s[i + 1..]));
            }
            b'\\' => {
                let next = *bytes.get(i + 1)?;
                match next {
                    b'n' => out.push(b'\n'),
                    b't' => out.push(b'\t'),
                    b'r' => out.push(b'\r'),
                    b'"' => out.push(b'"'),
                    b'\\' => out.push(b'\\'),
                    b'0'..=b'7' => {
                        let digits = s.get(i + 1..i + 4)?;
                        out.push(u8::from_str_radix(digits, 8).ok()?);
                        i += 4;
                        continue;
                    }
                    _ => return None,
                }
                i += 2;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diff_has_no_sections() {
        let doc = DiffDocument::parse("");
        assert!(doc.is_empty());
        assert_eq!(doc.to_text(), "");
    }

    #[test]
    fn single_file_splits_header_and_hunks() {
        let diff = "\
diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@
 fn main() {
+    println!(\"hello\");
     let x = 1;
 }
";
        let doc = DiffDocument::parse(diff);
        assert_eq!(doc.sections.len(), 1);
        let section = &doc.sections[0];
        assert_eq!(section.path.as_deref(), Some("src/main.rs"));
        assert_eq!(section.header_lines().count(), 4);
        assert_eq!(section.hunk_lines().count(), 5);
        assert!(section.hunks.starts_with("@@ -1,3 +1,4 @@"));
    }

    #[test]
    fn multiple_files_keep_order_and_bytes() {
        let diff = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1 +1,2 @@
 line1
+line2
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1 +1,2 @@
 line1
+line2";
        let doc = DiffDocument::parse(diff);
        assert_eq!(doc.paths(), vec!["a.rs", "b.rs"]);
        assert_eq!(doc.to_text(), diff);
        assert_eq!(doc.to_string(), diff);
    }

    #[test]
    fn renamed_file_uses_destination_path() {
        let diff = "\
diff --git a/old_name.rs b/new_name.rs
similarity index 100%
rename from old_name.rs
rename to new_name.rs
";
        let doc = DiffDocument::parse(diff);
        assert_eq!(doc.sections[0].path.as_deref(), Some("new_name.rs"));
        assert!(doc.sections[0].hunks.is_empty());
    }

    #[test]
    fn binary_sections_are_kept() {
        let diff = "\
diff --git a/image.png b/image.png
Binary files a/image.png and b/image.png differ
";
        let doc = DiffDocument::parse(diff);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].path.as_deref(), Some("image.png"));
    }

    #[test]
    fn preamble_becomes_unknown_section() {
        let diff = "\
From 1234 Mon Sep 17 00:00:00 2001
Subject: [PATCH] tweak

diff --git a/a.rs b/a.rs
@@ -1 +1 @@
-a
+b
";
        let doc = DiffDocument::parse(diff);
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].path, None);
        assert_eq!(doc.sections[1].path.as_deref(), Some("a.rs"));
        assert_eq!(doc.to_text(), diff);
    }

    #[test]
    fn unparseable_header_is_fail_open() {
        let diff = "diff --git garbage\n@@ -1 +1 @@\n+x\n";
        let doc = DiffDocument::parse(diff);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].path, None);
        assert_eq!(doc.to_text(), diff);
    }

    #[test]
    fn hunk_content_mentioning_header_does_not_split() {
        let diff = "\
diff --git a/notes.md b/notes.md
@@ -1 +1,2 @@
 intro
+diff --git a/fake b/fake
";
        let doc = DiffDocument::parse(diff);
        assert_eq!(doc.sections.len(), 1);
    }

    #[test]
    fn crlf_line_endings_preserved() {
        let diff = "diff --git a/w.txt b/w.txt\r\n@@ -1 +1 @@\r\n-a\r\n+b\r\n";
        let doc = DiffDocument::parse(diff);
        assert_eq!(doc.sections[0].path.as_deref(), Some("w.txt"));
        assert_eq!(doc.to_text(), diff);
    }

    #[test]
    fn header_path_with_spaces() {
        assert_eq!(
            parse_header_path("diff --git a/my dir/file.rs b/my dir/file.rs\n").as_deref(),
            Some("my dir/file.rs")
        );
    }

    #[test]
    fn header_path_quoted() {
        assert_eq!(
            parse_header_path("diff --git \"a/my file.rs\" \"b/my file.rs\"\n").as_deref(),
            Some("my file.rs")
        );
        assert_eq!(
            parse_header_path("diff --git \"a/tab\\there\" \"b/tab\\there\"").as_deref(),
            Some("tab\there")
        );
    }

    #[test]
    fn header_path_octal_escapes() {
        // "café" as git writes it with core.quotePath
        assert_eq!(
            parse_header_path("diff --git \"a/caf\\303\\251\" \"b/caf\\303\\251\"").as_deref(),
            Some("café")
        );
    }

    #[test]
    fn header_path_rename_falls_back_to_last_b_prefix() {
        assert_eq!(
            parse_header_path("diff --git a/src/old.rs b/src/new.rs").as_deref(),
            Some("src/new.rs")
        );
    }

    #[test]
    fn header_without_prefixes_is_unknown() {
        assert_eq!(parse_header_path("diff --git src/a.rs src/a.rs"), None);
        assert_eq!(parse_header_path("diff --git"), None);
    }

    #[test]
    fn truncate_to_lines_keeps_whole_lines() {
        let mut doc = DiffDocument::parse("diff --git a/x b/x\n@@ -1 +1 @@\n+yy\n");
        let section = &mut doc.sections[0];
        // 19 + 12 = 31 fits; the "+yy\n" line does not
        assert!(section.truncate_to_lines(33));
        assert_eq!(section.text(), "diff --git a/x b/x\n@@ -1 +1 @@\n");
        assert!(section.hunks.starts_with("@@"));
        assert!(!section.truncate_to_lines(100));
    }
}
