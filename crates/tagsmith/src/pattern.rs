//! Tag matching rules.
//!
//! Every tag family is matched by the same envelope: the start delimiter, an
//! inner pattern, then the end delimiter, with `.` spanning newlines. A match
//! that sits directly after the escape marker `{!}` is skipped, which is how
//! authors keep a single tag occurrence from being converted. The marker is
//! removed at the end of the pipeline (see [`PatternBuilder::unescape`]).
//!
//! The `regex` crate has no look-behind, so the exclusion is applied while
//! scanning: a rejected match restarts the search one character past its
//! start, giving the same result as a `(?<!{!})` prefix would.

use regex::{Captures, Regex};

use crate::config::Delimiters;
use crate::error::Result;

/// Literal marker that suppresses conversion of the tag right after it.
pub const ESCAPE_MARKER: &str = "{!}";

/// Identifier accepted for block names.
pub const BLOCK_NAME: &str = r"[_a-zA-Z][_a-zA-Z0-9]*";

/// Variable accepted as a loop binding (`$name`).
pub const LOOP_VARIABLE: &str = r"\$[\p{L}_][\p{L}\p{N}_]*";

/// Builds tag patterns for one delimiter pair.
#[derive(Debug, Clone)]
pub struct PatternBuilder {
    delimiters: Delimiters,
}

impl PatternBuilder {
    pub fn new(delimiters: &Delimiters) -> Self {
        Self {
            delimiters: delimiters.clone(),
        }
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// The start delimiter, regex-escaped.
    pub fn start(&self) -> String {
        regex::escape(self.delimiters.start())
    }

    /// The end delimiter, regex-escaped.
    pub fn end(&self) -> String {
        regex::escape(self.delimiters.end())
    }

    /// Wraps `inner` in the delimiters. `inner` is a regex fragment and is
    /// inserted as-is.
    pub fn tag(&self, inner: &str) -> Result<TagPattern> {
        let regex = Regex::new(&format!("(?s){}{}{}", self.start(), inner, self.end()))?;
        Ok(TagPattern { regex })
    }

    /// Matches `{!}` followed by one complete tag; group 1 is the tag text.
    pub fn unescape(&self) -> Result<Regex> {
        Ok(Regex::new(&format!(
            "(?s){}({}.+?{})",
            regex::escape(ESCAPE_MARKER),
            self.start(),
            self.end()
        ))?)
    }
}

/// A compiled tag rule that ignores escaped occurrences.
#[derive(Debug, Clone)]
pub struct TagPattern {
    regex: Regex,
}

impl TagPattern {
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Returns true if the haystack contains at least one unescaped match.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.next_unescaped(haystack, 0).is_some()
    }

    /// Returns the first unescaped match.
    pub fn captures<'h>(&self, haystack: &'h str) -> Option<Captures<'h>> {
        self.next_unescaped(haystack, 0)
    }

    /// Counts the unescaped, non-overlapping matches.
    pub fn count(&self, haystack: &str) -> usize {
        let mut count = 0;
        let mut at = 0;
        while let Some(caps) = self.next_unescaped(haystack, at) {
            let Some(m) = caps.get(0) else { break };
            count += 1;
            at = advance(haystack, m.start(), m.end());
        }
        count
    }

    /// Replaces every unescaped match with the closure's output.
    pub fn replace_all<F>(&self, haystack: &str, mut replacer: F) -> String
    where
        F: FnMut(&Captures<'_>) -> String,
    {
        let result: std::result::Result<String, std::convert::Infallible> =
            self.try_replace_all(haystack, |caps| Ok(replacer(caps)));
        match result {
            Ok(replaced) => replaced,
            Err(never) => match never {},
        }
    }

    /// Like [`replace_all`](Self::replace_all) but stops at the first error.
    pub fn try_replace_all<F, E>(&self, haystack: &str, mut replacer: F) -> std::result::Result<String, E>
    where
        F: FnMut(&Captures<'_>) -> std::result::Result<String, E>,
    {
        let mut out = String::with_capacity(haystack.len());
        let mut last = 0;
        let mut at = 0;
        while let Some(caps) = self.next_unescaped(haystack, at) {
            let Some(m) = caps.get(0) else { break };
            out.push_str(&haystack[last..m.start()]);
            out.push_str(&replacer(&caps)?);
            last = m.end();
            at = advance(haystack, m.start(), m.end());
        }
        out.push_str(&haystack[last..]);
        Ok(out)
    }

    fn next_unescaped<'h>(&self, haystack: &'h str, mut at: usize) -> Option<Captures<'h>> {
        while at <= haystack.len() {
            let caps = self.regex.captures_at(haystack, at)?;
            let m = caps.get(0)?;
            if !haystack[..m.start()].ends_with(ESCAPE_MARKER) {
                return Some(caps);
            }
            at = next_char_boundary(haystack, m.start());
        }
        None
    }
}

// Resume point after a match; empty matches step over one character.
fn advance(haystack: &str, start: usize, end: usize) -> usize {
    if end > start {
        end
    } else {
        next_char_boundary(haystack, start)
    }
}

fn next_char_boundary(haystack: &str, at: usize) -> usize {
    at + haystack[at..].chars().next().map_or(1, char::len_utf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PatternBuilder {
        PatternBuilder::new(&Delimiters::default())
    }

    #[test]
    fn test_tag_matches_between_delimiters() {
        let pattern = builder().tag(r"info\s+(.+?)").unwrap();
        let out = pattern.replace_all("a{info note}b", |caps| format!("<{}>", &caps[1]));
        assert_eq!(out, "a<note>b");
    }

    #[test]
    fn test_tag_spans_newlines() {
        let pattern = builder().tag(r"info\s+(.+?)").unwrap();
        let out = pattern.replace_all("{info line one\nline two}", |caps| caps[1].to_uppercase());
        assert_eq!(out, "LINE ONE\nLINE TWO");
    }

    #[test]
    fn test_escaped_occurrence_is_skipped() {
        let pattern = builder().tag(r"(\$.+?)").unwrap();
        let out = pattern.replace_all("{!}{$a} {$b}", |_| "X".to_string());
        assert_eq!(out, "{!}{$a} X");
        assert_eq!(pattern.count("{!}{$a} {$b}"), 1);
        assert!(!pattern.is_match("{!}{$a}"));
    }

    #[test]
    fn test_rejected_match_does_not_hide_later_ones() {
        let pattern = builder().tag(r"(\$.+?)").unwrap();
        let out = pattern.replace_all("{!}{$a}{$b}", |caps| format!("[{}]", &caps[1]));
        assert_eq!(out, "{!}{$a}[$b]");
    }

    #[test]
    fn test_custom_delimiters_are_escaped() {
        let builder = PatternBuilder::new(&Delimiters::new("<{", "}>").unwrap());
        let pattern = builder.tag(r"(\$.+?)").unwrap();
        let out = pattern.replace_all("{$a} <{$b}>", |caps| format!("[{}]", &caps[1]));
        assert_eq!(out, "{$a} [$b]");

        let builder = PatternBuilder::new(&Delimiters::new("[[", "]]").unwrap());
        let pattern = builder.tag("build_time").unwrap();
        assert!(pattern.is_match("x [[build_time]] y"));
    }

    #[test]
    fn test_unescape_restores_tag_text() {
        let regex = builder().unescape().unwrap();
        let out = regex.replace_all("{!}{$x} and {!}{if $y}", "$1");
        assert_eq!(out, "{$x} and {if $y}");
    }

    #[test]
    fn test_try_replace_all_propagates_error() {
        let pattern = builder().tag(r"include\s+(.+?)").unwrap();
        let result: std::result::Result<String, String> =
            pattern.try_replace_all("{include a}{include b}", |caps| {
                if &caps[1] == "b" {
                    Err("boom".to_string())
                } else {
                    Ok(String::new())
                }
            });
        assert_eq!(result, Err("boom".to_string()));
    }

    #[test]
    fn test_multibyte_text_around_escape() {
        let pattern = builder().tag(r"(\$.+?)").unwrap();
        let out = pattern.replace_all("héllo {!}{$ü} {$ö}", |_| "X".to_string());
        assert_eq!(out, "héllo {!}{$ü} X");
    }
}
