//! Single-pass tag stages.
//!
//! Each stage is a flat substitution over the whole buffer: it does not track
//! nesting, so an `{if}` and its closer are handled by unrelated stages.

use std::borrow::Cow;

use regex::Regex;
use tracing::warn;

use super::Pipeline;
use crate::directive::{self, CLOSE, OPEN};
use crate::error::Result;
use crate::pattern::{PatternBuilder, TagPattern, LOOP_VARIABLE};

/// Replaces every unescaped match, returning how many were replaced.
fn substitute<F>(content: &mut String, pattern: &TagPattern, mut replacer: F) -> usize
where
    F: FnMut(&regex::Captures<'_>) -> String,
{
    let mut count = 0;
    let replaced = pattern.replace_all(content, |caps| {
        count += 1;
        replacer(caps)
    });
    if count > 0 {
        *content = replaced;
    }
    count
}

/// Keeps `<%` and `%>` written by the author from reading as directive
/// markers. Must run before any stage emits a directive.
pub(super) fn protect_markers(content: &mut String, _pipeline: &Pipeline<'_>) -> Result<usize> {
    if let Cow::Owned(protected) = directive::protect(content) {
        let added = protected.len() - content.len();
        *content = protected;
        return Ok(added);
    }
    Ok(0)
}

/// `{$expr}`
pub(super) fn variables(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag(r"(\$.+?)")?;
    Ok(substitute(content, &pattern, |caps| directive::echo(&caps[1])))
}

/// `{text $expr}`
pub(super) fn escaped_variables(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag(r"text\s+(\$.+?)")?;
    Ok(substitute(content, &pattern, |caps| {
        directive::echo_escaped(&caps[1])
    }))
}

/// `{php}code{/php}`
pub(super) fn raw_code(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let patterns = pipeline.patterns();
    let inner = format!("php{}(.+?){}/php", patterns.end(), patterns.start());
    let pattern = patterns.tag(&inner)?;
    Ok(substitute(content, &pattern, |caps| directive::raw(&caps[1])))
}

/// `{info text}`
pub(super) fn comments(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag(r"info\s+(.+?)")?;
    Ok(substitute(content, &pattern, |caps| directive::comment(&caps[1])))
}

/// Warns when block openers and closers do not pair up. Templates are still
/// compiled; the runtime reports the imbalance when the artifact executes.
pub(super) fn check_balance(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let (openers, closers) = balance(content, pipeline.patterns())?;
    if openers != closers {
        warn!(openers, closers, "unbalanced if/loop tags");
    }
    Ok(0)
}

/// Counts `{if}`/`{loop}` openers and `{/if}`/`{/loop}` closers.
fn balance(content: &str, patterns: &PatternBuilder) -> Result<(usize, usize)> {
    let openers = patterns.tag(r"if\s+(.+?)")?.count(content)
        + patterns.tag(&loop_inner())?.count(content);
    let closers = patterns.tag(r"/(?:if|loop)")?.count(content);
    Ok((openers, closers))
}

/// `{if expr}`
pub(super) fn open_if(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag(r"if\s+(.+?)")?;
    Ok(substitute(content, &pattern, |caps| directive::open_if(&caps[1])))
}

/// `{elseif expr}`
pub(super) fn open_elseif(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag(r"elseif\s+(.+?)")?;
    Ok(substitute(content, &pattern, |caps| {
        directive::open_elseif(&caps[1])
    }))
}

/// `{else}`
pub(super) fn open_else(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag("else")?;
    Ok(substitute(content, &pattern, |_| directive::open_else()))
}

/// `{/if}` and `{/loop}`
pub(super) fn close_blocks(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag(r"/(?:if|loop)")?;
    Ok(substitute(content, &pattern, |_| directive::close_block()))
}

fn loop_inner() -> String {
    format!(r"loop\s+(.+?)\s+({LOOP_VARIABLE})(?:\s+({LOOP_VARIABLE}))?")
}

/// `{loop expr $v}` and `{loop expr $k $v}`
pub(super) fn loops(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag(&loop_inner())?;
    Ok(substitute(content, &pattern, |caps| match caps.get(3) {
        Some(value) => directive::open_foreach(&caps[1], Some(&caps[2]), value.as_str()),
        None => directive::open_foreach(&caps[1], None, &caps[2]),
    }))
}

/// `{build_time}`
pub(super) fn build_time(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag("build_time")?;
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    Ok(substitute(content, &pattern, |_| {
        directive::comment(&format!("compiled at {stamp}"))
    }))
}

/// `{!}{tag}` becomes the literal `{tag}`.
pub(super) fn unescape(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let regex = pipeline.patterns().unescape()?;
    let count = regex.find_iter(content).count();
    if count > 0 {
        *content = regex.replace_all(content, "$1").into_owned();
    }
    Ok(count)
}

/// Joins two emitted directives separated only by whitespace into one.
///
/// Only the ` %>` and `<% ` forms emitted by this crate are joined; protected
/// markers in literal text never take that shape.
pub(super) fn merge_directives(content: &mut String, _pipeline: &Pipeline<'_>) -> Result<usize> {
    let regex = Regex::new(&format!(
        r" {}(\s*){} ",
        regex::escape(CLOSE),
        regex::escape(OPEN)
    ))?;
    let count = regex.find_iter(content).count();
    if count > 0 {
        *content = regex.replace_all(content, " ${1} ").into_owned();
    }
    Ok(count)
}
