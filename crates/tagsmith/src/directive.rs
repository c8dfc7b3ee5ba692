//! Directive text emitted into compiled artifacts.
//!
//! A directive is a run of statements between [`OPEN`] and [`CLOSE`]; the
//! runtime parser in [`crate::runtime`] reads the same forms back.
//!
//! Literal text may contain the marker characters too. Before any directive
//! is emitted the pipeline runs [`protect`] over the buffer, which doubles
//! each `%` that follows a `<` or precedes a `>`. Emitted directives always
//! open with `<% ` and close with ` %>`, so the two never collide: the lexer
//! only opens a directive at a `<%` whose next character is not `%`, and drops
//! the extra `%` from literal text again (see [`doubled_percent`]).

use std::borrow::Cow;

use crate::config::EngineConfig;

/// Opens a directive.
pub const OPEN: &str = "<%";

/// Closes a directive.
pub const CLOSE: &str = "%>";

// Bodies are author text, so markers protected earlier are restored.
fn wrap(body: &str) -> String {
    format!("{OPEN} {} {CLOSE}", unprotect(body))
}

pub fn echo(expr: &str) -> String {
    wrap(&format!("echo {expr};"))
}

pub fn echo_escaped(expr: &str) -> String {
    wrap(&format!("echo escape({expr});"))
}

/// Author code forwarded verbatim.
pub fn raw(code: &str) -> String {
    wrap(code)
}

pub fn comment(text: &str) -> String {
    wrap(&format!("/*{text}*/"))
}

pub fn open_if(expr: &str) -> String {
    wrap(&format!("if ({expr}) {{"))
}

pub fn open_elseif(expr: &str) -> String {
    wrap(&format!("}} elseif ({expr}) {{"))
}

pub fn open_else() -> String {
    wrap("} else {")
}

/// Terminates the innermost open block, whatever opened it.
pub fn close_block() -> String {
    wrap("}")
}

pub fn open_foreach(expr: &str, key: Option<&str>, value: &str) -> String {
    match key {
        Some(key) => wrap(&format!("foreach ({expr} as {key} => {value}) {{")),
        None => wrap(&format!("foreach ({expr} as {value}) {{")),
    }
}

/// Render-time inclusion of another template's artifact.
pub fn include_template(config: &EngineConfig, name: &str) -> String {
    format!(
        "{OPEN} include template({}, {}, {}, {}); {CLOSE}",
        quote(&config.base_dir.to_string_lossy()),
        quote(&config.cache_dir.to_string_lossy()),
        config.use_cache,
        quote(&unprotect(name.trim()))
    )
}

/// Single-quoted string literal in directive syntax.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for ch in text.chars() {
        if ch == '\'' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}

/// Doubles every `%` that directly follows `<` or directly precedes `>`.
/// Text without `<%` or `%>` is returned as is.
pub fn protect(text: &str) -> Cow<'_, str> {
    if !text.contains(OPEN) && !text.contains(CLOSE) {
        return Cow::Borrowed(text);
    }

    let mut protected = String::with_capacity(text.len() + 8);
    let mut previous = None;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        protected.push(ch);
        if ch == '%' && (previous == Some('<') || chars.peek() == Some(&'>')) {
            protected.push('%');
        }
        previous = Some(ch);
    }
    Cow::Owned(protected)
}

/// Byte index of the first `%` that [`protect`] added to `text`.
///
/// A doubled `%` is recognised by its neighbours: a `%%` pair right after `<`
/// or right before `>`. Callers drop the returned byte and continue scanning
/// after it.
pub fn doubled_percent(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    (0..bytes.len().saturating_sub(1)).find_map(|index| {
        let pair = bytes[index] == b'%' && bytes[index + 1] == b'%';
        let marked =
            (index > 0 && bytes[index - 1] == b'<') || bytes.get(index + 2) == Some(&b'>');
        (pair && marked).then_some(index + 1)
    })
}

/// Reverses [`protect`].
pub fn unprotect(text: &str) -> Cow<'_, str> {
    let Some(mut dropped) = doubled_percent(text) else {
        return Cow::Borrowed(text);
    };

    let mut plain = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        plain.push_str(&rest[..dropped]);
        rest = &rest[dropped + 1..];
        match doubled_percent(rest) {
            Some(next) => dropped = next,
            None => break,
        }
    }
    plain.push_str(rest);
    Cow::Owned(plain)
}

/// Byte index of the first `<%` that opens a directive rather than being
/// protected literal text.
pub fn find_open(text: &str) -> Option<usize> {
    text.match_indices(OPEN)
        .map(|(index, _)| index)
        .find(|&index| !text[index + OPEN.len()..].starts_with('%'))
}
