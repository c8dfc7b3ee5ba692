//! Tokenizer for compiled artifacts.
//!
//! Artifacts alternate between literal text and directive code. The lexer
//! starts in text mode, switches to code mode at `<%` and back at `%>`. Text
//! comes out as [`Token::Text`] runs, split where a protected marker loses its
//! extra `%`; code is split into variables, identifiers, literals, and
//! punctuation. Comments are dropped.

use crate::directive::{self, CLOSE, OPEN};
use crate::error::RenderError;

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'a> {
    /// Literal text outside directives.
    Text(&'a str),
    /// `$name`, without the sigil.
    Var(&'a str),
    /// Keywords and function names.
    Ident(&'a str),
    Int(i64),
    Float(f64),
    /// String literal with escapes resolved.
    Str(String),
    Punct(&'static str),
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<'a> {
    pub token: Token<'a>,
    pub offset: usize,
}

// Longest first, so `==` wins over `=`.
const PUNCTUATION: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "=>", "(", ")", "{", "}", "[", "]", ",", ";", ".", "?",
    ":", "=", "<", ">", "+", "-", "*", "/", "%", "~", "!",
];

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    in_code: bool,
    after_dot: bool,
    failed: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            in_code: false,
            after_dot: false,
            failed: false,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> RenderError {
        RenderError::Syntax {
            message: message.into(),
            offset,
        }
    }

    fn text(&mut self) -> Option<Spanned<'a>> {
        let remaining = self.remaining();
        let start = self.pos;
        let open = directive::find_open(remaining);

        let run = &remaining[..open.unwrap_or(remaining.len())];
        if let Some(dropped) = directive::doubled_percent(run) {
            self.pos += dropped + 1;
            return Some(Spanned {
                token: Token::Text(&remaining[..dropped]),
                offset: start,
            });
        }

        match open {
            Some(0) => {
                self.pos += OPEN.len();
                self.in_code = true;
                None
            }
            Some(end) => {
                self.pos += end;
                Some(Spanned {
                    token: Token::Text(&remaining[..end]),
                    offset: start,
                })
            }
            None => {
                self.pos = self.input.len();
                Some(Spanned {
                    token: Token::Text(remaining),
                    offset: start,
                })
            }
        }
    }

    /// Skips whitespace and comments in code mode.
    fn skip_trivia(&mut self) -> Result<(), RenderError> {
        loop {
            let remaining = self.remaining();
            let trimmed = remaining.trim_start();
            self.pos += remaining.len() - trimmed.len();

            if trimmed.starts_with("/*") {
                match trimmed[2..].find("*/") {
                    Some(end) => self.pos += end + 4,
                    None => return Err(self.error("unterminated comment", self.pos)),
                }
            } else if trimmed.starts_with("//") {
                let line_end = trimmed.find('\n').unwrap_or(trimmed.len());
                let code_end = trimmed.find(CLOSE).unwrap_or(trimmed.len());
                self.pos += line_end.min(code_end);
            } else {
                return Ok(());
            }
        }
    }

    fn code(&mut self) -> Result<Spanned<'a>, RenderError> {
        let remaining = self.remaining();
        let start = self.pos;
        let Some(first) = remaining.chars().next() else {
            return Err(self.error("unexpected end of input", start));
        };

        let token = if first == '$' {
            let name = identifier(&remaining[1..]);
            if name.is_empty() {
                return Err(self.error("expected a variable name after `$`", start));
            }
            self.pos += 1 + name.len();
            Token::Var(name)
        } else if first.is_alphabetic() || first == '_' {
            let name = identifier(remaining);
            self.pos += name.len();
            Token::Ident(name)
        } else if first.is_ascii_digit() {
            self.number(remaining)?
        } else if first == '\'' || first == '"' {
            self.string(first)?
        } else if let Some(punct) = PUNCTUATION.iter().find(|p| remaining.starts_with(**p)) {
            self.pos += punct.len();
            Token::Punct(*punct)
        } else {
            return Err(self.error(format!("unexpected character '{first}'"), start));
        };

        self.after_dot = token == Token::Punct(".");
        Ok(Spanned {
            token,
            offset: start,
        })
    }

    fn number(&mut self, remaining: &'a str) -> Result<Token<'a>, RenderError> {
        let start = self.pos;
        let mut end = digits(remaining);
        // After a member dot, `1.2` is two path segments, not a float.
        let fraction = !self.after_dot
            && remaining[end..].starts_with('.')
            && remaining[end + 1..].starts_with(|c: char| c.is_ascii_digit());
        if fraction {
            end += 1 + digits(&remaining[end + 1..]);
        }
        let literal = &remaining[..end];
        self.pos += end;

        if !fraction {
            if let Ok(value) = literal.parse::<i64>() {
                return Ok(Token::Int(value));
            }
        }
        literal
            .parse::<f64>()
            .map(Token::Float)
            .map_err(|_| self.error(format!("invalid number '{literal}'"), start))
    }

    fn string(&mut self, quote: char) -> Result<Token<'a>, RenderError> {
        let start = self.pos;
        let mut value = String::new();
        let mut chars = self.remaining().char_indices().skip(1);

        while let Some((index, ch)) = chars.next() {
            match ch {
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    match (quote, escaped) {
                        (_, '\\') => value.push('\\'),
                        (q, e) if q == e => value.push(e),
                        ('"', 'n') => value.push('\n'),
                        ('"', 't') => value.push('\t'),
                        ('"', 'r') => value.push('\r'),
                        ('"', '$') => value.push('$'),
                        (_, other) => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                }
                c if c == quote => {
                    self.pos += index + c.len_utf8();
                    return Ok(Token::Str(value));
                }
                c => value.push(c),
            }
        }

        Err(self.error("unterminated string literal", start))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Spanned<'a>, RenderError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        while self.pos < self.input.len() {
            if !self.in_code {
                if let Some(text) = self.text() {
                    return Some(Ok(text));
                }
                continue;
            }

            if let Err(err) = self.skip_trivia() {
                self.failed = true;
                return Some(Err(err));
            }
            if self.pos >= self.input.len() {
                break;
            }
            if self.remaining().starts_with(CLOSE) {
                self.pos += CLOSE.len();
                self.in_code = false;
                self.after_dot = false;
                continue;
            }

            let result = self.code();
            self.failed = result.is_err();
            return Some(result);
        }

        None
    }
}

fn identifier(input: &str) -> &str {
    let mut end = 0;
    for (index, ch) in input.char_indices() {
        let valid = if index == 0 {
            ch.is_alphabetic() || ch == '_'
        } else {
            ch.is_alphanumeric() || ch == '_'
        };
        if !valid {
            break;
        }
        end = index + ch.len_utf8();
    }
    &input[..end]
}

fn digits(input: &str) -> usize {
    input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        Lexer::new(input)
            .map(|spanned| spanned.unwrap().token)
            .collect()
    }

    #[test]
    fn test_text_only() {
        assert_eq!(tokens("plain {text}"), vec![Token::Text("plain {text}")]);
    }

    #[test]
    fn test_text_and_code_alternate() {
        assert_eq!(
            tokens("a<% echo $x; %>b"),
            vec![
                Token::Text("a"),
                Token::Ident("echo"),
                Token::Var("x"),
                Token::Punct(";"),
                Token::Text("b"),
            ]
        );
    }

    #[test]
    fn test_protected_markers_stay_text() {
        assert_eq!(
            tokens("a <%% b %%> c<% echo 1; %>"),
            vec![
                Token::Text("a <%"),
                Token::Text(" b %"),
                Token::Text("> c"),
                Token::Ident("echo"),
                Token::Int(1),
                Token::Punct(";"),
            ]
        );
    }

    #[test]
    fn test_operators_prefer_longest() {
        assert_eq!(
            tokens("<% $a == $b => != = %>"),
            vec![
                Token::Var("a"),
                Token::Punct("=="),
                Token::Var("b"),
                Token::Punct("=>"),
                Token::Punct("!="),
                Token::Punct("="),
            ]
        );
    }

    #[test]
    fn test_modulo_is_not_close() {
        assert_eq!(
            tokens("<% 7 % 2 %>"),
            vec![Token::Int(7), Token::Punct("%"), Token::Int(2)]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("<% 42 1.5 99999999999999999999 %>"),
            vec![Token::Int(42), Token::Float(1.5), Token::Float(1e20)]
        );
    }

    #[test]
    fn test_numeric_path_segments() {
        assert_eq!(
            tokens("<% $a.1.2 %>"),
            vec![
                Token::Var("a"),
                Token::Punct("."),
                Token::Int(1),
                Token::Punct("."),
                Token::Int(2),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#"<% 'it\'s \n' "a\n\"b\"" 'C:\\dir' %>"#),
            vec![
                Token::Str("it's \\n".to_string()),
                Token::Str("a\n\"b\"".to_string()),
                Token::Str("C:\\dir".to_string()),
            ]
        );
    }

    #[test]
    fn test_close_inside_string_stays_code() {
        assert_eq!(
            tokens("<% echo '%>'; %>!"),
            vec![
                Token::Ident("echo"),
                Token::Str("%>".to_string()),
                Token::Punct(";"),
                Token::Text("!"),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            tokens("<% /*compiled at 2024-01-01 10:00:00*/ %>x<% // note %>y"),
            vec![Token::Text("x"), Token::Text("y")]
        );
    }

    #[test]
    fn test_unicode_variable_names() {
        assert_eq!(tokens("<% $café %>"), vec![Token::Var("café")]);
    }

    #[test]
    fn test_offsets_point_into_input() {
        let spans: Vec<_> = Lexer::new("ab<% $x %>").map(Result::unwrap).collect();
        assert_eq!(spans[0].offset, 0);
        assert_eq!(spans[1].offset, 5);
    }

    #[test]
    fn test_unterminated_string_fails_once() {
        let results: Vec<_> = Lexer::new("<% 'open %>").collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0],
            Err(RenderError::Syntax { offset: 3, .. })
        ));
    }

    #[test]
    fn test_unterminated_comment() {
        let result: Result<Vec<_>, _> = Lexer::new("<% /* open").collect();
        assert!(matches!(result, Err(RenderError::Syntax { .. })));
    }
}
