//! Recursive-descent parser for compiled artifacts.
//!
//! Blocks are delimited by braces that may sit in different directives, with
//! literal text in between, so the parser works on the whole token stream at
//! once rather than per directive.

use serde_json::Value;

use super::lexer::{Lexer, Spanned, Token};
use super::value::Arith;
use crate::error::RenderError;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Text(String),
    Echo(Expr),
    Assign(String, Expr),
    Expr(Expr),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    Foreach {
        iterable: Expr,
        key: Option<String>,
        value: String,
        body: Vec<Stmt>,
    },
    /// `include template(base, cache, use_cache, name)`
    IncludeTemplate {
        base: Expr,
        cache: Expr,
        use_cache: Expr,
        name: Expr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Array(Vec<Expr>),
    /// `.name` or `.0`
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Concat,
    Arith(Arith),
}

/// Parses an artifact into a statement list.
pub fn parse(code: &str) -> Result<Vec<Stmt>, RenderError> {
    let tokens = Lexer::new(code).collect::<Result<Vec<_>, _>>()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: code.len(),
    };
    parser.block(false)
}

struct Parser<'a> {
    tokens: Vec<Spanned<'a>>,
    pos: usize,
    end: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos).map(|spanned| &spanned.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token<'a>> {
        self.tokens.get(self.pos + ahead).map(|spanned| &spanned.token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.end, |spanned| spanned.offset)
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).map(|spanned| spanned.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, RenderError> {
        Err(RenderError::Syntax {
            message: message.into(),
            offset: self.offset(),
        })
    }

    fn at_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    fn at_ident(&self, ident: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(i)) if *i == ident)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        let found = self.at_punct(punct);
        if found {
            self.pos += 1;
        }
        found
    }

    fn eat_ident(&mut self, ident: &str) -> bool {
        let found = self.at_ident(ident);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), RenderError> {
        if self.eat_punct(punct) {
            Ok(())
        } else {
            self.error(format!("expected `{punct}`"))
        }
    }

    fn expect_var(&mut self) -> Result<String, RenderError> {
        match self.peek() {
            Some(Token::Var(name)) => {
                let name = name.to_string();
                self.pos += 1;
                Ok(name)
            }
            _ => self.error("expected a variable"),
        }
    }

    /// `;` may be left out before text, a closing brace, or the end.
    fn terminator(&mut self) -> Result<(), RenderError> {
        if self.eat_punct(";") {
            return Ok(());
        }
        match self.peek() {
            None | Some(Token::Text(_)) | Some(Token::Punct("}")) => Ok(()),
            _ => self.error("expected `;`"),
        }
    }

    fn block(&mut self, braced: bool) -> Result<Vec<Stmt>, RenderError> {
        let mut stmts = Vec::new();
        loop {
            match self.peek() {
                None if braced => return self.error("unclosed `{`"),
                None => return Ok(stmts),
                Some(Token::Punct("}")) if braced => {
                    self.pos += 1;
                    return Ok(stmts);
                }
                Some(Token::Punct("}")) => return self.error("unmatched `}`"),
                Some(Token::Punct(";")) => self.pos += 1,
                _ => stmts.push(self.statement()?),
            }
        }
    }

    fn braced_body(&mut self) -> Result<Vec<Stmt>, RenderError> {
        self.expect_punct("{")?;
        self.block(true)
    }

    fn statement(&mut self) -> Result<Stmt, RenderError> {
        if let Some(Token::Text(text)) = self.peek() {
            let text = text.to_string();
            self.pos += 1;
            return Ok(Stmt::Text(text));
        }

        if self.eat_ident("echo") {
            let expr = self.expression()?;
            self.terminator()?;
            return Ok(Stmt::Echo(expr));
        }
        if self.eat_ident("if") {
            return self.if_statement();
        }
        if self.eat_ident("foreach") {
            return self.foreach_statement();
        }
        if self.eat_ident("include") {
            return self.include_statement();
        }

        if let (Some(Token::Var(name)), Some(Token::Punct("="))) = (self.peek(), self.peek_at(1)) {
            let name = name.to_string();
            self.pos += 2;
            let expr = self.expression()?;
            self.terminator()?;
            return Ok(Stmt::Assign(name, expr));
        }

        let expr = self.expression()?;
        self.terminator()?;
        Ok(Stmt::Expr(expr))
    }

    fn condition(&mut self) -> Result<Expr, RenderError> {
        self.expect_punct("(")?;
        let expr = self.expression()?;
        self.expect_punct(")")?;
        Ok(expr)
    }

    fn if_statement(&mut self) -> Result<Stmt, RenderError> {
        let mut branches = vec![(self.condition()?, self.braced_body()?)];
        let mut otherwise = None;

        loop {
            if self.eat_ident("elseif") {
                branches.push((self.condition()?, self.braced_body()?));
            } else if self.at_ident("else") {
                self.pos += 1;
                if self.eat_ident("if") {
                    branches.push((self.condition()?, self.braced_body()?));
                } else {
                    otherwise = Some(self.braced_body()?);
                    break;
                }
            } else {
                break;
            }
        }

        Ok(Stmt::If {
            branches,
            otherwise,
        })
    }

    fn foreach_statement(&mut self) -> Result<Stmt, RenderError> {
        self.expect_punct("(")?;
        let iterable = self.expression()?;
        if !self.eat_ident("as") {
            return self.error("expected `as`");
        }
        let first = self.expect_var()?;
        let (key, value) = if self.eat_punct("=>") {
            (Some(first), self.expect_var()?)
        } else {
            (None, first)
        };
        self.expect_punct(")")?;
        let body = self.braced_body()?;
        Ok(Stmt::Foreach {
            iterable,
            key,
            value,
            body,
        })
    }

    fn include_statement(&mut self) -> Result<Stmt, RenderError> {
        if !self.eat_ident("template") {
            return self.error("expected `template` after `include`");
        }
        self.expect_punct("(")?;
        let args = self.arguments()?;
        let count = args.len();
        let Ok([base, cache, use_cache, name]) = <[Expr; 4]>::try_from(args) else {
            return self.error(format!(
                "include template() expects 4 arguments, got {count}"
            ));
        };
        self.terminator()?;
        Ok(Stmt::IncludeTemplate {
            base,
            cache,
            use_cache,
            name,
        })
    }

    /// Comma-separated expressions up to and including `)`.
    fn arguments(&mut self) -> Result<Vec<Expr>, RenderError> {
        self.list(")")
    }

    fn list(&mut self, close: &str) -> Result<Vec<Expr>, RenderError> {
        let mut items = Vec::new();
        if self.eat_punct(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat_punct(close) {
                return Ok(items);
            }
            self.expect_punct(",")?;
        }
    }

    fn expression(&mut self) -> Result<Expr, RenderError> {
        let condition = self.or()?;
        if self.eat_punct("?") {
            let then = self.expression()?;
            self.expect_punct(":")?;
            let otherwise = self.expression()?;
            return Ok(Expr::Ternary(
                Box::new(condition),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(condition)
    }

    fn or(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.and()?;
        while self.eat_punct("||") || self.eat_ident("or") {
            left = binary(BinaryOp::Or, left, self.and()?);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.equality()?;
        while self.eat_punct("&&") || self.eat_ident("and") {
            left = binary(BinaryOp::And, left, self.equality()?);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.comparison()?;
        loop {
            let op = if self.eat_punct("==") {
                BinaryOp::Eq
            } else if self.eat_punct("!=") {
                BinaryOp::Ne
            } else {
                return Ok(left);
            };
            left = binary(op, left, self.comparison()?);
        }
    }

    fn comparison(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.concat()?;
        loop {
            let op = if self.eat_punct("<=") {
                BinaryOp::Le
            } else if self.eat_punct(">=") {
                BinaryOp::Ge
            } else if self.eat_punct("<") {
                BinaryOp::Lt
            } else if self.eat_punct(">") {
                BinaryOp::Gt
            } else {
                return Ok(left);
            };
            left = binary(op, left, self.concat()?);
        }
    }

    fn concat(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.additive()?;
        while self.eat_punct("~") {
            left = binary(BinaryOp::Concat, left, self.additive()?);
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.eat_punct("+") {
                Arith::Add
            } else if self.eat_punct("-") {
                Arith::Sub
            } else {
                return Ok(left);
            };
            left = binary(BinaryOp::Arith(op), left, self.multiplicative()?);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat_punct("*") {
                Arith::Mul
            } else if self.eat_punct("/") {
                Arith::Div
            } else if self.eat_punct("%") {
                Arith::Rem
            } else {
                return Ok(left);
            };
            left = binary(BinaryOp::Arith(op), left, self.unary()?);
        }
    }

    fn unary(&mut self) -> Result<Expr, RenderError> {
        if self.eat_punct("!") || self.eat_ident("not") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat_punct("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, RenderError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_punct(".") {
                let member = match self.advance() {
                    Some(Token::Ident(name)) => name.to_string(),
                    Some(Token::Int(index)) if index >= 0 => index.to_string(),
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        return self.error("expected a member name after `.`");
                    }
                };
                expr = Expr::Member(Box::new(expr), member);
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, RenderError> {
        let offset = self.offset();
        let Some(token) = self.advance() else {
            return self.error("unexpected end of input");
        };

        match token {
            Token::Int(i) => Ok(Expr::Literal(Value::from(i))),
            Token::Float(f) => Ok(Expr::Literal(Value::from(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Var(name) => Ok(Expr::Var(name.to_string())),
            Token::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            Token::Punct("[") => Ok(Expr::Array(self.list("]")?)),
            Token::Ident("true") => Ok(Expr::Literal(Value::Bool(true))),
            Token::Ident("false") => Ok(Expr::Literal(Value::Bool(false))),
            Token::Ident("null") => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) if self.at_punct("(") => {
                self.pos += 1;
                Ok(Expr::Call(name.to_string(), self.arguments()?))
            }
            other => Err(RenderError::Syntax {
                message: format!("unexpected {}", describe(&other)),
                offset,
            }),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary(op, Box::new(left), Box::new(right))
}

fn describe(token: &Token<'_>) -> String {
    match token {
        Token::Text(_) => "literal text inside an expression".to_string(),
        Token::Var(name) => format!("variable ${name}"),
        Token::Ident(name) => format!("identifier '{name}'"),
        Token::Int(i) => format!("number {i}"),
        Token::Float(f) => format!("number {f}"),
        Token::Str(_) => "string literal".to_string(),
        Token::Punct(p) => format!("`{p}`"),
    }
}
