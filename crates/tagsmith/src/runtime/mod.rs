//! Reference execution environment for compiled artifacts.
//!
//! The compiler only produces directive text; something has to run it. This
//! module is that something: it parses an artifact and executes it against a
//! flat variable scope, writing literal text and `echo` output to a string.
//!
//! - Undefined variables read as null, and null prints as nothing.
//! - Loop variables and assignments write into the same scope and remain set
//!   after the loop ends.
//! - `include template(...)` compiles (through the cache gate) and runs another
//!   template in the same scope, up to [`MAX_INCLUDE_DEPTH`] levels deep.

mod eval;
mod lexer;
mod parser;
mod value;

use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::RenderError;
use crate::store;

pub use eval::escape_html;
pub use parser::{parse, BinaryOp, Expr, Stmt};
pub use value::{format_value, is_truthy, Arith};

/// Variable bindings visible to an executing artifact.
pub type Scope = serde_json::Map<String, Value>;

/// How deeply dynamic template inclusion may nest.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Executes artifacts on behalf of an engine.
///
/// The engine supplies configuration and extensions for sub-engines created
/// by dynamic template inclusion.
pub struct Runtime<'e> {
    engine: &'e Engine,
    depth: usize,
}

impl<'e> Runtime<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine, depth: 0 }
    }

    /// Parses and executes `code`, returning the produced output.
    pub fn execute(&self, code: &str, scope: &mut Scope) -> Result<String, RenderError> {
        let mut out = String::new();
        self.execute_into(code, scope, &mut out)?;
        Ok(out)
    }

    fn execute_into(&self, code: &str, scope: &mut Scope, out: &mut String) -> Result<(), RenderError> {
        let program = parser::parse(code)?;
        self.run(&program, scope, out)
    }

    fn run(&self, stmts: &[Stmt], scope: &mut Scope, out: &mut String) -> Result<(), RenderError> {
        for stmt in stmts {
            self.step(stmt, scope, out)?;
        }
        Ok(())
    }

    fn step(&self, stmt: &Stmt, scope: &mut Scope, out: &mut String) -> Result<(), RenderError> {
        match stmt {
            Stmt::Text(text) => out.push_str(text),
            Stmt::Echo(expr) => out.push_str(&format_value(&eval::evaluate(expr, scope)?)),
            Stmt::Assign(name, expr) => {
                let value = eval::evaluate(expr, scope)?;
                scope.insert(name.clone(), value);
            }
            Stmt::Expr(expr) => {
                eval::evaluate(expr, scope)?;
            }
            Stmt::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if is_truthy(&eval::evaluate(condition, scope)?) {
                        return self.run(body, scope, out);
                    }
                }
                if let Some(body) = otherwise {
                    self.run(body, scope, out)?;
                }
            }
            Stmt::Foreach {
                iterable,
                key,
                value: item,
                body,
            } => {
                let iterable = eval::evaluate(iterable, scope)?;
                for (k, v) in value::iteration_pairs(&iterable)? {
                    if let Some(key) = key {
                        scope.insert(key.clone(), k);
                    }
                    scope.insert(item.clone(), v);
                    self.run(body, scope, out)?;
                }
            }
            Stmt::IncludeTemplate {
                base,
                cache,
                use_cache,
                name,
            } => {
                let base = format_value(&eval::evaluate(base, scope)?);
                let cache = format_value(&eval::evaluate(cache, scope)?);
                let use_cache = is_truthy(&eval::evaluate(use_cache, scope)?);
                let name = format_value(&eval::evaluate(name, scope)?);
                self.include_template(&base, &cache, use_cache, &name, scope, out)?;
            }
        }
        Ok(())
    }

    fn include_template(
        &self,
        base: &str,
        cache: &str,
        use_cache: bool,
        name: &str,
        scope: &mut Scope,
        out: &mut String,
    ) -> Result<(), RenderError> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(RenderError::IncludeDepth {
                name: name.to_string(),
                limit: MAX_INCLUDE_DEPTH,
            });
        }

        let config = sub_config(self.engine.config(), base, cache, use_cache);
        let engine = Engine::new(config)
            .with_extensions(self.engine.extensions().iter().cloned())
            .with_template(name);
        let artifact = engine.target_path()?;
        debug!(template = name, depth = self.depth + 1, "including dynamic template");

        let code = store::read_text(&artifact)?;
        let nested = Runtime {
            engine: &engine,
            depth: self.depth + 1,
        };
        nested.execute_into(&code, scope, out)
    }
}

/// Configuration for a dynamically included template: the parent's settings
/// with the roots and cache policy carried by the directive.
fn sub_config(parent: &EngineConfig, base: &str, cache: &str, use_cache: bool) -> EngineConfig {
    let config = if parent.base_dir.as_os_str() == base {
        parent.clone()
    } else {
        EngineConfig {
            delimiters: parent.delimiters.clone(),
            content_type: parent.content_type.clone(),
            source_suffix: parent.source_suffix.clone(),
            artifact_suffix: parent.artifact_suffix.clone(),
            ..EngineConfig::new(base)
        }
    };
    config.with_cache_dir(cache).with_use_cache(use_cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn run(code: &str, data: Value) -> Result<String, RenderError> {
        let engine = Engine::new(EngineConfig::new("/nonexistent"));
        let Value::Object(mut scope) = data else {
            panic!("bindings must be an object");
        };
        Runtime::new(&engine).execute(code, &mut scope)
    }

    #[test]
    fn test_text_passthrough() {
        assert_eq!(run("just text", json!({})).unwrap(), "just text");
    }

    #[test]
    fn test_echo_and_escape() {
        let out = run(
            "<% echo $a; %>|<% echo escape($a); %>",
            json!({"a": "a&b<c>d"}),
        )
        .unwrap();
        assert_eq!(out, "a&b<c>d|a&amp;b&lt;c&gt;d");
    }

    #[test]
    fn test_undefined_prints_nothing() {
        assert_eq!(run("[<% echo $nope; %>]", json!({})).unwrap(), "[]");
    }

    #[test]
    fn test_branches() {
        let code = "<% if ($n > 1) { %>big<% } elseif ($n == 1) { %>one<% } else { %>none<% } %>";
        assert_eq!(run(code, json!({"n": 5})).unwrap(), "big");
        assert_eq!(run(code, json!({"n": 1})).unwrap(), "one");
        assert_eq!(run(code, json!({"n": 0})).unwrap(), "none");
    }

    #[test]
    fn test_foreach_over_object_and_array() {
        let code = "<% foreach ($m as $k => $v) {  echo $k; %>:<% echo $v; %>;<% } %>";
        assert_eq!(run(code, json!({"m": {"a": 1, "b": 2}})).unwrap(), "a:1;b:2;");

        let code = "<% foreach ($xs as $i => $x) { echo $i ~ '=' ~ $x ~ ' '; } %>";
        assert_eq!(run(code, json!({"xs": ["p", "q"]})).unwrap(), "0=p 1=q ");
    }

    #[test]
    fn test_loop_variables_persist() {
        let code = "<% foreach ($xs as $x) { } echo $x; %>";
        assert_eq!(run(code, json!({"xs": [1, 2, 3]})).unwrap(), "3");
    }

    #[test]
    fn test_foreach_over_null_and_scalar() {
        let code = "<% foreach ($xs as $x) { echo $x; } %>done";
        assert_eq!(run(code, json!({})).unwrap(), "done");
        let err = run(code, json!({"xs": 7})).unwrap_err();
        assert!(matches!(err, RenderError::Runtime(msg) if msg.contains("iterate")));
    }

    #[test]
    fn test_assignment_and_raw_code() {
        let code = "<% $total = 0; foreach ($xs as $x) { $total = $total + $x; } echo $total; %>";
        assert_eq!(run(code, json!({"xs": [1, 2, 3]})).unwrap(), "6");
    }

    #[test]
    fn test_comments_produce_nothing() {
        assert_eq!(run("a<% /*note*/ %>b", json!({})).unwrap(), "ab");
    }

    #[test]
    fn test_syntax_error_surfaces() {
        let err = run("<% if ($a) { %>open", json!({})).unwrap_err();
        assert!(matches!(err, RenderError::Syntax { .. }));
    }

    #[test]
    fn test_sub_config_same_base_keeps_parent_settings() {
        let parent = EngineConfig::new("/srv/tpl")
            .with_delimiters("<{", "}>")
            .unwrap();
        let config = sub_config(&parent, "/srv/tpl", "/tmp/c", false);
        assert_eq!(config.delimiters, parent.delimiters);
        assert_eq!(config.source_dir, parent.source_dir);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/c"));
        assert!(!config.use_cache);
    }

    #[test]
    fn test_sub_config_other_base() {
        let parent = EngineConfig::new("/srv/tpl")
            .with_delimiters("<{", "}>")
            .unwrap();
        let config = sub_config(&parent, "/srv/other", "", true);
        assert_eq!(config.source_dir, PathBuf::from("/srv/other/src"));
        assert_eq!(config.cache_dir, PathBuf::from("/srv/other/dist"));
        assert_eq!(config.delimiters, parent.delimiters);
    }
}
