//! The structural tag pipeline.
//!
//! Compilation is a fixed sequence of rewriting stages over one working
//! buffer. Each stage matches its tag family and replaces every occurrence
//! with generated directives, captured state, or nothing. Later stages see
//! the output of earlier ones, so the order is part of the semantics:
//!
//! | # | Stage | Tag |
//! |---|-------|-----|
//! | 1 | static include (to fixpoint) | `{include name}` |
//! | 2 | marker protection | literal `<%` and `%>` |
//! | 3 | dynamic template | `{template name}` |
//! | 4 | registered [`TagExtension`]s | |
//! | 5 | variable output | `{$expr}` |
//! | 6 | escaped variable output | `{text $expr}` |
//! | 7 | raw code | `{php}code{/php}` |
//! | 8 | block capture and display | `{block n}…{/block}`, `{display_block n}` |
//! | 9 | comment | `{info text}` |
//! | 10 | conditionals and closers | `{if e}`, `{elseif e}`, `{else}`, `{/if}`, `{/loop}` |
//! | 11 | loop | `{loop e $v}`, `{loop e $k $v}` |
//! | 12 | build stamp | `{build_time}` |
//! | 13 | unescape | `{!}{…}` |
//! | 14 | directive merge | |
//!
//! Every stage except unescape skips tags preceded by the escape marker, so an
//! escaped tag reaches stage 13 untouched and ends up as literal text.
//!
//! Marker protection doubles the `%` of any directive marker already in the
//! text (see [`crate::directive::protect`]). Text with no tags and no `<%` or
//! `%>` compiles to itself byte for byte; text containing those markers
//! compiles to its protected form and still renders unchanged.
//!
//! The pipeline never validates expressions or tag balance; `{/if}` and
//! `{/loop}` both compile to the same block terminator.

mod blocks;
mod include;
mod stages;

use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{CompileError, Result};
use crate::extension::TagExtension;
use crate::pattern::PatternBuilder;

pub use blocks::BlockTable;
pub use include::MAX_INCLUDE_PASSES;

/// A stage rewrites the buffer and reports how many tags it handled.
type Stage = fn(&mut String, &Pipeline<'_>) -> Result<usize>;

const LEADING_STAGES: &[(&str, Stage)] = &[
    ("include", include::inline_static),
    ("protect", stages::protect_markers),
    ("template", include::dynamic_templates),
];

const TRAILING_STAGES: &[(&str, Stage)] = &[
    ("variable", stages::variables),
    ("text", stages::escaped_variables),
    ("php", stages::raw_code),
    ("block", blocks::capture_and_display),
    ("info", stages::comments),
    ("balance", stages::check_balance),
    ("if", stages::open_if),
    ("elseif", stages::open_elseif),
    ("else", stages::open_else),
    ("end", stages::close_blocks),
    ("loop", stages::loops),
    ("build_time", stages::build_time),
    ("unescape", stages::unescape),
    ("merge", stages::merge_directives),
];

/// One compile run over a working buffer.
pub struct Pipeline<'a> {
    config: &'a EngineConfig,
    patterns: PatternBuilder,
    extensions: &'a [Arc<dyn TagExtension>],
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a EngineConfig, extensions: &'a [Arc<dyn TagExtension>]) -> Self {
        Self {
            config,
            patterns: PatternBuilder::new(&config.delimiters),
            extensions,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    pub fn patterns(&self) -> &PatternBuilder {
        &self.patterns
    }

    /// Runs every stage over `source` and returns the artifact text.
    pub fn run(&self, source: &str) -> Result<String> {
        let mut content = source.to_string();

        self.run_stages(LEADING_STAGES, &mut content)?;

        for extension in self.extensions {
            extension
                .apply(&mut content, &self.patterns)
                .map_err(|err| match err {
                    CompileError::Extension { .. } => err,
                    other => CompileError::Extension {
                        name: extension.name().to_string(),
                        message: other.to_string(),
                    },
                })?;
            debug!(extension = extension.name(), "applied tag extension");
        }

        self.run_stages(TRAILING_STAGES, &mut content)?;
        Ok(content)
    }

    fn run_stages(&self, stages: &[(&str, Stage)], content: &mut String) -> Result<()> {
        for (name, stage) in stages {
            let handled = stage(content, self)?;
            if handled > 0 {
                debug!(stage = *name, handled, "applied stage");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> String {
        let config = EngineConfig::new("/nonexistent");
        Pipeline::new(&config, &[]).run(source).unwrap()
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        let source = "<html>\n  <p>No tags { here } at all.</p>\n</html>\n";
        assert_eq!(compile(source), source);
    }

    #[test]
    fn test_literal_markers_are_protected() {
        assert_eq!(compile("a %> <% b"), "a %%> <%% b");
        assert_eq!(compile("{$x} %> <% {$y}"), "<% echo $x; %> %%> <%% <% echo $y; %>");
    }

    #[test]
    fn test_raw_code_keeps_its_markers() {
        assert_eq!(compile("{php}echo '<%';{/php}"), "<% echo '<%'; %>");
    }

    #[test]
    fn test_variable_output() {
        assert_eq!(compile("Hi {$name}!"), "Hi <% echo $name; %>!");
    }

    #[test]
    fn test_escaped_variable_output() {
        assert_eq!(compile("{text $bio}"), "<% echo escape($bio); %>");
    }

    #[test]
    fn test_escape_marker_keeps_tag_literal() {
        assert_eq!(compile("{!}{$x}"), "{$x}");
        assert_eq!(compile("{!}{if $a}{$b}"), "{if $a}<% echo $b; %>");
    }

    #[test]
    fn test_conditional_chain() {
        let out = compile("{if $a}A{elseif $b}B{else}C{/if}");
        assert_eq!(
            out,
            "<% if ($a) { %>A<% } elseif ($b) { %>B<% } else { %>C<% } %>"
        );
    }

    #[test]
    fn test_loop_forms() {
        assert_eq!(
            compile("{loop $items $item}x{/loop}"),
            "<% foreach ($items as $item) { %>x<% } %>"
        );
        assert_eq!(
            compile("{loop $map $k $v}x{/loop}"),
            "<% foreach ($map as $k => $v) { %>x<% } %>"
        );
    }

    #[test]
    fn test_adjacent_directives_merge() {
        let out = compile("{loop $arr $k $v}{$k}:{$v};{/loop}");
        assert_eq!(
            out,
            "<% foreach ($arr as $k => $v) {  echo $k; %>:<% echo $v; %>;<% } %>"
        );
    }

    #[test]
    fn test_merge_keeps_whitespace_between_directives() {
        let out = compile("{if $a}\n  {$b}\n{/if}");
        assert_eq!(out, "<% if ($a) { \n   echo $b; \n } %>");
    }

    #[test]
    fn test_comment_and_raw_code() {
        assert_eq!(compile("{info todo list}"), "<% /*todo list*/ %>");
        assert_eq!(compile("{php}$x = 1;{/php}"), "<% $x = 1; %>");
    }

    #[test]
    fn test_closers_are_interchangeable() {
        assert_eq!(compile("{if $a}x{/loop}"), "<% if ($a) { %>x<% } %>");
    }

    #[test]
    fn test_custom_delimiters() {
        let config = EngineConfig::new("/nonexistent")
            .with_delimiters("<{", "}>")
            .unwrap();
        let out = Pipeline::new(&config, &[])
            .run("{$plain} <{$x}>-<{if $y}>y<{/if}>")
            .unwrap();
        assert_eq!(out, "{$plain} <% echo $x; %>-<% if ($y) { %>y<% } %>");
    }

    #[test]
    fn test_build_time_stamp() {
        let out = compile("{build_time}");
        assert!(out.starts_with("<% /*compiled at "));
        assert!(out.ends_with("*/ %>"));
    }

    struct Shout;

    impl TagExtension for Shout {
        fn name(&self) -> &str {
            "shout"
        }

        fn apply(&self, content: &mut String, patterns: &PatternBuilder) -> Result<()> {
            let tag = patterns.tag(r"shout\s+(.+?)")?;
            *content = tag.replace_all(content, |caps| caps[1].to_uppercase());
            Ok(())
        }
    }

    #[test]
    fn test_extension_runs_before_builtin_stages() {
        let config = EngineConfig::new("/nonexistent");
        let extensions: Vec<Arc<dyn TagExtension>> = vec![Arc::new(Shout)];
        let out = Pipeline::new(&config, &extensions)
            .run("{shout hello} {!}{shout quiet}")
            .unwrap();
        assert_eq!(out, "HELLO {shout quiet}");
    }

    struct Failing;

    impl TagExtension for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn apply(&self, _content: &mut String, _patterns: &PatternBuilder) -> Result<()> {
            Err(CompileError::Config("bad".to_string()))
        }
    }

    #[test]
    fn test_extension_errors_are_named() {
        let config = EngineConfig::new("/nonexistent");
        let extensions: Vec<Arc<dyn TagExtension>> = vec![Arc::new(Failing)];
        let err = Pipeline::new(&config, &extensions).run("x").unwrap_err();
        match err {
            CompileError::Extension { name, message } => {
                assert_eq!(name, "failing");
                assert!(message.contains("bad"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
