//! # tagsmith
//!
//! A template compiler that turns tag-annotated text into executable
//! directives and keeps the result in a persistent artifact cache.
//!
//! Templates are plain text with tags between a configurable delimiter pair
//! (`{` and `}` by default):
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `{$expr}` | output a value |
//! | `{text $expr}` | output a value, HTML-escaped |
//! | `{if e}` `{elseif e}` `{else}` `{/if}` | conditionals |
//! | `{loop e $v}` `{loop e $k $v}` `{/loop}` | iteration |
//! | `{include name}` | inline another template's source at compile time |
//! | `{template name}` | render another template's artifact at render time |
//! | `{block n}…{/block}` `{display_block n}` | named blocks, last definition wins |
//! | `{php}code{/php}` | raw directive code |
//! | `{info text}` | comment |
//! | `{build_time}` | compile timestamp comment |
//! | `{!}{tag}` | the literal text `{tag}` |
//!
//! Compilation is a fixed sequence of regex rewriting stages (see
//! [`pipeline`]); it does not parse expressions or check tag balance. A
//! compiled artifact is written to the cache directory and reused until it is
//! deleted, unless caching is turned off (see [`cache`]).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use tagsmith::{Engine, EngineConfig};
//!
//! // templates/src/hello.tpl: "Hello, {text $name}!"
//! let engine = Engine::new(EngineConfig::new("templates")).with_template("hello");
//! assert_eq!(engine.render(&json!({"name": "<world>"}))?, "Hello, &lt;world&gt;!");
//! # Ok::<(), tagsmith::RenderError>(())
//! ```
//!
//! Compiled artifacts are run by the [`runtime`] module, a small interpreter
//! for the directive language.

pub mod cache;
pub mod config;
pub mod directive;
mod engine;
mod error;
mod extension;
pub mod pattern;
pub mod pipeline;
pub mod runtime;
pub mod store;

// Re-export public API
pub use cache::GateOutcome;
pub use config::{Delimiters, EngineConfig};
pub use engine::{Engine, LAYOUT_CONTENT_MARKER};
pub use error::{CompileError, RenderError, Result};
pub use extension::TagExtension;
pub use pattern::{PatternBuilder, TagPattern, ESCAPE_MARKER};
pub use pipeline::{BlockTable, Pipeline, MAX_INCLUDE_PASSES};
pub use runtime::{Runtime, Scope, MAX_INCLUDE_DEPTH};
