//! Extra tag families.
//!
//! A [`TagExtension`] runs after include resolution and before the built-in
//! output, block, and control-flow stages. That position matters for blocks:
//! an extension that injects `{block name}…{/block}` text takes part in the
//! same block table as the template's own definitions, and because later
//! definitions win, it can override them by appending.
//!
//! ```rust
//! use tagsmith::{CompileError, PatternBuilder, TagExtension};
//!
//! /// `{year}` becomes a fixed year literal.
//! struct Year;
//!
//! impl TagExtension for Year {
//!     fn name(&self) -> &str {
//!         "year"
//!     }
//!
//!     fn apply(&self, content: &mut String, patterns: &PatternBuilder) -> Result<(), CompileError> {
//!         let tag = patterns.tag("year")?;
//!         *content = tag.replace_all(content, |_| "2024".to_string());
//!         Ok(())
//!     }
//! }
//! ```

use crate::error::CompileError;
use crate::pattern::PatternBuilder;

/// A pipeline stage contributed from outside the crate.
pub trait TagExtension: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Rewrites the working buffer. `patterns` uses the engine's delimiters
    /// and honours the escape marker.
    fn apply(&self, content: &mut String, patterns: &PatternBuilder) -> Result<(), CompileError>;
}
