//! Named blocks.
//!
//! `{block name}body{/block}` is cut out of the buffer and its body recorded
//! under `name`; `{display_block name}` is then replaced by the recorded body.
//! Bodies are captured after output and raw-code stages have run, so they
//! already hold directives rather than tag text. Redefining a name replaces
//! the earlier body, and displaying an unknown name yields nothing.

use std::collections::HashMap;

use super::Pipeline;
use crate::error::Result;
use crate::pattern::{PatternBuilder, BLOCK_NAME};

/// Block bodies captured during one compile.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockTable {
    blocks: HashMap<String, String>,
}

impl BlockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `body` under `name`, replacing any earlier definition.
    pub fn define(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.blocks.insert(name.into(), body.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.blocks.get(name).map(String::as_str)
    }

    /// The body for `name`, or the empty string if it was never defined.
    pub fn resolve(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Removes every block definition from `content` and records it.
    pub fn capture(content: &mut String, patterns: &PatternBuilder) -> Result<Self> {
        let inner = format!(
            r"block\s+({BLOCK_NAME}){}\s*(.*?)\s*{}/block",
            patterns.end(),
            patterns.start()
        );
        let pattern = patterns.tag(&inner)?;
        let mut table = BlockTable::new();
        *content = pattern.replace_all(content, |caps| {
            table.define(&caps[1], &caps[2]);
            String::new()
        });
        Ok(table)
    }

    /// Replaces every `display_block` reference with the recorded body.
    /// Returns the number of references replaced.
    pub fn display(&self, content: &mut String, patterns: &PatternBuilder) -> Result<usize> {
        let pattern = patterns.tag(&format!(r"display_block\s+({BLOCK_NAME})"))?;
        let mut count = 0;
        *content = pattern.replace_all(content, |caps| {
            count += 1;
            self.resolve(&caps[1]).to_string()
        });
        Ok(count)
    }
}

pub(super) fn capture_and_display(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let table = BlockTable::capture(content, pipeline.patterns())?;
    let displayed = table.display(content, pipeline.patterns())?;
    Ok(table.len() + displayed)
}
