//! Template inclusion.
//!
//! Static includes (`{include name}`) are inlined at compile time: the tag is
//! replaced by the named template's raw source, and the buffer is rescanned
//! until no include tag remains, which resolves nested includes. The inlined
//! text is compiled as part of the including template.
//!
//! Dynamic templates (`{template name}`) are left to render time: the tag
//! becomes a directive that builds an engine with the same roots and cache
//! policy, and executes that template's own cached artifact.

use super::Pipeline;
use crate::directive;
use crate::error::{CompileError, Result};
use crate::store;

/// Upper bound on rescans of the buffer for nested includes.
pub const MAX_INCLUDE_PASSES: usize = 64;

pub(super) fn inline_static(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag(r"include\s+(.+?)")?;
    let config = pipeline.config();
    let mut inlined = 0;
    let mut passes = 0;

    while let Some(caps) = pattern.captures(content) {
        if passes == MAX_INCLUDE_PASSES {
            return Err(CompileError::IncludeCycle {
                name: caps[1].trim().to_string(),
                limit: MAX_INCLUDE_PASSES,
            });
        }
        *content = pattern.try_replace_all(content, |caps| {
            inlined += 1;
            store::read_text(&config.source_path(caps[1].trim()))
        })?;
        passes += 1;
    }

    Ok(inlined)
}

pub(super) fn dynamic_templates(content: &mut String, pipeline: &Pipeline<'_>) -> Result<usize> {
    let pattern = pipeline.patterns().tag(r"template\s+(.+?)")?;
    let config = pipeline.config();
    let mut count = 0;
    let replaced = pattern.replace_all(content, |caps| {
        count += 1;
        directive::include_template(config, &caps[1])
    });
    if count > 0 {
        *content = replaced;
    }
    Ok(count)
}
