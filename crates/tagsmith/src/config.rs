//! Engine configuration.
//!
//! An [`EngineConfig`] fixes where template sources, layouts, and compiled
//! artifacts live, whether existing artifacts are reused, and which delimiter
//! pair marks a tag. It is built in code with the `with_*` methods or loaded
//! from YAML:
//!
//! ```yaml
//! base_dir: ./templates
//! cache_dir: /var/cache/site   # default: <base_dir>/dist
//! use_cache: false             # default: true
//! delimiters:
//!   start: "<{"
//!   end: "}>"
//! ```
//!
//! Omitted directories default to subdirectories of `base_dir`: `src` for
//! sources, `dist` for artifacts, and `layout` for layouts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};

/// Default content type handed to the response-header collaborator.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=UTF-8";

/// Default suffix of template source and layout files.
pub const DEFAULT_SOURCE_SUFFIX: &str = ".tpl";

/// Default suffix of compiled artifacts.
pub const DEFAULT_ARTIFACT_SUFFIX: &str = ".tsc";

/// The literal start/end markers bounding a tag.
///
/// Both markers must be non-empty and free of `%`, which compiled artifacts
/// reserve for their directive markers. Every constructor, including YAML
/// loading, goes through [`Delimiters::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DelimiterPair")]
pub struct Delimiters {
    start: String,
    end: String,
}

#[derive(Deserialize)]
struct DelimiterPair {
    start: String,
    end: String,
}

impl Delimiters {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Result<Self> {
        let (start, end) = (start.into(), end.into());
        if start.is_empty() || end.is_empty() {
            return Err(CompileError::Config(
                "delimiters must not be empty".to_string(),
            ));
        }
        if start.contains('%') || end.contains('%') {
            return Err(CompileError::Config(format!(
                "delimiters must not contain '%': {start:?} {end:?}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn end(&self) -> &str {
        &self.end
    }
}

impl TryFrom<DelimiterPair> for Delimiters {
    type Error = CompileError;

    fn try_from(pair: DelimiterPair) -> Result<Self> {
        Self::new(pair.start, pair.end)
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            start: "{".to_string(),
            end: "}".to_string(),
        }
    }
}

/// Configuration shared by an engine and every sub-engine it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    pub base_dir: PathBuf,
    pub source_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub layout_dir: PathBuf,
    /// Reuse an existing artifact instead of recompiling.
    pub use_cache: bool,
    pub content_type: String,
    pub delimiters: Delimiters,
    pub source_suffix: String,
    pub artifact_suffix: String,
}

/// On-disk form of the configuration; every field but `base_dir` is optional.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_dir: PathBuf,
    source_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    layout_dir: Option<PathBuf>,
    use_cache: Option<bool>,
    content_type: Option<String>,
    delimiters: Option<Delimiters>,
    source_suffix: Option<String>,
    artifact_suffix: Option<String>,
}

impl EngineConfig {
    /// Creates a configuration rooted at `base_dir` with all defaults.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            source_dir: base_dir.join("src"),
            cache_dir: base_dir.join("dist"),
            layout_dir: base_dir.join("layout"),
            base_dir,
            use_cache: true,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            delimiters: Delimiters::default(),
            source_suffix: DEFAULT_SOURCE_SUFFIX.to_string(),
            artifact_suffix: DEFAULT_ARTIFACT_SUFFIX.to_string(),
        }
    }

    /// Moves the configuration to `base_dir`. Directories still at their
    /// defaults follow the new base; explicitly set ones are kept.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let old = EngineConfig::new(self.base_dir.clone());
        let new = EngineConfig::new(base_dir.clone());
        if self.source_dir == old.source_dir {
            self.source_dir = new.source_dir;
        }
        if self.cache_dir == old.cache_dir {
            self.cache_dir = new.cache_dir;
        }
        if self.layout_dir == old.layout_dir {
            self.layout_dir = new.layout_dir;
        }
        self.base_dir = base_dir;
        self
    }

    /// Overrides the artifact directory. An empty path keeps the default.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        if !cache_dir.as_os_str().is_empty() {
            self.cache_dir = cache_dir;
        }
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Replaces the tag delimiters; fails on a pair [`Delimiters::new`]
    /// rejects.
    pub fn with_delimiters(
        mut self,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Result<Self> {
        self.delimiters = Delimiters::new(start, end)?;
        Ok(self)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_source_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.source_suffix = suffix.into();
        self
    }

    pub fn with_artifact_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.artifact_suffix = suffix.into();
        self
    }

    /// Parses a YAML configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml)?;
        let mut config = EngineConfig::new(file.base_dir);
        if let Some(dir) = file.source_dir {
            config.source_dir = dir;
        }
        if let Some(dir) = file.cache_dir {
            config = config.with_cache_dir(dir);
        }
        if let Some(dir) = file.layout_dir {
            config.layout_dir = dir;
        }
        if let Some(use_cache) = file.use_cache {
            config.use_cache = use_cache;
        }
        if let Some(content_type) = file.content_type {
            config.content_type = content_type;
        }
        if let Some(delimiters) = file.delimiters {
            config.delimiters = delimiters;
        }
        if let Some(suffix) = file.source_suffix {
            config.source_suffix = suffix;
        }
        if let Some(suffix) = file.artifact_suffix {
            config.artifact_suffix = suffix;
        }
        Ok(config)
    }

    /// Reads and parses a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| CompileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Location of the source file for a logical template name.
    pub fn source_path(&self, name: &str) -> PathBuf {
        suffixed(&self.source_dir, name, &self.source_suffix)
    }

    /// Location of the compiled artifact for a logical template name.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        suffixed(&self.cache_dir, name, &self.artifact_suffix)
    }

    /// Location of a layout file.
    pub fn layout_path(&self, layout: &str) -> PathBuf {
        suffixed(&self.layout_dir, layout, &self.source_suffix)
    }
}

// Names may be hierarchical ("area/page"), so the suffix is appended to the
// joined path rather than set as an extension.
fn suffixed(dir: &Path, name: &str, suffix: &str) -> PathBuf {
    let mut path = dir.join(name).into_os_string();
    path.push(suffix);
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_derive_from_base() {
        let config = EngineConfig::new("/srv/tpl");
        assert_eq!(config.source_dir, PathBuf::from("/srv/tpl/src"));
        assert_eq!(config.cache_dir, PathBuf::from("/srv/tpl/dist"));
        assert_eq!(config.layout_dir, PathBuf::from("/srv/tpl/layout"));
        assert!(config.use_cache);
        assert_eq!(config.delimiters, Delimiters::new("{", "}").unwrap());
        assert_eq!(config.content_type, DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn test_empty_cache_dir_keeps_default() {
        let config = EngineConfig::new("/srv/tpl").with_cache_dir("");
        assert_eq!(config.cache_dir, PathBuf::from("/srv/tpl/dist"));

        let config = EngineConfig::new("/srv/tpl").with_cache_dir("/tmp/out");
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_hierarchical_names_map_to_paths() {
        let config = EngineConfig::new("/srv/tpl");
        assert_eq!(
            config.source_path("mobile/header"),
            PathBuf::from("/srv/tpl/src/mobile/header.tpl")
        );
        assert_eq!(
            config.artifact_path("mobile/header"),
            PathBuf::from("/srv/tpl/dist/mobile/header.tsc")
        );
        assert_eq!(
            config.layout_path("main"),
            PathBuf::from("/srv/tpl/layout/main.tpl")
        );
    }

    #[test]
    fn test_dotted_name_keeps_suffix_appended() {
        let config = EngineConfig::new("/srv/tpl");
        assert_eq!(
            config.source_path("v1.2/page"),
            PathBuf::from("/srv/tpl/src/v1.2/page.tpl")
        );
        assert_eq!(
            config.source_path("page.v2"),
            PathBuf::from("/srv/tpl/src/page.v2.tpl")
        );
    }

    #[test]
    fn test_from_yaml_minimal() {
        let config = EngineConfig::from_yaml("base_dir: /srv/tpl\n").unwrap();
        assert_eq!(config, EngineConfig::new("/srv/tpl"));
    }

    #[test]
    fn test_from_yaml_overrides() {
        let yaml = r#"
base_dir: /srv/tpl
cache_dir: /var/cache/tpl
use_cache: false
content_type: "text/plain"
delimiters:
  start: "<{"
  end: "}>"
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/tpl"));
        assert!(!config.use_cache);
        assert_eq!(config.content_type, "text/plain");
        assert_eq!(config.delimiters, Delimiters::new("<{", "}>").unwrap());
        assert_eq!(config.source_dir, PathBuf::from("/srv/tpl/src"));
    }

    #[test]
    fn test_from_yaml_rejects_unknown_fields() {
        let result = EngineConfig::from_yaml("base_dir: /x\nuse_cahce: true\n");
        assert!(matches!(result, Err(CompileError::Config(_))));
    }

    #[test]
    fn test_from_yaml_rejects_empty_delimiters() {
        let yaml = "base_dir: /x\ndelimiters:\n  start: \"\"\n  end: \"}\"\n";
        let result = EngineConfig::from_yaml(yaml);
        assert!(matches!(result, Err(CompileError::Config(msg)) if msg.contains("empty")));
    }

    #[test]
    fn test_with_base_dir_moves_default_dirs_only() {
        let config = EngineConfig::new("/srv/a")
            .with_cache_dir("/var/cache/tpl")
            .with_base_dir("/srv/b");
        assert_eq!(config.base_dir, PathBuf::from("/srv/b"));
        assert_eq!(config.source_dir, PathBuf::from("/srv/b/src"));
        assert_eq!(config.layout_dir, PathBuf::from("/srv/b/layout"));
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/tpl"));
    }

    #[test]
    fn test_delimiters_are_validated_in_code() {
        assert!(matches!(
            EngineConfig::new("/x").with_delimiters("", ""),
            Err(CompileError::Config(msg)) if msg.contains("empty")
        ));
        assert!(matches!(
            Delimiters::new("<%", "%>"),
            Err(CompileError::Config(msg)) if msg.contains('%')
        ));

        let config = EngineConfig::new("/x").with_delimiters("[[", "]]").unwrap();
        assert_eq!(config.delimiters.start(), "[[");
        assert_eq!(config.delimiters.end(), "]]");
    }

    #[test]
    fn test_from_yaml_rejects_percent_delimiters() {
        let yaml = "base_dir: /x\ndelimiters:\n  start: \"{%\"\n  end: \"%}\"\n";
        let result = EngineConfig::from_yaml(yaml);
        assert!(matches!(result, Err(CompileError::Config(msg)) if msg.contains('%')));
    }
}
