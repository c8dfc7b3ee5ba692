//! The engine façade.
//!
//! An [`Engine`] binds one template identity (a logical name, optionally
//! wrapped in a layout) to an [`EngineConfig`], and exposes the compile and
//! render operations over it:
//!
//! - [`build`](Engine::build) always runs the pipeline and writes the artifact.
//! - [`target_path`](Engine::target_path) runs the cache gate and returns where
//!   the artifact lives.
//! - [`render`](Engine::render) goes through the gate and executes the
//!   artifact with the given bindings.
//!
//! ```rust,no_run
//! use serde_json::json;
//! use tagsmith::{Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::new("./templates"))
//!     .with_template("blog/post")
//!     .with_layout("main");
//! let html = engine.render(&json!({"title": "Hello"}))?;
//! # Ok::<(), tagsmith::RenderError>(())
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::cache::{self, GateOutcome};
use crate::config::EngineConfig;
use crate::error::{CompileError, RenderError, Result};
use crate::extension::TagExtension;
use crate::pipeline::Pipeline;
use crate::runtime::{Runtime, Scope};
use crate::store;

/// Marker in a layout that is replaced by the template source.
pub const LAYOUT_CONTENT_MARKER: &str = "{content}";

#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    extensions: Vec<Arc<dyn TagExtension>>,
    template: Option<String>,
    layout: Option<String>,
    params: Map<String, Value>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            extensions: Vec::new(),
            template: None,
            layout: None,
            params: Map::new(),
        }
    }

    /// Registers a tag extension. Extensions run in registration order.
    pub fn with_extension<E: TagExtension + 'static>(mut self, extension: E) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    pub fn with_extensions<I>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn TagExtension>>,
    {
        self.extensions.extend(extensions);
        self
    }

    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.set_template_name(name);
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.set_layout(layout);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_param(key, value);
        self
    }

    pub fn set_template_name(&mut self, name: impl Into<String>) {
        self.template = Some(name.into());
    }

    pub fn set_layout(&mut self, layout: impl Into<String>) {
        self.layout = Some(layout.into());
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.config.content_type = content_type.into();
    }

    /// Stores a binding used by every later render.
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.params.insert(key.into(), value.into());
    }

    /// Stores several bindings; later values replace earlier ones.
    pub fn add_params(&mut self, params: Map<String, Value>) {
        self.params.extend(params);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn extensions(&self) -> &[Arc<dyn TagExtension>] {
        &self.extensions
    }

    pub fn template_name(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn layout(&self) -> Option<&str> {
        self.layout.as_deref()
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn content_type(&self) -> &str {
        &self.config.content_type
    }

    fn name(&self) -> Result<&str> {
        self.template.as_deref().ok_or(CompileError::NoTemplate)
    }

    pub fn source_path(&self) -> Result<PathBuf> {
        Ok(self.config.source_path(self.name()?))
    }

    pub fn artifact_path(&self) -> Result<PathBuf> {
        Ok(self.config.artifact_path(self.name()?))
    }

    /// The layout file path, if a layout is set.
    pub fn layout_path(&self) -> Option<PathBuf> {
        self.layout
            .as_deref()
            .map(|layout| self.config.layout_path(layout))
    }

    /// The raw template text, merged into the layout if one is set.
    pub fn template_source(&self) -> Result<String> {
        let source = store::read_text(&self.source_path()?)?;
        match self.layout_path() {
            Some(layout) => Ok(store::read_text(&layout)?.replace(LAYOUT_CONTENT_MARKER, &source)),
            None => Ok(source),
        }
    }

    /// Runs the pipeline over arbitrary text without touching storage.
    pub fn compile_str(&self, source: &str) -> Result<String> {
        Pipeline::new(&self.config, &self.extensions).run(source)
    }

    /// Compiles the template source without persisting it.
    pub fn compile(&self) -> Result<String> {
        self.compile_str(&self.template_source()?)
    }

    /// Compiles and writes the artifact regardless of the cache policy.
    pub fn build(&self) -> Result<PathBuf> {
        let artifact = self.artifact_path()?;
        cache::ensure(false, &artifact, || self.compile())?;
        Ok(artifact)
    }

    /// Runs the cache gate and returns the artifact path.
    pub fn target_path(&self) -> Result<PathBuf> {
        Ok(self.ensure()?.0)
    }

    /// Runs the cache gate, reporting whether the artifact was rebuilt.
    pub fn ensure(&self) -> Result<(PathBuf, GateOutcome)> {
        let artifact = self.artifact_path()?;
        let outcome = cache::ensure(self.config.use_cache, &artifact, || self.compile())?;
        Ok((artifact, outcome))
    }

    /// Renders the template. `data` must serialize to an object (or null);
    /// its keys override stored parameters of the same name.
    pub fn render<T: Serialize + ?Sized>(&self, data: &T) -> std::result::Result<String, RenderError> {
        let mut scope = self.scope(data)?;
        let artifact = self.target_path()?;
        let code = store::read_text(&artifact)?;
        Runtime::new(self).execute(&code, &mut scope)
    }

    /// Renders the template into `writer`.
    ///
    /// Once rendering has succeeded, `header` receives the content type so the
    /// host can emit it ahead of the body. A failed render calls neither.
    pub fn display<T, W, H>(
        &self,
        data: &T,
        writer: &mut W,
        header: H,
    ) -> std::result::Result<(), RenderError>
    where
        T: Serialize + ?Sized,
        W: Write,
        H: FnOnce(&str),
    {
        let output = self.render(data)?;
        header(self.content_type());
        writer.write_all(output.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn scope<T: Serialize + ?Sized>(&self, data: &T) -> std::result::Result<Scope, RenderError> {
        let mut scope = self.params.clone();
        match serde_json::to_value(data)? {
            Value::Object(bindings) => scope.extend(bindings),
            Value::Null => {}
            other => {
                return Err(RenderError::Serialization(format!(
                    "template data must be an object, got {}",
                    crate::runtime::format_value(&other)
                )))
            }
        }
        Ok(scope)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let extensions: Vec<&str> = self.extensions.iter().map(|ext| ext.name()).collect();
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("extensions", &extensions)
            .field("template", &self.template)
            .field("layout", &self.layout)
            .field("params", &self.params)
            .finish()
    }
}
