//! Pluggable serialization and template rendering.
//!
//! The context does not link a codec or a template engine. Handlers that call
//! [`Context::json`], [`Context::body_as_object`] or [`Context::render`] rely
//! on a [`Capabilities`] table built at startup and shared by every exchange.
//! A missing entry is reported as [`ContextError::MissingCapability`] at the
//! point of use.
//!
//! ```rust
//! use http_context::{BoxError, Capabilities, EngineKind};
//! use serde_json::Value;
//!
//! let capabilities = Capabilities::builder()
//!     .template_engine(EngineKind::MiniJinja, |path: &str, _model: &Value| {
//!         Ok::<_, BoxError>(format!("<p>{path}</p>"))
//!     })
//!     .build();
//!
//! assert!(capabilities.has_template_engine(EngineKind::MiniJinja));
//! assert!(!capabilities.has_template_engine(EngineKind::Tera));
//! ```
//!
//! [`Context::json`]: crate::Context::json
//! [`Context::body_as_object`]: crate::Context::body_as_object
//! [`Context::render`]: crate::Context::render
//! [`ContextError::MissingCapability`]: crate::ContextError::MissingCapability
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::BoxError;

/// Converts structured values to and from text.
pub trait Serializer: Send + Sync + 'static {
    /// Renders `value` as text.
    fn to_text(&self, value: &Value) -> Result<String, BoxError>;

    /// Parses `text` into a structured value.
    fn from_text(&self, text: &str) -> Result<Value, BoxError>;
}

/// Renders a template at `path` against `model`.
pub trait TemplateEngine: Send + Sync + 'static {
    /// Produces the rendered document.
    fn render(&self, path: &str, model: &Value) -> Result<String, BoxError>;
}

impl<F, E> TemplateEngine for F
where
    F: Fn(&str, &Value) -> Result<String, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    fn render(&self, path: &str, model: &Value) -> Result<String, BoxError> {
        self(path, model).map_err(Into::into)
    }
}

/// Selects which registered template engine renders a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EngineKind {
    /// Jinja2-style templates.
    MiniJinja,
    /// Tera templates.
    Tera,
    /// Handlebars templates.
    Handlebars,
    /// Mustache templates.
    Mustache,
}

impl EngineKind {
    /// Lowercase name used in diagnostics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MiniJinja => "minijinja",
            Self::Tera => "tera",
            Self::Handlebars => "handlebars",
            Self::Mustache => "mustache",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names a capability in [`ContextError::MissingCapability`](crate::ContextError::MissingCapability).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The structured serializer.
    Serializer,
    /// A template engine.
    TemplateEngine(EngineKind),
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serializer => f.write_str("serializer"),
            Self::TemplateEngine(kind) => write!(f, "`{kind}` template engine"),
        }
    }
}

/// [`Serializer`] backed by `serde_json`.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

#[cfg(feature = "json")]
impl Serializer for JsonSerializer {
    fn to_text(&self, value: &Value) -> Result<String, BoxError> {
        Ok(serde_json::to_string(value)?)
    }

    fn from_text(&self, text: &str) -> Result<Value, BoxError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Registry of optional capabilities, injected into every [`Context`](crate::Context).
#[derive(Default, Clone)]
pub struct Capabilities {
    serializer: Option<Arc<dyn Serializer>>,
    engines: HashMap<EngineKind, Arc<dyn TemplateEngine>>,
}

impl Capabilities {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table behind an `Arc`, ready to hand to contexts.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// A table with [`JsonSerializer`] registered.
    #[cfg(feature = "json")]
    pub fn json() -> Self {
        Self::builder().serializer(JsonSerializer).build()
    }

    /// Starts a builder.
    pub fn builder() -> CapabilitiesBuilder {
        CapabilitiesBuilder {
            inner: Self::default(),
        }
    }

    /// The registered serializer.
    pub fn serializer(&self) -> Option<&dyn Serializer> {
        self.serializer.as_deref()
    }

    /// Whether a serializer is registered.
    pub fn has_serializer(&self) -> bool {
        self.serializer.is_some()
    }

    /// The engine registered for `kind`.
    pub fn template_engine(&self, kind: EngineKind) -> Option<&dyn TemplateEngine> {
        self.engines.get(&kind).map(|engine| engine.as_ref())
    }

    /// Whether an engine is registered for `kind`.
    pub fn has_template_engine(&self, kind: EngineKind) -> bool {
        self.engines.contains_key(&kind)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut engines: Vec<_> = self.engines.keys().map(EngineKind::as_str).collect();
        engines.sort_unstable();
        f.debug_struct("Capabilities")
            .field("serializer", &self.has_serializer())
            .field("engines", &engines)
            .finish()
    }
}

/// Builder for [`Capabilities`].
#[derive(Debug)]
pub struct CapabilitiesBuilder {
    inner: Capabilities,
}

impl CapabilitiesBuilder {
    /// Registers the serializer, replacing any previous one.
    pub fn serializer(mut self, serializer: impl Serializer) -> Self {
        self.inner.serializer = Some(Arc::new(serializer));
        self
    }

    /// Registers `engine` under `kind`, replacing any previous one.
    pub fn template_engine(mut self, kind: EngineKind, engine: impl TemplateEngine) -> Self {
        self.inner.engines.insert(kind, Arc::new(engine));
        self
    }

    /// Finishes the table.
    pub fn build(self) -> Capabilities {
        self.inner
    }

    /// Finishes the table behind an `Arc`.
    pub fn shared(self) -> Arc<Capabilities> {
        Arc::new(self.inner)
    }
}
