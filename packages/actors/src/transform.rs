//! Transform trait and registry.

use batch_core::{ResultPayload, SourceFile};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Message recorded when a transform fails without saying why.
pub const FALLBACK_ERROR_MESSAGE: &str = "Processing failed";

/// Failure of a single transform call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", self.message())]
pub struct TransformError {
    message: Option<String>,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            message: (!message.trim().is_empty()).then_some(message),
        }
    }

    /// A failure that carries no message.
    pub fn unknown() -> Self {
        Self { message: None }
    }

    /// Wrap any error, keeping its display text.
    pub fn from_error(err: impl std::fmt::Display) -> Self {
        Self::new(err.to_string())
    }

    /// The failure message, or [`FALLBACK_ERROR_MESSAGE`].
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or(FALLBACK_ERROR_MESSAGE)
    }
}

impl From<String> for TransformError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for TransformError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result type for transforms.
pub type TransformResult = Result<ResultPayload, TransformError>;

/// Future type for async transforms.
pub type TransformFuture = Pin<Box<dyn Future<Output = TransformResult> + Send>>;

/// Operation converting one input file into one output payload.
///
/// Implement this trait to plug a concrete conversion into the pipeline.
pub trait Transform: Send + Sync + 'static {
    /// Name the transform is registered under.
    fn name(&self) -> &str;

    /// Process one file.
    fn transform(&self, source: &SourceFile) -> TransformFuture;
}

impl std::fmt::Debug for dyn Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name())
            .finish()
    }
}

/// A transform name that is not registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transform '{name}' (available: {})", .available.join(", "))]
pub struct UnknownTransform {
    pub name: String,
    pub available: Vec<String>,
}

/// Transforms selectable by name, kept in name order.
#[derive(Default, Clone)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform under its own name, replacing any previous one.
    pub fn register<T: Transform>(&mut self, transform: T) {
        let name = transform.name().to_string();
        self.transforms.insert(name, Arc::new(transform));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<T: Transform>(mut self, transform: T) -> Self {
        self.register(transform);
        self
    }

    /// Look a transform up by the name a user typed.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Transform>, UnknownTransform> {
        self.transforms
            .get(name.trim())
            .cloned()
            .ok_or_else(|| UnknownTransform {
                name: name.to_string(),
                available: self.names().into_iter().map(str::to_string).collect(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.transforms.keys().map(String::as_str).collect()
    }
}

/// A transform backed by a closure.
pub struct FnTransform<F>
where
    F: Fn(&SourceFile) -> TransformFuture + Send + Sync + 'static,
{
    name: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&SourceFile) -> TransformFuture + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&SourceFile) -> TransformFuture + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, source: &SourceFile) -> TransformFuture {
        (self.func)(source)
    }
}

/// Build a [`FnTransform`] from an async body over an owned source.
///
/// ```ignore
/// let upper = transform!("uppercase-name", |source| {
///     Ok(ResultPayload::named(source.name.to_uppercase(), source.content))
/// });
/// ```
#[macro_export]
macro_rules! transform {
    ($name:expr, |$source:ident| $body:expr) => {
        $crate::FnTransform::new($name, |$source: &$crate::SourceFile| {
            let $source = $source.clone();
            ::std::boxed::Box::pin(async move { $body })
        })
    };
}
