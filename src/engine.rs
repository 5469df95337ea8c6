//! The seam between the bridge and the embedded script runtime.
//!
//! The interpreter itself is an external dependency. The bridge drives it
//! through the [`ScriptEngine`] trait and never assumes anything about its
//! internals beyond this surface.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

/// Failure reported by the embedded runtime.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
    #[error("module not found: {0}")]
    ModuleNotFound(String),
    #[error("function not found: {0}")]
    FunctionNotFound(String),
    #[error("failed to load module {module}: {reason}")]
    LoadFailed { module: String, reason: String },
    #[error("arity mismatch calling {function}: expected {expected}, got {got}")]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },
    #[error("script raised: {0}")]
    Raised(String),
}

/// The loading context a function handle must be resolved in.
///
/// Hosts with plugin systems may keep several isolated resolution scopes.
/// The hint is captured once at bootstrap and reused for every later
/// resolution; the bridge never trusts an ambient or thread-local default.
#[derive(Clone, Default)]
pub struct ContextHint {
    label: String,
    loader: Option<Arc<dyn Any + Send + Sync>>,
}

impl ContextHint {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            loader: None,
        }
    }

    /// Attach the host's opaque loader handle for the engine to resolve
    /// symbols through.
    pub fn with_loader(mut self, loader: Arc<dyn Any + Send + Sync>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn loader(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.loader.as_ref()
    }
}

impl fmt::Debug for ContextHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHint")
            .field("label", &self.label)
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

/// The argument count a resolved function accepts, reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Variadic { min: usize },
}

impl Arity {
    pub fn accepts(&self, argc: usize) -> bool {
        match self {
            Arity::Exact(n) => argc == *n,
            Arity::Variadic { min } => argc >= *min,
        }
    }
}

/// An opaque, invocable reference to a resolved script function.
///
/// Cheap to clone and reuse; the engine that produced it is the only party
/// that can interpret the raw payload.
#[derive(Clone)]
pub struct FnHandle {
    raw: Arc<dyn Any + Send + Sync>,
    arity: Arity,
}

impl FnHandle {
    pub fn new(raw: impl Any + Send + Sync, arity: Arity) -> Self {
        Self {
            raw: Arc::new(raw),
            arity,
        }
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Downcast the raw payload back to the engine's concrete handle type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.raw.downcast_ref::<T>()
    }
}

impl fmt::Debug for FnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandle").field("arity", &self.arity).finish()
    }
}

/// Driver interface for the embedded script runtime.
///
/// Implementations must be safe to call from any host thread. `load_module`
/// must be idempotent, and `bootstrap` must verify operability by resolving
/// one known built-in symbol before reporting success.
///
/// Engine methods must not call back into the bridge for the module being
/// loaded; module loading is serialized per module.
pub trait ScriptEngine: Send + Sync {
    /// Start the interpreter inside the given loading context.
    fn bootstrap(&self, hint: &ContextHint) -> Result<(), EngineError>;

    /// Load a module by id (idempotent).
    fn load_module(&self, module: &str) -> Result<(), EngineError>;

    /// Resolve a function in a loaded module to an invocable handle.
    fn resolve(&self, module: &str, function: &str) -> Result<FnHandle, EngineError>;

    /// Invoke a resolved handle. Arity is checked here, against the live
    /// target, not by the caller.
    fn call(&self, handle: &FnHandle, args: &[Value]) -> Result<Value, EngineError>;

    /// Read the current value of a module-level binding.
    fn lookup(&self, module: &str, symbol: &str) -> Result<Value, EngineError>;

    /// File extensions the engine recognises as script source, without the
    /// leading dot. Used by the hot-reload watcher to filter changes.
    fn source_extensions(&self) -> &'static [&'static str];
}
