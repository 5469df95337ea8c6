//! Runtime bootstrap and the resolved-call cache.
//!
//! `ScriptBridge` owns the embedded runtime behind its [`ScriptEngine`]
//! seam: it bootstraps it exactly once in the captured loading context,
//! resolves `(module, function)` references into invocable handles, caches
//! them for hot-path reuse, and invalidates them on demand (hot reload).
//!
//! The bridge is an owned, injectable object so tests can construct
//! independent instances; production keeps one process-wide instance behind
//! [`install_global`]/[`global`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, error, info};

use crate::engine::{ContextHint, EngineError, FnHandle, ScriptEngine};
use crate::error::BridgeError;
use crate::value::{CallArgs, Value};

static GLOBAL: OnceCell<Arc<ScriptBridge>> = OnceCell::new();

/// Install the process-wide bridge instance. Returns false if one is
/// already installed (the first install wins).
pub fn install_global(bridge: Arc<ScriptBridge>) -> bool {
    GLOBAL.set(bridge).is_ok()
}

/// The process-wide bridge instance, if one has been installed.
pub fn global() -> Option<Arc<ScriptBridge>> {
    GLOBAL.get().cloned()
}

/// A loaded script module. Re-created with a new generation on hot reload.
#[derive(Debug, Clone)]
struct ModuleHandle {
    generation: u64,
    loaded_at: Instant,
}

/// A cached resolved function, tagged with the module generation it was
/// resolved under. A hit from a stale generation is never invoked.
#[derive(Clone)]
struct CachedCallable {
    handle: FnHandle,
    generation: u64,
}

pub struct ScriptBridge {
    engine: Arc<dyn ScriptEngine>,
    hint: ContextHint,
    ready: AtomicBool,
    init_lock: Mutex<()>,
    /// module id -> load marker. Loading is serialized per module via the
    /// map entry, mirroring load-on-first-resolution semantics.
    modules: DashMap<String, ModuleHandle>,
    /// "module/function" -> resolved handle.
    callables: DashMap<String, CachedCallable>,
    generation_counter: AtomicU64,
    last_error: Mutex<Option<BridgeError>>,
}

impl ScriptBridge {
    /// Create a bridge over an engine, capturing the loading context the
    /// runtime must resolve symbols in. Nothing is started until
    /// [`ensure_initialized`](Self::ensure_initialized) or the first call.
    pub fn new(engine: Arc<dyn ScriptEngine>, hint: ContextHint) -> Self {
        Self {
            engine,
            hint,
            ready: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            modules: DashMap::new(),
            callables: DashMap::new(),
            generation_counter: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    /// Bootstrap the embedded runtime exactly once. Idempotent and safe to
    /// call concurrently; the ready flag is the lock-free fast path.
    ///
    /// This is the one fatal, propagated error in the bridge.
    pub fn ensure_initialized(&self) -> Result<(), BridgeError> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let _guard = self
            .init_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        info!(target: "bridge", "bootstrapping script runtime (context: {})", self.hint.label());
        match self.engine.bootstrap(&self.hint) {
            Ok(()) => {
                self.ready.store(true, Ordering::Release);
                info!(target: "bridge", "script runtime ready");
                Ok(())
            }
            Err(e) => {
                error!(target: "bridge", "script runtime bootstrap failed: {e}");
                Err(BridgeError::Bootstrap(e))
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// File extensions the engine recognises as script source.
    pub fn source_extensions(&self) -> &'static [&'static str] {
        self.engine.source_extensions()
    }

    /// Invoke a script function with the given argument shape.
    ///
    /// Cache hits reuse the resolved handle with no re-resolution; misses
    /// load the module (idempotent) and resolve the function first. Every
    /// failure in here is contained: logged with full call identity and
    /// surfaced as `None`, so one scripting bug cannot abort a host frame.
    pub fn invoke(&self, module: &str, function: &str, args: impl Into<CallArgs>) -> Option<Value> {
        let argv = args.into().into_vec();
        match self.try_invoke(module, function, &argv) {
            Ok(value) => Some(value),
            Err(err) => {
                error!(
                    target: "bridge",
                    "invoke {}/{} with {} arg(s) failed: {}",
                    module,
                    function,
                    argv.len(),
                    render_chain(&err)
                );
                self.record_error(err);
                None
            }
        }
    }

    pub fn invoke0(&self, module: &str, function: &str) -> Option<Value> {
        self.invoke(module, function, CallArgs::Zero)
    }

    pub fn invoke1(&self, module: &str, function: &str, a: Value) -> Option<Value> {
        self.invoke(module, function, CallArgs::One(a))
    }

    pub fn invoke2(&self, module: &str, function: &str, a: Value, b: Value) -> Option<Value> {
        self.invoke(module, function, CallArgs::Two(a, b))
    }

    pub fn invoke3(
        &self,
        module: &str,
        function: &str,
        a: Value,
        b: Value,
        c: Value,
    ) -> Option<Value> {
        self.invoke(module, function, CallArgs::Three(a, b, c))
    }

    pub fn invoke4(
        &self,
        module: &str,
        function: &str,
        a: Value,
        b: Value,
        c: Value,
        d: Value,
    ) -> Option<Value> {
        self.invoke(module, function, CallArgs::Four(a, b, c, d))
    }

    /// Explicit variadic path for call sites with more than four arguments.
    pub fn invoke_variadic(&self, module: &str, function: &str, args: Vec<Value>) -> Option<Value> {
        self.invoke(module, function, CallArgs::Variadic(args))
    }

    /// Read the current value of a module-level binding. Contained like
    /// `invoke`.
    pub fn lookup(&self, module: &str, symbol: &str) -> Option<Value> {
        match self.try_lookup(module, symbol) {
            Ok(value) => Some(value),
            Err(err) => {
                error!(target: "bridge", "lookup {}/{} failed: {}", module, symbol, render_chain(&err));
                self.record_error(err);
                None
            }
        }
    }

    /// Startup path: bootstrap, load the module and call its entry
    /// function, propagating any failure. Host startup wants loud errors,
    /// unlike hot paths.
    pub fn run_entrypoint(&self, module: &str, function: &str) -> Result<Value, BridgeError> {
        info!(target: "bridge", "running entrypoint {}/{}", module, function);
        self.ensure_initialized()?;
        self.require_module(module)?;
        self.try_invoke(module, function, &[])
    }

    /// Warm a module without resolving a function. Failures are contained.
    pub fn preload(&self, module: &str) {
        let result = self
            .ensure_initialized()
            .and_then(|()| self.require_module(module).map(|_| ()));
        if let Err(err) = result {
            error!(target: "bridge", "failed to preload module {}: {}", module, render_chain(&err));
            self.record_error(err);
        }
    }

    pub fn is_module_loaded(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// How long ago the module was (re)loaded, if it is loaded.
    pub fn module_age(&self, module: &str) -> Option<std::time::Duration> {
        self.modules.get(module).map(|m| m.loaded_at.elapsed())
    }

    /// Drop cached handles and load markers, forcing the next invocation to
    /// reload. `None` clears everything; `Some(module)` clears one module.
    pub fn clear_cache(&self, module: Option<&str>) {
        match module {
            None => {
                self.callables.clear();
                self.modules.clear();
                debug!(target: "bridge", "cleared all cached callables and load markers");
            }
            Some(module) => {
                let prefix = format!("{module}/");
                self.callables.retain(|key, _| !key.starts_with(&prefix));
                self.modules.remove(module);
                debug!(target: "bridge", "cleared cache for module {}", module);
            }
        }
    }

    /// Most recent contained failure, for diagnostics tooling. Normal call
    /// sites need not check this.
    pub fn last_error(&self) -> Option<BridgeError> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn record_error(&self, err: BridgeError) {
        *self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(err);
    }

    fn try_invoke(&self, module: &str, function: &str, args: &[Value]) -> Result<Value, BridgeError> {
        self.ensure_initialized()?;
        let generation = self.require_module(module)?;
        let key = format!("{module}/{function}");

        // Clone the handle out so no map lock is held while the script
        // runs. A hit from an older generation is treated as a miss.
        let cached = self
            .callables
            .get(&key)
            .and_then(|entry| (entry.generation == generation).then(|| entry.handle.clone()));

        let handle = match cached {
            Some(handle) => handle,
            None => {
                let handle = self.engine.resolve(module, function).map_err(|source| {
                    BridgeError::Resolution {
                        target: key.clone(),
                        source,
                    }
                })?;
                // Insert before use. Racing inserts produce equivalent
                // handles, so last-writer-wins is fine.
                self.callables.insert(
                    key,
                    CachedCallable {
                        handle: handle.clone(),
                        generation,
                    },
                );
                debug!(target: "bridge", "resolved and cached {}/{}", module, function);
                handle
            }
        };

        self.call_handle(module, function, &handle, args)
    }

    fn call_handle(
        &self,
        module: &str,
        function: &str,
        handle: &FnHandle,
        args: &[Value],
    ) -> Result<Value, BridgeError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.engine.call(handle, args)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(EngineError::Raised(panic_message(payload))),
        };
        result.map_err(|source| BridgeError::Invocation {
            module: module.to_string(),
            function: function.to_string(),
            argc: args.len(),
            source,
        })
    }

    fn try_lookup(&self, module: &str, symbol: &str) -> Result<Value, BridgeError> {
        self.ensure_initialized()?;
        self.require_module(module)?;
        self.engine
            .lookup(module, symbol)
            .map_err(|source| BridgeError::Resolution {
                target: format!("{module}/{symbol}"),
                source,
            })
    }

    /// Load the module if it is not loaded and return its current
    /// generation. Loading is serialized on the map entry so concurrent
    /// first callers load exactly once.
    ///
    /// The entry holds its map shard for the duration of the load, so a
    /// cold load briefly blocks lookups of other modules hashing to the
    /// same shard (and a concurrent `clear_cache(None)`). Loads are rare
    /// and front-loaded; steady-state lookups take the read-only fast path
    /// below and never touch the entry.
    fn require_module(&self, module: &str) -> Result<u64, BridgeError> {
        if let Some(existing) = self.modules.get(module) {
            return Ok(existing.generation);
        }

        match self.modules.entry(module.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().generation),
            Entry::Vacant(slot) => {
                self.engine
                    .load_module(module)
                    .map_err(|source| BridgeError::Resolution {
                        target: module.to_string(),
                        source,
                    })?;
                let generation = self.generation_counter.fetch_add(1, Ordering::Relaxed) + 1;
                slot.insert(ModuleHandle {
                    generation,
                    loaded_at: Instant::now(),
                });
                debug!(target: "bridge", "loaded module {} (generation {})", module, generation);
                Ok(generation)
            }
        }
    }
}

fn render_chain(err: &BridgeError) -> String {
    use std::error::Error as _;
    match err.source() {
        Some(source) => format!("{err}: {source}"),
        None => err.to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "script call panicked".to_string()
    }
}
