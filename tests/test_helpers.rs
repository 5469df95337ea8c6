//! Shared helpers for integration tests.
//!
//! `RecordingEngine` is an in-memory `ScriptEngine` with probe counters
//! (bootstraps, per-module loads, per-function calls), a scriptable
//! function table, and failure injection for broken modules.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use scriptbridge::{Arity, ContextHint, EngineError, FnHandle, ScriptEngine, Value};

static TRACING: Once = Once::new();

/// Capture bridge logs in test output; honors RUST_LOG.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub type ScriptFn = Arc<dyn Fn(&[Value]) -> Result<Value, EngineError> + Send + Sync>;

#[derive(Clone)]
struct FnDef {
    arity: Arity,
    body: ScriptFn,
}

/// Payload stored inside the opaque `FnHandle`.
struct HandleData {
    key: String,
    body: ScriptFn,
    arity: Arity,
}

pub struct RecordingEngine {
    fail_bootstrap: bool,
    bootstraps: AtomicUsize,
    loads: Mutex<HashMap<String, usize>>,
    calls: Mutex<HashMap<String, usize>>,
    modules: Mutex<HashSet<String>>,
    functions: Mutex<HashMap<String, FnDef>>,
    vars: Mutex<HashMap<String, Value>>,
    broken: Mutex<HashSet<String>>,
}

impl RecordingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_bootstrap: false,
            bootstraps: AtomicUsize::new(0),
            loads: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            modules: Mutex::new(HashSet::new()),
            functions: Mutex::new(HashMap::new()),
            vars: Mutex::new(HashMap::new()),
            broken: Mutex::new(HashSet::new()),
        })
    }

    /// An engine whose interpreter refuses to start.
    pub fn failing_bootstrap() -> Arc<Self> {
        let mut engine = Self::new();
        Arc::get_mut(&mut engine).unwrap().fail_bootstrap = true;
        engine
    }

    /// Define a script function. The module springs into existence with
    /// its first definition.
    pub fn define(
        self: &Arc<Self>,
        module: &str,
        function: &str,
        arity: Arity,
        body: impl Fn(&[Value]) -> Result<Value, EngineError> + Send + Sync + 'static,
    ) {
        self.modules.lock().unwrap().insert(module.to_string());
        self.functions.lock().unwrap().insert(
            format!("{module}/{function}"),
            FnDef {
                arity,
                body: Arc::new(body),
            },
        );
    }

    /// Define a module-level binding.
    pub fn define_var(self: &Arc<Self>, module: &str, name: &str, value: Value) {
        self.modules.lock().unwrap().insert(module.to_string());
        self.vars
            .lock()
            .unwrap()
            .insert(format!("{module}/{name}"), value);
    }

    /// Register a module with no definitions (loadable, nothing to call).
    pub fn add_module(self: &Arc<Self>, module: &str) {
        self.modules.lock().unwrap().insert(module.to_string());
    }

    /// Make the module fail to load, as a mid-edit syntax error would.
    pub fn break_module(&self, module: &str) {
        self.broken.lock().unwrap().insert(module.to_string());
    }

    pub fn fix_module(&self, module: &str) {
        self.broken.lock().unwrap().remove(module);
    }

    pub fn bootstrap_count(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }

    pub fn load_count(&self, module: &str) -> usize {
        self.loads.lock().unwrap().get(module).copied().unwrap_or(0)
    }

    /// Calls of `module/function` that reached the target.
    pub fn call_count(&self, module: &str, function: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&format!("{module}/{function}"))
            .copied()
            .unwrap_or(0)
    }
}

impl ScriptEngine for RecordingEngine {
    fn bootstrap(&self, _hint: &ContextHint) -> Result<(), EngineError> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        if self.fail_bootstrap {
            return Err(EngineError::Unavailable("interpreter missing".into()));
        }
        Ok(())
    }

    fn load_module(&self, module: &str) -> Result<(), EngineError> {
        if self.broken.lock().unwrap().contains(module) {
            return Err(EngineError::LoadFailed {
                module: module.to_string(),
                reason: "syntax error".into(),
            });
        }
        if !self.modules.lock().unwrap().contains(module) {
            return Err(EngineError::ModuleNotFound(module.to_string()));
        }
        *self
            .loads
            .lock()
            .unwrap()
            .entry(module.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    fn resolve(&self, module: &str, function: &str) -> Result<FnHandle, EngineError> {
        let key = format!("{module}/{function}");
        let def = self
            .functions
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| EngineError::FunctionNotFound(key.clone()))?;
        Ok(FnHandle::new(
            HandleData {
                key,
                body: def.body.clone(),
                arity: def.arity,
            },
            def.arity,
        ))
    }

    fn call(&self, handle: &FnHandle, args: &[Value]) -> Result<Value, EngineError> {
        let data = handle
            .downcast_ref::<HandleData>()
            .ok_or_else(|| EngineError::Raised("foreign handle".into()))?;
        *self
            .calls
            .lock()
            .unwrap()
            .entry(data.key.clone())
            .or_insert(0) += 1;
        if !data.arity.accepts(args.len()) {
            let expected = match data.arity {
                Arity::Exact(n) => n,
                Arity::Variadic { min } => min,
            };
            return Err(EngineError::ArityMismatch {
                function: data.key.clone(),
                expected,
                got: args.len(),
            });
        }
        (data.body)(args)
    }

    fn lookup(&self, module: &str, symbol: &str) -> Result<Value, EngineError> {
        let key = format!("{module}/{symbol}");
        self.vars
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(EngineError::FunctionNotFound(key))
    }

    fn source_extensions(&self) -> &'static [&'static str] {
        &["scr"]
    }
}
