//! Bridge layer between a compiled host application and an embedded,
//! dynamically loaded script runtime.
//!
//! The interpreter itself is an external dependency behind the
//! [`ScriptEngine`] seam. This crate owns everything around it: one-time
//! bootstrap in the host's loading context, a resolved-call cache for
//! hot-path invocation, forwarding of native host events into script
//! handlers with failure containment, and a hot-reload watcher that busts
//! the cache when script source changes on disk.
//!
//! ```ignore
//! let bridge = Arc::new(ScriptBridge::new(engine, ContextHint::new("my-plugin")));
//! bridge.ensure_initialized()?;
//!
//! // hot path: resolved once, cached after
//! bridge.invoke1("hooks", "on-join", Value::map([("name", Value::from("Ava"))]));
//!
//! // host event wiring
//! let hub = EventHub::new(bridge.clone());
//! hub.register(EventKind::EntityJoin, HandlerRef::named("hooks", "on-join"));
//!
//! // dev-mode hot reload
//! let watcher = HotReloadWatcher::new(bridge.clone());
//! watcher.start(ReloadConfig::new([PathBuf::from("scripts")]));
//! ```

pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod reload;
pub mod value;

// Re-export the working surface for host-side wiring
pub use bridge::{global, install_global, ScriptBridge};
pub use config::BridgeConfig;
pub use engine::{Arity, ContextHint, EngineError, FnHandle, ScriptEngine};
pub use error::BridgeError;
pub use events::{
    DirectHandler, EventHub, EventKind, EventOutcome, HandlerRef, SubscriptionId, INTERRUPT,
};
pub use reload::{HotReloadWatcher, ReloadConfig, ReloadHook, WatcherStatus, DEBOUNCE_WINDOW};
pub use value::{CallArgs, Value};
