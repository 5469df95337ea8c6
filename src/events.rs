//! Forwarding of native host events into script handlers.
//!
//! The hub subscribes thin native listeners to the host's own event
//! sources and forwards each firing through the resolved-call cache.
//! Payloads are marshalled into plain [`Value`]s before they cross the
//! bridge, and the whole forward is contained: a throwing or panicking
//! handler is logged and never propagates into the host's dispatch loop.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::bridge::ScriptBridge;
use crate::engine::EngineError;
use crate::value::Value;

/// Sentinel a handler returns to cancel a cancelable event. Anything else
/// (including a failure) leaves the event's default outcome untouched.
pub const INTERRUPT: &str = "interrupt";

/// The host event hooks the bridge can forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Tick,
    LevelTick,
    HostStarting,
    HostStarted,
    HostStopping,
    HostStopped,
    EntityJoin,
    EntityLeave,
    EntitySpawn,
    BlockBreak,
    BlockPlace,
    BlockInteract,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::Tick,
        EventKind::LevelTick,
        EventKind::HostStarting,
        EventKind::HostStarted,
        EventKind::HostStopping,
        EventKind::HostStopped,
        EventKind::EntityJoin,
        EventKind::EntityLeave,
        EventKind::EntitySpawn,
        EventKind::BlockBreak,
        EventKind::BlockPlace,
        EventKind::BlockInteract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Tick => "tick",
            EventKind::LevelTick => "level-tick",
            EventKind::HostStarting => "host-starting",
            EventKind::HostStarted => "host-started",
            EventKind::HostStopping => "host-stopping",
            EventKind::HostStopped => "host-stopped",
            EventKind::EntityJoin => "entity-join",
            EventKind::EntityLeave => "entity-leave",
            EventKind::EntitySpawn => "entity-spawn",
            EventKind::BlockBreak => "block-break",
            EventKind::BlockPlace => "block-place",
            EventKind::BlockInteract => "block-interact",
        }
    }

    /// Whether a handler may cancel the host's default handling of this
    /// event via the [`INTERRUPT`] sentinel.
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            EventKind::EntitySpawn
                | EventKind::BlockBreak
                | EventKind::BlockPlace
                | EventKind::BlockInteract
        )
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the host should do after a firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Proceed with default handling (the default).
    Pass,
    /// A handler of a cancelable event asked to cancel default handling.
    Interrupt,
}

/// A pre-bound native callback (the throughput-oriented registration
/// shape; must be re-registered after a reload).
pub type DirectHandler = Arc<dyn Fn(&Value) -> Result<Value, EngineError> + Send + Sync>;

/// The target of a subscription.
#[derive(Clone)]
pub enum HandlerRef {
    /// Resolved through the cache on every firing, so it follows hot
    /// reloads automatically.
    Named { module: String, function: String },
    /// Pre-bound callable; faster, but pinned to whatever it captured.
    Direct(DirectHandler),
}

impl HandlerRef {
    pub fn named(module: impl Into<String>, function: impl Into<String>) -> Self {
        HandlerRef::Named {
            module: module.into(),
            function: function.into(),
        }
    }

    pub fn direct(
        handler: impl Fn(&Value) -> Result<Value, EngineError> + Send + Sync + 'static,
    ) -> Self {
        HandlerRef::Direct(Arc::new(handler))
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRef::Named { module, function } => write!(f, "Named({module}/{function})"),
            HandlerRef::Direct(_) => f.write_str("Direct(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    target: HandlerRef,
}

/// Registration and dispatch point between host event sources and script
/// handlers. Safe to call from any host thread; firings run synchronously
/// on the thread that fired.
pub struct EventHub {
    bridge: Arc<ScriptBridge>,
    subscriptions: DashMap<EventKind, Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub fn new(bridge: Arc<ScriptBridge>) -> Self {
        Self {
            bridge,
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Subscribe a handler to an event kind.
    pub fn register(&self, kind: EventKind, target: HandlerRef) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(target: "events", "registering {:?} handler for {}", target, kind);
        self.subscriptions
            .entry(kind)
            .or_default()
            .push(Subscription { id, target });
        id
    }

    /// Remove a subscription. Returns false if the id is unknown.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.subscriptions.iter_mut() {
            let before = entry.len();
            entry.retain(|sub| sub.id != id);
            removed |= entry.len() != before;
        }
        removed
    }

    /// Handlers currently subscribed to a kind.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.subscriptions.get(&kind).map_or(0, |subs| subs.len())
    }

    /// Forward one firing to every handler of the kind.
    ///
    /// An unregistered kind, a failing handler, and a panicking handler
    /// all leave the default outcome untouched; only a handler of a
    /// cancelable kind returning the [`INTERRUPT`] sentinel flips the
    /// outcome.
    pub fn fire(&self, kind: EventKind, payload: Value) -> EventOutcome {
        let targets: Vec<Subscription> = match self.subscriptions.get(&kind) {
            Some(subs) => subs.value().clone(),
            None => return EventOutcome::Pass,
        };

        let mut outcome = EventOutcome::Pass;
        for sub in targets {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                self.dispatch(&sub.target, &payload)
            }));
            match result {
                Ok(Some(value)) => {
                    if kind.is_cancelable() && value.as_str() == Some(INTERRUPT) {
                        debug!(target: "events", "{} canceled by {:?}", kind, sub.target);
                        outcome = EventOutcome::Interrupt;
                    }
                }
                Ok(None) => {}
                Err(_) => {
                    error!(target: "events", "handler {:?} for {} panicked", sub.target, kind);
                }
            }
        }
        outcome
    }

    fn dispatch(&self, target: &HandlerRef, payload: &Value) -> Option<Value> {
        match target {
            // invoke() contains and logs resolution/invocation failures
            HandlerRef::Named { module, function } => {
                self.bridge.invoke1(module, function, payload.clone())
            }
            HandlerRef::Direct(handler) => match handler(payload) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(target: "events", "direct handler failed: {e}");
                    None
                }
            },
        }
    }
}
