//! Hot reload: a filesystem watcher that maps changed source files to
//! modules, debounces bursts, and busts the resolved-call cache.
//!
//! One dedicated background thread drains watch notifications with a
//! bounded wait so `stop` is observed promptly without busy-waiting. The
//! cache entry is always removed *before* the fresh load is attempted; if
//! the fresh load fails (a mid-edit syntax error), the module stays
//! unloaded and every subsequent invoke surfaces the load error, contained,
//! until the source is fixed.

use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::{Event, EventKind as FsEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};

use crate::bridge::ScriptBridge;
use crate::error::BridgeError;

/// Changes for the same module closer together than this collapse into one
/// reload.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Upper bound on how long the watcher thread sleeps between checks of the
/// running flag.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Callback invoked with the module id after each reload.
pub type ReloadHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct ReloadConfig {
    pub watch_paths: Vec<PathBuf>,
    pub recursive: bool,
    pub on_reload: Option<ReloadHook>,
}

impl ReloadConfig {
    pub fn new(watch_paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            watch_paths: watch_paths.into_iter().collect(),
            recursive: true,
            on_reload: None,
        }
    }

    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }

    pub fn with_on_reload(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_reload = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for ReloadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadConfig")
            .field("watch_paths", &self.watch_paths)
            .field("recursive", &self.recursive)
            .field("on_reload", &self.on_reload.is_some())
            .finish()
    }
}

/// Read-only diagnostics snapshot.
#[derive(Debug)]
pub struct WatcherStatus {
    pub running: bool,
    pub watched_dirs: Vec<PathBuf>,
    pub config: Option<ReloadConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct Lifecycle {
    state: WatchState,
    running: Arc<AtomicBool>,
    // kept alive while running; dropping it closes the native watch handle
    watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
    watched_dirs: Vec<PathBuf>,
    config: Option<ReloadConfig>,
}

/// Filesystem watcher driving cache invalidation and module reloads.
///
/// Owns at most one background thread; `start` while running performs a
/// full `stop` first, and `start`/`stop` are single-flighted by the
/// lifecycle lock.
pub struct HotReloadWatcher {
    bridge: Arc<ScriptBridge>,
    extensions: Vec<String>,
    lifecycle: Mutex<Lifecycle>,
}

impl HotReloadWatcher {
    pub fn new(bridge: Arc<ScriptBridge>) -> Self {
        let extensions = bridge
            .source_extensions()
            .iter()
            .map(|e| e.to_string())
            .collect();
        Self {
            bridge,
            extensions,
            lifecycle: Mutex::new(Lifecycle {
                state: WatchState::Stopped,
                running: Arc::new(AtomicBool::new(false)),
                watcher: None,
                thread: None,
                watched_dirs: Vec::new(),
                config: None,
            }),
        }
    }

    /// Start watching. Each root is resolved to a concrete canonical
    /// directory first. Returns true iff at least one root could be
    /// watched. Unwatchable roots are skipped with a logged failure;
    /// the rest proceed.
    pub fn start(&self, config: ReloadConfig) -> bool {
        let mut lifecycle = self.lock_lifecycle();
        if lifecycle.state != WatchState::Stopped {
            Self::stop_locked(&mut lifecycle);
        }
        lifecycle.state = WatchState::Starting;

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = match notify::recommended_watcher(move |result| {
            let _ = tx.send(result);
        }) {
            Ok(watcher) => watcher,
            Err(e) => {
                error!(target: "hotreload", "failed to create filesystem watcher: {e}");
                lifecycle.state = WatchState::Stopped;
                return false;
            }
        };

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        // Resolve each root to a concrete canonical directory before
        // watching. The watch backend reports canonicalized event paths, so
        // a relative or symlinked root kept as given would never match them
        // and every change would be dropped.
        let mut watched = Vec::new();
        for root in &config.watch_paths {
            let resolved = match root.canonicalize() {
                Ok(resolved) => resolved,
                Err(e) => {
                    let err = BridgeError::Watch {
                        path: root.clone(),
                        reason: e.to_string(),
                    };
                    warn!(target: "hotreload", "{err}, skipping");
                    continue;
                }
            };
            if !resolved.is_dir() {
                let err = BridgeError::Watch {
                    path: root.clone(),
                    reason: "not a directory".into(),
                };
                warn!(target: "hotreload", "{err}, skipping");
                continue;
            }
            match watcher.watch(&resolved, mode) {
                Ok(()) => watched.push(resolved),
                Err(e) => {
                    let err = BridgeError::Watch {
                        path: root.clone(),
                        reason: e.to_string(),
                    };
                    warn!(target: "hotreload", "{err}, skipping");
                }
            }
        }

        if watched.is_empty() {
            warn!(target: "hotreload", "no watchable roots, watcher not started");
            lifecycle.state = WatchState::Stopped;
            return false;
        }

        let running = Arc::new(AtomicBool::new(true));
        let worker = WatchWorker {
            bridge: self.bridge.clone(),
            roots: watched.clone(),
            extensions: self.extensions.clone(),
            on_reload: config.on_reload.clone(),
            running: running.clone(),
        };
        let thread = std::thread::Builder::new()
            .name("script-hotreload".into())
            .spawn(move || worker.run(rx));
        let thread = match thread {
            Ok(handle) => handle,
            Err(e) => {
                error!(target: "hotreload", "failed to spawn watcher thread: {e}");
                lifecycle.state = WatchState::Stopped;
                return false;
            }
        };

        info!(
            target: "hotreload",
            "watching {} dir(s) for script changes (debounce {}ms)",
            watched.len(),
            DEBOUNCE_WINDOW.as_millis()
        );
        lifecycle.running = running;
        lifecycle.watcher = Some(watcher);
        lifecycle.thread = Some(thread);
        lifecycle.watched_dirs = watched;
        lifecycle.config = Some(config);
        lifecycle.state = WatchState::Running;
        true
    }

    /// Stop watching and join the background thread. The bounded poll wait
    /// makes the join prompt. No-op when already stopped.
    pub fn stop(&self) {
        let mut lifecycle = self.lock_lifecycle();
        Self::stop_locked(&mut lifecycle);
    }

    pub fn status(&self) -> WatcherStatus {
        let lifecycle = self.lock_lifecycle();
        WatcherStatus {
            running: lifecycle.state == WatchState::Running,
            watched_dirs: lifecycle.watched_dirs.clone(),
            config: lifecycle.config.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_lifecycle().state == WatchState::Running
    }

    fn stop_locked(lifecycle: &mut Lifecycle) {
        if lifecycle.state != WatchState::Running {
            lifecycle.state = WatchState::Stopped;
            return;
        }
        lifecycle.state = WatchState::Stopping;
        lifecycle.running.store(false, Ordering::Release);
        // closing the watch handle also disconnects the channel, waking
        // the thread immediately
        lifecycle.watcher = None;
        if let Some(thread) = lifecycle.thread.take() {
            if thread.join().is_err() {
                error!(target: "hotreload", "watcher thread panicked");
            }
        }
        lifecycle.watched_dirs.clear();
        lifecycle.config = None;
        lifecycle.state = WatchState::Stopped;
        info!(target: "hotreload", "watcher stopped");
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for HotReloadWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the background thread. Everything mutable after `start`
/// lives here.
struct WatchWorker {
    bridge: Arc<ScriptBridge>,
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
    on_reload: Option<ReloadHook>,
    running: Arc<AtomicBool>,
}

impl WatchWorker {
    fn run(&self, rx: Receiver<notify::Result<Event>>) {
        let mut last_reload_at: HashMap<String, Instant> = HashMap::new();

        while self.running.load(Ordering::Acquire) {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) => self.handle_event(&event, &mut last_reload_at),
                Ok(Err(e)) => warn!(target: "hotreload", "watch error: {e}"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!(target: "hotreload", "watcher thread exiting");
    }

    fn handle_event(&self, event: &Event, last_reload_at: &mut HashMap<String, Instant>) {
        // only content changes matter; deletes and metadata churn do not
        // invalidate anything by themselves
        if !matches!(
            event.kind,
            FsEventKind::Create(_) | FsEventKind::Modify(_) | FsEventKind::Any
        ) {
            return;
        }

        for path in &event.paths {
            let Some(module) = module_id_for_path(path, &self.roots, &self.extensions) else {
                continue;
            };
            if let Some(previous) = last_reload_at.get(&module) {
                if previous.elapsed() < DEBOUNCE_WINDOW {
                    debug!(target: "hotreload", "debounced change for module {}", module);
                    continue;
                }
            }
            self.reload(&module);
            last_reload_at.insert(module, Instant::now());
        }
    }

    /// Remove before reloading, never the reverse: a cleared cache with a
    /// failed fresh load is safe (next invoke surfaces the error); a stale
    /// handle surviving a reload is not.
    fn reload(&self, module: &str) {
        info!(target: "hotreload", "source change detected, reloading module {}", module);
        self.bridge.clear_cache(Some(module));
        self.bridge.preload(module);
        if let Some(hook) = &self.on_reload {
            hook(module);
        }
    }
}

/// Deterministic path -> module id transform: the path is made relative to
/// its watch root, the extension is stripped, and separators become `.`.
/// Files whose extension the engine does not claim map to nothing.
fn module_id_for_path(path: &Path, roots: &[PathBuf], extensions: &[String]) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !extensions.iter().any(|known| known == ext) {
        return None;
    }
    let relative = roots.iter().find_map(|root| path.strip_prefix(root).ok())?;
    let stem = relative.with_extension("");
    let mut parts = Vec::new();
    for component in stem.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?.to_string()),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec!["scr".to_string()]
    }

    #[test]
    fn test_module_id_flat_file() {
        let roots = vec![PathBuf::from("/proj/scripts")];
        assert_eq!(
            module_id_for_path(Path::new("/proj/scripts/hooks.scr"), &roots, &exts()),
            Some("hooks".to_string())
        );
    }

    #[test]
    fn test_module_id_nested_path_uses_dots() {
        let roots = vec![PathBuf::from("/proj/scripts")];
        assert_eq!(
            module_id_for_path(
                Path::new("/proj/scripts/game/combat/melee.scr"),
                &roots,
                &exts()
            ),
            Some("game.combat.melee".to_string())
        );
    }

    #[test]
    fn test_module_id_foreign_extension_ignored() {
        let roots = vec![PathBuf::from("/proj/scripts")];
        assert_eq!(
            module_id_for_path(Path::new("/proj/scripts/notes.txt"), &roots, &exts()),
            None
        );
    }

    #[test]
    fn test_module_id_outside_roots_ignored() {
        let roots = vec![PathBuf::from("/proj/scripts")];
        assert_eq!(
            module_id_for_path(Path::new("/elsewhere/hooks.scr"), &roots, &exts()),
            None
        );
    }

    #[test]
    fn test_module_id_picks_matching_root() {
        let roots = vec![PathBuf::from("/a"), PathBuf::from("/b")];
        assert_eq!(
            module_id_for_path(Path::new("/b/util.scr"), &roots, &exts()),
            Some("util".to_string())
        );
    }
}
