use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::bridge::{ProcessBridge, PtyProcess};
use super::env::build_spawn_env;
use super::error::PtyError;
use super::lifecycle::{EventKind, EventObserver, ExitStatus, ProcessEvent, Subscription};
use super::options::{CwdSource, PtyOptions, SpawnConfig, TermSize, DEFAULT_COLS, DEFAULT_ROWS};
use super::settings::SettingsProvider;
use super::shell::{ShellResolution, ShellResolver};

const EVENT_CAPACITY: usize = 64;

/// Manager-assigned identity of a PTY, independent of the OS pid.
///
/// Ids grow monotonically, so ordering by id is creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pty-{}", self.0)
    }
}

/// Lifecycle notifications for consumers of the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created { id: HandleId, pid: Option<u32> },
    /// The process exited on its own.
    Terminated { id: HandleId, exit: ExitStatus },
    /// The bridge reported an error for the process.
    Failed { id: HandleId, message: String },
    /// The handle was torn down through [`PtyManager::destroy_pty`].
    Destroyed { id: HandleId },
}

/// One live pseudo-terminal tracked by a [`PtyManager`].
pub struct PtyHandle {
    id: HandleId,
    pid: Option<u32>,
    shell: String,
    cwd: PathBuf,
    cwd_source: CwdSource,
    size: Mutex<TermSize>,
    process: Box<dyn PtyProcess>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl PtyHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Working directory the process was actually started in.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn cwd_source(&self) -> CwdSource {
        self.cwd_source
    }

    pub fn size(&self) -> TermSize {
        *self.size.lock()
    }

    /// Resize this PTY. The recorded size only changes on success.
    pub fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let size = TermSize::new(cols, rows);
        self.process.resize(size)?;
        *self.size.lock() = size;
        Ok(())
    }

    /// Send input bytes to the shell.
    pub fn write(&self, data: &[u8]) -> anyhow::Result<()> {
        self.process.write(data)
    }

    /// Take the output stream. Only the first caller gets it.
    pub fn take_reader(&self) -> Option<Box<dyn Read + Send>> {
        self.process.take_reader()
    }
}

impl fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtyHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("shell", &self.shell)
            .field("cwd", &self.cwd)
            .field("size", &self.size())
            .finish()
    }
}

type ActiveSet = BTreeMap<HandleId, Arc<PtyHandle>>;

/// Owns every running PTY and the policy for creating them.
///
/// Calls are expected to come from one control thread. Exit and error
/// notifications arrive on bridge threads and only ever remove entries from
/// the active set, guarded by an existence check, so they stay harmless after
/// a destroy, a cleanup or after the manager itself is gone.
pub struct PtyManager {
    bridge: Arc<dyn ProcessBridge>,
    resolver: ShellResolver,
    active: Arc<Mutex<ActiveSet>>,
    next_id: AtomicU64,
    events: broadcast::Sender<LifecycleEvent>,
}

impl PtyManager {
    pub fn new(bridge: Arc<dyn ProcessBridge>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            resolver: ShellResolver::new(Arc::clone(&bridge)),
            bridge,
            active: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    /// Receive lifecycle events for handles created after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Spawn a PTY for `options` and start tracking it.
    ///
    /// Fails with `BridgeUnavailable` or `ShellNotFound` before anything is
    /// spawned. A `cwd` that is not an existing directory (missing, or a
    /// regular file) is replaced by the home directory (or `/`).
    /// Spawn failures come back as `PtyCreationFailed`.
    pub fn create_pty(&self, mut options: PtyOptions) -> Result<Arc<PtyHandle>, PtyError> {
        if !self.bridge.is_available() {
            return Err(PtyError::bridge_unavailable());
        }

        if !self.resolver.validate_shell_path(&options.shell) {
            return Err(PtyError::shell_not_found(&options.shell));
        }

        let cwd_source = self.ensure_cwd(&mut options);

        let platform = self.bridge.platform();
        let config = SpawnConfig::for_platform(&options, &platform);

        let process = self
            .bridge
            .spawn(&options.shell, &options.args, &config)
            .map_err(|e| match e.downcast::<PtyError>() {
                Ok(typed) => typed,
                Err(e) => PtyError::creation_failed(e, &options),
            })?;

        let id = HandleId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = Arc::new(PtyHandle {
            id,
            pid: process.pid(),
            shell: options.shell.clone(),
            cwd: options.cwd.clone(),
            cwd_source,
            size: Mutex::new(config.size),
            process,
            subscriptions: Mutex::new(Vec::new()),
        });

        self.active.lock().insert(id, Arc::clone(&handle));
        info!(
            "Created {} (pid {:?}) running {} in {}",
            id,
            handle.pid,
            handle.shell,
            handle.cwd.display()
        );
        let _ = self.events.send(LifecycleEvent::Created {
            id,
            pid: handle.pid,
        });

        if let Err(e) = self.attach_observers(&handle) {
            warn!("Failed to observe {}: {}", id, e);
            self.destroy_pty(id);
            return Err(PtyError::creation_failed(e, &options));
        }

        Ok(handle)
    }

    /// Stop tracking and terminate a PTY. Unknown ids are ignored.
    ///
    /// Failures while terminating or releasing observers are logged; the
    /// handle is gone from the manager either way.
    pub fn destroy_pty(&self, id: HandleId) {
        let Some(handle) = self.active.lock().remove(&id) else {
            debug!("destroy_pty: {} is not tracked", id);
            return;
        };

        if let Err(e) = handle.process.kill() {
            warn!("Failed to terminate {}: {}", id, e);
        }

        let subscriptions: Vec<Subscription> = handle.subscriptions.lock().drain(..).collect();
        for subscription in subscriptions {
            if let Err(e) = handle.process.unsubscribe(subscription) {
                let err = PtyError::teardown_failed(e, id);
                warn!("{}", err);
            }
        }

        info!("Destroyed {}", id);
        let _ = self.events.send(LifecycleEvent::Destroyed { id });
    }

    /// Resize every tracked PTY. A failing handle does not stop the rest.
    pub fn resize_all(&self, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 {
            warn!("Ignoring resize to {}x{}", cols, rows);
            return;
        }

        for handle in self.handles() {
            if let Err(e) = handle.resize(cols, rows) {
                warn!("Failed to resize {} to {}x{}: {}", handle.id, cols, rows, e);
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn get(&self, id: HandleId) -> Option<Arc<PtyHandle>> {
        self.active.lock().get(&id).cloned()
    }

    /// Snapshot of tracked handles in creation order.
    pub fn handles(&self) -> Vec<Arc<PtyHandle>> {
        self.active.lock().values().cloned().collect()
    }

    /// Destroy every tracked PTY.
    pub fn cleanup(&self) {
        let ids: Vec<HandleId> = self.active.lock().keys().copied().collect();
        if !ids.is_empty() {
            info!("Cleaning up {} PTY(s)", ids.len());
        }
        for id in ids {
            self.destroy_pty(id);
        }
        self.active.lock().clear();
    }

    pub fn default_shell(&self) -> ShellResolution {
        self.resolver.default_shell()
    }

    /// Options for a PTY running the default shell in the current directory.
    pub fn default_options(&self) -> PtyOptions {
        let settings = self.resolver.current_settings();
        let shell = self.resolver.resolve_with(settings.as_ref()).path;
        let args = settings.map(|s| s.shell_args).unwrap_or_default();

        let cwd = match self.bridge.current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                debug!("No current directory ({}), using home", e);
                self.fallback_dir().0
            }
        };

        PtyOptions {
            shell,
            args,
            cwd,
            env: build_spawn_env(&self.bridge.env(), &self.bridge.platform()),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }

    pub fn validate_shell_path(&self, path: &str) -> bool {
        self.resolver.validate_shell_path(path)
    }

    pub fn alternative_shells(&self) -> Vec<String> {
        self.resolver.alternative_shells()
    }

    pub async fn find_available_shell(&self) -> ShellResolution {
        self.resolver.find_available_shell().await
    }

    pub fn set_settings_provider(&self, provider: Option<Arc<dyn SettingsProvider>>) {
        self.resolver.set_settings_provider(provider);
    }

    fn ensure_cwd(&self, options: &mut PtyOptions) -> CwdSource {
        if options.cwd.is_dir() {
            return CwdSource::Requested;
        }

        let (dir, source) = self.fallback_dir();
        warn!(
            "Working directory {} is not a directory, using {}",
            options.cwd.display(),
            dir.display()
        );
        options.cwd = dir;
        source
    }

    fn fallback_dir(&self) -> (PathBuf, CwdSource) {
        match self.bridge.home_dir() {
            Some(home) => (home, CwdSource::HomeFallback),
            None => (PathBuf::from("/"), CwdSource::RootFallback),
        }
    }

    fn attach_observers(&self, handle: &PtyHandle) -> anyhow::Result<()> {
        for kind in [EventKind::Error, EventKind::Exit] {
            let observer = self.removal_observer(handle.id);
            let subscription = handle.process.subscribe(kind, observer)?;
            handle.subscriptions.lock().push(subscription);
        }
        Ok(())
    }

    /// Observer that drops `id` from the active set when its process stops.
    ///
    /// Holds only weak state so a handle never keeps itself alive through its
    /// own observers.
    fn removal_observer(&self, id: HandleId) -> EventObserver {
        let active: Weak<Mutex<ActiveSet>> = Arc::downgrade(&self.active);
        let events = self.events.clone();

        Arc::new(move |event: &ProcessEvent| {
            let Some(active) = active.upgrade() else {
                return;
            };
            let removed = active.lock().remove(&id);
            if removed.is_none() {
                return;
            }

            let notice = match event {
                ProcessEvent::Exit(exit) => {
                    info!("{}", PtyError::process_terminated(id, exit));
                    LifecycleEvent::Terminated {
                        id,
                        exit: exit.clone(),
                    }
                }
                ProcessEvent::Error(message) => {
                    warn!("{} failed: {}", id, message);
                    LifecycleEvent::Failed {
                        id,
                        message: message.clone(),
                    }
                }
            };
            let _ = events.send(notice);
        })
    }
}

impl Drop for PtyManager {
    fn drop(&mut self) {
        if self.active_count() > 0 {
            debug!("Dropping PtyManager with live PTYs");
            self.cleanup();
        }
    }
}
