#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use parking_lot::Mutex;

use ptyward::pty::{
    EventKind, EventObserver, ExitStatus, ObserverRegistry, Platform, ProcessBridge,
    ProcessEvent, PtyProcess, SpawnConfig, Subscription, TermSize,
};

/// Scripted process bridge. Shells are valid only when listed.
pub struct MockBridge {
    pub platform: Platform,
    pub available: AtomicBool,
    pub fail_spawn: AtomicBool,
    /// Spawned processes refuse observer registration.
    pub fail_subscribe: AtomicBool,
    /// Spawned processes exit with this code before the bridge returns.
    pub exit_on_spawn: Mutex<Option<i32>>,
    valid: Mutex<HashSet<String>>,
    /// Shells whose validity check raises instead of answering.
    broken: Mutex<HashSet<String>>,
    system_default: Mutex<Option<String>>,
    pub home: Mutex<Option<PathBuf>>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    /// Async probe log, in call order.
    pub probes: Mutex<Vec<String>>,
    pub spawned: Mutex<Vec<Arc<MockProcess>>>,
    pub configs: Mutex<Vec<SpawnConfig>>,
    next_pid: AtomicU32,
}

impl MockBridge {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            available: AtomicBool::new(true),
            fail_spawn: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            exit_on_spawn: Mutex::new(None),
            valid: Mutex::new(HashSet::new()),
            broken: Mutex::new(HashSet::new()),
            system_default: Mutex::new(Some("/bin/bash".to_string())),
            home: Mutex::new(Some(PathBuf::from("/home/tester"))),
            cwd: std::env::temp_dir(),
            env: HashMap::from([("PATH".to_string(), "/usr/bin:/bin".to_string())]),
            probes: Mutex::new(Vec::new()),
            spawned: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
            next_pid: AtomicU32::new(1000),
        }
    }

    pub fn linux() -> Self {
        Self::new(Platform::Linux)
    }

    pub fn with_valid(self, shells: &[&str]) -> Self {
        self.valid.lock().extend(shells.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_broken(self, shells: &[&str]) -> Self {
        self.broken.lock().extend(shells.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_system_default(self, shell: Option<&str>) -> Self {
        *self.system_default.lock() = shell.map(str::to_string);
        self
    }

    pub fn with_home(self, home: Option<PathBuf>) -> Self {
        *self.home.lock() = home;
        self
    }

    pub fn process(&self, index: usize) -> Arc<MockProcess> {
        Arc::clone(&self.spawned.lock()[index])
    }

    pub fn last_config(&self) -> SpawnConfig {
        self.configs.lock().last().cloned().expect("nothing spawned")
    }

    pub fn probes(&self) -> Vec<String> {
        self.probes.lock().clone()
    }

    fn check(&self, path: &str) -> anyhow::Result<bool> {
        if self.broken.lock().contains(path) {
            bail!("probe for {} blew up", path);
        }
        Ok(self.valid.lock().contains(path))
    }
}

#[async_trait]
impl ProcessBridge for MockBridge {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn spawn(
        &self,
        _shell: &str,
        _args: &[String],
        config: &SpawnConfig,
    ) -> anyhow::Result<Box<dyn PtyProcess>> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            bail!("posix_spawnp failed: resource temporarily unavailable");
        }
        self.configs.lock().push(config.clone());
        let process = Arc::new(MockProcess::new(self.next_pid.fetch_add(1, Ordering::SeqCst)));
        process
            .fail_subscribe
            .store(self.fail_subscribe.load(Ordering::SeqCst), Ordering::SeqCst);
        if let Some(code) = *self.exit_on_spawn.lock() {
            process.exit(code);
        }
        self.spawned.lock().push(Arc::clone(&process));
        Ok(Box::new(SharedProcess(process)))
    }

    fn validate_shell_sync(&self, path: &str) -> anyhow::Result<bool> {
        self.check(path)
    }

    async fn validate_shell(&self, path: &str) -> anyhow::Result<bool> {
        self.probes.lock().push(path.to_string());
        tokio::task::yield_now().await;
        self.check(path)
    }

    fn platform(&self) -> Platform {
        self.platform.clone()
    }

    fn arch(&self) -> String {
        "x86_64".to_string()
    }

    fn env(&self) -> HashMap<String, String> {
        self.env.clone()
    }

    fn current_dir(&self) -> anyhow::Result<PathBuf> {
        Ok(self.cwd.clone())
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home.lock().clone()
    }

    fn system_default_shell(&self) -> anyhow::Result<String> {
        self.system_default
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("no default shell configured"))
    }
}

pub struct MockProcess {
    pub pid: u32,
    pub registry: ObserverRegistry,
    pub fail_resize: AtomicBool,
    pub fail_kill: AtomicBool,
    pub fail_unsubscribe: AtomicBool,
    pub fail_subscribe: AtomicBool,
    pub killed: AtomicBool,
    pub resizes: Mutex<Vec<TermSize>>,
    pub written: Mutex<Vec<u8>>,
}

impl MockProcess {
    fn new(pid: u32) -> Self {
        Self {
            pid,
            registry: ObserverRegistry::new(),
            fail_resize: AtomicBool::new(false),
            fail_kill: AtomicBool::new(false),
            fail_unsubscribe: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            killed: AtomicBool::new(false),
            resizes: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn exit(&self, code: i32) {
        self.registry.dispatch(ProcessEvent::Exit(ExitStatus::code(code)));
    }

    pub fn fail(&self, message: &str) {
        self.registry.dispatch(ProcessEvent::Error(message.to_string()));
    }

    pub fn observer_count(&self) -> usize {
        self.registry.len()
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

struct SharedProcess(Arc<MockProcess>);

impl PtyProcess for SharedProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.0.pid)
    }

    fn resize(&self, size: TermSize) -> anyhow::Result<()> {
        if self.0.fail_resize.load(Ordering::SeqCst) {
            bail!("ioctl(TIOCSWINSZ) failed");
        }
        self.0.resizes.lock().push(size);
        Ok(())
    }

    fn kill(&self) -> anyhow::Result<()> {
        if self.0.fail_kill.load(Ordering::SeqCst) {
            bail!("kill: operation not permitted");
        }
        self.0.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self, kind: EventKind, observer: EventObserver) -> anyhow::Result<Subscription> {
        if self.0.fail_subscribe.load(Ordering::SeqCst) {
            bail!("process handle closed");
        }
        Ok(self.0.registry.subscribe(kind, observer))
    }

    fn unsubscribe(&self, subscription: Subscription) -> anyhow::Result<()> {
        if self.0.fail_unsubscribe.load(Ordering::SeqCst) {
            bail!("listener table locked");
        }
        self.0.registry.unsubscribe(subscription);
        Ok(())
    }

    fn write(&self, data: &[u8]) -> anyhow::Result<()> {
        self.0.written.lock().extend_from_slice(data);
        Ok(())
    }

    fn take_reader(&self) -> Option<Box<dyn Read + Send>> {
        Some(Box::new(std::io::empty()))
    }
}
