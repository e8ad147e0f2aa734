use std::collections::HashMap;
use std::env;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, info, warn};

use super::bridge::{ProcessBridge, PtyProcess};
use super::lifecycle::{
    EventKind, EventObserver, ExitStatus, ObserverRegistry, ProcessEvent, Subscription,
};
use super::options::{Platform, SpawnConfig, TermSize};

/// Process bridge backed by the operating system's PTY facility
/// (openpty on Unix, ConPTY on Windows).
#[derive(Debug, Default, Clone)]
pub struct NativeBridge;

impl NativeBridge {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessBridge for NativeBridge {
    fn is_available(&self) -> bool {
        cfg!(any(unix, windows))
    }

    fn spawn(
        &self,
        shell: &str,
        args: &[String],
        config: &SpawnConfig,
    ) -> anyhow::Result<Box<dyn PtyProcess>> {
        info!("Spawning shell: {} {:?} ({})", shell, args, config.size);
        if config.use_conpty {
            debug!("Console compatibility mode requested, using ConPTY backend");
        }

        let pair = native_pty_system()
            .openpty(pty_size(config.size))
            .context("failed to open PTY")?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.args(args);
        cmd.cwd(&config.cwd);
        cmd.env_clear();
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        // Take both ends of the master before spawning so a failure here
        // never leaves a child behind.
        let reader = pair
            .master
            .try_clone_reader()
            .context("failed to clone PTY reader")?;
        let writer = pair
            .master
            .take_writer()
            .context("failed to take PTY writer")?;

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("failed to spawn '{}'", shell))?;
        // Only the master side is kept; holding the slave would keep the
        // reader from seeing EOF after the child exits.
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        let mut orphan_killer = child.clone_killer();
        let observers = Arc::new(ObserverRegistry::new());

        let waiter_observers = Arc::clone(&observers);
        let waiter = thread::Builder::new()
            .name("pty-waiter".to_string())
            .spawn(move || {
                let event = match wait_for_exit(&mut child) {
                    Ok(exit) => {
                        debug!("Child process {:?} exited: {}", pid, exit);
                        ProcessEvent::Exit(exit)
                    }
                    Err(e) => {
                        warn!("Waiting on child process {:?} failed: {}", pid, e);
                        ProcessEvent::Error(e.to_string())
                    }
                };
                waiter_observers.dispatch(event);
            });
        if let Err(e) = waiter {
            abandon_child(orphan_killer.as_mut(), pid);
            return Err(e).context("failed to spawn PTY waiter thread");
        }

        Ok(Box::new(NativeProcess {
            pid,
            master: Mutex::new(pair.master),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(writer),
            killer: Mutex::new(killer),
            observers,
        }))
    }

    fn validate_shell_sync(&self, path: &str) -> anyhow::Result<bool> {
        Ok(resolve_executable(path).is_some())
    }

    async fn validate_shell(&self, path: &str) -> anyhow::Result<bool> {
        let path = path.to_string();
        let found = tokio::task::spawn_blocking(move || resolve_executable(&path).is_some())
            .await
            .context("shell validation task failed")?;
        Ok(found)
    }

    fn platform(&self) -> Platform {
        Platform::current()
    }

    fn arch(&self) -> String {
        env::consts::ARCH.to_string()
    }

    fn env(&self) -> HashMap<String, String> {
        env::vars().collect()
    }

    fn current_dir(&self) -> anyhow::Result<PathBuf> {
        Ok(env::current_dir()?)
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    fn system_default_shell(&self) -> anyhow::Result<String> {
        let var = if cfg!(windows) { "COMSPEC" } else { "SHELL" };
        match env::var(var) {
            Ok(shell) if !shell.trim().is_empty() => Ok(shell),
            _ => Err(anyhow!("{} is not set", var)),
        }
    }
}

struct NativeProcess {
    pid: Option<u32>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    reader: Mutex<Option<Box<dyn Read + Send>>>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    observers: Arc<ObserverRegistry>,
}

impl PtyProcess for NativeProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn resize(&self, size: TermSize) -> anyhow::Result<()> {
        debug!("Resizing PTY {:?} to {}", self.pid, size);
        self.master.lock().resize(pty_size(size))
    }

    fn kill(&self) -> anyhow::Result<()> {
        if self.observers.is_settled() {
            debug!("Child process {:?} already exited, nothing to kill", self.pid);
            return Ok(());
        }
        self.killer.lock().kill()?;
        Ok(())
    }

    fn subscribe(&self, kind: EventKind, observer: EventObserver) -> anyhow::Result<Subscription> {
        Ok(self.observers.subscribe(kind, observer))
    }

    fn unsubscribe(&self, subscription: Subscription) -> anyhow::Result<()> {
        if !self.observers.unsubscribe(subscription) {
            debug!("Subscription {:?} was already released", subscription);
        }
        Ok(())
    }

    fn write(&self, data: &[u8]) -> anyhow::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    fn take_reader(&self) -> Option<Box<dyn Read + Send>> {
        self.reader.lock().take()
    }
}

type NativeChild = Box<dyn Child + Send + Sync>;

/// Block until the child exits and report how it ended.
///
/// On Unix the child is reaped with `waitpid` so a fatal signal is reported
/// as such rather than folded into an exit code.
#[cfg(unix)]
fn wait_for_exit(child: &mut NativeChild) -> anyhow::Result<ExitStatus> {
    use nix::errno::Errno;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::Pid;

    let Some(pid) = child.process_id() else {
        let status = child.wait()?;
        return Ok(ExitStatus::code(status.exit_code() as i32));
    };

    loop {
        match waitpid(Pid::from_raw(pid as i32), None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus::code(code)),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                return Ok(ExitStatus::signaled(signal as i32))
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => return Err(e).context("waitpid failed"),
        }
    }
}

#[cfg(not(unix))]
fn wait_for_exit(child: &mut NativeChild) -> anyhow::Result<ExitStatus> {
    let status = child.wait()?;
    Ok(ExitStatus::code(status.exit_code() as i32))
}

/// Terminate and reap a child that no waiter will ever watch.
fn abandon_child(killer: &mut (dyn ChildKiller + Send + Sync), pid: Option<u32>) {
    warn!("Abandoning child process {:?}", pid);
    if let Err(e) = killer.kill() {
        warn!("Failed to kill abandoned child {:?}: {}", pid, e);
    }

    #[cfg(unix)]
    if let Some(pid) = pid {
        let _ = nix::sys::wait::waitpid(nix::unistd::Pid::from_raw(pid as i32), None);
    }
}

fn pty_size(size: TermSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Locate `shell` as an executable file, searching `PATH` for bare names.
fn resolve_executable(shell: &str) -> Option<PathBuf> {
    if shell.trim().is_empty() {
        return None;
    }

    let path = Path::new(shell);
    if path.is_absolute() || path.components().count() > 1 {
        return is_executable(path).then(|| path.to_path_buf());
    }

    let search_path = env::var_os("PATH")?;
    env::split_paths(&search_path).find_map(|dir| {
        candidate_names(shell)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|candidate| is_executable(candidate))
    })
}

fn candidate_names(shell: &str) -> Vec<String> {
    if cfg!(windows) && Path::new(shell).extension().is_none() {
        vec![format!("{}.exe", shell), format!("{}.cmd", shell), shell.to_string()]
    } else {
        vec![shell.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
