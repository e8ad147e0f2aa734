//! Boundary between the manager and whatever actually creates processes.
//!
//! [`ProcessBridge`] is implemented by [`NativeBridge`](super::NativeBridge)
//! for real pseudo-terminals; tests substitute a scripted bridge.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;

use super::lifecycle::{EventKind, EventObserver, Subscription};
use super::options::{Platform, SpawnConfig, TermSize};

/// Host capability for spawning and inspecting native PTY processes.
#[async_trait]
pub trait ProcessBridge: Send + Sync {
    /// Whether PTY spawning works on this host at all.
    fn is_available(&self) -> bool;

    fn spawn(
        &self,
        shell: &str,
        args: &[String],
        config: &SpawnConfig,
    ) -> anyhow::Result<Box<dyn PtyProcess>>;

    /// Blocking check that `path` names an existing executable.
    fn validate_shell_sync(&self, path: &str) -> anyhow::Result<bool>;

    /// Same check as [`validate_shell_sync`](Self::validate_shell_sync),
    /// without blocking the caller.
    async fn validate_shell(&self, path: &str) -> anyhow::Result<bool>;

    fn platform(&self) -> Platform;

    fn arch(&self) -> String;

    /// Snapshot of the ambient process environment.
    fn env(&self) -> HashMap<String, String>;

    fn current_dir(&self) -> anyhow::Result<PathBuf>;

    fn home_dir(&self) -> Option<PathBuf>;

    /// The shell the host considers its default (`$SHELL`, `%COMSPEC%`).
    fn system_default_shell(&self) -> anyhow::Result<String>;
}

/// A spawned pseudo-terminal process as seen through the bridge.
pub trait PtyProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    fn resize(&self, size: TermSize) -> anyhow::Result<()>;

    /// Ask the process to terminate.
    fn kill(&self) -> anyhow::Result<()>;

    fn subscribe(&self, kind: EventKind, observer: EventObserver) -> anyhow::Result<Subscription>;

    fn unsubscribe(&self, subscription: Subscription) -> anyhow::Result<()>;

    fn write(&self, data: &[u8]) -> anyhow::Result<()>;

    /// Hand out the output stream. Returns `None` once it has been taken.
    fn take_reader(&self) -> Option<Box<dyn Read + Send>>;
}
