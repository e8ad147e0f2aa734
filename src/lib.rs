//! Ptyward - pseudo-terminal lifecycle manager
//!
//! Spawns interactive shells inside native pseudo-terminals, keeps track of
//! the running ones, and tears them down again.
//!
//! ## Components
//!
//! - **Process Bridge**: the seam to the host's PTY facility ([`NativeBridge`] in production)
//! - **Environment Builder**: UTF-8 locale and code page normalization per platform
//! - **Shell Resolver**: settings, host default and per-platform fallback shells
//! - **PTY Manager**: create / destroy / resize / cleanup over the set of live PTYs

pub mod error;
pub mod pty;

// Re-export commonly used types
pub use error::{PtywardError, Result};
pub use pty::{
    build_spawn_env, ErrorKind, LifecycleEvent, NativeBridge, Platform, ProcessBridge, PtyError,
    PtyHandle, PtyManager, PtyOptions, SettingsProvider, ShellSettings,
};
