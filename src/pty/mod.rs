pub mod bridge;
pub mod env;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod manager;
pub mod options;
pub mod settings;
pub mod shell;

pub use bridge::{ProcessBridge, PtyProcess};
pub use env::build_spawn_env;
pub use error::{ErrorKind, PtyError};
pub use host::NativeBridge;
pub use lifecycle::{EventKind, EventObserver, ExitStatus, ObserverRegistry, ProcessEvent, Subscription};
pub use manager::{HandleId, LifecycleEvent, PtyHandle, PtyManager};
pub use options::{CwdSource, Platform, PtyOptions, SpawnConfig, TermSize, DEFAULT_COLS, DEFAULT_ROWS};
pub use settings::{FileSettingsProvider, SettingsProvider, ShellSettings, StaticSettings};
pub use shell::{ShellResolution, ShellResolver, ShellSource};
