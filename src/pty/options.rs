use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde_json::{json, Value};

/// Default terminal columns.
pub const DEFAULT_COLS: u16 = 80;

/// Default terminal rows.
pub const DEFAULT_ROWS: u16 = 24;

/// Operating-system family the PTY runs on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Other(String),
}

impl Platform {
    /// Parse an OS identifier such as `std::env::consts::OS`.
    pub fn from_os(os: &str) -> Self {
        match os.to_ascii_lowercase().as_str() {
            "windows" | "win32" => Platform::Windows,
            "macos" | "darwin" => Platform::MacOs,
            "linux" => Platform::Linux,
            other => Platform::Other(other.to_string()),
        }
    }

    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::MacOs => write!(f, "macos"),
            Platform::Linux => write!(f, "linux"),
            Platform::Other(os) => write!(f, "{}", os),
        }
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    /// Build a size, replacing zero dimensions with the defaults.
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols: if cols == 0 { DEFAULT_COLS } else { cols },
            rows: if rows == 0 { DEFAULT_ROWS } else { rows },
        }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// A request to spawn a shell inside a new PTY.
#[derive(Debug, Clone, PartialEq)]
pub struct PtyOptions {
    /// Absolute path or bare executable name.
    pub shell: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub cols: u16,
    pub rows: u16,
}

impl PtyOptions {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            args: Vec::new(),
            cwd: PathBuf::from("/"),
            env: HashMap::new(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn size(&self) -> TermSize {
        TermSize::new(self.cols, self.rows)
    }

    /// Diagnostic view of the request. Environment values are left out
    /// because they routinely carry credentials.
    pub fn describe(&self) -> Value {
        let mut env_keys: Vec<&String> = self.env.keys().collect();
        env_keys.sort();
        json!({
            "shell": self.shell,
            "args": self.args,
            "cwd": self.cwd.display().to_string(),
            "cols": self.cols,
            "rows": self.rows,
            "env_keys": env_keys,
        })
    }
}

/// Where the working directory of a spawned PTY came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CwdSource {
    Requested,
    HomeFallback,
    RootFallback,
}

/// Everything the bridge needs besides the program and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnConfig {
    pub size: TermSize,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub encoding: String,
    /// Console emulation compatibility mode. Only ever set on Windows.
    pub use_conpty: bool,
}

impl SpawnConfig {
    pub fn for_platform(options: &PtyOptions, platform: &Platform) -> Self {
        Self {
            size: options.size(),
            cwd: options.cwd.clone(),
            env: options.env.clone(),
            encoding: "utf8".to_string(),
            use_conpty: platform.is_windows(),
        }
    }
}
