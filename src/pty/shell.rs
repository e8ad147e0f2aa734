//! Shell selection: user settings first, then the host default, then a
//! static per-platform table.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::bridge::ProcessBridge;
use super::options::Platform;
use super::settings::{SettingsProvider, ShellSettings};

const WINDOWS_SHELLS: &[&str] = &[
    "C:\\Windows\\System32\\WindowsPowerShell\\v1.0\\powershell.exe",
    "C:\\Program Files\\PowerShell\\7\\pwsh.exe",
    "C:\\Windows\\System32\\cmd.exe",
];

const MACOS_SHELLS: &[&str] = &["/bin/zsh", "/bin/bash", "/bin/sh"];

const LINUX_SHELLS: &[&str] = &["/bin/bash", "/bin/zsh", "/usr/bin/fish", "/bin/sh"];

const POSIX_SHELL: &str = "/bin/sh";

/// Candidate shells for `platform`, most commonly correct first.
pub fn platform_shells(platform: &Platform) -> &'static [&'static str] {
    match platform {
        Platform::Windows => WINDOWS_SHELLS,
        Platform::MacOs => MACOS_SHELLS,
        Platform::Linux => LINUX_SHELLS,
        Platform::Other(_) => &[POSIX_SHELL],
    }
}

/// Shell used when even the host cannot name a default.
pub fn fallback_shell(platform: &Platform) -> &'static str {
    match platform {
        Platform::Windows => "cmd.exe",
        Platform::MacOs => "/bin/zsh",
        Platform::Linux => "/bin/bash",
        Platform::Other(_) => POSIX_SHELL,
    }
}

/// Which step of the fallback chain produced a shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellSource {
    /// The user's configured shell.
    Configured,
    /// The host's own default shell.
    SystemDefault,
    /// The built-in per-platform fallback.
    StaticFallback,
    /// Position in the alternatives list that validated first.
    Alternative(usize),
}

impl fmt::Display for ShellSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellSource::Configured => write!(f, "configured"),
            ShellSource::SystemDefault => write!(f, "system default"),
            ShellSource::StaticFallback => write!(f, "static fallback"),
            ShellSource::Alternative(index) => write!(f, "alternative #{}", index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellResolution {
    pub path: String,
    pub source: ShellSource,
}

impl ShellResolution {
    fn new(path: impl Into<String>, source: ShellSource) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

pub struct ShellResolver {
    bridge: Arc<dyn ProcessBridge>,
    settings: RwLock<Option<Arc<dyn SettingsProvider>>>,
}

impl ShellResolver {
    pub fn new(bridge: Arc<dyn ProcessBridge>) -> Self {
        Self {
            bridge,
            settings: RwLock::new(None),
        }
    }

    /// Replace the settings provider. `None` removes user overrides.
    pub fn set_settings_provider(&self, provider: Option<Arc<dyn SettingsProvider>>) {
        *self.settings.write() = provider;
    }

    /// Fetch settings from the current provider. Never cached.
    pub fn current_settings(&self) -> Option<ShellSettings> {
        let provider = self.settings.read().clone();
        provider.and_then(|p| p.shell_settings())
    }

    /// Resolve the shell to launch by default.
    pub fn default_shell(&self) -> ShellResolution {
        self.resolve_with(self.current_settings().as_ref())
    }

    /// Resolve against an already-fetched settings snapshot.
    pub fn resolve_with(&self, settings: Option<&ShellSettings>) -> ShellResolution {
        if let Some(configured) = settings.and_then(ShellSettings::configured_shell) {
            if self.validate_shell_path(configured) {
                debug!("Using configured shell {}", configured);
                return ShellResolution::new(configured, ShellSource::Configured);
            }
            warn!(
                "Configured shell {} is not usable, falling back to system default",
                configured
            );
        }

        match self.bridge.system_default_shell() {
            Ok(shell) => ShellResolution::new(shell, ShellSource::SystemDefault),
            Err(e) => {
                let platform = self.bridge.platform();
                let shell = fallback_shell(&platform);
                debug!("No system default shell ({}), using {} for {}", e, shell, platform);
                ShellResolution::new(shell, ShellSource::StaticFallback)
            }
        }
    }

    pub fn alternative_shells(&self) -> Vec<String> {
        platform_shells(&self.bridge.platform())
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Probe the alternatives in order and return the first that validates.
    ///
    /// Probes run one at a time and stop at the first success. A probe that
    /// errors counts as invalid. With no valid alternative the default shell
    /// is returned.
    pub async fn find_available_shell(&self) -> ShellResolution {
        for (index, candidate) in self.alternative_shells().into_iter().enumerate() {
            match self.bridge.validate_shell(&candidate).await {
                Ok(true) => {
                    info!("Found available shell: {}", candidate);
                    return ShellResolution::new(candidate, ShellSource::Alternative(index));
                }
                Ok(false) => debug!("Shell candidate {} is not available", candidate),
                Err(e) => debug!("Probing shell candidate {} failed: {}", candidate, e),
            }
        }

        warn!("No alternative shell validated, using default shell");
        self.default_shell()
    }

    /// Whether `path` is a usable shell. Never fails; bridge errors count as
    /// invalid.
    pub fn validate_shell_path(&self, path: &str) -> bool {
        match self.bridge.validate_shell_sync(path) {
            Ok(valid) => valid,
            Err(e) => {
                debug!("Shell validation for {} failed: {}", path, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_tables() {
        assert_eq!(platform_shells(&Platform::MacOs)[0], "/bin/zsh");
        assert_eq!(platform_shells(&Platform::Linux)[0], "/bin/bash");
        assert!(platform_shells(&Platform::Windows)[0].ends_with("powershell.exe"));
        assert_eq!(
            platform_shells(&Platform::Other("aix".into())),
            &["/bin/sh"]
        );
    }

    #[test]
    fn test_fallback_table() {
        assert_eq!(fallback_shell(&Platform::Windows), "cmd.exe");
        assert_eq!(fallback_shell(&Platform::MacOs), "/bin/zsh");
        assert_eq!(fallback_shell(&Platform::Linux), "/bin/bash");
        assert_eq!(fallback_shell(&Platform::Other("plan9".into())), "/bin/sh");
    }

    #[test]
    fn test_source_display() {
        assert_eq!(ShellSource::Alternative(2).to_string(), "alternative #2");
        assert_eq!(ShellSource::StaticFallback.to_string(), "static fallback");
    }
}
