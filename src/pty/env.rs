//! Spawn environment normalization.
//!
//! Shells inherit whatever locale the host happens to have, which on a
//! stripped-down system is often `C`/`POSIX` and breaks UTF-8 output. The
//! builder fills in UTF-8 locale variables and, on Windows, switches the
//! console code page to UTF-8.

use std::collections::HashMap;

use super::options::Platform;

/// Locale used when the base environment does not define one.
pub const DEFAULT_LOCALE: &str = "en_US.UTF-8";

const LOCALE_VARS: &[&str] = &["LANG", "LC_ALL", "LC_CTYPE"];

/// UTF-8 code page identifier on Windows.
const UTF8_CODE_PAGE: &str = "65001";

/// Derive the environment for a spawned shell from `base`.
///
/// Existing locale and terminal values win; defaults are only supplied where
/// a variable is absent. The Windows code page and Python I/O encoding are
/// always forced. `base` is left untouched.
pub fn build_spawn_env(base: &HashMap<String, String>, platform: &Platform) -> HashMap<String, String> {
    let mut env = base.clone();

    for var in LOCALE_VARS {
        env.entry((*var).to_string())
            .or_insert_with(|| DEFAULT_LOCALE.to_string());
    }

    env.entry("TERM".to_string())
        .or_insert_with(|| "xterm-256color".to_string());
    env.entry("COLORTERM".to_string())
        .or_insert_with(|| "truecolor".to_string());

    if platform.is_windows() {
        env.insert("CHCP".to_string(), UTF8_CODE_PAGE.to_string());
        env.insert("PYTHONIOENCODING".to_string(), "utf-8".to_string());
    }

    env
}
