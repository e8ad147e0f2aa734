use std::error::Error as StdError;

use serde_json::{json, Value};
use thiserror::Error;

use super::lifecycle::ExitStatus;
use super::manager::HandleId;
use super::options::PtyOptions;

type Cause = Box<dyn StdError + Send + Sync + 'static>;

/// Category of a PTY failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The host cannot spawn pseudo-terminals at all.
    BridgeUnavailable,
    /// The requested shell failed the validity check.
    ShellNotFound,
    /// Spawning failed for any other reason.
    PtyCreationFailed,
    /// Releasing a handle's resources failed.
    PtyTeardownFailed,
    /// The process behind a handle exited. Delivered as an event, never raised.
    ProcessTerminated,
}

impl ErrorKind {
    /// Fixed, non-technical message suitable for showing to a user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::BridgeUnavailable => "Terminal support is not available on this system.",
            ErrorKind::ShellNotFound => "The configured shell could not be found.",
            ErrorKind::PtyCreationFailed => "The terminal could not be started.",
            ErrorKind::PtyTeardownFailed => "The terminal could not be closed cleanly.",
            ErrorKind::ProcessTerminated => "The terminal process has exited.",
        }
    }
}

/// Typed PTY failure: a kind, a message, the low-level cause and
/// structured context for diagnostics.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct PtyError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<Cause>,
    context: Value,
}

impl PtyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            context: Value::Null,
        }
    }

    pub fn with_source(mut self, source: impl Into<Cause>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn bridge_unavailable() -> Self {
        Self::new(
            ErrorKind::BridgeUnavailable,
            "PTY spawning is not available on this host",
        )
    }

    pub fn shell_not_found(shell: &str) -> Self {
        Self::new(ErrorKind::ShellNotFound, format!("Shell not found: {}", shell))
            .with_context(json!({ "shell": shell }))
    }

    pub fn creation_failed(cause: impl Into<Cause>, options: &PtyOptions) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::PtyCreationFailed,
            format!("PTY creation failed: {}", cause),
        )
        .with_source(cause)
        .with_context(options.describe())
    }

    pub fn teardown_failed(cause: impl Into<Cause>, id: HandleId) -> Self {
        let cause = cause.into();
        Self::new(
            ErrorKind::PtyTeardownFailed,
            format!("PTY teardown failed for {}: {}", id, cause),
        )
        .with_source(cause)
        .with_context(json!({ "handle": id.get() }))
    }

    pub fn process_terminated(id: HandleId, exit: &ExitStatus) -> Self {
        Self::new(
            ErrorKind::ProcessTerminated,
            format!("{} terminated: {}", id, exit),
        )
        .with_context(json!({
            "handle": id.get(),
            "code": exit.code,
            "signal": exit.signal,
        }))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}
