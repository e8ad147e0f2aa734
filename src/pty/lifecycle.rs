use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// How a PTY child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i32,
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn code(code: i32) -> Self {
        Self { code, signal: None }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: 128 + signal,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal {
            Some(signal) => write!(f, "killed by signal {}", signal),
            None => write!(f, "exit code {}", self.code),
        }
    }
}

/// Notification pushed by a process once it stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Exit(ExitStatus),
    Error(String),
}

impl ProcessEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProcessEvent::Exit(_) => EventKind::Exit,
            ProcessEvent::Error(_) => EventKind::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Exit,
    Error,
}

pub type EventObserver = Arc<dyn Fn(&ProcessEvent) + Send + Sync>;

/// Token returned by a subscription, used to release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    observers: Vec<(Subscription, EventKind, EventObserver)>,
    settled: Option<ProcessEvent>,
}

/// Per-process list of exit/error observers.
///
/// A process settles at most once. Observers subscribed after it settled are
/// invoked immediately with the recorded event, so a child that dies before
/// anyone subscribed is still observed. Observers always run without the
/// registry lock held.
#[derive(Default)]
pub struct ObserverRegistry {
    state: Mutex<RegistryState>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, observer: EventObserver) -> Subscription {
        let (subscription, replay) = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let subscription = Subscription(state.next_id);
            state.observers.push((subscription, kind, Arc::clone(&observer)));
            let replay = state.settled.clone().filter(|event| event.kind() == kind);
            (subscription, replay)
        };

        if let Some(event) = replay {
            debug!("Replaying settled {:?} event to late observer", kind);
            observer(&event);
        }
        subscription
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut state = self.state.lock();
        let before = state.observers.len();
        state.observers.retain(|(s, _, _)| *s != subscription);
        state.observers.len() != before
    }

    /// Record the event and notify matching observers. Later dispatches are
    /// ignored.
    pub fn dispatch(&self, event: ProcessEvent) {
        let targets: Vec<EventObserver> = {
            let mut state = self.state.lock();
            if state.settled.is_some() {
                debug!("Ignoring {:?} after process already settled", event.kind());
                return;
            }
            state.settled = Some(event.clone());
            state
                .observers
                .iter()
                .filter(|(_, kind, _)| *kind == event.kind())
                .map(|(_, _, observer)| Arc::clone(observer))
                .collect()
        };

        for observer in targets {
            observer(&event);
        }
    }

    pub fn is_settled(&self) -> bool {
        self.state.lock().settled.is_some()
    }

    pub fn len(&self) -> usize {
        self.state.lock().observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
