#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use ptyward::pty::{ExitStatus, HandleId};
use ptyward::{LifecycleEvent, NativeBridge, PtyManager, PtyOptions};
use tokio::sync::broadcast;

fn sh(script: &str) -> PtyOptions {
    PtyOptions::new("/bin/sh")
        .with_args(["-c", script])
        .with_cwd(std::env::temp_dir())
        .with_env("PATH", "/usr/bin:/bin")
}

async fn terminated(events: &mut broadcast::Receiver<LifecycleEvent>, id: HandleId) -> ExitStatus {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for termination")
            .expect("event channel closed");
        match event {
            LifecycleEvent::Terminated { id: done, exit } if done == id => return exit,
            LifecycleEvent::Failed { id: done, message } if done == id => {
                panic!("{} failed: {}", id, message)
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn exit_code_untracks_handle() {
    let manager = PtyManager::new(Arc::new(NativeBridge::new()));
    let mut events = manager.subscribe();

    let handle = manager.create_pty(sh("exit 5")).unwrap();
    let id = handle.id();
    // The waiter thread then holds the last reference to the handle.
    drop(handle);

    let exit = terminated(&mut events, id).await;

    assert_eq!(exit, ExitStatus::code(5));
    assert_eq!(manager.active_count(), 0);
    assert!(manager.get(id).is_none());
}

#[tokio::test]
async fn signal_death_is_reported_with_signal() {
    let manager = PtyManager::new(Arc::new(NativeBridge::new()));
    let mut events = manager.subscribe();

    let id = manager.create_pty(sh("kill -TERM $$")).unwrap().id();

    let exit = terminated(&mut events, id).await;

    assert_eq!(exit.signal, Some(15));
    assert_eq!(manager.active_count(), 0);
}

#[tokio::test]
async fn destroy_kills_running_shell() {
    let manager = PtyManager::new(Arc::new(NativeBridge::new()));
    let mut events = manager.subscribe();

    let handle = manager.create_pty(sh("sleep 30")).unwrap();
    let id = handle.id();
    manager.destroy_pty(id);

    assert_eq!(manager.active_count(), 0);
    let mut saw_destroyed = false;
    while let Ok(event) = events.try_recv() {
        if event == (LifecycleEvent::Destroyed { id }) {
            saw_destroyed = true;
        }
    }
    assert!(saw_destroyed);
}
