use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ptyward::pty::{FileSettingsProvider, SettingsProvider};
use ptyward::{LifecycleEvent, NativeBridge, PtyManager};

#[derive(Parser)]
#[command(name = "ptyward", version, about = "Spawn and manage shells in pseudo-terminals")]
struct Cli {
    /// Settings file (JSON with `defaultShell` and `shellArgs`)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List candidate shells for this platform
    Shells,
    /// Show the default shell and where it came from
    Resolve,
    /// Probe candidate shells and print the first usable one
    Find,
    /// Run a shell in a PTY and stream its output
    Run {
        #[arg(long)]
        shell: Option<String>,
        #[arg(long)]
        cwd: Option<PathBuf>,
        #[arg(long)]
        cols: Option<u16>,
        #[arg(long)]
        rows: Option<u16>,
        /// Arguments passed to the shell
        #[arg(last = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let manager = PtyManager::new(Arc::new(NativeBridge::new()));
    let provider = match cli.settings {
        Some(path) => Some(FileSettingsProvider::new(path)),
        None => FileSettingsProvider::default_location(),
    };
    if let Some(provider) = provider {
        info!("Reading settings from {}", provider.path().display());
        manager.set_settings_provider(Some(Arc::new(provider) as Arc<dyn SettingsProvider>));
    }

    match cli.command {
        Command::Shells => {
            for shell in manager.alternative_shells() {
                let mark = if manager.validate_shell_path(&shell) { "ok" } else { "--" };
                println!("[{}] {}", mark, shell);
            }
        }
        Command::Resolve => {
            let resolution = manager.default_shell();
            println!("{} ({})", resolution.path, resolution.source);
        }
        Command::Find => {
            let resolution = manager.find_available_shell().await;
            println!("{} ({})", resolution.path, resolution.source);
        }
        Command::Run {
            shell,
            cwd,
            cols,
            rows,
            args,
        } => run(&manager, shell, cwd, cols, rows, args).await?,
    }

    Ok(())
}

async fn run(
    manager: &PtyManager,
    shell: Option<String>,
    cwd: Option<PathBuf>,
    cols: Option<u16>,
    rows: Option<u16>,
    args: Vec<String>,
) -> anyhow::Result<()> {
    let mut options = manager.default_options();
    if let Some(shell) = shell {
        options.shell = shell;
    }
    if let Some(cwd) = cwd {
        options.cwd = cwd;
    }
    if !args.is_empty() {
        options.args = args;
    }
    options.cols = cols.unwrap_or(options.cols);
    options.rows = rows.unwrap_or(options.rows);

    let mut events = manager.subscribe();
    let handle = match manager.create_pty(options) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Err(e).context("failed to start PTY");
        }
    };

    if let Some(mut reader) = handle.take_reader() {
        thread::Builder::new()
            .name("pty-output".to_string())
            .spawn(move || {
                let mut stdout = io::stdout();
                let mut buf = [0u8; 4096];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stdout.write_all(&buf[..n]).is_err() {
                                break;
                            }
                            let _ = stdout.flush();
                        }
                    }
                }
            })?;
    }

    let id = handle.id();
    loop {
        match events.recv().await {
            Ok(LifecycleEvent::Terminated { id: done, exit }) if done == id => {
                println!();
                info!("{} finished with {}", id, exit);
                break;
            }
            Ok(LifecycleEvent::Failed { id: done, message }) if done == id => {
                manager.cleanup();
                bail!("{} failed: {}", id, message);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Missed {} lifecycle events", skipped),
            Err(RecvError::Closed) => break,
        }
    }

    manager.cleanup();
    Ok(())
}
