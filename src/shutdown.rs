//! Interrupt handling for the poll loop.
//!
//! SIGINT (Ctrl+C) and SIGTERM flip a watch channel that the poll loop
//! selects on, so an interrupted run stops cleanly instead of being killed
//! mid-report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Shutdown signal that can be awaited.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for the shutdown signal.
    pub async fn recv(&mut self) {
        // A dropped controller never fires, so keep waiting.
        if self.receiver.wait_for(|&v| v).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Check if shutdown has been signaled without blocking.
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Controller that fans a single shutdown request out to every signal.
pub struct ShutdownController {
    sender: watch::Sender<bool>,
    shutting_down: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Get a shutdown signal receiver.
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Check if shutdown is in progress.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Request shutdown. Later calls are no-ops.
    pub fn shutdown(&self) {
        if self
            .shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Stopping...");
            self.sender.send_replace(true);
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared shutdown controller type.
pub type SharedShutdownController = Arc<ShutdownController>;

/// Create a new shared shutdown controller.
pub fn new_shutdown_controller() -> SharedShutdownController {
    Arc::new(ShutdownController::new())
}

/// Install signal handlers that trigger the controller.
///
/// Handles Ctrl+C everywhere and SIGTERM on Unix.
pub fn install_signal_handlers(controller: SharedShutdownController) {
    let ctrl_c_controller = controller.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, stopping");
                ctrl_c_controller.shutdown();
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C signal: {}", e);
            }
        }
    });

    #[cfg(unix)]
    {
        let term_controller = controller;
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, stopping");
                    term_controller.shutdown();
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                }
            }
        });
    }

    #[cfg(not(unix))]
    drop(controller);
}
