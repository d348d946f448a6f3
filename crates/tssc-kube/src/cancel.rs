//! Cooperative cancellation on SIGINT and SIGTERM

use std::future::Future;
use tokio::sync::watch;

use crate::error::{KubeError, Result};

/// Cancellation signal shared by every long running operation
#[derive(Clone, Debug)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

/// Triggers a [`CancelSignal`]
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !*self.sender.borrow() {
            tracing::warn!("cancellation requested, stopping");
        }
        self.sender.send_replace(true);
    }
}

impl CancelSignal {
    pub fn new() -> (CancelHandle, Self) {
        let (sender, receiver) = watch::channel(false);
        (CancelHandle { sender }, Self { receiver })
    }

    /// A signal that never fires
    pub fn never() -> Self {
        let (handle, signal) = Self::new();
        // Dropping the sender leaves the value at false for good
        drop(handle);
        signal
    }

    /// Fires on the first SIGINT or SIGTERM received by the process
    pub fn from_os_signals() -> Self {
        let (handle, signal) = Self::new();
        tokio::spawn(async move {
            wait_for_os_signal().await;
            handle.cancel();
        });
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancelled, never when the handle is gone
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run `operation` unless cancelled first
    pub async fn run<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_cancelled() {
            return Err(KubeError::Cancelled);
        }
        tokio::select! {
            result = operation => result,
            _ = self.cancelled() => Err(KubeError::Cancelled),
        }
    }
}

async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "unable to listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
