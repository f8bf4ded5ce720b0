//! Background eviction loops.
//!
//! Each [`Sweeper`] owns one tokio task that calls its sweep function every
//! probe interval. The task runs until [`Sweeper::stop`] is called or the
//! handle is dropped; the stop signal is a oneshot, so it is sent at most once.

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to one running eviction loop.
#[derive(Debug)]
pub struct Sweeper {
    name: &'static str,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn a loop calling `sweep(ttl)` every `interval`.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn spawn<F>(name: &'static str, interval: Duration, ttl: Duration, sweep: F) -> Self
    where
        F: Fn(Duration) -> usize + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::debug!(sweeper = name, "Sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = sweep(ttl);
                        if removed > 0 {
                            tracing::debug!(sweeper = name, removed, "Evicted expired entries");
                        }
                    }
                }
            }
        });

        tracing::debug!(
            sweeper = name,
            interval_ms = interval.as_millis() as u64,
            ttl_ms = ttl.as_millis() as u64,
            "Sweeper started"
        );

        Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the loop to stop and wait for it. Later calls do nothing.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(sweeper = self.name, error = %e, "Sweeper task ended abnormally");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// The engine's two eviction loops.
#[derive(Debug)]
pub struct Sweepers {
    pub(crate) state: Sweeper,
    pub(crate) session: Sweeper,
}

impl Sweepers {
    pub fn is_running(&self) -> bool {
        self.state.is_running() || self.session.is_running()
    }

    /// Stop both loops. Safe to call more than once.
    pub async fn shutdown(&mut self) {
        self.state.stop().await;
        self.session.stop().await;
        tracing::info!("Eviction sweepers stopped");
    }
}
