// Handler layer - feed drivers binding transports, books and publishing

pub mod health;
pub mod quote;
pub mod trade;

pub use health::HealthTracker;
pub use quote::QuoteFeedHandler;
pub use trade::TradeFeedHandler;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

/// Cooperative shutdown flag, settable from the signal task and polled by
/// every driver loop and backoff sleep.
#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

/// Wall-clock receive timestamp in nanoseconds since the Unix epoch.
pub fn wall_clock_ns() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Trip the shutdown flag on SIGINT or SIGTERM. No other signals are
/// trapped. Must be called from within a runtime.
pub fn install_signal_handlers(shutdown: &Shutdown) {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        }
        shutdown.trigger();
    });
}

/// Exponential backoff delay for reconnect attempt `attempt` (0-based):
/// initial doubling up to max.
pub fn backoff_delay_ms(attempt: u32, initial_ms: u64, max_ms: u64) -> u64 {
    let mut delay = initial_ms;
    for _ in 0..attempt {
        if delay >= max_ms {
            break;
        }
        delay = delay.saturating_mul(2);
    }
    delay.min(max_ms)
}

/// Sleep for `delay_ms` in slices of at most 100 ms, bailing out early on
/// shutdown. Returns false when shutdown was requested.
pub async fn sleep_with_backoff(
    attempt: u32,
    initial_ms: u64,
    max_ms: u64,
    shutdown: &Shutdown,
) -> bool {
    let delay_ms = backoff_delay_ms(attempt, initial_ms, max_ms);
    info!(delay_ms = delay_ms, attempt = attempt, "Waiting before reconnect");

    let check_interval = Duration::from_millis(100);
    let mut slept = 0u64;
    while slept < delay_ms {
        if shutdown.is_set() {
            return false;
        }
        let remaining = Duration::from_millis(delay_ms - slept);
        tokio::time::sleep(remaining.min(check_interval)).await;
        slept += 100;
    }

    !shutdown.is_set()
}
