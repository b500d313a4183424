//! Sleeping, abstracted so tests can run the state machine without waiting

use super::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::time::Duration;

/// Monotonic sleep
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleep unless shutdown is requested first
///
/// Returns `false` when the pause was cut short (or shutdown was already
/// requested before it began).
pub async fn pause(sleeper: &dyn Sleeper, shutdown: &ShutdownSignal, duration: Duration) -> bool {
    if shutdown.is_triggered() {
        return false;
    }
    tokio::select! {
        _ = sleeper.sleep(duration) => !shutdown.is_triggered(),
        _ = shutdown.wait() => false,
    }
}
